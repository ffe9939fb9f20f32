/// SAT-composite to ACT-composite concordance ranges, descending by SAT
/// score: `(sat_min, sat_max, act)`.
const SAT_TO_ACT_RANGES: [(f64, f64, f64); 28] = [
    (1570.0, 1600.0, 36.0),
    (1530.0, 1560.0, 35.0),
    (1490.0, 1520.0, 34.0),
    (1450.0, 1480.0, 33.0),
    (1420.0, 1440.0, 32.0),
    (1390.0, 1410.0, 31.0),
    (1360.0, 1380.0, 30.0),
    (1330.0, 1350.0, 29.0),
    (1300.0, 1320.0, 28.0),
    (1260.0, 1290.0, 27.0),
    (1230.0, 1250.0, 26.0),
    (1200.0, 1220.0, 25.0),
    (1160.0, 1190.0, 24.0),
    (1130.0, 1150.0, 23.0),
    (1100.0, 1120.0, 22.0),
    (1060.0, 1090.0, 21.0),
    (1030.0, 1050.0, 20.0),
    (990.0, 1020.0, 19.0),
    (960.0, 980.0, 18.0),
    (920.0, 950.0, 17.0),
    (880.0, 910.0, 16.0),
    (830.0, 870.0, 15.0),
    (780.0, 820.0, 14.0),
    (730.0, 770.0, 13.0),
    (690.0, 720.0, 12.0),
    (650.0, 680.0, 11.0),
    (620.0, 640.0, 10.0),
    (590.0, 610.0, 9.0),
];

/// Convert an SAT composite (out of 1600) to an ACT composite with decimal
/// precision.
///
/// Each range's lower bound anchors its ACT value; scores between two
/// anchors interpolate linearly, which covers both in-range scores and the
/// gaps between adjacent ranges. Scores above the top anchor clamp to 36,
/// scores at or below the bottom anchor clamp to 9. The result is rounded to
/// one decimal place and is monotonic non-decreasing in the input.
pub fn sat_to_act(sat_composite: f64) -> Option<f64> {
    if !sat_composite.is_finite() {
        return None;
    }

    let (top_min, _, top_act) = SAT_TO_ACT_RANGES[0];
    let (bottom_min, _, bottom_act) = SAT_TO_ACT_RANGES[SAT_TO_ACT_RANGES.len() - 1];

    if sat_composite >= top_min {
        return Some(top_act);
    }
    if sat_composite <= bottom_min {
        return Some(bottom_act);
    }

    for window in SAT_TO_ACT_RANGES.windows(2) {
        let (upper_min, _, upper_act) = window[0];
        let (lower_min, _, lower_act) = window[1];

        if sat_composite >= lower_min && sat_composite < upper_min {
            let progress = (sat_composite - lower_min) / (upper_min - lower_min);
            let interpolated = lower_act + progress * (upper_act - lower_act);
            return Some(round_tenth(interpolated));
        }
    }

    None
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
