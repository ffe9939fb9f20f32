use std::collections::BTreeMap;

use crate::clean::normalize_rcdts;
use crate::concordance::sat_to_act;
use crate::loader::YearLoader;
use crate::models::{FlatValue, Race, SchoolRecord};
use crate::series::{metric_series, trim_latest, Metric};

/// The import's reference year; all window arithmetic is relative to it.
pub const CURRENT_YEAR: i32 = 2025;
pub const EARLIEST_HISTORICAL_YEAR: i32 = 2010;

pub const TREND_WINDOWS: [i32; 3] = [1, 3, 5];

/// No statewide assessment ran in 2020; a five-year lookback landing there
/// may substitute the prior year. Every other window needs an exact hit.
pub const GAP_YEAR: i32 = 2020;
pub const GAP_FALLBACK_YEAR: i32 = 2019;

/// Trend deltas never look further back than the widest window.
const MAX_TREND_YEARS: usize = 5;

/// Historical years scanned for snapshots and series, newest first. The
/// current year itself comes from the live school row, not from source files.
pub fn historical_years() -> Vec<i32> {
    (EARLIEST_HISTORICAL_YEAR..CURRENT_YEAR).rev().collect()
}

/// Computes per-school trend deltas and historical snapshot columns from the
/// yearly source files.
pub struct TrendCalculator {
    loader: YearLoader,
}

impl TrendCalculator {
    pub fn new(loader: YearLoader) -> TrendCalculator {
        TrendCalculator { loader }
    }

    /// Release the per-year source cache at the end of a run.
    pub fn clear_cache(&mut self) {
        self.loader.clear_cache();
    }

    /// The sparse flattened column map for one school: every
    /// `{metric}_trend_{n}yr` and `{metric}_hist_{year}` value that could be
    /// computed. Nothing is ever written as zero-for-missing.
    pub fn column_updates(&mut self, school: &SchoolRecord) -> BTreeMap<String, FlatValue> {
        let rcdts = normalize_rcdts(&school.rcdts);
        let mut columns = BTreeMap::new();
        self.trend_deltas(&rcdts, school, &mut columns);
        self.historical_columns(&rcdts, school, &mut columns);
        columns
    }

    fn trend_deltas(
        &mut self,
        rcdts: &str,
        school: &SchoolRecord,
        columns: &mut BTreeMap<String, FlatValue>,
    ) {
        let years = historical_years();
        for metric in Metric::ALL {
            let Some(current) = current_value(school, metric) else {
                continue;
            };
            let series = metric_series(&mut self.loader, rcdts, metric, &years);
            let series = trim_latest(&series, MAX_TREND_YEARS);

            for window in TREND_WINDOWS {
                let target_year = CURRENT_YEAR - window;
                let Some(historical) = window_value(&series, target_year) else {
                    continue;
                };
                let delta = round_hundredth(current - historical);
                columns.insert(
                    format!("{}_trend_{}yr", metric.key(), window),
                    FlatValue::Float(delta),
                );
            }
        }
    }

    fn historical_columns(
        &mut self,
        rcdts: &str,
        school: &SchoolRecord,
        columns: &mut BTreeMap<String, FlatValue>,
    ) {
        current_year_snapshot(school, columns);

        let years = historical_years();
        for metric in Metric::ALL {
            if metric == Metric::ActComposite {
                continue; // handled below with its section scores
            }
            let series = metric_series(&mut self.loader, rcdts, metric, &years);
            for (year, value) in &series {
                let flat = if metric.is_integral() {
                    FlatValue::Int(*value as i64)
                } else {
                    FlatValue::Float(round_tenth(*value))
                };
                columns.insert(format!("{}_hist_{}", metric.key(), year), flat);
            }
        }

        for &year in &years {
            self.act_snapshot_for_year(rcdts, year, columns);
        }
    }

    /// ACT composite and section snapshots for one historical year. Direct
    /// measurements win; SAT-era years contribute concordance conversions
    /// (section scores are doubled onto the composite scale first).
    fn act_snapshot_for_year(
        &mut self,
        rcdts: &str,
        year: i32,
        columns: &mut BTreeMap<String, FlatValue>,
    ) {
        let Some(record) = self.loader.school_for_year(year, rcdts) else {
            return;
        };

        let composite = record
            .act
            .composite
            .or_else(|| record.sat_composite.and_then(sat_to_act));
        if let Some(composite) = composite {
            columns.insert(
                format!("act_hist_{year}"),
                FlatValue::Float(round_tenth(composite)),
            );
        }

        let has_sections =
            record.act.ela.is_some() || record.act.math.is_some() || record.act.science.is_some();

        if has_sections {
            for (section, value) in [
                ("ela", record.act.ela),
                ("math", record.act.math),
                ("science", record.act.science),
            ] {
                if let Some(value) = value {
                    columns.insert(
                        format!("act_{section}_hist_{year}"),
                        FlatValue::Float(round_tenth(value)),
                    );
                }
            }
        } else {
            // SAT has no science section, so that column stays absent here.
            for (section, value) in [("ela", record.sat_reading), ("math", record.sat_math)] {
                if let Some(converted) = value.and_then(|score| sat_to_act(score * 2.0)) {
                    columns.insert(
                        format!("act_{section}_hist_{year}"),
                        FlatValue::Float(round_tenth(converted)),
                    );
                }
            }
        }
    }
}

fn current_year_snapshot(school: &SchoolRecord, columns: &mut BTreeMap<String, FlatValue>) {
    if let Some(enrollment) = school.enrollment {
        columns.insert(
            format!("enrollment_hist_{CURRENT_YEAR}"),
            FlatValue::Int(enrollment),
        );
    }
    for (section, value) in [
        ("ela", school.act_ela_avg),
        ("math", school.act_math_avg),
        ("science", school.act_science_avg),
    ] {
        if let Some(value) = value {
            columns.insert(
                format!("act_{section}_hist_{CURRENT_YEAR}"),
                FlatValue::Float(round_tenth(value)),
            );
        }
    }
    if let Some(composite) = school.act_composite() {
        columns.insert(
            format!("act_hist_{CURRENT_YEAR}"),
            FlatValue::Float(round_tenth(composite)),
        );
    }
    if let Some(el) = school.el_pct {
        columns.insert(
            format!("el_hist_{CURRENT_YEAR}"),
            FlatValue::Float(round_tenth(el)),
        );
    }
    if let Some(low_income) = school.low_income_pct {
        columns.insert(
            format!("low_income_hist_{CURRENT_YEAR}"),
            FlatValue::Float(round_tenth(low_income)),
        );
    }
    for race in Race::ALL {
        if let Some(value) = school.diversity.get(&race) {
            columns.insert(
                format!("{}_hist_{CURRENT_YEAR}", race.key()),
                FlatValue::Float(round_tenth(*value)),
            );
        }
    }
}

fn current_value(school: &SchoolRecord, metric: Metric) -> Option<f64> {
    match metric {
        Metric::Enrollment => school.enrollment.map(|count| count as f64),
        Metric::LowIncome => school.low_income_pct,
        Metric::El => school.el_pct,
        Metric::Race(race) => school.diversity.get(&race).copied(),
        Metric::ActComposite => school.act_composite(),
    }
}

/// Exact-year lookup, with the single sanctioned approximation: a target
/// landing on the assessment gap year may use the designated fallback year.
fn window_value(series: &BTreeMap<i32, f64>, target_year: i32) -> Option<f64> {
    if let Some(value) = series.get(&target_year) {
        return Some(*value);
    }
    if target_year == GAP_YEAR {
        return series.get(&GAP_FALLBACK_YEAR).copied();
    }
    None
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round_hundredth(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_year(dir: &TempDir, year: i32, header: &str, row: &str) {
        fs::write(
            dir.path().join(format!("{year}-report-card.txt")),
            format!("{header}\n{row}\n"),
        )
        .unwrap();
    }

    fn school(rcdts: &str) -> SchoolRecord {
        SchoolRecord {
            rcdts: rcdts.to_string(),
            school_name: "Test School".to_string(),
            level: "high".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn one_year_low_income_delta() {
        let dir = TempDir::new().unwrap();
        write_year(
            &dir,
            2024,
            "RCDTS|% Student Enrollment - Low Income",
            "1-0001|40.0",
        );

        let mut school = school("1-0001");
        school.low_income_pct = Some(45.0);

        let mut calculator = TrendCalculator::new(YearLoader::new(dir.path()));
        let columns = calculator.column_updates(&school);
        assert_eq!(
            columns.get("low_income_trend_1yr"),
            Some(&FlatValue::Float(5.0))
        );
    }

    #[test]
    fn windows_without_exact_year_are_omitted() {
        let dir = TempDir::new().unwrap();
        write_year(
            &dir,
            2024,
            "RCDTS|# Student Enrollment",
            "1-0001|680",
        );

        let mut school = school("1-0001");
        school.enrollment = Some(700);

        let mut calculator = TrendCalculator::new(YearLoader::new(dir.path()));
        let columns = calculator.column_updates(&school);
        assert_eq!(
            columns.get("enrollment_trend_1yr"),
            Some(&FlatValue::Float(20.0))
        );
        assert!(!columns.contains_key("enrollment_trend_3yr"));
        assert!(!columns.contains_key("enrollment_trend_5yr"));
    }

    #[test]
    fn five_year_act_window_falls_back_across_the_gap_year() {
        let dir = TempDir::new().unwrap();
        // 2020 has no assessment data anywhere; 2019 carries a direct ACT
        // composite.
        write_year(
            &dir,
            2019,
            "RCDTS|ACT Composite Score - Grade 11",
            "1-0001|19.0",
        );

        let mut school = school("1-0001");
        school.act_ela_avg = Some(20.0);
        school.act_math_avg = Some(22.0);

        let mut calculator = TrendCalculator::new(YearLoader::new(dir.path()));
        let columns = calculator.column_updates(&school);
        // current composite (20+22)/2 = 21.0, fallback value 19.0
        assert_eq!(columns.get("act_trend_5yr"), Some(&FlatValue::Float(2.0)));
    }

    #[test]
    fn fallback_applies_only_to_the_gap_year() {
        let dir = TempDir::new().unwrap();
        // 2023 missing, 2022 present: the 3-year window must NOT borrow it.
        write_year(
            &dir,
            2022,
            "RCDTS|% Student Enrollment - Low Income",
            "1-0001|42.0",
        );

        let mut school = school("1-0001");
        school.low_income_pct = Some(45.0);

        let mut calculator = TrendCalculator::new(YearLoader::new(dir.path()));
        let columns = calculator.column_updates(&school);
        assert!(!columns.contains_key("low_income_trend_1yr"));
        assert!(columns.contains_key("low_income_trend_3yr"));
    }

    #[test]
    fn deltas_round_to_two_decimals() {
        let dir = TempDir::new().unwrap();
        write_year(
            &dir,
            2024,
            "RCDTS|% Student Enrollment - EL",
            "1-0001|10.125",
        );

        let mut school = school("1-0001");
        school.el_pct = Some(15.5);

        let mut calculator = TrendCalculator::new(YearLoader::new(dir.path()));
        let columns = calculator.column_updates(&school);
        assert_eq!(columns.get("el_trend_1yr"), Some(&FlatValue::Float(5.38)));
    }

    #[test]
    fn historical_columns_cover_snapshot_and_current_year() {
        let dir = TempDir::new().unwrap();
        write_year(
            &dir,
            2024,
            "RCDTS|# Student Enrollment|% Student Enrollment - Low Income",
            "1-0001|680|40.04",
        );

        let mut school = school("1-0001");
        school.enrollment = Some(700);
        school.low_income_pct = Some(45.0);

        let mut calculator = TrendCalculator::new(YearLoader::new(dir.path()));
        let columns = calculator.column_updates(&school);
        assert_eq!(columns.get("enrollment_hist_2024"), Some(&FlatValue::Int(680)));
        assert_eq!(columns.get("enrollment_hist_2025"), Some(&FlatValue::Int(700)));
        assert_eq!(
            columns.get("low_income_hist_2024"),
            Some(&FlatValue::Float(40.0))
        );
        assert_eq!(
            columns.get("low_income_hist_2025"),
            Some(&FlatValue::Float(45.0))
        );
    }

    #[test]
    fn sat_years_contribute_converted_act_history() {
        let dir = TempDir::new().unwrap();
        write_year(
            &dir,
            2022,
            "RCDTS|SAT Reading Average Score|SAT Math Average Score",
            "1-0001|505|505",
        );

        let mut school = school("1-0001");
        school.act_ela_avg = Some(20.0);
        school.act_math_avg = Some(20.0);

        let mut calculator = TrendCalculator::new(YearLoader::new(dir.path()));
        let columns = calculator.column_updates(&school);

        // Composite 1010 converts to a value strictly between 19 and 20.
        let Some(FlatValue::Float(act_2022)) = columns.get("act_hist_2022") else {
            panic!("missing act_hist_2022");
        };
        assert!(*act_2022 > 19.0 && *act_2022 < 20.0, "got {act_2022}");

        // Section scores double onto the composite scale before converting.
        assert!(columns.contains_key("act_ela_hist_2022"));
        assert!(columns.contains_key("act_math_hist_2022"));
        assert!(!columns.contains_key("act_science_hist_2022"));
    }

    #[test]
    fn direct_sections_suppress_sat_section_conversion() {
        let dir = TempDir::new().unwrap();
        write_year(
            &dir,
            2016,
            "RCDTS|ACT ELA Average Score - Grade 11|ACT Math Average Score - Grade 11",
            "1-0001|18.5|19.5",
        );

        let school = school("1-0001");
        let mut calculator = TrendCalculator::new(YearLoader::new(dir.path()));
        let columns = calculator.column_updates(&school);
        assert_eq!(
            columns.get("act_ela_hist_2016"),
            Some(&FlatValue::Float(18.5))
        );
        assert_eq!(
            columns.get("act_math_hist_2016"),
            Some(&FlatValue::Float(19.5))
        );
    }

    #[test]
    fn schools_with_no_data_anywhere_get_no_columns() {
        let dir = TempDir::new().unwrap();
        let school = school("9-9999");
        let mut calculator = TrendCalculator::new(YearLoader::new(dir.path()));
        assert!(calculator.column_updates(&school).is_empty());
    }
}
