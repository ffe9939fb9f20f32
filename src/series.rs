use std::collections::BTreeMap;

use crate::concordance::sat_to_act;
use crate::loader::YearLoader;
use crate::models::Race;

/// A metric that gets trend deltas and historical snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Enrollment,
    LowIncome,
    El,
    Race(Race),
    /// ACT composite, backfilled from SAT conversions in the SAT era.
    ActComposite,
}

impl Metric {
    pub const ALL: [Metric; 12] = [
        Metric::Enrollment,
        Metric::LowIncome,
        Metric::El,
        Metric::Race(Race::White),
        Metric::Race(Race::Black),
        Metric::Race(Race::Hispanic),
        Metric::Race(Race::Asian),
        Metric::Race(Race::PacificIslander),
        Metric::Race(Race::NativeAmerican),
        Metric::Race(Race::TwoOrMore),
        Metric::Race(Race::Mena),
        Metric::ActComposite,
    ];

    /// Key used in flattened column names.
    pub fn key(self) -> &'static str {
        match self {
            Metric::Enrollment => "enrollment",
            Metric::LowIncome => "low_income",
            Metric::El => "el",
            Metric::Race(race) => race.key(),
            Metric::ActComposite => "act",
        }
    }

    pub fn is_integral(self) -> bool {
        matches!(self, Metric::Enrollment)
    }
}

/// Assemble one school's year -> value series for a metric, scanning the
/// given years. Years with no value contribute nothing; there is no
/// interpolation across years.
///
/// For the ACT composite a direct composite measurement always wins; a year
/// with only an SAT composite contributes its concordance conversion.
pub fn metric_series(
    loader: &mut YearLoader,
    rcdts: &str,
    metric: Metric,
    years: &[i32],
) -> BTreeMap<i32, f64> {
    let mut series = BTreeMap::new();

    for &year in years {
        let Some(record) = loader.school_for_year(year, rcdts) else {
            continue;
        };

        let value = match metric {
            Metric::Enrollment => record.enrollment.map(|count| count as f64),
            Metric::LowIncome => record.low_income_pct,
            Metric::El => record.el_pct,
            Metric::Race(race) => record.diversity.get(&race).copied(),
            Metric::ActComposite => record
                .act
                .composite
                .or_else(|| record.sat_composite.and_then(sat_to_act)),
        };

        if let Some(value) = value {
            series.insert(year, value);
        }
    }

    series
}

/// Keep only the most recent `keep` years of a series. The short-horizon
/// trend path uses this; snapshot extraction works on the full series.
pub fn trim_latest(series: &BTreeMap<i32, f64>, keep: usize) -> BTreeMap<i32, f64> {
    series
        .iter()
        .rev()
        .take(keep)
        .map(|(year, value)| (*year, *value))
        .collect()
}
