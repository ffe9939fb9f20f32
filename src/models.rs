use std::collections::BTreeMap;

use serde::Serialize;

/// Racial/ethnic enrollment categories tracked across all source years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Race {
    White,
    Black,
    Hispanic,
    Asian,
    PacificIslander,
    NativeAmerican,
    TwoOrMore,
    Mena,
}

impl Race {
    pub const ALL: [Race; 8] = [
        Race::White,
        Race::Black,
        Race::Hispanic,
        Race::Asian,
        Race::PacificIslander,
        Race::NativeAmerican,
        Race::TwoOrMore,
        Race::Mena,
    ];

    /// Key used in flattened column names (`white_trend_1yr`, `mena_hist_2024`).
    pub fn key(self) -> &'static str {
        match self {
            Race::White => "white",
            Race::Black => "black",
            Race::Hispanic => "hispanic",
            Race::Asian => "asian",
            Race::PacificIslander => "pacific_islander",
            Race::NativeAmerican => "native_american",
            Race::TwoOrMore => "two_or_more",
            Race::Mena => "mena",
        }
    }
}

/// Direct ACT section/composite averages found in a yearly source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActScores {
    pub ela: Option<f64>,
    pub math: Option<f64>,
    pub science: Option<f64>,
    pub composite: Option<f64>,
}

impl ActScores {
    pub fn is_empty(&self) -> bool {
        self.ela.is_none()
            && self.math.is_none()
            && self.science.is_none()
            && self.composite.is_none()
    }

    pub fn merge_from(&mut self, other: &ActScores) {
        if other.ela.is_some() {
            self.ela = other.ela;
        }
        if other.math.is_some() {
            self.math = other.math;
        }
        if other.science.is_some() {
            self.science = other.science;
        }
        if other.composite.is_some() {
            self.composite = other.composite;
        }
    }
}

/// One school's metrics extracted from a single source year.
///
/// All fields are optional; records that end up with no metric at all are
/// pruned by the loader.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct YearlyRecord {
    pub enrollment: Option<i64>,
    pub low_income_pct: Option<f64>,
    pub el_pct: Option<f64>,
    pub diversity: BTreeMap<Race, f64>,
    pub sat_reading: Option<f64>,
    pub sat_math: Option<f64>,
    pub sat_composite: Option<f64>,
    pub act: ActScores,
}

impl YearlyRecord {
    pub fn is_empty(&self) -> bool {
        self.enrollment.is_none()
            && self.low_income_pct.is_none()
            && self.el_pct.is_none()
            && self.diversity.is_empty()
            && self.sat_reading.is_none()
            && self.sat_math.is_none()
            && self.sat_composite.is_none()
            && self.act.is_empty()
    }

    /// Merge metrics parsed from another file of the same year. Scalars are
    /// last-writer-wins; the diversity and ACT buckets merge per key.
    pub fn merge_from(&mut self, other: &YearlyRecord) {
        if other.enrollment.is_some() {
            self.enrollment = other.enrollment;
        }
        if other.low_income_pct.is_some() {
            self.low_income_pct = other.low_income_pct;
        }
        if other.el_pct.is_some() {
            self.el_pct = other.el_pct;
        }
        for (race, value) in &other.diversity {
            self.diversity.insert(*race, *value);
        }
        if other.sat_reading.is_some() {
            self.sat_reading = other.sat_reading;
        }
        if other.sat_math.is_some() {
            self.sat_math = other.sat_math;
        }
        if other.sat_composite.is_some() {
            self.sat_composite = other.sat_composite;
        }
        self.act.merge_from(&other.act);
    }

    /// Derive the SAT composite from section scores when no composite column
    /// supplied one. Runs once per year after all files are merged.
    pub fn finalize(&mut self) {
        if self.sat_composite.is_none() {
            if let (Some(reading), Some(math)) = (self.sat_reading, self.sat_math) {
                self.sat_composite = Some(reading + math);
            }
        }
    }
}

/// Current-year school row as imported into (or read back from) the schools
/// table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchoolRecord {
    pub rcdts: String,
    pub school_name: String,
    pub district: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub school_type: Option<String>,
    pub level: String,
    pub grades_served: Option<String>,
    pub enrollment: Option<i64>,
    pub el_pct: Option<f64>,
    pub low_income_pct: Option<f64>,
    pub act_ela_avg: Option<f64>,
    pub act_math_avg: Option<f64>,
    pub act_science_avg: Option<f64>,
    pub iar_ela_pct: Option<f64>,
    pub iar_math_pct: Option<f64>,
    pub iar_overall_pct: Option<f64>,
    pub diversity: BTreeMap<Race, f64>,
}

impl SchoolRecord {
    /// Composite ACT proxy for the current year: mean of the ELA and Math
    /// section averages, when both exist.
    pub fn act_composite(&self) -> Option<f64> {
        match (self.act_ela_avg, self.act_math_avg) {
            (Some(ela), Some(math)) => Some((ela + math) / 2.0),
            _ => None,
        }
    }
}

/// A value destined for one flattened column. Enrollment-family columns carry
/// integers, everything else carries floats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FlatValue {
    Int(i64),
    Float(f64),
}

impl FlatValue {
    pub fn as_f64(self) -> f64 {
        match self {
            FlatValue::Int(value) => value as f64,
            FlatValue::Float(value) => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_record_is_pruned_candidate() {
        let record = YearlyRecord::default();
        assert!(record.is_empty());
    }

    #[test]
    fn record_with_single_metric_is_kept() {
        let record = YearlyRecord {
            enrollment: Some(500),
            ..Default::default()
        };
        assert!(!record.is_empty());
    }

    #[test]
    fn merge_prefers_present_values_and_unions_buckets() {
        let mut base = YearlyRecord {
            enrollment: Some(400),
            ..Default::default()
        };
        base.diversity.insert(Race::White, 60.0);

        let mut other = YearlyRecord {
            low_income_pct: Some(35.5),
            ..Default::default()
        };
        other.diversity.insert(Race::Black, 12.5);
        other.act.composite = Some(21.3);

        base.merge_from(&other);
        assert_eq!(base.enrollment, Some(400));
        assert_eq!(base.low_income_pct, Some(35.5));
        assert_eq!(base.diversity.get(&Race::White), Some(&60.0));
        assert_eq!(base.diversity.get(&Race::Black), Some(&12.5));
        assert_eq!(base.act.composite, Some(21.3));
    }

    #[test]
    fn finalize_builds_sat_composite_from_sections() {
        let mut record = YearlyRecord {
            sat_reading: Some(505.0),
            sat_math: Some(505.0),
            ..Default::default()
        };
        record.finalize();
        assert_eq!(record.sat_composite, Some(1010.0));

        let mut partial = YearlyRecord {
            sat_reading: Some(505.0),
            ..Default::default()
        };
        partial.finalize();
        assert_eq!(partial.sat_composite, None);
    }

    #[test]
    fn current_act_composite_requires_both_sections() {
        let school = SchoolRecord {
            act_ela_avg: Some(19.0),
            act_math_avg: Some(21.0),
            ..Default::default()
        };
        assert_eq!(school.act_composite(), Some(20.0));

        let missing = SchoolRecord {
            act_ela_avg: Some(19.0),
            ..Default::default()
        };
        assert_eq!(missing.act_composite(), None);
    }
}
