use std::collections::HashMap;

use crate::clean::{clean_enrollment, clean_percentage, clean_score, normalize_rcdts};
use crate::models::{Race, YearlyRecord};
use crate::workbook::{CellValue, RawSheet};

/// Column-name aliases per canonical metric, ordered newest era first. The
/// first alias present among a sheet's headers wins; matching is exact after
/// header normalization. These tables absorb fifteen years of column renames
/// so no per-year conditionals exist anywhere else.
pub const RCDTS_ALIASES: &[&str] = &["rcdts"];
pub const LEVEL_ALIASES: &[&str] = &["level"];

pub const ENROLLMENT_ALIASES: &[&str] = &["# student enrollment", "student enrollment"];

pub const LOW_INCOME_ALIASES: &[&str] = &[
    "% student enrollment - low income",
    "% low-income",
    "% low income",
];

pub const EL_ALIASES: &[&str] = &[
    "% student enrollment - el",
    "% el",
    "% english learners",
];

pub const SAT_READING_ALIASES: &[&str] = &[
    "sat reading average score",
    "sat ebrw average score",
    "sat reading average",
];

pub const SAT_MATH_ALIASES: &[&str] = &["sat math average score", "sat math average"];

pub const SAT_COMPOSITE_ALIASES: &[&str] = &[
    "average sat composite score",
    "sat composite score - grade 11",
    "sat total score",
];

pub const ACT_COMPOSITE_ALIASES: &[&str] = &[
    "act composite score - grade 11",
    "act average composite score",
    "average act composite score",
    "act composite",
];

pub const ACT_ELA_ALIASES: &[&str] = &[
    "act ela average score - grade 11",
    "act english average score",
    "act ela",
    "act reading",
];

pub const ACT_MATH_ALIASES: &[&str] = &["act math average score - grade 11", "act math"];

pub const ACT_SCIENCE_ALIASES: &[&str] = &["act science average score - grade 11", "act science"];

pub fn race_aliases(race: Race) -> &'static [&'static str] {
    match race {
        Race::White => &["% student enrollment - white", "% white"],
        Race::Black => &["% student enrollment - black or african american", "% black"],
        Race::Hispanic => &["% student enrollment - hispanic or latino", "% hispanic"],
        Race::Asian => &["% student enrollment - asian", "% asian"],
        Race::PacificIslander => &[
            "% student enrollment - native hawaiian or other pacific islander",
            "% native hawaiian or other pacific islander",
        ],
        Race::NativeAmerican => &[
            "% student enrollment - american indian or alaska native",
            "% native american",
            "% american indian or alaska native",
        ],
        Race::TwoOrMore => &["% student enrollment - two or more races", "% two or more races"],
        Race::Mena => &["% student enrollment - middle eastern or north african", "% mena"],
    }
}

/// Normalized header name -> column index for one sheet.
pub struct HeaderMap {
    index: HashMap<String, usize>,
}

impl HeaderMap {
    pub fn new(headers: &[String]) -> HeaderMap {
        let mut index = HashMap::with_capacity(headers.len());
        for (position, header) in headers.iter().enumerate() {
            // First occurrence wins on duplicate headers.
            index.entry(header.clone()).or_insert(position);
        }
        HeaderMap { index }
    }

    /// Resolve an ordered alias list to a column index.
    pub fn resolve(&self, aliases: &[&str]) -> Option<usize> {
        aliases.iter().find_map(|alias| self.index.get(*alias).copied())
    }
}

/// Metric columns resolved once per sheet, so row extraction is pure index
/// lookups rather than per-row string probing.
struct ResolvedColumns {
    enrollment: Option<usize>,
    low_income: Option<usize>,
    el: Option<usize>,
    races: [Option<usize>; 8],
    sat_reading: Option<usize>,
    sat_math: Option<usize>,
    sat_composite: Option<usize>,
    act_composite: Option<usize>,
    act_ela: Option<usize>,
    act_math: Option<usize>,
    act_science: Option<usize>,
}

impl ResolvedColumns {
    fn resolve(headers: &HeaderMap) -> ResolvedColumns {
        let mut races = [None; 8];
        for (slot, race) in races.iter_mut().zip(Race::ALL) {
            *slot = headers.resolve(race_aliases(race));
        }
        ResolvedColumns {
            enrollment: headers.resolve(ENROLLMENT_ALIASES),
            low_income: headers.resolve(LOW_INCOME_ALIASES),
            el: headers.resolve(EL_ALIASES),
            races,
            sat_reading: headers.resolve(SAT_READING_ALIASES),
            sat_math: headers.resolve(SAT_MATH_ALIASES),
            sat_composite: headers.resolve(SAT_COMPOSITE_ALIASES),
            act_composite: headers.resolve(ACT_COMPOSITE_ALIASES),
            act_ela: headers.resolve(ACT_ELA_ALIASES),
            act_math: headers.resolve(ACT_MATH_ALIASES),
            act_science: headers.resolve(ACT_SCIENCE_ALIASES),
        }
    }

    fn apply(&self, row: &[CellValue], record: &mut YearlyRecord) {
        if let Some(value) = pick(row, self.enrollment).and_then(clean_enrollment) {
            record.enrollment = Some(value);
        }
        if let Some(value) = pick(row, self.low_income).and_then(clean_percentage) {
            record.low_income_pct = Some(value);
        }
        if let Some(value) = pick(row, self.el).and_then(clean_percentage) {
            record.el_pct = Some(value);
        }
        for (slot, race) in self.races.iter().zip(Race::ALL) {
            if let Some(value) = pick(row, *slot).and_then(clean_percentage) {
                record.diversity.insert(race, value);
            }
        }
        if let Some(value) = pick(row, self.sat_reading).and_then(clean_score) {
            record.sat_reading = Some(value);
        }
        if let Some(value) = pick(row, self.sat_math).and_then(clean_score) {
            record.sat_math = Some(value);
        }
        if let Some(value) = pick(row, self.sat_composite).and_then(clean_score) {
            record.sat_composite = Some(value);
        }
        if let Some(value) = pick(row, self.act_composite).and_then(clean_score) {
            record.act.composite = Some(value);
        }
        if let Some(value) = pick(row, self.act_ela).and_then(clean_score) {
            record.act.ela = Some(value);
        }
        if let Some(value) = pick(row, self.act_math).and_then(clean_score) {
            record.act.math = Some(value);
        }
        if let Some(value) = pick(row, self.act_science).and_then(clean_score) {
            record.act.science = Some(value);
        }
    }
}

fn pick<'a>(row: &'a [CellValue], column: Option<usize>) -> Option<&'a CellValue> {
    column.and_then(|index| row.get(index))
}

/// Extract every school-level row of a sheet into the per-year map, merging
/// into records other sheets/files of the same year already produced. Sheets
/// without an identifier column are skipped.
pub fn extract_sheet(sheet: &RawSheet, out: &mut HashMap<String, YearlyRecord>) {
    let headers = HeaderMap::new(&sheet.headers);
    let Some(rcdts_column) = headers.resolve(RCDTS_ALIASES) else {
        return;
    };
    let level_column = headers.resolve(LEVEL_ALIASES);
    let columns = ResolvedColumns::resolve(&headers);

    for row in &sheet.rows {
        let Some(raw_rcdts) = row.get(rcdts_column).and_then(CellValue::as_text) else {
            continue;
        };
        let rcdts = normalize_rcdts(&raw_rcdts);
        if rcdts.is_empty() {
            continue;
        }

        // District and state aggregate rows share the file with schools.
        if let Some(level) = pick(row, level_column).and_then(CellValue::as_text) {
            if !level.trim().eq_ignore_ascii_case("school") {
                continue;
            }
        }

        let mut parsed = YearlyRecord::default();
        columns.apply(row, &mut parsed);
        out.entry(rcdts).or_default().merge_from(&parsed);
    }
}
