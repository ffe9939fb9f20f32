use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;

/// Fixed-position field map for one legacy text era: zero-based field index
/// after delimiter splitting -> canonical (normalized) column label. Field
/// positions shifted across years as upstream fields were inserted or
/// removed, so each era carries its own table.
#[derive(Debug)]
pub struct EraLayout {
    pub token: &'static str,
    pub fields: &'static [(usize, &'static str)],
    /// The rc10-era identifier column is unreliable; rows must be re-keyed
    /// through the roster cross-reference.
    pub recover_identifier: bool,
}

const RC10_FIELDS: &[(usize, &'static str)] = &[
    (0, "rcdts"),
    (2, "school name"),
    (3, "district"),
    (4, "city"),
    (5, "county"),
    (8, "school type"),
    (11, "grades served"),
    (12, "% white"),
    (13, "% black"),
    (14, "% hispanic"),
    (15, "% asian"),
    (16, "% native hawaiian or other pacific islander"),
    (17, "% native american"),
    (18, "# student enrollment"),
    (40, "% el"),
    (48, "% low-income"),
    (176, "act composite"),
    (180, "act ela"),
    (184, "act math"),
    (188, "act reading"),
    (192, "act science"),
];

const RC11_FIELDS: &[(usize, &'static str)] = &[
    (0, "rcdts"),
    (2, "school name"),
    (3, "district"),
    (4, "city"),
    (5, "county"),
    (10, "school type"),
    (11, "grades served"),
    (12, "% white"),
    (13, "% black"),
    (14, "% hispanic"),
    (15, "% asian"),
    (16, "% native hawaiian or other pacific islander"),
    (17, "% native american"),
    (18, "% two or more races"),
    (19, "# student enrollment"),
    (44, "% el"),
    (52, "% low-income"),
    (188, "act composite"),
    (192, "act ela"),
    (196, "act math"),
    (200, "act reading"),
    (204, "act science"),
];

const RC12_FIELDS: &[(usize, &'static str)] = &[
    (0, "rcdts"),
    (3, "school name"),
    (4, "district"),
    (5, "city"),
    (6, "county"),
    (11, "school type"),
    (12, "grades served"),
    (13, "% white"),
    (14, "% black"),
    (15, "% hispanic"),
    (16, "% asian"),
    (17, "% native hawaiian or other pacific islander"),
    (18, "% native american"),
    (19, "% two or more races"),
    (20, "# student enrollment"),
    (45, "% el"),
    (53, "% low-income"),
    (245, "act composite"),
    (249, "act ela"),
    (253, "act math"),
    (257, "act reading"),
    (261, "act science"),
];

const RC13_FIELDS: &[(usize, &'static str)] = &[
    (0, "rcdts"),
    (3, "school name"),
    (4, "district"),
    (5, "city"),
    (6, "county"),
    (11, "school type"),
    (12, "grades served"),
    (13, "% white"),
    (14, "% black"),
    (15, "% hispanic"),
    (16, "% asian"),
    (17, "% native hawaiian or other pacific islander"),
    (18, "% native american"),
    (19, "% two or more races"),
    (20, "# student enrollment"),
    (45, "% el"),
    (53, "% low-income"),
    (253, "act composite"),
    (257, "act ela"),
    (261, "act math"),
    (265, "act reading"),
    (269, "act science"),
];

// The 2014 layout matches 2013.
const RC14_FIELDS: &[(usize, &'static str)] = RC13_FIELDS;

const RC15_FIELDS: &[(usize, &'static str)] = &[
    (0, "rcdts"),
    (3, "school name"),
    (4, "district"),
    (5, "city"),
    (6, "county"),
    (11, "school type"),
    (12, "grades served"),
    (13, "% white"),
    (14, "% black"),
    (15, "% hispanic"),
    (16, "% asian"),
    (17, "% native hawaiian or other pacific islander"),
    (18, "% native american"),
    (19, "% two or more races"),
    (20, "# student enrollment"),
    (53, "% low-income"),
    (253, "act composite"),
    (257, "act ela"),
    (261, "act math"),
    (265, "act reading"),
    (269, "act science"),
];

const RC16_FIELDS: &[(usize, &'static str)] = &[
    (0, "rcdts"),
    (3, "school name"),
    (4, "district"),
    (5, "city"),
    (6, "county"),
    (11, "school type"),
    (12, "grades served"),
    (13, "% white"),
    (14, "% black"),
    (15, "% hispanic"),
    (16, "% asian"),
    (17, "% native hawaiian or other pacific islander"),
    (18, "% native american"),
    (19, "% two or more races"),
    (20, "# student enrollment"),
    (45, "% el"),
    (53, "% low-income"),
    (365, "act composite"),
    (369, "act ela"),
    (373, "act math"),
    (377, "act reading"),
    (381, "act science"),
];

const RC17_FIELDS: &[(usize, &'static str)] = &[
    (0, "rcdts"),
    (3, "school name"),
    (4, "district"),
    (5, "city"),
    (6, "county"),
    (11, "school type"),
    (12, "grades served"),
    (13, "% white"),
    (14, "% black"),
    (15, "% hispanic"),
    (16, "% asian"),
    (17, "% native hawaiian or other pacific islander"),
    (18, "% native american"),
    (19, "% two or more races"),
    (20, "# student enrollment"),
    (45, "% el"),
    (53, "% low-income"),
    (409, "act composite"),
    (413, "act ela"),
    (417, "act math"),
    (421, "act reading"),
    (425, "act science"),
];

// Fallback for rcNN files that have no dedicated table (the 2013-2015 shape
// held for most of the era).
const DEFAULT_FIELDS: &[(usize, &'static str)] = RC13_FIELDS;

static DEFAULT_LAYOUT: EraLayout = EraLayout {
    token: "",
    fields: DEFAULT_FIELDS,
    recover_identifier: false,
};

/// Era table, evaluated most-specific-first.
static ERA_LAYOUTS: [EraLayout; 8] = [
    EraLayout { token: "rc17", fields: RC17_FIELDS, recover_identifier: false },
    EraLayout { token: "rc16", fields: RC16_FIELDS, recover_identifier: false },
    EraLayout { token: "rc15", fields: RC15_FIELDS, recover_identifier: false },
    EraLayout { token: "rc14", fields: RC14_FIELDS, recover_identifier: false },
    EraLayout { token: "rc13", fields: RC13_FIELDS, recover_identifier: false },
    EraLayout { token: "rc12", fields: RC12_FIELDS, recover_identifier: false },
    EraLayout { token: "rc11", fields: RC11_FIELDS, recover_identifier: false },
    EraLayout { token: "rc10", fields: RC10_FIELDS, recover_identifier: true },
];

/// Pick the fixed-position layout for a legacy text file, if the filename
/// marks it as one. Files carrying an `assessment` token ship a header row
/// instead and parse header-based, as does anything without an `rcNN` token.
pub fn positional_layout(filename: &str) -> Option<&'static EraLayout> {
    let name = filename.to_lowercase();
    if name.contains("assessment") {
        return None;
    }
    for layout in &ERA_LAYOUTS {
        if name.contains(layout.token) {
            return Some(layout);
        }
    }
    if has_rc_token(&name) {
        return Some(&DEFAULT_LAYOUT);
    }
    None
}

fn has_rc_token(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.windows(4).any(|window| {
        window[0] == b'r'
            && window[1] == b'c'
            && window[2].is_ascii_digit()
            && window[3].is_ascii_digit()
    })
}

/// Lowercased, whitespace-collapsed form used for roster join keys.
pub fn normalize_text(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Cross-reference index rebuilding trustworthy identifiers for the rc10 era
/// from the adjacent year's roster: (school, district, city) and
/// (school, district) keys -> RCDTS.
#[derive(Debug, Default)]
pub struct RosterIndex {
    entries: HashMap<(String, String, String), String>,
}

impl RosterIndex {
    /// Build from a semicolon-delimited roster file. First entry per key
    /// wins.
    pub fn from_file(path: &Path) -> anyhow::Result<RosterIndex> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read roster file {}", path.display()))?;
        let content = String::from_utf8_lossy(&bytes);

        let mut entries = HashMap::new();
        for line in content.lines() {
            let fields: Vec<&str> = line.trim().split(';').collect();
            let Some(rcdts) = fields.first().map(|f| f.trim()) else {
                continue;
            };
            if rcdts.is_empty() {
                continue;
            }
            let school = normalize_text(fields.get(2).unwrap_or(&""));
            let district = normalize_text(fields.get(3).unwrap_or(&""));
            let city = normalize_text(fields.get(4).unwrap_or(&""));
            if school.is_empty() || district.is_empty() {
                continue;
            }
            entries
                .entry((school.clone(), district.clone(), city))
                .or_insert_with(|| rcdts.to_string());
            entries
                .entry((school, district, String::new()))
                .or_insert_with(|| rcdts.to_string());
        }

        Ok(RosterIndex { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// City-qualified lookup first, then without city.
    pub fn lookup(&self, school: &str, district: &str, city: &str) -> Option<&str> {
        let school = normalize_text(school);
        let district = normalize_text(district);
        if school.is_empty() || district.is_empty() {
            return None;
        }
        let city = normalize_text(city);
        self.entries
            .get(&(school.clone(), district.clone(), city))
            .or_else(|| self.entries.get(&(school, district, String::new())))
            .map(String::as_str)
    }
}
