use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use tracing::{debug, warn};

use crate::extract::extract_sheet;
use crate::layout::{positional_layout, EraLayout, RosterIndex};
use crate::models::YearlyRecord;
use crate::workbook::{read_workbook, CellValue, RawSheet};

const SPREADSHEET_EXTENSIONS: [&str; 3] = ["xlsx", "xls", "xlsm"];
const TEXT_EXTENSIONS: [&str; 2] = ["txt", "tsv"];

/// Delimiters tried in order against the first line of a text source. The
/// semicolon covers the positional era files.
const TEXT_DELIMITERS: [char; 4] = ['|', '\t', ';', ','];

/// Loads and caches one year's worth of school metrics from the historical
/// source directory. Each source file is parsed at most once per loader
/// lifetime; `clear_cache` releases everything at the end of a run.
pub struct YearLoader {
    base_path: PathBuf,
    cache: HashMap<i32, HashMap<String, YearlyRecord>>,
    roster: OnceLock<RosterIndex>,
}

impl YearLoader {
    pub fn new(base_path: impl Into<PathBuf>) -> YearLoader {
        YearLoader {
            base_path: base_path.into(),
            cache: HashMap::new(),
            roster: OnceLock::new(),
        }
    }

    /// All metrics for a year, keyed by normalized RCDTS. A year with no
    /// usable source files is an empty map, not an error.
    pub fn load_year(&mut self, year: i32) -> &HashMap<String, YearlyRecord> {
        if !self.cache.contains_key(&year) {
            let loaded = self.scan_year(year);
            self.cache.insert(year, loaded);
        }
        self.cache.entry(year).or_default()
    }

    /// One school's record for a year, if any source supplied it.
    pub fn school_for_year(&mut self, year: i32, rcdts: &str) -> Option<&YearlyRecord> {
        self.load_year(year).get(rcdts)
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
        self.roster = OnceLock::new();
    }

    fn scan_year(&self, year: i32) -> HashMap<String, YearlyRecord> {
        let mut merged: HashMap<String, YearlyRecord> = HashMap::new();

        for path in self.files_for_year(year) {
            match self.parse_file(&path) {
                Ok(parsed) => {
                    debug!(file = %path.display(), schools = parsed.len(), "parsed source file");
                    for (rcdts, record) in parsed {
                        merged.entry(rcdts).or_default().merge_from(&record);
                    }
                }
                Err(error) => {
                    // A corrupt file contributes nothing; the run goes on.
                    warn!(file = %path.display(), %error, "skipping unreadable source file");
                }
            }
        }

        for record in merged.values_mut() {
            record.finalize();
        }
        merged.retain(|_, record| !record.is_empty());
        merged
    }

    /// Candidate source files for a year: spreadsheet or text extension, not
    /// a temp/layout artifact, and carrying the year token in the stem (the
    /// 4-digit year anywhere, the `rcNN` short form, or the `YY-` prefix
    /// style used from 2023 on).
    fn files_for_year(&self, year: i32) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.base_path) else {
            return Vec::new();
        };

        let year_token = year.to_string();
        let short_token = &year_token[2..];

        let mut matches: Vec<PathBuf> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let extension = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_lowercase)
                .unwrap_or_default();
            if !SPREADSHEET_EXTENSIONS.contains(&extension.as_str())
                && !TEXT_EXTENSIONS.contains(&extension.as_str())
            {
                continue;
            }
            let stem = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::to_lowercase)
                .unwrap_or_default();
            if stem.starts_with("~$") || stem.contains("layout") || stem.starts_with("school_") {
                continue;
            }

            let matched = stem.contains(&year_token)
                || stem.starts_with(&format!("rc{short_token}"))
                || (year >= 2023 && stem.contains(&format!("{short_token}-")));
            if matched {
                matches.push(path);
            }
        }

        matches.sort();
        matches
    }

    fn parse_file(&self, path: &Path) -> anyhow::Result<HashMap<String, YearlyRecord>> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        let sheets = if SPREADSHEET_EXTENSIONS.contains(&extension.as_str()) {
            read_workbook(path)?
        } else {
            self.read_text_file(path)?.into_iter().collect()
        };

        let mut parsed = HashMap::new();
        for sheet in &sheets {
            extract_sheet(sheet, &mut parsed);
        }
        Ok(parsed)
    }

    fn read_text_file(&self, path: &Path) -> anyhow::Result<Option<RawSheet>> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read text source {}", path.display()))?;
        let content = String::from_utf8_lossy(&bytes);
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

        let first_line = content.lines().next().unwrap_or_default();
        let delimiter = detect_delimiter(first_line);
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();

        if let Some(layout) = positional_layout(&name) {
            let mut sheet = positional_sheet(&name, content, delimiter, layout);
            if layout.recover_identifier {
                self.recover_identifiers(&mut sheet);
            }
            return Ok(Some(sheet));
        }

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter as u8)
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_bytes());

        let mut raw_rows: Vec<Vec<CellValue>> = Vec::new();
        for record in reader.records() {
            let record =
                record.with_context(|| format!("malformed row in {}", path.display()))?;
            raw_rows.push(
                record
                    .iter()
                    .map(|field| CellValue::Text(field.to_string()))
                    .collect(),
            );
        }

        Ok(RawSheet::from_rows(name, raw_rows))
    }

    /// Rewrite the identifier cells of an rc10-era sheet through the roster
    /// join. A miss keeps the original identifier.
    fn recover_identifiers(&self, sheet: &mut RawSheet) {
        let position = |label: &str| sheet.headers.iter().position(|header| header == label);
        let (Some(rcdts_col), Some(school_col), Some(district_col)) =
            (position("rcdts"), position("school name"), position("district"))
        else {
            return;
        };
        let city_col = position("city");

        let roster = self.roster();
        if roster.is_empty() {
            return;
        }

        for row in &mut sheet.rows {
            let school = row.get(school_col).and_then(CellValue::as_text);
            let district = row.get(district_col).and_then(CellValue::as_text);
            let city = city_col
                .and_then(|col| row.get(col))
                .and_then(CellValue::as_text)
                .unwrap_or_default();
            let (Some(school), Some(district)) = (school, district) else {
                continue;
            };
            if let Some(recovered) = roster.lookup(&school, &district, &city) {
                if let Some(cell) = row.get_mut(rcdts_col) {
                    *cell = CellValue::Text(recovered.to_string());
                }
            }
        }
    }

    /// Roster built lazily from the rc11 file in the source directory, owned
    /// by this loader instance.
    fn roster(&self) -> &RosterIndex {
        self.roster.get_or_init(|| {
            let Some(path) = self.find_roster_file() else {
                warn!("no rc11 roster file found; rc10 identifiers kept as-is");
                return RosterIndex::default();
            };
            match RosterIndex::from_file(&path) {
                Ok(roster) => roster,
                Err(error) => {
                    warn!(%error, "failed to build roster index; rc10 identifiers kept as-is");
                    RosterIndex::default()
                }
            }
        })
    }

    fn find_roster_file(&self) -> Option<PathBuf> {
        let entries = std::fs::read_dir(&self.base_path).ok()?;
        let mut candidates: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .file_stem()
                        .and_then(|stem| stem.to_str())
                        .map(|stem| stem.to_lowercase().starts_with("rc11"))
                        .unwrap_or(false)
            })
            .collect();
        candidates.sort();
        candidates.into_iter().next()
    }
}

fn detect_delimiter(sample: &str) -> char {
    TEXT_DELIMITERS
        .into_iter()
        .find(|delimiter| sample.contains(*delimiter))
        .unwrap_or(',')
}

/// Assemble a headerless positional file into a sheet: headers come from the
/// era layout's labels and every line is a data row.
fn positional_sheet(name: &str, content: &str, delimiter: char, layout: &EraLayout) -> RawSheet {
    let headers: Vec<String> = layout
        .fields
        .iter()
        .map(|(_, label)| label.to_string())
        .collect();

    let mut rows = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let fields: Vec<&str> = trimmed.split(delimiter).collect();
        let row: Vec<CellValue> = layout
            .fields
            .iter()
            .map(|(index, _)| match fields.get(*index) {
                Some(field) if !field.trim().is_empty() => {
                    CellValue::Text(field.trim().to_string())
                }
                _ => CellValue::Empty,
            })
            .collect();
        rows.push(row);
    }

    RawSheet {
        name: name.to_string(),
        headers,
        rows,
    }
}
