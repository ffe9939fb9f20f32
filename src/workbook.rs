use std::path::Path;

use anyhow::Context;
use calamine::{open_workbook_auto, Data, Reader};

/// Canonical cell representation shared by the workbook and text adapters.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            CellValue::Number(value) => value.is_nan(),
            CellValue::Bool(_) => false,
        }
    }

    /// Trimmed textual form for identifier and name cells. Whole numbers
    /// render without a decimal point so a numeric identifier column round
    /// trips cleanly.
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Empty | CellValue::Bool(_) => None,
            CellValue::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            CellValue::Number(value) => {
                if value.is_nan() {
                    None
                } else if value.fract() == 0.0 {
                    Some(format!("{}", *value as i64))
                } else {
                    Some(value.to_string())
                }
            }
        }
    }
}

impl From<&Data> for CellValue {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty | Data::Error(_) => CellValue::Empty,
            Data::String(text) => CellValue::Text(text.clone()),
            Data::Float(value) => CellValue::Number(*value),
            Data::Int(value) => CellValue::Number(*value as f64),
            Data::Bool(value) => CellValue::Bool(*value),
            Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
            Data::DateTimeIso(text) | Data::DurationIso(text) => CellValue::Text(text.clone()),
        }
    }
}

/// One sheet (or text file) reduced to normalized headers plus data rows.
#[derive(Debug, Clone)]
pub struct RawSheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

/// Number of leading data rows probed when checking for a spurious inserted
/// column.
const SHIFT_PROBE_ROWS: usize = 10;

impl RawSheet {
    /// Build a sheet from raw rows where the first row is the header row.
    /// Returns `None` for sheets with no header row at all.
    pub fn from_rows(name: impl Into<String>, mut raw_rows: Vec<Vec<CellValue>>) -> Option<RawSheet> {
        if raw_rows.is_empty() {
            return None;
        }
        let mut headers = raw_rows.remove(0);

        // Some yearly workbooks carry a spurious empty column at index 1
        // that shifts every header left of its data. Detect it by probing
        // the first data rows and drop it before header resolution.
        if headers.len() > 1 && has_spurious_column(&raw_rows) {
            headers.remove(1);
            for row in &mut raw_rows {
                if row.len() > 1 {
                    row.remove(1);
                }
            }
        }

        let headers = headers
            .iter()
            .map(|cell| normalize_header(&cell.as_text().unwrap_or_default()))
            .collect();

        Some(RawSheet {
            name: name.into(),
            headers,
            rows: raw_rows,
        })
    }
}

fn has_spurious_column(rows: &[Vec<CellValue>]) -> bool {
    if rows.is_empty() {
        return false;
    }
    rows.iter()
        .take(SHIFT_PROBE_ROWS)
        .all(|row| row.get(1).map(CellValue::is_empty).unwrap_or(true))
}

/// Lowercase, whitespace-trimmed header form used for all alias matching.
pub fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase()
}

/// Read every sheet of a workbook. A file-level failure is an error for the
/// caller to log; individual empty sheets are skipped.
pub fn read_workbook(path: &Path) -> anyhow::Result<Vec<RawSheet>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.display()))?;

    let sheet_names = workbook.sheet_names().to_owned();
    let mut sheets = Vec::with_capacity(sheet_names.len());

    for sheet_name in sheet_names {
        let range = workbook
            .worksheet_range(&sheet_name)
            .with_context(|| format!("failed to read sheet {sheet_name} of {}", path.display()))?;

        let raw_rows: Vec<Vec<CellValue>> = range
            .rows()
            .map(|row| row.iter().map(CellValue::from).collect())
            .collect();

        if let Some(sheet) = RawSheet::from_rows(sheet_name, raw_rows) {
            sheets.push(sheet);
        }
    }

    Ok(sheets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> CellValue {
        CellValue::Text(value.to_string())
    }

    #[test]
    fn headers_are_normalized() {
        let sheet = RawSheet::from_rows(
            "General",
            vec![
                vec![text("  RCDTS "), text("# Student Enrollment")],
                vec![text("123"), text("500")],
            ],
        )
        .unwrap();
        assert_eq!(sheet.headers, vec!["rcdts", "# student enrollment"]);
        assert_eq!(sheet.rows.len(), 1);
    }

    #[test]
    fn spurious_empty_column_is_dropped() {
        let sheet = RawSheet::from_rows(
            "General",
            vec![
                vec![text("RCDTS"), text("Ghost"), text("Level")],
                vec![text("1"), CellValue::Empty, text("School")],
                vec![text("2"), text("   "), text("School")],
            ],
        )
        .unwrap();
        assert_eq!(sheet.headers, vec!["rcdts", "level"]);
        assert_eq!(sheet.rows[0], vec![text("1"), text("School")]);
    }

    #[test]
    fn populated_second_column_is_kept() {
        let sheet = RawSheet::from_rows(
            "General",
            vec![
                vec![text("RCDTS"), text("Level")],
                vec![text("1"), text("School")],
            ],
        )
        .unwrap();
        assert_eq!(sheet.headers, vec!["rcdts", "level"]);
    }

    #[test]
    fn numeric_cells_render_without_trailing_zeroes() {
        assert_eq!(CellValue::Number(525.0).as_text().as_deref(), Some("525"));
        assert_eq!(CellValue::Number(52.3).as_text().as_deref(), Some("52.3"));
        assert_eq!(CellValue::Number(f64::NAN).as_text(), None);
    }

    #[test]
    fn empty_sheet_yields_none() {
        assert!(RawSheet::from_rows("Empty", vec![]).is_none());
    }
}
