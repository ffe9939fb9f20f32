use crate::workbook::CellValue;

/// Convert a percentage-like cell to a float. Blank cells, suppression
/// markers (`*`), NaN floats, and unparsable strings are all missing, never
/// an error.
pub fn clean_percentage(value: &CellValue) -> Option<f64> {
    match value {
        CellValue::Number(number) => {
            if number.is_nan() {
                None
            } else {
                Some(*number)
            }
        }
        CellValue::Text(text) => {
            let stripped = text.trim();
            if stripped.is_empty() || stripped == "*" {
                return None;
            }
            let stripped = stripped.strip_suffix('%').unwrap_or(stripped).trim();
            stripped.parse::<f64>().ok()
        }
        CellValue::Empty | CellValue::Bool(_) => None,
    }
}

/// Convert an enrollment-like cell to an integer, stripping thousands
/// separators. Float inputs truncate toward zero.
pub fn clean_enrollment(value: &CellValue) -> Option<i64> {
    match value {
        CellValue::Number(number) => {
            if number.is_nan() {
                None
            } else {
                Some(*number as i64)
            }
        }
        CellValue::Text(text) => {
            let stripped = text.trim();
            if stripped.is_empty() || stripped == "*" {
                return None;
            }
            let normalized = stripped.replace(',', "");
            normalized.parse::<f64>().ok().map(|parsed| parsed as i64)
        }
        CellValue::Empty | CellValue::Bool(_) => None,
    }
}

/// Permissive float parse for SAT/ACT score cells. Same missing-value rules
/// as the other cleaners, without the percent-sign handling.
pub fn clean_score(value: &CellValue) -> Option<f64> {
    match value {
        CellValue::Number(number) => {
            if number.is_nan() {
                None
            } else {
                Some(*number)
            }
        }
        CellValue::Text(text) => {
            let stripped = text.trim();
            if stripped.is_empty() || stripped == "*" {
                return None;
            }
            stripped.parse::<f64>().ok()
        }
        CellValue::Empty | CellValue::Bool(_) => None,
    }
}

/// Strip formatting punctuation from an RCDTS identifier. Idempotent; applied
/// at every lookup boundary so differently formatted source eras join up.
pub fn normalize_rcdts(rcdts: &str) -> String {
    rcdts.trim().replace('-', "")
}
