use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;

use crate::clean::{clean_enrollment, clean_percentage, clean_score};
use crate::extract::{race_aliases, HeaderMap};
use crate::models::{Race, SchoolRecord};
use crate::workbook::{read_workbook, CellValue, RawSheet};

/// Sheet names in the current-year workbook.
const GENERAL_SHEET: &str = "general";
const ACT_SHEET: &str = "act";
const IAR_SHEET: &str = "iar";

const IAR_ELA_ALIASES: &[&str] = &["iar ela proficiency rate - total"];
const IAR_MATH_ALIASES: &[&str] = &["iar math proficiency rate - total"];

/// Load the current-year workbook into school rows ready for the full
/// table replace.
pub fn load_current_year(workbook_path: &Path) -> anyhow::Result<Vec<SchoolRecord>> {
    let sheets = read_workbook(workbook_path)
        .with_context(|| format!("failed to load workbook {}", workbook_path.display()))?;
    let records = records_from_sheets(&sheets);
    if records.is_empty() {
        anyhow::bail!(
            "no school-level rows found in {}",
            workbook_path.display()
        );
    }
    Ok(records)
}

/// Assemble school rows from the workbook's sheets: General supplies the
/// roster and demographics, ACT and IAR sheets left-join their scores by
/// RCDTS.
pub fn records_from_sheets(sheets: &[RawSheet]) -> Vec<SchoolRecord> {
    let mut schools = sheets
        .iter()
        .find(|sheet| sheet.name.eq_ignore_ascii_case(GENERAL_SHEET))
        .map(general_records)
        .unwrap_or_default();

    if let Some(sheet) = sheets.iter().find(|sheet| sheet.name.eq_ignore_ascii_case(ACT_SHEET)) {
        apply_act_sheet(sheet, &mut schools);
    }
    if let Some(sheet) = sheets.iter().find(|sheet| sheet.name.eq_ignore_ascii_case(IAR_SHEET)) {
        apply_iar_sheet(sheet, &mut schools);
    }

    schools.into_values().collect()
}

/// Bucket raw school-type strings into coarse level labels.
pub fn normalize_level(school_type: Option<&str>) -> String {
    let Some(school_type) = school_type else {
        return "other".to_string();
    };
    let normalized = school_type.to_lowercase();
    if normalized.contains("middle")
        || normalized.contains("junior")
        || normalized.contains("intermediate")
    {
        "middle".to_string()
    } else if normalized.contains("high") {
        "high".to_string()
    } else if normalized.contains("elementary") || normalized.contains("primary") {
        "elementary".to_string()
    } else {
        "other".to_string()
    }
}

fn general_records(sheet: &RawSheet) -> HashMap<String, SchoolRecord> {
    let headers = HeaderMap::new(&sheet.headers);
    let Some(rcdts_col) = headers.resolve(&["rcdts"]) else {
        return HashMap::new();
    };
    let level_col = headers.resolve(&["level"]);
    let name_col = headers.resolve(&["school name"]);
    let district_col = headers.resolve(&["district"]);
    let city_col = headers.resolve(&["city"]);
    let county_col = headers.resolve(&["county"]);
    let type_col = headers.resolve(&["school type"]);
    let grades_col = headers.resolve(&["grades served"]);
    let enrollment_col = headers.resolve(&["# student enrollment"]);
    let el_col = headers.resolve(&["% student enrollment - el"]);
    let low_income_col = headers.resolve(&["% student enrollment - low income"]);
    let mut race_cols = [None; 8];
    for (slot, race) in race_cols.iter_mut().zip(Race::ALL) {
        *slot = headers.resolve(race_aliases(race));
    }

    let mut schools = HashMap::new();
    for row in &sheet.rows {
        let Some(rcdts) = cell(row, Some(rcdts_col)).and_then(CellValue::as_text) else {
            continue;
        };
        // Only school-level rows become records; district and state
        // aggregates are dropped.
        let level_cell = cell(row, level_col).and_then(CellValue::as_text);
        if !level_cell
            .as_deref()
            .map(|level| level.trim().eq_ignore_ascii_case("school"))
            .unwrap_or(false)
        {
            continue;
        }

        let school_type = cell(row, type_col).and_then(CellValue::as_text);
        let mut record = SchoolRecord {
            rcdts: rcdts.clone(),
            school_name: cell(row, name_col)
                .and_then(CellValue::as_text)
                .unwrap_or_default(),
            district: cell(row, district_col).and_then(CellValue::as_text),
            city: cell(row, city_col).and_then(CellValue::as_text),
            county: cell(row, county_col).and_then(CellValue::as_text),
            level: normalize_level(school_type.as_deref()),
            school_type,
            grades_served: cell(row, grades_col).and_then(CellValue::as_text),
            enrollment: cell(row, enrollment_col).and_then(clean_enrollment),
            el_pct: cell(row, el_col).and_then(clean_percentage),
            low_income_pct: cell(row, low_income_col).and_then(clean_percentage),
            ..Default::default()
        };
        for (slot, race) in race_cols.iter().zip(Race::ALL) {
            if let Some(value) = cell(row, *slot).and_then(clean_percentage) {
                record.diversity.insert(race, value);
            }
        }

        schools.insert(rcdts, record);
    }
    schools
}

fn apply_act_sheet(sheet: &RawSheet, schools: &mut HashMap<String, SchoolRecord>) {
    let headers = HeaderMap::new(&sheet.headers);
    let Some(rcdts_col) = headers.resolve(&["rcdts"]) else {
        return;
    };
    let ela_col = headers.resolve(&["act ela average score - grade 11"]);
    let math_col = headers.resolve(&["act math average score - grade 11"]);
    let science_col = headers.resolve(&["act science average score - grade 11"]);

    for row in &sheet.rows {
        let Some(rcdts) = cell(row, Some(rcdts_col)).and_then(CellValue::as_text) else {
            continue;
        };
        let Some(record) = schools.get_mut(&rcdts) else {
            continue;
        };
        if let Some(value) = cell(row, ela_col).and_then(clean_score) {
            record.act_ela_avg = Some(value);
        }
        if let Some(value) = cell(row, math_col).and_then(clean_score) {
            record.act_math_avg = Some(value);
        }
        if let Some(value) = cell(row, science_col).and_then(clean_score) {
            record.act_science_avg = Some(value);
        }
    }
}

fn apply_iar_sheet(sheet: &RawSheet, schools: &mut HashMap<String, SchoolRecord>) {
    let headers = HeaderMap::new(&sheet.headers);
    let Some(rcdts_col) = headers.resolve(&["rcdts"]) else {
        return;
    };
    let ela_col = headers.resolve(IAR_ELA_ALIASES);
    let math_col = headers.resolve(IAR_MATH_ALIASES);

    for row in &sheet.rows {
        let Some(rcdts) = cell(row, Some(rcdts_col)).and_then(CellValue::as_text) else {
            continue;
        };
        let Some(record) = schools.get_mut(&rcdts) else {
            continue;
        };
        if let Some(value) = cell(row, ela_col).and_then(clean_percentage) {
            record.iar_ela_pct = Some(value);
        }
        if let Some(value) = cell(row, math_col).and_then(clean_percentage) {
            record.iar_math_pct = Some(value);
        }
        if let (Some(ela), Some(math)) = (record.iar_ela_pct, record.iar_math_pct) {
            record.iar_overall_pct = Some((ela + math) / 2.0);
        }
    }
}

fn cell<'a>(row: &'a [CellValue], column: Option<usize>) -> Option<&'a CellValue> {
    column.and_then(|index| row.get(index))
}
