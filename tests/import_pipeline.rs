//! End-to-end pipeline tests: yearly text sources in a fixture directory,
//! a throwaway SQLite database, and the flattened columns read back out.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tempfile::TempDir;

use report_card_trends::db;
use report_card_trends::loader::YearLoader;
use report_card_trends::models::{FlatValue, Race, SchoolRecord};
use report_card_trends::trends::TrendCalculator;

const RCDTS: &str = "11-111-1111-11-0001";

fn write_fixture_sources(data_dir: &Path) {
    fs::create_dir_all(data_dir).unwrap();
    fs::write(
        data_dir.join("2024-report-card.txt"),
        format!(
            "RCDTS|Level|# Student Enrollment|% Student Enrollment - Low Income|% Student Enrollment - EL|% Student Enrollment - White|SAT Reading Average Score|SAT Math Average Score\n\
             {RCDTS}|School|680|40.0|12.0|55.0|505|505\n"
        ),
    )
    .unwrap();
    fs::write(
        data_dir.join("2022-report-card.txt"),
        format!(
            "RCDTS|Level|# Student Enrollment|% Student Enrollment - Low Income\n\
             {RCDTS}|School|650|38.5\n"
        ),
    )
    .unwrap();
    // 2020 carries no assessment data anywhere; 2019 has a direct ACT
    // composite for the five-year fallback.
    fs::write(
        data_dir.join("2019-report-card.txt"),
        format!("RCDTS|ACT Composite Score - Grade 11\n{RCDTS}|19.0\n"),
    )
    .unwrap();
}

fn current_school() -> SchoolRecord {
    let mut school = SchoolRecord {
        rcdts: RCDTS.to_string(),
        school_name: "Central High School".to_string(),
        district: Some("Springfield CUSD".to_string()),
        city: Some("Springfield".to_string()),
        level: "high".to_string(),
        enrollment: Some(700),
        low_income_pct: Some(45.0),
        el_pct: Some(15.0),
        act_ela_avg: Some(20.0),
        act_math_avg: Some(22.0),
        ..Default::default()
    };
    school.diversity.insert(Race::White, 52.5);
    school
}

#[tokio::test]
async fn import_then_trend_update_round_trips() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("historical-report-cards");
    write_fixture_sources(&data_dir);

    let pool = db::connect(&dir.path().join("schools.db")).await.unwrap();
    db::init_db(&pool).await.unwrap();

    let school = current_school();
    let imported = db::replace_all(&pool, std::slice::from_ref(&school))
        .await
        .unwrap();
    assert_eq!(imported, 1);

    let mut calculator = TrendCalculator::new(YearLoader::new(&data_dir));
    let columns = calculator.column_updates(&school);
    calculator.clear_cache();

    let updates = vec![(school.rcdts.clone(), columns.clone())];
    let updated = db::apply_column_updates(&pool, &updates).await.unwrap();
    assert_eq!(updated, 1);

    // Current-year composite is (20 + 22) / 2 = 21.0.
    assert_eq!(columns.get("low_income_trend_1yr"), Some(&FlatValue::Float(5.0)));
    assert_eq!(columns.get("low_income_trend_3yr"), Some(&FlatValue::Float(6.5)));
    assert_eq!(columns.get("enrollment_trend_1yr"), Some(&FlatValue::Float(20.0)));
    assert_eq!(columns.get("enrollment_trend_3yr"), Some(&FlatValue::Float(50.0)));
    // 1-year ACT window hits the 2024 SAT conversion (1010 -> 19.5).
    assert_eq!(columns.get("act_trend_1yr"), Some(&FlatValue::Float(1.5)));
    // 3-year window has no 2022 assessment value and is omitted.
    assert!(!columns.contains_key("act_trend_3yr"));
    // 5-year window lands on the 2020 gap and falls back to 2019.
    assert_eq!(columns.get("act_trend_5yr"), Some(&FlatValue::Float(2.0)));
    // No window exists for EL beyond the current year.
    assert!(!columns.contains_key("el_trend_3yr"));

    assert_eq!(columns.get("enrollment_hist_2025"), Some(&FlatValue::Int(700)));
    assert_eq!(columns.get("enrollment_hist_2024"), Some(&FlatValue::Int(680)));
    assert_eq!(columns.get("act_hist_2024"), Some(&FlatValue::Float(19.5)));
    assert_eq!(columns.get("act_hist_2019"), Some(&FlatValue::Float(19.0)));
    assert_eq!(columns.get("white_hist_2025"), Some(&FlatValue::Float(52.5)));

    // Round trip: everything the calculator produced persists unchanged.
    let stored = db::fetch_flat_columns(&pool, &school.rcdts).await.unwrap();
    assert_eq!(stored, columns);
}

#[tokio::test]
async fn update_trends_reads_current_rows_back() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("historical-report-cards");
    write_fixture_sources(&data_dir);

    let pool = db::connect(&dir.path().join("schools.db")).await.unwrap();
    db::init_db(&pool).await.unwrap();
    db::replace_all(&pool, &[current_school()]).await.unwrap();

    let schools = db::fetch_current_schools(&pool).await.unwrap();
    assert_eq!(schools.len(), 1);
    let school = &schools[0];
    assert_eq!(school.rcdts, RCDTS);
    assert_eq!(school.enrollment, Some(700));
    assert_eq!(school.diversity.get(&Race::White), Some(&52.5));

    let mut calculator = TrendCalculator::new(YearLoader::new(&data_dir));
    let columns = calculator.column_updates(school);
    let updated = db::apply_column_updates(&pool, &[(school.rcdts.clone(), columns)])
        .await
        .unwrap();
    assert_eq!(updated, 1);
}

#[tokio::test]
async fn reimport_fully_replaces_the_table() {
    let dir = TempDir::new().unwrap();
    let pool = db::connect(&dir.path().join("schools.db")).await.unwrap();
    db::init_db(&pool).await.unwrap();

    db::replace_all(&pool, &[current_school()]).await.unwrap();

    let mut replacement = current_school();
    replacement.rcdts = "22-222-2222-22-0002".to_string();
    replacement.school_name = "North Elementary".to_string();
    replacement.level = "elementary".to_string();
    db::replace_all(&pool, std::slice::from_ref(&replacement))
        .await
        .unwrap();

    let schools = db::fetch_current_schools(&pool).await.unwrap();
    assert_eq!(schools.len(), 1);
    assert_eq!(schools[0].rcdts, replacement.rcdts);
}

#[tokio::test]
async fn updates_for_unknown_schools_count_nothing() {
    let dir = TempDir::new().unwrap();
    let pool = db::connect(&dir.path().join("schools.db")).await.unwrap();
    db::init_db(&pool).await.unwrap();

    let mut columns = BTreeMap::new();
    columns.insert("enrollment_trend_1yr".to_string(), FlatValue::Float(1.0));
    let updated = db::apply_column_updates(&pool, &[("99-9999".to_string(), columns)])
        .await
        .unwrap();
    assert_eq!(updated, 0);
}

#[tokio::test]
async fn batching_handles_more_schools_than_one_batch() {
    let dir = TempDir::new().unwrap();
    let pool = db::connect(&dir.path().join("schools.db")).await.unwrap();
    db::init_db(&pool).await.unwrap();

    let schools: Vec<SchoolRecord> = (0..250)
        .map(|index| SchoolRecord {
            rcdts: format!("11-111-1111-11-{index:04}"),
            school_name: format!("School {index}"),
            level: "high".to_string(),
            enrollment: Some(400 + index),
            ..Default::default()
        })
        .collect();
    db::replace_all(&pool, &schools).await.unwrap();

    let updates: Vec<(String, BTreeMap<String, FlatValue>)> = schools
        .iter()
        .map(|school| {
            let mut columns = BTreeMap::new();
            columns.insert("enrollment_hist_2025".to_string(), FlatValue::Int(500));
            (school.rcdts.clone(), columns)
        })
        .collect();

    let updated = db::apply_column_updates(&pool, &updates).await.unwrap();
    assert_eq!(updated, 250);
}
