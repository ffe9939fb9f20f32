use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::models::{FlatValue, Race, SchoolRecord};
use crate::series::Metric;
use crate::trends::{CURRENT_YEAR, EARLIEST_HISTORICAL_YEAR, TREND_WINDOWS};

/// Schools committed per transaction when writing trend columns back.
pub const UPDATE_BATCH_SIZE: usize = 100;

/// Historical snapshot metrics: column key plus whether values are integral.
/// The ACT section metrics exist only as snapshots, never as trend deltas.
const HIST_METRICS: [(&str, bool); 15] = [
    ("enrollment", true),
    ("act", false),
    ("act_ela", false),
    ("act_math", false),
    ("act_science", false),
    ("el", false),
    ("low_income", false),
    ("white", false),
    ("black", false),
    ("hispanic", false),
    ("asian", false),
    ("pacific_islander", false),
    ("native_american", false),
    ("two_or_more", false),
    ("mena", false),
];

/// Open (creating if needed) the SQLite database file.
pub async fn connect(db_path: &Path) -> anyhow::Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await
        .with_context(|| format!("failed to open database {}", db_path.display()))?;

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    Ok(pool)
}

/// The schools DDL is generated from the same metric registry the trend
/// calculator flattens against, so column names cannot drift apart.
pub fn schema_sql() -> String {
    let mut columns: Vec<String> = vec![
        "id INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
        "rcdts TEXT NOT NULL UNIQUE".to_string(),
        "school_name TEXT NOT NULL".to_string(),
        "district TEXT".to_string(),
        "city TEXT".to_string(),
        "county TEXT".to_string(),
        "school_type TEXT".to_string(),
        "level TEXT NOT NULL".to_string(),
        "grades_served TEXT".to_string(),
        "student_enrollment INTEGER".to_string(),
        "el_percentage REAL".to_string(),
        "low_income_percentage REAL".to_string(),
        "act_ela_avg REAL".to_string(),
        "act_math_avg REAL".to_string(),
        "act_science_avg REAL".to_string(),
        "iar_ela_proficiency_pct REAL".to_string(),
        "iar_math_proficiency_pct REAL".to_string(),
        "iar_overall_proficiency_pct REAL".to_string(),
    ];
    for race in Race::ALL {
        columns.push(format!("pct_{} REAL", race.key()));
    }
    for metric in Metric::ALL {
        for window in TREND_WINDOWS {
            columns.push(format!("{}_trend_{}yr REAL", metric.key(), window));
        }
    }
    for (metric, integral) in HIST_METRICS {
        let sql_type = if integral { "INTEGER" } else { "REAL" };
        for year in EARLIEST_HISTORICAL_YEAR..=CURRENT_YEAR {
            columns.push(format!("{metric}_hist_{year} {sql_type}"));
        }
    }
    columns.push("created_at TEXT".to_string());

    format!(
        "CREATE TABLE IF NOT EXISTS schools (\n    {}\n)",
        columns.join(",\n    ")
    )
}

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(&schema_sql())
        .execute(pool)
        .await
        .context("failed to create schools table")?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_schools_city ON schools (city)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_schools_level ON schools (level)")
        .execute(pool)
        .await?;
    Ok(())
}

const INSERT_SCHOOL_SQL: &str = "INSERT INTO schools (rcdts, school_name, district, city, county, \
     school_type, level, grades_served, student_enrollment, el_percentage, low_income_percentage, \
     act_ela_avg, act_math_avg, act_science_avg, iar_ela_proficiency_pct, iar_math_proficiency_pct, \
     iar_overall_proficiency_pct, pct_white, pct_black, pct_hispanic, pct_asian, \
     pct_pacific_islander, pct_native_american, pct_two_or_more, pct_mena, created_at) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

/// Full-replace import: delete every row, then bulk-insert the new ones,
/// inside a single transaction. Readers may observe an empty table for the
/// duration of the swap window.
pub async fn replace_all(pool: &SqlitePool, records: &[SchoolRecord]) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await.context("failed to begin import transaction")?;

    sqlx::query("DELETE FROM schools")
        .execute(&mut *tx)
        .await
        .context("failed to clear schools table")?;

    let imported_at = Utc::now();
    for record in records {
        let mut query = sqlx::query(INSERT_SCHOOL_SQL)
            .bind(&record.rcdts)
            .bind(&record.school_name)
            .bind(&record.district)
            .bind(&record.city)
            .bind(&record.county)
            .bind(&record.school_type)
            .bind(&record.level)
            .bind(&record.grades_served)
            .bind(record.enrollment)
            .bind(record.el_pct)
            .bind(record.low_income_pct)
            .bind(record.act_ela_avg)
            .bind(record.act_math_avg)
            .bind(record.act_science_avg)
            .bind(record.iar_ela_pct)
            .bind(record.iar_math_pct)
            .bind(record.iar_overall_pct);
        for race in Race::ALL {
            query = query.bind(record.diversity.get(&race).copied());
        }
        query
            .bind(imported_at)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to insert school {}", record.rcdts))?;
    }

    tx.commit().await.context("failed to commit import transaction")?;
    Ok(records.len())
}

/// Write sparse trend/historical column maps back in batches of
/// [`UPDATE_BATCH_SIZE`] schools per transaction. A failing batch aborts the
/// run; batches already committed stay committed.
pub async fn apply_column_updates(
    pool: &SqlitePool,
    updates: &[(String, BTreeMap<String, FlatValue>)],
) -> anyhow::Result<usize> {
    let mut updated = 0usize;

    for batch in updates.chunks(UPDATE_BATCH_SIZE) {
        let mut tx = pool.begin().await.context("failed to begin update batch")?;

        for (rcdts, columns) in batch {
            if columns.is_empty() {
                continue;
            }
            // Column names come from the internal metric registry, never
            // from source data.
            let assignments: Vec<String> =
                columns.keys().map(|column| format!("{column} = ?")).collect();
            let sql = format!(
                "UPDATE schools SET {} WHERE rcdts = ?",
                assignments.join(", ")
            );

            let mut query = sqlx::query(&sql);
            for value in columns.values() {
                query = match value {
                    FlatValue::Int(value) => query.bind(*value),
                    FlatValue::Float(value) => query.bind(*value),
                };
            }
            let result = query
                .bind(rcdts)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to update trend columns for {rcdts}"))?;
            if result.rows_affected() > 0 {
                updated += 1;
            }
        }

        tx.commit().await.context("failed to commit update batch")?;
        info!(updated, "committed trend update batch");
    }

    Ok(updated)
}

/// Read back the current-year metrics for every school, for trend
/// recomputation against an already-imported table.
pub async fn fetch_current_schools(pool: &SqlitePool) -> anyhow::Result<Vec<SchoolRecord>> {
    let rows = sqlx::query(
        "SELECT rcdts, school_name, district, city, county, school_type, level, grades_served, \
         student_enrollment, el_percentage, low_income_percentage, act_ela_avg, act_math_avg, \
         act_science_avg, iar_ela_proficiency_pct, iar_math_proficiency_pct, \
         iar_overall_proficiency_pct, pct_white, pct_black, pct_hispanic, pct_asian, \
         pct_pacific_islander, pct_native_american, pct_two_or_more, pct_mena \
         FROM schools ORDER BY rcdts",
    )
    .fetch_all(pool)
    .await
    .context("failed to read schools for trend update")?;

    let mut schools = Vec::with_capacity(rows.len());
    for row in rows {
        let mut record = SchoolRecord {
            rcdts: row.get("rcdts"),
            school_name: row.get("school_name"),
            district: row.get("district"),
            city: row.get("city"),
            county: row.get("county"),
            school_type: row.get("school_type"),
            level: row.get("level"),
            grades_served: row.get("grades_served"),
            enrollment: row.get("student_enrollment"),
            el_pct: row.get("el_percentage"),
            low_income_pct: row.get("low_income_percentage"),
            act_ela_avg: row.get("act_ela_avg"),
            act_math_avg: row.get("act_math_avg"),
            act_science_avg: row.get("act_science_avg"),
            iar_ela_pct: row.get("iar_ela_proficiency_pct"),
            iar_math_pct: row.get("iar_math_proficiency_pct"),
            iar_overall_pct: row.get("iar_overall_proficiency_pct"),
            ..Default::default()
        };
        for race in Race::ALL {
            let column = format!("pct_{}", race.key());
            if let Some(value) = row.get::<Option<f64>, _>(column.as_str()) {
                record.diversity.insert(race, value);
            }
        }
        schools.push(record);
    }

    Ok(schools)
}

/// Read one school's flattened trend/historical columns back out, in the
/// same sparse shape the calculator produced them.
pub async fn fetch_flat_columns(
    pool: &SqlitePool,
    rcdts: &str,
) -> anyhow::Result<BTreeMap<String, FlatValue>> {
    let row = sqlx::query("SELECT * FROM schools WHERE rcdts = ?")
        .bind(rcdts)
        .fetch_optional(pool)
        .await
        .context("failed to read school row")?;
    let Some(row) = row else {
        return Ok(BTreeMap::new());
    };

    let mut columns = BTreeMap::new();
    for metric in Metric::ALL {
        for window in TREND_WINDOWS {
            let name = format!("{}_trend_{}yr", metric.key(), window);
            if let Some(value) = row.get::<Option<f64>, _>(name.as_str()) {
                columns.insert(name, FlatValue::Float(value));
            }
        }
    }
    for (metric, integral) in HIST_METRICS {
        for year in EARLIEST_HISTORICAL_YEAR..=CURRENT_YEAR {
            let name = format!("{metric}_hist_{year}");
            if integral {
                if let Some(value) = row.get::<Option<i64>, _>(name.as_str()) {
                    columns.insert(name, FlatValue::Int(value));
                }
            } else if let Some(value) = row.get::<Option<f64>, _>(name.as_str()) {
                columns.insert(name, FlatValue::Float(value));
            }
        }
    }

    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_contains_every_trend_and_hist_column() {
        let sql = schema_sql();
        // 12 trend metrics x 3 windows.
        assert_eq!(sql.matches("_trend_").count(), 36);
        // 15 hist metrics x 16 years.
        assert_eq!(sql.matches("_hist_").count(), 240);
        assert!(sql.contains("enrollment_hist_2010 INTEGER"));
        assert!(sql.contains("act_hist_2025 REAL"));
        assert!(sql.contains("mena_trend_5yr REAL"));
        assert!(sql.contains("rcdts TEXT NOT NULL UNIQUE"));
    }

    #[test]
    fn hist_registry_matches_trend_metrics() {
        // Every delta-bearing metric also keeps snapshots.
        for metric in Metric::ALL {
            assert!(
                HIST_METRICS.iter().any(|(key, _)| *key == metric.key()),
                "no hist columns for {}",
                metric.key()
            );
        }
    }

    #[test]
    fn insert_placeholder_count_matches_columns() {
        let columns = INSERT_SCHOOL_SQL
            .split('(')
            .nth(1)
            .unwrap()
            .split(')')
            .next()
            .unwrap()
            .split(',')
            .count();
        let placeholders = INSERT_SCHOOL_SQL.matches('?').count();
        assert_eq!(columns, placeholders);
    }
}
