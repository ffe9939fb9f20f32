use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use tracing::info;
use tracing_subscriber::EnvFilter;

use report_card_trends::clean::normalize_rcdts;
use report_card_trends::loader::YearLoader;
use report_card_trends::models::SchoolRecord;
use report_card_trends::trends::TrendCalculator;
use report_card_trends::{db, import};

#[derive(Parser)]
#[command(name = "report-card-trends")]
#[command(about = "Report card ETL: import school statistics and compute trends", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    InitDb {
        #[arg(long, default_value = "data/schools.db")]
        database: PathBuf,
    },
    /// Full-replace import of the current-year workbook, then compute trends
    Import {
        /// Current-year report card workbook
        #[arg(long)]
        workbook: PathBuf,
        /// Directory of historical yearly source files
        #[arg(long, default_value = "data/historical-report-cards")]
        data_dir: PathBuf,
        #[arg(long, default_value = "data/schools.db")]
        database: PathBuf,
    },
    /// Recompute trend and historical columns for already-imported schools
    UpdateTrends {
        #[arg(long, default_value = "data/historical-report-cards")]
        data_dir: PathBuf,
        #[arg(long, default_value = "data/schools.db")]
        database: PathBuf,
    },
    /// Print one school's computed trend/historical columns as JSON
    Inspect {
        /// RCDTS identifier, with or without formatting punctuation
        #[arg(long)]
        rcdts: String,
        #[arg(long)]
        workbook: PathBuf,
        #[arg(long, default_value = "data/historical-report-cards")]
        data_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb { database } => {
            let pool = db::connect(&database).await?;
            db::init_db(&pool).await?;
            println!("Schema ready at {}.", database.display());
        }
        Commands::Import {
            workbook,
            data_dir,
            database,
        } => {
            let pool = db::connect(&database).await?;
            db::init_db(&pool).await?;

            let records = import::load_current_year(&workbook)?;
            let imported = db::replace_all(&pool, &records).await?;
            println!("Imported {imported} schools from {}.", workbook.display());

            let updated = update_trend_columns(&pool, &records, &data_dir).await?;
            println!("Updated trend columns for {updated} schools.");
        }
        Commands::UpdateTrends { data_dir, database } => {
            let pool = db::connect(&database).await?;
            let records = db::fetch_current_schools(&pool).await?;
            if records.is_empty() {
                println!("No schools in the database; run import first.");
                return Ok(());
            }
            let updated = update_trend_columns(&pool, &records, &data_dir).await?;
            println!("Updated trend columns for {updated} schools.");
        }
        Commands::Inspect {
            rcdts,
            workbook,
            data_dir,
        } => {
            let records = import::load_current_year(&workbook)?;
            let wanted = normalize_rcdts(&rcdts);
            let school = records
                .iter()
                .find(|record| normalize_rcdts(&record.rcdts) == wanted)
                .with_context(|| format!("school {rcdts} not found in workbook"))?;

            let columns = {
                let mut calculator = TrendCalculator::new(YearLoader::new(&data_dir));
                calculator.column_updates(school)
            };
            let output = serde_json::json!({
                "school": school,
                "columns": columns,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Compute trend/historical columns for every school and write them back in
/// batches. Per-school gaps are normal; only database failures abort.
async fn update_trend_columns(
    pool: &SqlitePool,
    records: &[SchoolRecord],
    data_dir: &Path,
) -> anyhow::Result<usize> {
    let updates = {
        let mut calculator = TrendCalculator::new(YearLoader::new(data_dir));
        let mut updates = Vec::with_capacity(records.len());
        for record in records {
            let columns = calculator.column_updates(record);
            if !columns.is_empty() {
                updates.push((record.rcdts.clone(), columns));
            }
        }
        calculator.clear_cache();
        updates
    };

    info!(
        schools = records.len(),
        with_trends = updates.len(),
        "computed trend columns"
    );
    db::apply_column_updates(pool, &updates).await
}
