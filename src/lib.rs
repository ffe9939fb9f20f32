//! Offline ETL for school report-card statistics: parses fifteen years of
//! heterogeneous yearly source files, reconciles them into per-school time
//! series, computes 1/3/5-year trend deltas and 15-year historical
//! snapshots, and persists the flattened columns to SQLite.

pub mod clean;
pub mod concordance;
pub mod db;
pub mod extract;
pub mod import;
pub mod layout;
pub mod loader;
pub mod models;
pub mod series;
pub mod trends;
pub mod workbook;
