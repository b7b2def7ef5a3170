pub mod catalog;
pub mod config;
pub mod cube;
pub mod db;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod mapping;
pub mod models;
pub mod physiology;
pub mod report;
pub mod rollup;
pub mod training_load;

#[cfg(test)]
pub mod test_utils;

use tracing::info;

use config::WarehouseConfig;
use db::DbPool;
use error::WarehouseError;
use models::diary::DiaryDocument;
use models::warehouse::Period;
use report::RunReport;

/// Build the warehouse described by `config` from scratch
pub async fn run(config: &WarehouseConfig) -> Result<RunReport, WarehouseError> {
  info!("Reading diary from {}", config.diary_path.display());
  let diary = DiaryDocument::from_path(&config.diary_path)?;

  let pool = db::initialize_db(&config.database_url).await?;
  let report = build_warehouse(&pool, &diary, &config.rollup_periods).await;
  pool.close().await;
  report
}

/// Run every phase against an open pool: reset, ingest, training load,
/// physiology, then rollups.
pub async fn build_warehouse(
  pool: &DbPool,
  diary: &DiaryDocument,
  rollup_periods: &[Period],
) -> Result<RunReport, WarehouseError> {
  db::reset_warehouse(pool).await?;

  let mut report = RunReport::default();
  let mut catalog = ingest::ingest_diary(pool, diary, &mut report).await?;
  report.training_load_rows = training_load::apply_training_load(pool, &catalog).await?;
  report.physiological_rows = physiology::apply_physiology(pool, &catalog, diary, &mut report).await?;
  rollup::build_period_tables(pool, &mut catalog, rollup_periods, &mut report).await?;

  Ok(report)
}
