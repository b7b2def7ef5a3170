use std::env;
use std::path::PathBuf;

use crate::error::WarehouseError;
use crate::models::warehouse::Period;
use crate::rollup::DEFAULT_ROLLUP_PERIODS;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://training_data_warehouse.db?mode=rwc";

/// Warehouse build configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq)]
pub struct WarehouseConfig {
  /// Diary JSON export to ingest
  pub diary_path: PathBuf,
  pub database_url: String,
  /// Periods rolled up from the day tables
  pub rollup_periods: Vec<Period>,
}

impl WarehouseConfig {
  pub fn from_env() -> Result<Self, WarehouseError> {
    let diary_path = env::var("TRAINING_DIARY_PATH")
      .map_err(|_| WarehouseError::MissingConfig("TRAINING_DIARY_PATH".into()))?;

    let database_url = env::var("WAREHOUSE_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

    let rollup_periods = match env::var("WAREHOUSE_ROLLUP_PERIODS") {
      Ok(raw) => parse_periods(&raw)?,
      Err(_) => DEFAULT_ROLLUP_PERIODS.to_vec(),
    };

    Ok(Self {
      diary_path: PathBuf::from(diary_path),
      database_url,
      rollup_periods,
    })
  }
}

/// Parse a comma separated list of rollup periods ("week,month")
pub fn parse_periods(raw: &str) -> Result<Vec<Period>, WarehouseError> {
  let mut periods = Vec::new();
  for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
    let period: Period = part.parse().map_err(WarehouseError::InvalidConfig)?;
    if period == Period::Day {
      return Err(WarehouseError::InvalidConfig(
        "WAREHOUSE_ROLLUP_PERIODS accepts week and month only".into(),
      ));
    }
    if !periods.contains(&period) {
      periods.push(period);
    }
  }
  Ok(periods)
}
