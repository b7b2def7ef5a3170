use anyhow::Context;

use training_warehouse_lib::config::WarehouseConfig;
use training_warehouse_lib::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Load environment variables from .env file
  dotenvy::dotenv().ok();
  logging::init();

  let config = WarehouseConfig::from_env().context("Failed to load configuration")?;
  let report = training_warehouse_lib::run(&config)
    .await
    .context("Failed to build training warehouse")?;

  report.log_summary();
  Ok(())
}
