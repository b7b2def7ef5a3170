use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::catalog::{drop_view, Catalog};
use crate::error::WarehouseError;

pub type DbPool = SqlitePool;

/// Initialize the database connection pool and run migrations
///
/// The warehouse is written by a single sequential pipeline, so one
/// connection is enough and keeps `sqlite::memory:` URLs on one database.
pub async fn initialize_db(database_url: &str) -> Result<DbPool, WarehouseError> {
  info!("Initializing warehouse at: {}", database_url);

  // Create connection pool
  let pool = SqlitePoolOptions::new()
    .max_connections(1)
    .connect(database_url)
    .await?;

  // Run migrations
  sqlx::migrate!("./migrations").run(&pool).await?;

  info!("Warehouse schema ready");

  Ok(pool)
}

/// Drop every catalogued table and clear stored rows before a full rebuild.
///
/// Returns the number of tables removed.
pub async fn reset_warehouse(pool: &DbPool) -> Result<usize, WarehouseError> {
  let mut tx = pool.begin().await?;

  let catalog = Catalog::load(&mut tx).await?;
  for entry in catalog.entries() {
    drop_view(&mut tx, &entry.table_name).await?;
  }

  sqlx::query("DELETE FROM warehouse_rows").execute(&mut *tx).await?;
  sqlx::query("DELETE FROM table_catalog").execute(&mut *tx).await?;

  tx.commit().await?;

  if !catalog.is_empty() {
    info!("Cleared {} tables from previous run", catalog.len());
  }
  Ok(catalog.len())
}
