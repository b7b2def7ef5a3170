/// ---------------------------------------------------------------------------
/// Error Handling
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
  #[error("Missing configuration: {0}")]
  MissingConfig(String),

  #[error("Invalid configuration: {0}")]
  InvalidConfig(String),

  #[error("Database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("Migration failed: {0}")]
  Migration(#[from] sqlx::migrate::MigrateError),

  #[error("Failed to read diary: {0}")]
  Io(#[from] std::io::Error),

  #[error("Failed to decode diary: {0}")]
  Diary(#[from] serde_json::Error),

  #[error("Invalid date: {0}")]
  InvalidDate(String),

  #[error("Missing source field: {0}")]
  MissingField(String),

  #[error("Malformed value for {column}: {reason}")]
  MalformedValue { column: String, reason: String },

  #[error("Workout has no {0}")]
  MissingDimension(&'static str),

  #[error("Table is not in the catalog: {0}")]
  UnknownTable(String),

  #[error("Invalid table name: {0}")]
  InvalidTableName(String),
}

impl WarehouseError {
  pub fn malformed(column: &str, reason: impl Into<String>) -> Self {
    WarehouseError::MalformedValue {
      column: column.to_string(),
      reason: reason.into(),
    }
  }
}
