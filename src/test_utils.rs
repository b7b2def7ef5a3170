//! Test utilities and helpers for integration and unit testing
//!
//! This module provides common test infrastructure including:
//! - Database setup/teardown
//! - Mock diary factories
//! - Warehouse query helpers
//! - Helper assertions

use serde_json::{json, Map, Value};
use sqlx::SqlitePool;

use crate::catalog::quote_identifier;
use crate::models::diary::{DayEntry, DiaryDocument, PhysiologicalSample, WeightSample, WorkoutRecord};

/// ---------------------------------------------------------------------------
/// Database Test Utilities
/// ---------------------------------------------------------------------------

/// Create an in-memory SQLite database for testing
/// Runs all migrations and returns a ready-to-use pool
///
/// Uses max_connections(1) to prevent multiple pool connections from creating
/// isolated in-memory databases, which would cause intermittent test failures
pub async fn setup_test_db() -> SqlitePool {
  let pool = sqlx::sqlite::SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .expect("Failed to create in-memory database");

  // Run migrations
  sqlx::migrate!("./migrations")
    .run(&pool)
    .await
    .expect("Failed to run migrations");

  pool
}

/// Close a test database pool
pub async fn teardown_test_db(pool: SqlitePool) {
  pool.close().await;
}

/// Read one column of a dimensional table, ordered by date
pub async fn fetch_column(pool: &SqlitePool, table_name: &str, column: &str) -> Vec<(String, Option<f64>)> {
  let sql = format!(
    "SELECT date, CAST({} AS REAL) FROM {} ORDER BY date",
    column,
    quote_identifier(table_name).expect("Invalid table name")
  );
  sqlx::query_as(&sql)
    .fetch_all(pool)
    .await
    .expect("Failed to fetch column")
}

/// Number of rows stored for a dimensional table
pub async fn count_rows(pool: &SqlitePool, table_name: &str) -> i64 {
  sqlx::query_scalar("SELECT COUNT(*) FROM warehouse_rows WHERE table_name = ?1")
    .bind(table_name)
    .fetch_one(pool)
    .await
    .expect("Failed to count rows")
}

pub async fn catalog_names(pool: &SqlitePool, period: &str) -> Vec<String> {
  sqlx::query_scalar("SELECT table_name FROM table_catalog WHERE period = ?1 ORDER BY table_name")
    .bind(period)
    .fetch_all(pool)
    .await
    .expect("Failed to read catalog")
}

/// ---------------------------------------------------------------------------
/// Mock Data Factories
/// ---------------------------------------------------------------------------

/// Create a mock workout with every mapped field populated
pub fn mock_workout(activity: &str, activity_type: &str, equipment: &str) -> WorkoutRecord {
  let fields = json!({
    "km": 10.0,
    "tss": 50,
    "rpe": 5.0,
    "hr": 140,
    "watts": 0,
    "seconds": 3600,
    "ascentMetres": 100,
    "kj": 0,
    "reps": 0,
    "isRace": false,
    "brick": false,
    "wattsEstimated": false,
    "cadence": 170
  });

  WorkoutRecord {
    activity: Some(activity.to_string()),
    activity_type: Some(activity_type.to_string()),
    equipment: Some(equipment.to_string()),
    fields: as_map(fields),
  }
}

/// Create a mock diary day; `workouts` may be empty
pub fn mock_day(date: &str, workouts: Vec<WorkoutRecord>) -> DayEntry {
  DayEntry {
    date: format!("{}T00:00:00Z", date),
    workouts: if workouts.is_empty() { None } else { Some(workouts) },
    fields: as_map(json!({
      "type": "Normal",
      "fatigue": 5,
      "motivation": 6,
      "sleep": 8.0,
      "sleepQuality": "Good"
    })),
  }
}

pub fn mock_diary(days: Vec<DayEntry>) -> DiaryDocument {
  DiaryDocument {
    days,
    ..Default::default()
  }
}

pub fn mock_weight(date: &str, kg: f64) -> WeightSample {
  WeightSample {
    date: format!("{}T00:00:00Z", date),
    kg: Some(json!(kg)),
    fat_percent: None,
  }
}

pub fn mock_physiological(date: &str, resting_hr: f64) -> PhysiologicalSample {
  PhysiologicalSample {
    date: format!("{}T00:00:00Z", date),
    resting_hr: Some(json!(resting_hr)),
    resting_sdnn: None,
    resting_rmssd: None,
  }
}

fn as_map(value: Value) -> Map<String, Value> {
  match value {
    Value::Object(map) => map,
    _ => Map::new(),
  }
}

/// ---------------------------------------------------------------------------
/// Test Macros
/// ---------------------------------------------------------------------------

/// Assert two floats are approximately equal within a tolerance
#[macro_export]
macro_rules! assert_approx_eq {
  ($left:expr, $right:expr, $tolerance:expr) => {
    let diff = ($left - $right).abs();
    assert!(
      diff < $tolerance,
      "Values not approximately equal: {} vs {} (diff: {}, tolerance: {})",
      $left,
      $right,
      diff,
      $tolerance
    );
  };
}

/// ---------------------------------------------------------------------------
/// Tests for Test Utilities
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_setup_db_creates_schema() {
    let pool = setup_test_db().await;

    // Verify key tables exist
    let tables: Vec<(String,)> = sqlx::query_as(
      "SELECT name FROM sqlite_master WHERE type='table' AND name IN ('table_catalog', 'warehouse_rows')",
    )
    .fetch_all(&pool)
    .await
    .expect("Failed to query tables");

    assert_eq!(tables.len(), 2, "Expected 2 tables, got {}", tables.len());

    teardown_test_db(pool).await;
  }

  #[test]
  fn test_mock_factories_create_valid_data() {
    let workout = mock_workout("Run", "Road", "Road Shoes");
    assert_eq!(workout.activity.as_deref(), Some("Run"));
    assert!(workout.equipment_is_set());
    assert_eq!(workout.fields.get("seconds"), Some(&json!(3600)));

    let day = mock_day("2016-02-01", vec![workout]);
    assert!(day.has_workouts());
    assert!(!mock_day("2016-02-02", vec![]).has_workouts());

    let diary = mock_diary(vec![day]);
    assert_eq!(diary.day_dates().len(), 1);
  }
}
