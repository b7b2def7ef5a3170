//! Day ingestion
//!
//! Walks the diary in order and writes one row per (projection, merged
//! workout) into day tables, then gap-fills every known day table so each
//! has a row for the date.

use chrono::NaiveDate;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::cube::aggregate_day;
use crate::db::DbPool;
use crate::error::WarehouseError;
use crate::mapping::{apply_defaults, column_list, project, ColumnValue, DAY_MAPPINGS, PARTITION_COLUMNS, WORKOUT_MAPPINGS};
use crate::models::diary::{parse_diary_date, DayEntry, DiaryDocument, WorkoutRecord};
use crate::models::warehouse::{DatePartition, DimensionKey, Period};
use crate::report::{RowOutcome, RunReport};

/// ---------------------------------------------------------------------------
/// Row Writer
/// ---------------------------------------------------------------------------

/// Prepared insert statements for day tables
pub struct RowWriter {
  day_only_sql: String,
  workout_sql: String,
}

impl Default for RowWriter {
  fn default() -> Self {
    Self::new()
  }
}

impl RowWriter {
  pub fn new() -> Self {
    Self {
      day_only_sql: insert_sql(&[DAY_MAPPINGS]),
      workout_sql: insert_sql(&[DAY_MAPPINGS, WORKOUT_MAPPINGS]),
    }
  }

  /// Insert a row unless the table already holds one for the date.
  ///
  /// Workout values are omitted for day-only rows, which then take the
  /// column defaults.
  pub async fn insert(
    &self,
    conn: &mut SqliteConnection,
    table_name: &str,
    partition: &DatePartition,
    day_values: &[ColumnValue],
    workout_values: Option<&[ColumnValue]>,
  ) -> Result<RowOutcome, WarehouseError> {
    let sql = match workout_values {
      Some(_) => &self.workout_sql,
      None => &self.day_only_sql,
    };

    let mut query = sqlx::query(sql)
      .bind(table_name)
      .bind(partition.date)
      .bind(&partition.iso_week)
      .bind(&partition.iso_month)
      .bind(&partition.day_of_week)
      .bind(&partition.day_type);
    for value in day_values.iter().chain(workout_values.unwrap_or_default()) {
      query = bind_value(query, value);
    }

    let result = query.execute(&mut *conn).await?;
    if result.rows_affected() == 0 {
      Ok(RowOutcome::SkippedDuplicate)
    } else {
      Ok(RowOutcome::Inserted)
    }
  }

  pub async fn row_exists(
    &self,
    conn: &mut SqliteConnection,
    table_name: &str,
    date: NaiveDate,
  ) -> Result<bool, WarehouseError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM warehouse_rows WHERE table_name = ?1 AND date = ?2")
      .bind(table_name)
      .bind(date)
      .fetch_one(&mut *conn)
      .await?;
    Ok(count > 0)
  }
}

fn insert_sql(mapping_sets: &[&[crate::mapping::ColumnMapping]]) -> String {
  let mut columns = vec!["table_name".to_string()];
  columns.extend(PARTITION_COLUMNS.iter().map(|c| c.to_string()));
  columns.extend(mapping_sets.iter().map(|set| column_list(set)));

  let value_count = 1 + PARTITION_COLUMNS.len() + mapping_sets.iter().map(|set| set.len()).sum::<usize>();
  let placeholders = (1..=value_count).map(|i| format!("?{}", i)).collect::<Vec<_>>();

  format!(
    "INSERT INTO warehouse_rows ({}) VALUES ({}) ON CONFLICT(table_name, date) DO NOTHING",
    columns.join(", "),
    placeholders.join(", ")
  )
}

fn bind_value<'q>(
  query: Query<'q, Sqlite, SqliteArguments<'q>>,
  value: &ColumnValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
  match value {
    ColumnValue::Integer(v) => query.bind(*v),
    ColumnValue::Real(v) => query.bind(*v),
    ColumnValue::Text(v) => query.bind(v.clone()),
  }
}

/// ---------------------------------------------------------------------------
/// Ingestion Driver
/// ---------------------------------------------------------------------------

/// Ingest every diary day inside one transaction and return the catalog of
/// day tables that were created.
pub async fn ingest_diary(
  pool: &DbPool,
  diary: &DiaryDocument,
  report: &mut RunReport,
) -> Result<Catalog, WarehouseError> {
  let mut catalog = Catalog::new();
  let writer = RowWriter::new();

  let mut tx = pool.begin().await?;
  for day in &diary.days {
    ingest_day(&mut tx, &mut catalog, &writer, day, report).await?;
  }
  tx.commit().await?;

  info!(
    "Ingested {} days into {} day tables ({} rows, {} gap-filled)",
    report.days_processed,
    catalog.tables(Period::Day).count(),
    report.rows_inserted,
    report.rows_gap_filled
  );
  Ok(catalog)
}

/// Ingest one diary day.
///
/// Only infrastructure failures are returned; bad rows are recorded in
/// `report` and skipped.
pub async fn ingest_day(
  conn: &mut SqliteConnection,
  catalog: &mut Catalog,
  writer: &RowWriter,
  day: &DayEntry,
  report: &mut RunReport,
) -> Result<(), WarehouseError> {
  let date = match parse_diary_date(&day.date) {
    Ok(date) => date,
    Err(e) => {
      report.record_rejected(None, None, &e);
      return Ok(());
    }
  };
  report.days_processed += 1;
  let partition = DatePartition::from_date(date);

  let mut day_fields = day.fields.clone();
  apply_defaults(&mut day_fields, DAY_MAPPINGS);
  let day_values = match project(&day_fields, DAY_MAPPINGS) {
    Ok(values) => values,
    Err(e) => {
      report.record_rejected(None, Some(date), &e);
      return Ok(());
    }
  };

  match day.workouts.as_deref() {
    Some(workouts) if !workouts.is_empty() => {
      let workouts: Vec<WorkoutRecord> = workouts
        .iter()
        .cloned()
        .map(|mut w| {
          apply_defaults(&mut w.fields, WORKOUT_MAPPINGS);
          w
        })
        .collect();

      for slice in aggregate_day(&workouts) {
        for skipped in &slice.skipped {
          let error = WarehouseError::MissingDimension(skipped.missing);
          report.record_rejected(None, Some(date), &error);
          debug!("Workout {} skipped for {}", skipped.workout_index, slice.projection.label());
        }
        for rejected in &slice.rejected {
          report.record_rejected(Some(&rejected.key.table_name(Period::Day)), Some(date), &rejected.error);
        }

        for merged in &slice.workouts {
          let workout_values = match project(&merged.workout.fields, WORKOUT_MAPPINGS) {
            Ok(values) => values,
            Err(e) => {
              report.record_rejected(Some(&merged.key.table_name(Period::Day)), Some(date), &e);
              continue;
            }
          };
          let Some(table_name) = register(conn, catalog, &merged.key, date, report).await? else {
            continue;
          };
          let outcome = writer
            .insert(conn, &table_name, &partition, &day_values, Some(&workout_values))
            .await?;
          report.record_row(&table_name, date, outcome);
        }
      }
    }
    _ => {
      if let Some(table_name) = register(conn, catalog, &DimensionKey::all(), date, report).await? {
        let outcome = writer.insert(conn, &table_name, &partition, &day_values, None).await?;
        report.record_row(&table_name, date, outcome);
      }
    }
  }

  gap_fill(conn, catalog, writer, &partition, &day_values, report).await
}

/// Day table for `key`, or `None` when its dimension values cannot form a
/// table name. That rejection is recorded and only skips this row.
async fn register(
  conn: &mut SqliteConnection,
  catalog: &mut Catalog,
  key: &DimensionKey,
  date: NaiveDate,
  report: &mut RunReport,
) -> Result<Option<String>, WarehouseError> {
  let name = key.table_name(Period::Day);
  let known = catalog.contains(&name);
  let (table_name, creation) = match catalog.get_or_create(conn, Period::Day, key).await {
    Ok(created) => created,
    Err(e @ WarehouseError::InvalidTableName(_)) => {
      report.record_rejected(Some(&name), Some(date), &e);
      return Ok(None);
    }
    Err(e) => return Err(e),
  };
  // repeated lookups within a run are expected; only count first sightings
  if !known {
    report.record_table(creation);
  }
  Ok(Some(table_name))
}

/// Give every day table without a row for this date a day-only row.
async fn gap_fill(
  conn: &mut SqliteConnection,
  catalog: &Catalog,
  writer: &RowWriter,
  partition: &DatePartition,
  day_values: &[ColumnValue],
  report: &mut RunReport,
) -> Result<(), WarehouseError> {
  for entry in catalog.tables(Period::Day) {
    if writer.row_exists(conn, &entry.table_name, partition.date).await? {
      continue;
    }
    let outcome = match writer.insert(conn, &entry.table_name, partition, day_values, None).await? {
      RowOutcome::Inserted => RowOutcome::GapFilled,
      other => other,
    };
    report.record_row(&entry.table_name, partition.date, outcome);
  }
  Ok(())
}
