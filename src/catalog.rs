//! Table factory and catalog
//!
//! Dimensional tables are logical: their rows live in `warehouse_rows` and
//! each catalogued name is exposed as a view with the table's column layout.
//! The in-memory [`Catalog`] mirrors `table_catalog` for the current run and
//! is passed to every phase that needs to enumerate tables.

use sqlx::{Row, SqliteConnection};
use std::collections::HashSet;
use tracing::debug;

use crate::error::WarehouseError;
use crate::mapping::{all_mappings, PARTITION_COLUMNS};
use crate::models::warehouse::{CatalogEntry, DimensionKey, Period};

/// Result of a get-or-create call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableCreation {
  Created,
  /// Name was already registered; the existing table is used unchanged
  AlreadyExists,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
  entries: Vec<CatalogEntry>,
  names: HashSet<String>,
}

impl Catalog {
  pub fn new() -> Self {
    Self::default()
  }

  /// Read every registered table from the store
  pub async fn load(conn: &mut SqliteConnection) -> Result<Self, WarehouseError> {
    let rows = sqlx::query(
      "SELECT period, activity, activity_type, equipment, table_name FROM table_catalog ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut catalog = Self::new();
    for row in rows {
      let period_str: String = row.try_get("period")?;
      let period: Period = period_str.parse().map_err(WarehouseError::InvalidTableName)?;
      catalog.push(CatalogEntry {
        period,
        key: DimensionKey {
          activity: row.try_get("activity")?,
          activity_type: row.try_get("activity_type")?,
          equipment: row.try_get("equipment")?,
        },
        table_name: row.try_get("table_name")?,
      });
    }
    Ok(catalog)
  }

  pub fn entries(&self) -> &[CatalogEntry] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn contains(&self, table_name: &str) -> bool {
    self.names.contains(table_name)
  }

  /// Tables of one period in creation order
  pub fn tables(&self, period: Period) -> impl Iterator<Item = &CatalogEntry> {
    self.entries.iter().filter(move |e| e.period == period)
  }

  /// Distinct dimension keys among tables of `period`
  pub fn dimension_keys(&self, period: Period) -> Vec<DimensionKey> {
    let mut seen = HashSet::new();
    self
      .tables(period)
      .filter(|e| seen.insert(e.key.clone()))
      .map(|e| e.key.clone())
      .collect()
  }

  /// Look a name up in the catalog; only catalogued names may be used as identifiers
  pub fn require(&self, table_name: &str) -> Result<&CatalogEntry, WarehouseError> {
    self
      .entries
      .iter()
      .find(|e| e.table_name == table_name)
      .ok_or_else(|| WarehouseError::UnknownTable(table_name.to_string()))
  }

  /// Return the table for (period, key), registering it on first sight.
  ///
  /// Registration is attempted unconditionally; a name conflict is not an
  /// error and leaves the existing table and catalog untouched.
  pub async fn get_or_create(
    &mut self,
    conn: &mut SqliteConnection,
    period: Period,
    key: &DimensionKey,
  ) -> Result<(String, TableCreation), WarehouseError> {
    let table_name = key.table_name(period);
    validate_table_name(&table_name)?;

    let result = sqlx::query(
      r#"
      INSERT INTO table_catalog (period, activity, activity_type, equipment, table_name)
      VALUES (?1, ?2, ?3, ?4, ?5)
      ON CONFLICT(table_name) DO NOTHING
      "#,
    )
    .bind(period.as_str())
    .bind(&key.activity)
    .bind(&key.activity_type)
    .bind(&key.equipment)
    .bind(&table_name)
    .execute(&mut *conn)
    .await?;

    let entry = CatalogEntry {
      period,
      key: key.clone(),
      table_name: table_name.clone(),
    };

    if result.rows_affected() == 0 {
      // registered earlier in the store but not seen by this catalog yet
      if !self.contains(&table_name) {
        self.push(entry);
      }
      return Ok((table_name, TableCreation::AlreadyExists));
    }

    sqlx::query(&create_view_sql(&table_name))
      .execute(&mut *conn)
      .await?;
    debug!("Created table {}", table_name);

    self.push(entry);
    Ok((table_name, TableCreation::Created))
  }

  fn push(&mut self, entry: CatalogEntry) {
    self.names.insert(entry.table_name.clone());
    self.entries.push(entry);
  }
}

/// ---------------------------------------------------------------------------
/// Identifier Handling
/// ---------------------------------------------------------------------------

/// Table names end up as SQL identifiers, which cannot be bound as parameters
pub fn validate_table_name(table_name: &str) -> Result<(), WarehouseError> {
  let valid = !table_name.is_empty()
    && table_name.len() <= 255
    && !table_name.chars().any(|c| c == '"' || c == '`' || c == '[' || c == ']' || c.is_control());
  if valid {
    Ok(())
  } else {
    Err(WarehouseError::InvalidTableName(table_name.to_string()))
  }
}

pub fn quote_identifier(table_name: &str) -> Result<String, WarehouseError> {
  validate_table_name(table_name)?;
  Ok(format!("\"{}\"", table_name))
}

fn quote_literal(value: &str) -> String {
  format!("'{}'", value.replace('\'', "''"))
}

/// Column list every dimensional table exposes
pub fn table_columns() -> Vec<&'static str> {
  std::iter::once("id")
    .chain(PARTITION_COLUMNS.iter().copied())
    .chain(all_mappings().map(|m| m.column))
    .collect()
}

fn create_view_sql(table_name: &str) -> String {
  // the name was validated by the caller, so quoting cannot be escaped
  format!(
    "CREATE VIEW IF NOT EXISTS \"{}\" AS SELECT {} FROM warehouse_rows WHERE table_name = {}",
    table_name,
    table_columns().join(", "),
    quote_literal(table_name)
  )
}

pub async fn drop_view(conn: &mut SqliteConnection, table_name: &str) -> Result<(), WarehouseError> {
  let sql = format!("DROP VIEW IF EXISTS {}", quote_identifier(table_name)?);
  sqlx::query(&sql).execute(&mut *conn).await?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::warehouse::ALL;
  use crate::test_utils::{setup_test_db, teardown_test_db};

  #[tokio::test]
  async fn test_get_or_create_is_idempotent() {
    let pool = setup_test_db().await;
    let mut conn = pool.acquire().await.unwrap();
    let mut catalog = Catalog::new();
    let key = DimensionKey::new("Bike", "Road", "Road Bike");

    let (first, creation) = catalog.get_or_create(&mut conn, Period::Day, &key).await.unwrap();
    assert_eq!(first, "DAY_Bike_Road_RoadBike");
    assert_eq!(creation, TableCreation::Created);

    let (second, creation) = catalog.get_or_create(&mut conn, Period::Day, &key).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(creation, TableCreation::AlreadyExists);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM table_catalog WHERE table_name = ?1")
      .bind(&first)
      .fetch_one(&mut *conn)
      .await
      .unwrap();
    assert_eq!(count, 1);
    assert_eq!(catalog.len(), 1);

    drop(conn);
    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_created_table_is_queryable_by_name() {
    let pool = setup_test_db().await;
    let mut conn = pool.acquire().await.unwrap();
    let mut catalog = Catalog::new();

    let (name, _) = catalog
      .get_or_create(&mut conn, Period::Week, &DimensionKey::new("Run", ALL, ALL))
      .await
      .unwrap();
    assert_eq!(name, "WEEK_Run_All_All");

    let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?1)")
      .bind(&name)
      .fetch_all(&mut *conn)
      .await
      .unwrap();
    let expected: Vec<String> = table_columns().iter().map(|c| c.to_string()).collect();
    assert_eq!(columns, expected);

    drop(conn);
    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_catalog_load_matches_created_tables() {
    let pool = setup_test_db().await;
    let mut conn = pool.acquire().await.unwrap();
    let mut catalog = Catalog::new();
    catalog
      .get_or_create(&mut conn, Period::Day, &DimensionKey::all())
      .await
      .unwrap();
    catalog
      .get_or_create(&mut conn, Period::Month, &DimensionKey::all())
      .await
      .unwrap();

    let loaded = Catalog::load(&mut conn).await.unwrap();
    assert_eq!(loaded.entries(), catalog.entries());
    assert_eq!(loaded.tables(Period::Day).count(), 1);
    assert!(loaded.contains("MONTH_All_All_All"));

    drop(conn);
    teardown_test_db(pool).await;
  }

  #[test]
  fn test_dimension_keys_are_distinct_per_period() {
    let mut catalog = Catalog::new();
    for (period, key) in [
      (Period::Day, DimensionKey::all()),
      (Period::Week, DimensionKey::all()),
      (Period::Day, DimensionKey::new("Run", ALL, ALL)),
    ] {
      catalog.push(CatalogEntry {
        period,
        table_name: key.table_name(period),
        key,
      });
    }
    assert_eq!(catalog.dimension_keys(Period::Day).len(), 2);
    assert_eq!(catalog.dimension_keys(Period::Week), vec![DimensionKey::all()]);
    assert!(catalog.require("DAY_Run_All_All").is_ok());
    assert!(matches!(
      catalog.require("DAY_Swim_All_All"),
      Err(WarehouseError::UnknownTable(_))
    ));
  }

  #[test]
  fn test_table_name_validation() {
    assert!(validate_table_name("DAY_Bike_Road_RoadBike").is_ok());
    assert!(validate_table_name("DAY_Strength Training_All_All").is_ok());
    assert!(validate_table_name("").is_err());
    assert!(validate_table_name("DAY_\"; DROP TABLE x; --").is_err());
    assert_eq!(quote_identifier("DAY_All_All_All").unwrap(), "\"DAY_All_All_All\"");
    assert_eq!(quote_literal("O'Neil"), "'O''Neil'");
  }
}
