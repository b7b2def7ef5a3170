//! Period rollups
//!
//! Builds WEEK and MONTH tables from the day tables. Each period table gets
//! one row per ISO week or calendar month: summed columns add up, mean
//! columns average, text columns are left NULL. The row's `date` is the last
//! date seen in the period.

use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::db::DbPool;
use crate::error::WarehouseError;
use crate::mapping::{all_mappings, AggregationMethod, PARTITION_COLUMNS};
use crate::models::warehouse::Period;
use crate::report::RunReport;

/// Default periods built after ingestion
pub const DEFAULT_ROLLUP_PERIODS: [Period; 2] = [Period::Week, Period::Month];

/// Statement that aggregates one day table (`?2`) into one period table (`?1`)
pub fn rollup_sql(period: Period) -> Option<String> {
  let group_column = period.group_column()?;

  let mut columns = vec!["table_name".to_string()];
  let mut selects = vec!["?1".to_string()];

  for column in PARTITION_COLUMNS {
    columns.push(column.to_string());
    let select = match *column {
      "date" => "MAX(date)".to_string(),
      c if c == group_column => c.to_string(),
      _ => "NULL".to_string(),
    };
    selects.push(select);
  }

  for mapping in all_mappings() {
    columns.push(mapping.column.to_string());
    let select = match mapping.aggregation {
      Some(AggregationMethod::Sum) => format!("SUM({})", mapping.column),
      Some(AggregationMethod::Mean) => format!("AVG({})", mapping.column),
      None => "NULL".to_string(),
    };
    selects.push(select);
  }

  Some(format!(
    "INSERT INTO warehouse_rows ({}) SELECT {} FROM warehouse_rows WHERE table_name = ?2 GROUP BY {} ORDER BY {} ON CONFLICT(table_name, date) DO NOTHING",
    columns.join(", "),
    selects.join(", "),
    group_column,
    group_column
  ))
}

/// Create and populate a period table for every dimension key that has a
/// day table. Day periods in `periods` are ignored.
pub async fn build_period_tables(
  pool: &DbPool,
  catalog: &mut Catalog,
  periods: &[Period],
  report: &mut RunReport,
) -> Result<(), WarehouseError> {
  let keys = catalog.dimension_keys(Period::Day);
  let mut tx = pool.begin().await?;

  for period in periods {
    let Some(sql) = rollup_sql(*period) else {
      continue;
    };

    let mut period_rows = 0;
    for key in &keys {
      let source = key.table_name(Period::Day);
      catalog.require(&source)?;

      let (target, creation) = catalog.get_or_create(&mut tx, *period, key).await?;
      report.record_table(creation);

      let result = sqlx::query(&sql)
        .bind(&target)
        .bind(&source)
        .execute(&mut *tx)
        .await?;
      debug!("{} -> {}: {} rows", source, target, result.rows_affected());
      period_rows += result.rows_affected() as usize;
    }

    info!("Built {} {} tables ({} rows)", keys.len(), period, period_rows);
    report.period_rows += period_rows;
  }

  tx.commit().await?;
  Ok(())
}
