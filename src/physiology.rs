//! Physiological interpolation
//!
//! Weight, body fat and resting HR/HRV are measured sporadically. Each
//! measure becomes a sparse daily series that is linearly interpolated over
//! the diary's date range and written to every day table. Dates outside the
//! first and last valid sample stay NULL.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::info;

use crate::catalog::Catalog;
use crate::db::DbPool;
use crate::error::WarehouseError;
use crate::mapping::{numeric, project_value, SourceRecord, PHYSIOLOGICAL_MAPPINGS};
use crate::models::diary::{parse_diary_date, DiaryDocument};
use crate::models::warehouse::Period;
use crate::report::RunReport;

/// Daily values keyed by date
pub type Series = BTreeMap<NaiveDate, f64>;

/// ---------------------------------------------------------------------------
/// Series Construction
/// ---------------------------------------------------------------------------

/// Keep positive samples only; samples sharing a date are averaged
pub fn sparse_series<I>(samples: I) -> Series
where
  I: IntoIterator<Item = (NaiveDate, Option<f64>)>,
{
  let mut totals: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
  for (date, value) in samples {
    if let Some(v) = value.filter(|v| v.is_finite() && *v > 0.0) {
      let entry = totals.entry(date).or_insert((0.0, 0));
      entry.0 += v;
      entry.1 += 1;
    }
  }
  totals
    .into_iter()
    .map(|(date, (sum, count))| (date, sum / count as f64))
    .collect()
}

/// Value at `date`, interpolated by day count between the nearest samples
/// on either side. No extrapolation.
pub fn value_at(series: &Series, date: NaiveDate) -> Option<f64> {
  if let Some(v) = series.get(&date) {
    return Some(*v);
  }
  let (before_date, before) = series.range(..date).next_back()?;
  let (after_date, after) = series.range(date..).next()?;

  let span = (*after_date - *before_date).num_days() as f64;
  let offset = (date - *before_date).num_days() as f64;
  Some(before + (after - before) * offset / span)
}

/// Reindex onto every date in `[start, end]`, dropping undefined dates
pub fn interpolate(series: &Series, start: NaiveDate, end: NaiveDate) -> Series {
  start
    .iter_days()
    .take_while(|d| *d <= end)
    .filter_map(|d| value_at(series, d).map(|v| (d, v)))
    .collect()
}

fn sample_value(source: &str, raw: Option<&Value>, date: NaiveDate, report: &mut RunReport) -> Option<f64> {
  match raw {
    None | Some(Value::Null) => None,
    Some(value) => match numeric(source, value) {
      Ok(v) => Some(v),
      Err(e) => {
        report.record_rejected(None, Some(date), &e);
        None
      }
    },
  }
}

/// Sparse series for each physiological source field
#[derive(Debug, Clone, Default)]
pub struct PhysiologicalSeries {
  series: Vec<(&'static str, Series)>,
}

impl PhysiologicalSeries {
  /// Collect samples from the diary.
  ///
  /// Samples with unparseable dates and values that are not numeric are
  /// reported and skipped.
  pub fn from_diary(diary: &DiaryDocument, report: &mut RunReport) -> Self {
    let mut weights = Vec::new();
    for sample in &diary.weights {
      match parse_diary_date(&sample.date) {
        Ok(date) => weights.push((
          date,
          sample_value("kg", sample.kg.as_ref(), date, report),
          sample_value("fatPercent", sample.fat_percent.as_ref(), date, report),
        )),
        Err(e) => report.record_rejected(None, None, &e),
      }
    }

    let mut readings = Vec::new();
    for sample in &diary.physiologicals {
      match parse_diary_date(&sample.date) {
        Ok(date) => readings.push((
          date,
          sample_value("restingHR", sample.resting_hr.as_ref(), date, report),
          sample_value("restingSDNN", sample.resting_sdnn.as_ref(), date, report),
          sample_value("restingRMSSD", sample.resting_rmssd.as_ref(), date, report),
        )),
        Err(e) => report.record_rejected(None, None, &e),
      }
    }

    Self {
      series: vec![
        ("kg", sparse_series(weights.iter().map(|w| (w.0, w.1)))),
        ("fatPercent", sparse_series(weights.iter().map(|w| (w.0, w.2)))),
        ("restingHR", sparse_series(readings.iter().map(|r| (r.0, r.1)))),
        ("restingSDNN", sparse_series(readings.iter().map(|r| (r.0, r.2)))),
        ("restingRMSSD", sparse_series(readings.iter().map(|r| (r.0, r.3)))),
      ],
    }
  }

  pub fn get(&self, source: &str) -> Option<&Series> {
    self.series.iter().find(|(s, _)| *s == source).map(|(_, series)| series)
  }

  /// One source-keyed record per date in `[start, end]` that has any defined value
  pub fn interpolated_records(&self, start: NaiveDate, end: NaiveDate) -> BTreeMap<NaiveDate, Map<String, Value>> {
    let mut records: BTreeMap<NaiveDate, Map<String, Value>> = BTreeMap::new();
    for (source, series) in &self.series {
      for (date, value) in interpolate(series, start, end) {
        records
          .entry(date)
          .or_default()
          .insert(source.to_string(), Value::from(value));
      }
    }
    records
  }
}

/// ---------------------------------------------------------------------------
/// Broadcast
/// ---------------------------------------------------------------------------

/// Interpolate the diary's physiological samples and write them to every
/// day table row of each date. Returns the number of rows updated.
pub async fn apply_physiology(
  pool: &DbPool,
  catalog: &Catalog,
  diary: &DiaryDocument,
  report: &mut RunReport,
) -> Result<usize, WarehouseError> {
  let dates = diary.day_dates();
  let (Some(start), Some(end)) = (dates.iter().min().copied(), dates.iter().max().copied()) else {
    return Ok(0);
  };
  if catalog.tables(Period::Day).next().is_none() {
    return Ok(0);
  }

  let series = PhysiologicalSeries::from_diary(diary, report);
  let records = series.interpolated_records(start, end);

  let columns = PHYSIOLOGICAL_MAPPINGS
    .iter()
    .enumerate()
    .map(|(i, m)| format!("{} = ?{}", m.column, i + 1))
    .collect::<Vec<_>>()
    .join(", ");
  let date_param = PHYSIOLOGICAL_MAPPINGS.len() + 1;
  let sql = format!(
    "UPDATE warehouse_rows SET {} WHERE date = ?{} AND table_name IN (SELECT table_name FROM table_catalog WHERE period = ?{})",
    columns,
    date_param,
    date_param + 1
  );

  let mut tx = pool.begin().await?;
  let mut updated = 0;
  for (date, record) in &records {
    let mut query = sqlx::query(&sql);
    for mapping in PHYSIOLOGICAL_MAPPINGS {
      let value = match record.field(mapping.source) {
        Some(raw) => project_value(mapping, raw)?.as_f64(),
        None => None,
      };
      query = query.bind(value);
    }
    let result = query
      .bind(*date)
      .bind(Period::Day.as_str())
      .execute(&mut *tx)
      .await?;
    updated += result.rows_affected() as usize;
  }
  tx.commit().await?;

  info!("Physiological values written for {} dates ({} rows)", records.len(), updated);
  Ok(updated)
}
