//! Training load (CTL / ATL / TSB)
//!
//! Fitness (CTL) and fatigue (ATL) are exponentially weighted averages of
//! daily TSS with 42- and 7-day time constants; form (TSB) is their
//! difference. Each day depends on the previous one, so rows are processed
//! strictly in ascending date order.

use serde::Serialize;
use sqlx::Row;
use tracing::info;

use crate::catalog::Catalog;
use crate::db::DbPool;
use crate::error::WarehouseError;
use crate::mapping::round_to_hundredths;
use crate::models::warehouse::Period;

pub const CTL_DAYS: f64 = 42.0;
pub const ATL_DAYS: f64 = 7.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TrainingLoad {
  pub ctl: f64,
  pub atl: f64,
  pub tsb: f64,
}

impl TrainingLoad {
  /// Advance one day with that day's TSS
  pub fn next(&self, tss: f64) -> Self {
    let ctl_decay = (-1.0 / CTL_DAYS).exp();
    let atl_decay = (-1.0 / ATL_DAYS).exp();

    let ctl = tss * (1.0 - ctl_decay) + self.ctl * ctl_decay;
    let atl = tss * (1.0 - atl_decay) + self.atl * atl_decay;
    Self { ctl, atl, tsb: ctl - atl }
  }

  /// Values as stored: two decimal places
  pub fn rounded(&self) -> Self {
    Self {
      ctl: round_to_hundredths(self.ctl),
      atl: round_to_hundredths(self.atl),
      tsb: round_to_hundredths(self.tsb),
    }
  }
}

/// Load for each day of an ordered TSS series, starting from zero
pub fn training_load_series(tss: &[f64]) -> Vec<TrainingLoad> {
  tss
    .iter()
    .scan(TrainingLoad::default(), |load, &t| {
      *load = load.next(t);
      Some(*load)
    })
    .collect()
}

/// Compute and store ctl/atl/tsb for every day table in the catalog.
///
/// Returns the number of rows updated. Missing TSS counts as zero.
pub async fn apply_training_load(pool: &DbPool, catalog: &Catalog) -> Result<usize, WarehouseError> {
  let mut tx = pool.begin().await?;
  let mut updated = 0;

  for entry in catalog.tables(Period::Day) {
    let rows = sqlx::query(
      "SELECT id, CAST(tss AS REAL) AS tss FROM warehouse_rows WHERE table_name = ?1 ORDER BY date ASC",
    )
    .bind(&entry.table_name)
    .fetch_all(&mut *tx)
    .await?;

    let mut load = TrainingLoad::default();
    for row in rows {
      let id: i64 = row.try_get("id")?;
      let tss: Option<f64> = row.try_get("tss")?;
      load = load.next(tss.unwrap_or(0.0));
      let stored = load.rounded();

      sqlx::query("UPDATE warehouse_rows SET ctl = ?1, atl = ?2, tsb = ?3 WHERE id = ?4")
        .bind(stored.ctl)
        .bind(stored.atl)
        .bind(stored.tsb)
        .bind(id)
        .execute(&mut *tx)
        .await?;
      updated += 1;
    }
  }

  tx.commit().await?;
  info!("Training load computed for {} rows", updated);
  Ok(updated)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::assert_approx_eq;
  use crate::ingest::ingest_diary;
  use crate::report::RunReport;
  use crate::test_utils::{fetch_column, mock_day, mock_diary, mock_workout, setup_test_db, teardown_test_db};
  use serde_json::json;

  #[test]
  fn test_series_matches_recurrence() {
    let series = training_load_series(&[100.0, 0.0, 0.0]);
    assert_eq!(series.len(), 3);

    let ctl1 = 100.0 * (1.0 - (-1.0_f64 / 42.0).exp());
    let atl1 = 100.0 * (1.0 - (-1.0_f64 / 7.0).exp());
    assert_approx_eq!(series[0].ctl, ctl1, 1e-9);
    assert_approx_eq!(series[0].atl, atl1, 1e-9);
    assert_approx_eq!(series[0].tsb, ctl1 - atl1, 1e-9);

    assert_approx_eq!(series[0].ctl, 2.35, 0.01);
    assert_approx_eq!(series[0].atl, 13.31, 0.01);
    assert_approx_eq!(series[0].tsb, -10.96, 0.01);

    // zero-TSS days decay geometrically
    assert_approx_eq!(series[1].ctl, ctl1 * (-1.0_f64 / 42.0).exp(), 1e-9);
    assert_approx_eq!(series[2].atl, atl1 * (-2.0_f64 / 7.0).exp(), 1e-9);
    assert!(series[2].tsb > series[0].tsb);
  }

  #[test]
  fn test_empty_series() {
    assert!(training_load_series(&[]).is_empty());
    assert_eq!(TrainingLoad::default().next(0.0), TrainingLoad::default());
  }

  #[test]
  fn test_rounded_to_two_places() {
    let load = TrainingLoad::default().next(100.0).rounded();
    assert_eq!(load.ctl, 2.35);
    assert_eq!(load.atl, 13.31);
  }

  #[tokio::test]
  async fn test_apply_training_load_in_date_order() {
    let pool = setup_test_db().await;

    // Arrange: diary listed out of order, TSS only on the first date
    let mut workout = mock_workout("Run", "Road", "Road Shoes");
    workout.fields.insert("tss".into(), json!(100));
    let diary = mock_diary(vec![
      mock_day("2016-02-03", vec![]),
      mock_day("2016-02-01", vec![workout]),
      mock_day("2016-02-02", vec![]),
    ]);
    let mut report = RunReport::default();
    let catalog = ingest_diary(&pool, &diary, &mut report).await.unwrap();

    // Act
    let updated = apply_training_load(&pool, &catalog).await.unwrap();

    // Assert
    assert!(updated >= 3);
    let expected = training_load_series(&[100.0, 0.0, 0.0]);

    let ctl = fetch_column(&pool, "DAY_All_All_All", "ctl").await;
    let atl = fetch_column(&pool, "DAY_All_All_All", "atl").await;
    let tsb = fetch_column(&pool, "DAY_All_All_All", "tsb").await;
    assert_eq!(ctl.len(), 3);
    for i in 0..3 {
      let stored = expected[i].rounded();
      assert_approx_eq!(ctl[i].1.unwrap(), stored.ctl, 1e-9);
      assert_approx_eq!(atl[i].1.unwrap(), stored.atl, 1e-9);
      assert_approx_eq!(tsb[i].1.unwrap(), stored.tsb, 1e-9);
    }

    teardown_test_db(pool).await;
  }
}
