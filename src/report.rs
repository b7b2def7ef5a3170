//! Run report
//!
//! Row- and table-local problems never abort a run. They are collected here
//! as typed outcomes and logged as they happen.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::TableCreation;
use crate::error::WarehouseError;

/// Outcome of writing one (table, date) row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
  Inserted,
  GapFilled,
  /// A row for the date already existed; the earlier row is kept
  SkippedDuplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
  DuplicateDateConflict,
  MalformedValue,
  MissingDimensionData,
  InvalidDate,
  /// Dimension values that cannot form a table name
  InvalidTableName,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowIssue {
  pub kind: IssueKind,
  pub table_name: Option<String>,
  pub date: Option<NaiveDate>,
  pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
  pub days_processed: usize,
  pub tables_created: usize,
  /// get-or-create calls that found the table already registered
  pub schema_conflicts: usize,
  pub rows_inserted: usize,
  pub rows_gap_filled: usize,
  pub training_load_rows: usize,
  pub physiological_rows: usize,
  pub period_rows: usize,
  pub issues: Vec<RowIssue>,
}

impl RunReport {
  pub fn record_table(&mut self, creation: TableCreation) {
    match creation {
      TableCreation::Created => self.tables_created += 1,
      TableCreation::AlreadyExists => self.schema_conflicts += 1,
    }
  }

  pub fn record_row(&mut self, table_name: &str, date: NaiveDate, outcome: RowOutcome) {
    match outcome {
      RowOutcome::Inserted => self.rows_inserted += 1,
      RowOutcome::GapFilled => self.rows_gap_filled += 1,
      RowOutcome::SkippedDuplicate => {
        warn!("Duplicate date {} in {}; keeping the earlier row", date, table_name);
        self.issues.push(RowIssue {
          kind: IssueKind::DuplicateDateConflict,
          table_name: Some(table_name.to_string()),
          date: Some(date),
          detail: "row for this date already exists".to_string(),
        });
      }
    }
  }

  /// Record a row that could not be built; the error decides the issue kind
  pub fn record_rejected(&mut self, table_name: Option<&str>, date: Option<NaiveDate>, error: &WarehouseError) {
    let kind = match error {
      WarehouseError::InvalidDate(_) => IssueKind::InvalidDate,
      WarehouseError::MissingDimension(_) => IssueKind::MissingDimensionData,
      WarehouseError::InvalidTableName(_) => IssueKind::InvalidTableName,
      _ => IssueKind::MalformedValue,
    };
    warn!(
      "Rejected row for {} on {}: {}",
      table_name.unwrap_or("<day>"),
      date.map(|d| d.to_string()).unwrap_or_else(|| "<unknown date>".to_string()),
      error
    );
    self.issues.push(RowIssue {
      kind,
      table_name: table_name.map(str::to_string),
      date,
      detail: error.to_string(),
    });
  }

  pub fn count(&self, kind: IssueKind) -> usize {
    self.issues.iter().filter(|i| i.kind == kind).count()
  }

  pub fn log_summary(&self) {
    info!(
      "Warehouse built: {} days, {} tables, {} rows inserted, {} gap-filled, {} period rows",
      self.days_processed, self.tables_created, self.rows_inserted, self.rows_gap_filled, self.period_rows
    );
    if !self.issues.is_empty() {
      warn!(
        "{} rows skipped ({} duplicate dates, {} malformed, {} missing dimensions, {} invalid dates, {} invalid table names)",
        self.issues.len(),
        self.count(IssueKind::DuplicateDateConflict),
        self.count(IssueKind::MalformedValue),
        self.count(IssueKind::MissingDimensionData),
        self.count(IssueKind::InvalidDate),
        self.count(IssueKind::InvalidTableName)
      );
    }
  }
}
