//! Column mapping registry and value projector
//!
//! Each mapping describes how one source field becomes one destination
//! column. A source field may feed several columns (km -> km, miles).
//! The column order of every mapping set MUST match `migrations/0001_warehouse.sql`.

use serde_json::{Map, Value};

use crate::error::WarehouseError;

/// ---------------------------------------------------------------------------
/// Mapping Types
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
  Integer,
  Real,
  /// Stored as 0/1
  Boolean,
  Text,
}

impl ColumnType {
  pub fn sql_type(&self) -> &'static str {
    match self {
      ColumnType::Integer | ColumnType::Boolean => "INTEGER",
      ColumnType::Real => "REAL",
      ColumnType::Text => "TEXT",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMethod {
  Sum,
  Mean,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
  Integer(i64),
  Real(f64),
  Text(&'static str),
}

impl DefaultValue {
  pub fn to_json(self) -> Value {
    match self {
      DefaultValue::Integer(v) => Value::from(v),
      DefaultValue::Real(v) => Value::from(v),
      DefaultValue::Text(v) => Value::from(v),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnMapping {
  pub source: &'static str,
  pub column: &'static str,
  pub column_type: ColumnType,
  pub factor: f64,
  pub default: DefaultValue,
  /// None for text columns, which cannot be aggregated
  pub aggregation: Option<AggregationMethod>,
}

const fn mapping(
  source: &'static str,
  column: &'static str,
  column_type: ColumnType,
  factor: f64,
  default: DefaultValue,
  aggregation: Option<AggregationMethod>,
) -> ColumnMapping {
  ColumnMapping {
    source,
    column,
    column_type,
    factor,
    default,
    aggregation,
  }
}

use AggregationMethod::{Mean, Sum};
use ColumnType::{Boolean, Integer, Real, Text};

const ZERO: DefaultValue = DefaultValue::Integer(0);
const ZERO_REAL: DefaultValue = DefaultValue::Real(0.0);

pub const KM_TO_MILES: f64 = 0.621371;
pub const METRES_TO_FEET: f64 = 3.28084;
pub const KG_TO_LBS: f64 = 2.20462;

/// ---------------------------------------------------------------------------
/// Mapping Sets
/// ---------------------------------------------------------------------------

pub const WORKOUT_MAPPINGS: &[ColumnMapping] = &[
  mapping("km", "km", Real, 1.0, ZERO_REAL, Some(Sum)),
  mapping("km", "miles", Real, KM_TO_MILES, ZERO_REAL, Some(Sum)),
  mapping("tss", "tss", Integer, 1.0, ZERO, Some(Sum)),
  mapping("rpe", "rpe", Real, 1.0, ZERO_REAL, Some(Mean)),
  mapping("hr", "hr", Integer, 1.0, ZERO, Some(Mean)),
  mapping("watts", "watts", Integer, 1.0, ZERO, Some(Mean)),
  mapping("seconds", "seconds", Integer, 1.0, ZERO, Some(Sum)),
  mapping("seconds", "minutes", Integer, 1.0 / 60.0, ZERO, Some(Sum)),
  mapping("seconds", "hours", Real, 1.0 / 3600.0, ZERO_REAL, Some(Sum)),
  mapping("ascentMetres", "ascent_metres", Integer, 1.0, ZERO, Some(Sum)),
  mapping("ascentMetres", "ascent_feet", Integer, METRES_TO_FEET, ZERO, Some(Sum)),
  mapping("kj", "kj", Integer, 1.0, ZERO, Some(Sum)),
  mapping("reps", "reps", Integer, 1.0, ZERO, Some(Sum)),
  mapping("isRace", "is_race", Boolean, 1.0, ZERO, Some(Sum)),
  mapping("brick", "brick", Boolean, 1.0, ZERO, Some(Sum)),
  mapping("wattsEstimated", "watts_estimated", Boolean, 1.0, ZERO, Some(Sum)),
  mapping("cadence", "cadence", Integer, 1.0, ZERO, Some(Mean)),
];

pub const DAY_MAPPINGS: &[ColumnMapping] = &[
  mapping("fatigue", "fatigue", Real, 1.0, ZERO_REAL, Some(Mean)),
  mapping("motivation", "motivation", Real, 1.0, ZERO_REAL, Some(Mean)),
  mapping("sleep", "sleep_seconds", Integer, 3600.0, ZERO, Some(Mean)),
  mapping("sleep", "sleep_minutes", Integer, 60.0, ZERO, Some(Mean)),
  mapping("sleep", "sleep_hours", Real, 1.0, ZERO_REAL, Some(Mean)),
  mapping("type", "type", Text, 1.0, DefaultValue::Text("Normal"), None),
  mapping("sleepQuality", "sleep_quality", Text, 1.0, DefaultValue::Text("Average"), None),
];

pub const COMPUTED_MAPPINGS: &[ColumnMapping] = &[
  mapping("ctl", "ctl", Real, 1.0, ZERO_REAL, Some(Mean)),
  mapping("atl", "atl", Real, 1.0, ZERO_REAL, Some(Mean)),
  mapping("tsb", "tsb", Real, 1.0, ZERO_REAL, Some(Mean)),
];

/// Interpolated columns; NULL where a series is undefined
pub const PHYSIOLOGICAL_MAPPINGS: &[ColumnMapping] = &[
  mapping("kg", "kg", Real, 1.0, ZERO_REAL, Some(Mean)),
  mapping("kg", "lbs", Real, KG_TO_LBS, ZERO_REAL, Some(Mean)),
  mapping("fatPercent", "fat_percent", Real, 1.0, ZERO_REAL, Some(Mean)),
  mapping("restingHR", "resting_hr", Real, 1.0, ZERO_REAL, Some(Mean)),
  mapping("restingSDNN", "sdnn", Real, 1.0, ZERO_REAL, Some(Mean)),
  mapping("restingRMSSD", "rmssd", Real, 1.0, ZERO_REAL, Some(Mean)),
];

/// Date partition columns that precede the mapped columns in every table
pub const PARTITION_COLUMNS: &[&str] = &["date", "iso_week", "iso_month", "day_of_week", "day_type"];

/// Every mapped column in table order
pub fn all_mappings() -> impl Iterator<Item = &'static ColumnMapping> {
  DAY_MAPPINGS
    .iter()
    .chain(WORKOUT_MAPPINGS)
    .chain(COMPUTED_MAPPINGS)
    .chain(PHYSIOLOGICAL_MAPPINGS)
}

/// Column names of a mapping set joined for a statement
pub fn column_list(mappings: &[ColumnMapping]) -> String {
  mappings.iter().map(|m| m.column).collect::<Vec<_>>().join(", ")
}

/// ---------------------------------------------------------------------------
/// Projected Values
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
  Integer(i64),
  Real(f64),
  Text(String),
}

impl ColumnValue {
  pub fn as_f64(&self) -> Option<f64> {
    match self {
      ColumnValue::Integer(v) => Some(*v as f64),
      ColumnValue::Real(v) => Some(*v),
      ColumnValue::Text(_) => None,
    }
  }
}

/// Anything the projector can read source fields from
pub trait SourceRecord {
  fn field(&self, name: &str) -> Option<&Value>;
}

impl SourceRecord for Map<String, Value> {
  fn field(&self, name: &str) -> Option<&Value> {
    self.get(name).filter(|v| !v.is_null())
  }
}

/// Insert each mapping's default for absent or null source fields.
///
/// The projector never defaults missing fields itself; callers that accept
/// optional diary fields run this first.
pub fn apply_defaults(record: &mut Map<String, Value>, mappings: &[ColumnMapping]) {
  for m in mappings {
    let missing = record.get(m.source).map_or(true, Value::is_null);
    if missing {
      record.insert(m.source.to_string(), m.default.to_json());
    }
  }
}

/// Project `record` through `mappings` into one value per column.
pub fn project<R: SourceRecord + ?Sized>(
  record: &R,
  mappings: &[ColumnMapping],
) -> Result<Vec<ColumnValue>, WarehouseError> {
  mappings
    .iter()
    .map(|m| match record.field(m.source) {
      Some(value) => project_value(m, value),
      // absent booleans are false; anything else absent is a caller bug
      None if m.column_type == ColumnType::Boolean => Ok(ColumnValue::Integer(0)),
      None => Err(WarehouseError::MissingField(m.source.to_string())),
    })
    .collect()
}

/// Convert one source value to the mapping's destination type.
///
/// Integers round half away from zero; reals round to 2 decimal places.
pub fn project_value(mapping: &ColumnMapping, value: &Value) -> Result<ColumnValue, WarehouseError> {
  match mapping.column_type {
    ColumnType::Integer => {
      let scaled = numeric(mapping.column, value)? * mapping.factor;
      if !scaled.is_finite() || scaled.abs() >= i64::MAX as f64 {
        return Err(WarehouseError::malformed(mapping.column, format!("{} is out of range", scaled)));
      }
      Ok(ColumnValue::Integer(scaled.round() as i64))
    }
    ColumnType::Real => {
      let scaled = numeric(mapping.column, value)? * mapping.factor;
      if !scaled.is_finite() {
        return Err(WarehouseError::malformed(mapping.column, format!("{} is out of range", scaled)));
      }
      Ok(ColumnValue::Real(round_to_hundredths(scaled)))
    }
    ColumnType::Boolean => Ok(ColumnValue::Integer(truthy(mapping.column, value)? as i64)),
    ColumnType::Text => match value {
      Value::String(s) => Ok(ColumnValue::Text(s.clone())),
      Value::Number(n) => Ok(ColumnValue::Text(n.to_string())),
      Value::Bool(b) => Ok(ColumnValue::Text(b.to_string())),
      other => Err(WarehouseError::malformed(mapping.column, format!("expected text, got {}", other))),
    },
  }
}

pub fn round_to_hundredths(value: f64) -> f64 {
  (value * 100.0).round() / 100.0
}

/// Read a JSON value as a number the way a float parse would.
pub fn numeric(column: &str, value: &Value) -> Result<f64, WarehouseError> {
  match value {
    Value::Number(n) => n
      .as_f64()
      .ok_or_else(|| WarehouseError::malformed(column, format!("{} is not representable", n))),
    Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
    Value::String(s) => s
      .trim()
      .parse::<f64>()
      .map_err(|_| WarehouseError::malformed(column, format!("'{}' is not numeric", s))),
    other => Err(WarehouseError::malformed(column, format!("expected a number, got {}", other))),
  }
}

fn truthy(column: &str, value: &Value) -> Result<bool, WarehouseError> {
  match value {
    Value::Null => Ok(false),
    Value::Bool(b) => Ok(*b),
    Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
    Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
    other => Ok(numeric(column, other)? != 0.0),
  }
}
