//! Workout cube aggregation
//!
//! Collapses one day's workouts along each projection of the
//! (activity, activity type, equipment) lattice. Workouts sharing a key are
//! merged into a single record: summed fields add up, mean fields are
//! weighted by duration so rate-like values (hr, watts) stay fair across
//! sessions of different length.

use serde_json::{Map, Value};

use crate::error::WarehouseError;
use crate::mapping::{numeric, project_value, AggregationMethod, ColumnType, WORKOUT_MAPPINGS};
use crate::models::diary::WorkoutRecord;
use crate::models::warehouse::{DimensionKey, Projection, PROJECTION_LATTICE};

/// Source field used as the weight for mean aggregation
pub const DURATION_FIELD: &str = "seconds";

/// One merged workout routed to the table of `key`
#[derive(Debug, Clone, PartialEq)]
pub struct MergedWorkout {
  pub key: DimensionKey,
  pub workout: WorkoutRecord,
  pub members: usize,
}

/// Workout left out of a projection because a required dimension is missing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedWorkout {
  pub workout_index: usize,
  pub missing: &'static str,
}

#[derive(Debug)]
pub struct RejectedGroup {
  pub key: DimensionKey,
  pub error: WarehouseError,
}

#[derive(Debug)]
pub struct ProjectionSlice {
  pub projection: Projection,
  pub workouts: Vec<MergedWorkout>,
  pub skipped: Vec<SkippedWorkout>,
  pub rejected: Vec<RejectedGroup>,
}

/// Aggregate a day's workouts for every projection of the lattice, in lattice order.
pub fn aggregate_day(workouts: &[WorkoutRecord]) -> Vec<ProjectionSlice> {
  PROJECTION_LATTICE
    .iter()
    .map(|projection| aggregate_projection(workouts, *projection))
    .collect()
}

pub fn aggregate_projection(workouts: &[WorkoutRecord], projection: Projection) -> ProjectionSlice {
  let mut groups: Vec<(DimensionKey, Vec<&WorkoutRecord>)> = Vec::new();
  let mut skipped = Vec::new();

  for (workout_index, workout) in workouts.iter().enumerate() {
    if projection.equipment && !workout.equipment_is_set() {
      continue;
    }
    let key = match projection.key_for(workout) {
      Ok(key) => key,
      Err(missing) => {
        skipped.push(SkippedWorkout {
          workout_index,
          missing,
        });
        continue;
      }
    };
    // first-seen order keeps row insertion deterministic
    match groups.iter_mut().find(|(k, _)| *k == key) {
      Some((_, members)) => members.push(workout),
      None => groups.push((key, vec![workout])),
    }
  }

  let mut merged = Vec::new();
  let mut rejected = Vec::new();
  for (key, members) in groups {
    match merge_workouts(&members) {
      Ok(workout) => merged.push(MergedWorkout {
        key,
        workout,
        members: members.len(),
      }),
      Err(error) => rejected.push(RejectedGroup { key, error }),
    }
  }

  ProjectionSlice {
    projection,
    workouts: merged,
    skipped,
    rejected,
  }
}

/// Merge workouts that share a dimension key.
///
/// A single member is returned unchanged. Mean fields use
/// `sum(value * seconds) / sum(seconds)` and fall back to the plain average
/// when the group has no recorded duration.
pub fn merge_workouts(members: &[&WorkoutRecord]) -> Result<WorkoutRecord, WarehouseError> {
  let first = match members {
    [] => return Err(WarehouseError::MissingField(DURATION_FIELD.to_string())),
    [only] => return Ok((*only).clone()),
    [first, ..] => *first,
  };

  let durations = members
    .iter()
    .map(|w| required_number(w, DURATION_FIELD, DURATION_FIELD))
    .collect::<Result<Vec<f64>, _>>()?;
  let total_duration: f64 = durations.iter().sum();

  let mut fields = Map::new();
  for mapping in WORKOUT_MAPPINGS {
    // several columns share a source field; aggregate it once
    if fields.contains_key(mapping.source) {
      continue;
    }

    let values = members
      .iter()
      .map(|w| member_value(w, mapping.source, mapping.column, mapping.column_type))
      .collect::<Result<Vec<f64>, _>>()?;

    let aggregated = match mapping.aggregation {
      Some(AggregationMethod::Sum) => Value::from(values.iter().sum::<f64>()),
      Some(AggregationMethod::Mean) => {
        let mean = if total_duration > 0.0 {
          values.iter().zip(&durations).map(|(v, s)| v * s).sum::<f64>() / total_duration
        } else {
          values.iter().sum::<f64>() / values.len() as f64
        };
        if mapping.column_type == ColumnType::Integer {
          Value::from(mean.trunc() as i64)
        } else {
          Value::from(mean)
        }
      }
      None => first.fields.get(mapping.source).cloned().unwrap_or(Value::Null),
    };
    fields.insert(mapping.source.to_string(), aggregated);
  }

  Ok(WorkoutRecord {
    activity: first.activity.clone(),
    activity_type: first.activity_type.clone(),
    equipment: first.equipment.clone(),
    fields,
  })
}

fn member_value(
  workout: &WorkoutRecord,
  source: &str,
  column: &str,
  column_type: ColumnType,
) -> Result<f64, WarehouseError> {
  if column_type != ColumnType::Boolean {
    return required_number(workout, source, column);
  }
  let flag = workout.fields.get(source).filter(|v| !v.is_null());
  match flag {
    Some(value) => {
      let mapping = WORKOUT_MAPPINGS
        .iter()
        .find(|m| m.column == column)
        .ok_or_else(|| WarehouseError::MissingField(column.to_string()))?;
      Ok(project_value(mapping, value)?.as_f64().unwrap_or(0.0))
    }
    None => Ok(0.0),
  }
}

fn required_number(workout: &WorkoutRecord, source: &str, column: &str) -> Result<f64, WarehouseError> {
  match workout.fields.get(source).filter(|v| !v.is_null()) {
    Some(value) => numeric(column, value),
    None => Err(WarehouseError::MissingField(source.to_string())),
  }
}
