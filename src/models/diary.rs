//! Decoded training diary document
//!
//! Field names follow the diary's JSON export. Metrics and sample values are
//! kept as raw JSON values so that a single malformed field rejects one row
//! instead of the whole document. Dimension names that are not strings
//! decode as absent.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::WarehouseError;

pub const NOT_SET: &str = "Not Set";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiaryDocument {
  #[serde(default)]
  pub days: Vec<DayEntry>,
  #[serde(default)]
  pub weights: Vec<WeightSample>,
  #[serde(default)]
  pub physiologicals: Vec<PhysiologicalSample>,
}

impl DiaryDocument {
  pub fn from_json_str(json: &str) -> Result<Self, WarehouseError> {
    Ok(serde_json::from_str(json)?)
  }

  pub fn from_path(path: &Path) -> Result<Self, WarehouseError> {
    let json = std::fs::read_to_string(path)?;
    Self::from_json_str(&json)
  }

  /// Dates of every day entry that has a parseable date
  pub fn day_dates(&self) -> Vec<NaiveDate> {
    self
      .days
      .iter()
      .filter_map(|d| parse_diary_date(&d.date).ok())
      .collect()
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DayEntry {
  #[serde(rename = "iso8061DateString")]
  pub date: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub workouts: Option<Vec<WorkoutRecord>>,
  /// type, fatigue, motivation, sleep, sleepQuality
  #[serde(flatten)]
  pub fields: Map<String, Value>,
}

impl DayEntry {
  pub fn has_workouts(&self) -> bool {
    self.workouts.as_ref().is_some_and(|w| !w.is_empty())
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkoutRecord {
  #[serde(rename = "activityString", default, deserialize_with = "lenient_text")]
  pub activity: Option<String>,
  #[serde(rename = "activityTypeString", default, deserialize_with = "lenient_text")]
  pub activity_type: Option<String>,
  #[serde(rename = "equipmentName", default, deserialize_with = "lenient_text")]
  pub equipment: Option<String>,
  #[serde(flatten)]
  pub fields: Map<String, Value>,
}

impl WorkoutRecord {
  /// Equipment that is absent, empty or "Not Set" is excluded from
  /// equipment-keyed projections.
  pub fn equipment_is_set(&self) -> bool {
    match self.equipment.as_deref() {
      Some(name) => !name.is_empty() && name != NOT_SET,
      None => false,
    }
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeightSample {
  #[serde(rename = "iso8061DateString")]
  pub date: String,
  #[serde(default)]
  pub kg: Option<Value>,
  #[serde(rename = "fatPercent", default)]
  pub fat_percent: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhysiologicalSample {
  #[serde(rename = "iso8061DateString")]
  pub date: String,
  #[serde(rename = "restingHR", default)]
  pub resting_hr: Option<Value>,
  #[serde(rename = "restingSDNN", default)]
  pub resting_sdnn: Option<Value>,
  #[serde(rename = "restingRMSSD", default)]
  pub resting_rmssd: Option<Value>,
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  match Value::deserialize(deserializer)? {
    Value::String(s) => Ok(Some(s)),
    _ => Ok(None),
  }
}

/// Parse a diary timestamp into a timezone-naive calendar date.
///
/// The date is taken as written: "2016-02-02T23:30:00+01:00" is 2016-02-02.
pub fn parse_diary_date(raw: &str) -> Result<NaiveDate, WarehouseError> {
  let raw = raw.trim();

  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return Ok(dt.date_naive());
  }
  for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
      return Ok(dt.date());
    }
  }
  NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| WarehouseError::InvalidDate(raw.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_diary_date_formats() {
    let expected = NaiveDate::from_ymd_opt(2016, 2, 2).unwrap();
    assert_eq!(parse_diary_date("2016-02-02T00:00:00Z").unwrap(), expected);
    assert_eq!(parse_diary_date("2016-02-02T23:30:00+01:00").unwrap(), expected);
    assert_eq!(parse_diary_date("2016-02-02T06:15:00").unwrap(), expected);
    assert_eq!(parse_diary_date("2016-02-02").unwrap(), expected);
  }

  #[test]
  fn test_parse_diary_date_rejects_garbage() {
    let result = parse_diary_date("yesterday");
    assert!(matches!(result, Err(WarehouseError::InvalidDate(_))));
  }

  #[test]
  fn test_decode_diary_document() {
    let json = r#"{
      "days": [
        {
          "iso8061DateString": "2016-02-02T00:00:00Z",
          "type": "Normal",
          "fatigue": 5,
          "workouts": [
            {
              "activityString": "Bike",
              "activityTypeString": "Road",
              "equipmentName": "Road Bike",
              "km": 40.5,
              "seconds": 5400
            }
          ]
        },
        { "iso8061DateString": "2016-02-03T00:00:00Z" }
      ],
      "weights": [{ "iso8061DateString": "2016-02-02T00:00:00Z", "kg": 70.2, "fatPercent": 12.5 }]
    }"#;

    let diary = DiaryDocument::from_json_str(json).unwrap();
    assert_eq!(diary.days.len(), 2);
    assert!(diary.days[0].has_workouts());
    assert!(!diary.days[1].has_workouts());
    assert_eq!(diary.days[0].fields.get("fatigue"), Some(&Value::from(5)));

    let workout = &diary.days[0].workouts.as_ref().unwrap()[0];
    assert_eq!(workout.activity.as_deref(), Some("Bike"));
    assert_eq!(workout.equipment.as_deref(), Some("Road Bike"));
    assert_eq!(workout.fields.get("km"), Some(&Value::from(40.5)));
    assert!(!workout.fields.contains_key("activityString"));

    assert_eq!(diary.weights[0].fat_percent, Some(Value::from(12.5)));
    assert!(diary.physiologicals.is_empty());
  }

  #[test]
  fn test_mistyped_fields_do_not_reject_the_document() {
    let json = r#"{
      "days": [
        {
          "iso8061DateString": "2016-02-02T00:00:00Z",
          "workouts": [{ "activityString": 7, "activityTypeString": "Road", "equipmentName": null, "km": 5 }]
        }
      ],
      "weights": [{ "iso8061DateString": "2016-02-02T00:00:00Z", "kg": "70.2" }],
      "physiologicals": [{ "iso8061DateString": "2016-02-02T00:00:00Z", "restingHR": "slow" }]
    }"#;

    let diary = DiaryDocument::from_json_str(json).unwrap();
    let workout = &diary.days[0].workouts.as_ref().unwrap()[0];
    assert_eq!(workout.activity, None);
    assert_eq!(workout.activity_type.as_deref(), Some("Road"));
    assert_eq!(workout.equipment, None);
    assert!(!workout.fields.contains_key("activityString"));

    assert_eq!(diary.weights[0].kg, Some(Value::from("70.2")));
    assert_eq!(diary.physiologicals[0].resting_hr, Some(Value::from("slow")));
  }

  #[test]
  fn test_equipment_is_set() {
    let mut workout = WorkoutRecord {
      equipment: Some("Road Bike".to_string()),
      ..Default::default()
    };
    assert!(workout.equipment_is_set());

    workout.equipment = Some(NOT_SET.to_string());
    assert!(!workout.equipment_is_set());

    workout.equipment = Some(String::new());
    assert!(!workout.equipment_is_set());

    workout.equipment = None;
    assert!(!workout.equipment_is_set());
  }

  #[test]
  fn test_day_dates_skips_unparseable() {
    let diary = DiaryDocument {
      days: vec![
        DayEntry {
          date: "2016-02-02".to_string(),
          ..Default::default()
        },
        DayEntry {
          date: "not a date".to_string(),
          ..Default::default()
        },
      ],
      ..Default::default()
    };
    assert_eq!(diary.day_dates().len(), 1);
  }
}
