use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::models::diary::WorkoutRecord;

/// Sentinel for a dimension that a table does not distinguish
pub const ALL: &str = "All";

/// ---------------------------------------------------------------------------
/// Reporting Period
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
  Day,
  Week,
  Month,
}

impl Period {
  pub fn as_str(&self) -> &'static str {
    match self {
      Period::Day => "DAY",
      Period::Week => "WEEK",
      Period::Month => "MONTH",
    }
  }

  /// Column holding the period key that rollups group by
  pub fn group_column(&self) -> Option<&'static str> {
    match self {
      Period::Day => None,
      Period::Week => Some("iso_week"),
      Period::Month => Some("iso_month"),
    }
  }
}

impl std::fmt::Display for Period {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl std::str::FromStr for Period {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "day" => Ok(Self::Day),
      "week" => Ok(Self::Week),
      "month" => Ok(Self::Month),
      _ => Err(format!("Unknown period: {}", s)),
    }
  }
}

/// ---------------------------------------------------------------------------
/// Dimension Key
/// ---------------------------------------------------------------------------

/// (activity, activity type, equipment), each concrete or [`ALL`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DimensionKey {
  pub activity: String,
  pub activity_type: String,
  pub equipment: String,
}

impl DimensionKey {
  pub fn new(activity: &str, activity_type: &str, equipment: &str) -> Self {
    Self {
      activity: activity.to_string(),
      activity_type: activity_type.to_string(),
      equipment: equipment.to_string(),
    }
  }

  /// The fully collapsed key: All/All/All
  pub fn all() -> Self {
    Self::new(ALL, ALL, ALL)
  }

  /// Deterministic table name; spaces are stripped from the equipment name only
  pub fn table_name(&self, period: Period) -> String {
    format!(
      "{}_{}_{}_{}",
      period.as_str(),
      self.activity,
      self.activity_type,
      self.equipment.replace(' ', "")
    )
  }
}

/// ---------------------------------------------------------------------------
/// Projection Lattice
/// ---------------------------------------------------------------------------

/// Which dimensions a projection keeps; the rest collapse to [`ALL`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
  pub activity: bool,
  pub activity_type: bool,
  pub equipment: bool,
}

impl Projection {
  pub const fn new(activity: bool, activity_type: bool, equipment: bool) -> Self {
    Self {
      activity,
      activity_type,
      equipment,
    }
  }

  /// Key of `workout` under this projection.
  ///
  /// Returns the name of the first required dimension the workout lacks.
  pub fn key_for(&self, workout: &WorkoutRecord) -> Result<DimensionKey, &'static str> {
    let activity = if self.activity {
      required(workout.activity.as_deref(), "activity")?
    } else {
      ALL
    };
    let activity_type = if self.activity_type {
      required(workout.activity_type.as_deref(), "activity type")?
    } else {
      ALL
    };
    let equipment = if self.equipment {
      required(workout.equipment.as_deref(), "equipment")?
    } else {
      ALL
    };
    Ok(DimensionKey::new(activity, activity_type, equipment))
  }

  pub fn label(&self) -> String {
    let mut parts = Vec::new();
    if self.activity {
      parts.push("activity");
    }
    if self.activity_type {
      parts.push("activity_type");
    }
    if self.equipment {
      parts.push("equipment");
    }
    if parts.is_empty() {
      "all".to_string()
    } else {
      parts.join("+")
    }
  }
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str, &'static str> {
  match value {
    Some(v) if !v.is_empty() => Ok(v),
    _ => Err(name),
  }
}

/// Full key, the three pairwise marginals, the three single marginals, and
/// the fully collapsed key.
pub const PROJECTION_LATTICE: [Projection; 8] = [
  Projection::new(true, true, true),
  Projection::new(false, true, true),
  Projection::new(true, false, true),
  Projection::new(true, true, false),
  Projection::new(false, false, true),
  Projection::new(true, false, false),
  Projection::new(false, true, false),
  Projection::new(false, false, false),
];

/// ---------------------------------------------------------------------------
/// Catalog Entry
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
  pub period: Period,
  pub key: DimensionKey,
  pub table_name: String,
}

/// ---------------------------------------------------------------------------
/// Date Partition Columns
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatePartition {
  pub date: NaiveDate,
  /// ISO year-week, e.g. "2016-W05"
  pub iso_week: String,
  /// "2016-02"
  pub iso_month: String,
  pub day_of_week: String,
  /// "Weekday" or "Weekend"
  pub day_type: String,
}

impl DatePartition {
  pub fn from_date(date: NaiveDate) -> Self {
    let week = date.iso_week();
    let day_type = match date.weekday() {
      Weekday::Sat | Weekday::Sun => "Weekend",
      _ => "Weekday",
    };
    Self {
      date,
      iso_week: format!("{}-W{:02}", week.year(), week.week()),
      iso_month: date.format("%Y-%m").to_string(),
      day_of_week: date.format("%A").to_string(),
      day_type: day_type.to_string(),
    }
  }
}
