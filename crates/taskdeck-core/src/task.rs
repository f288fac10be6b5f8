use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::git_status::GitStatus;

/// Fields the generic field editor must never write.
pub const READONLY_FIELDS: &[&str] = &["id", "createdAt", "updatedAt", "gitStatus", "status"];

/// Fields holding store-assigned timestamps.
pub const DATE_FIELDS: &[&str] = &["createdAt", "updatedAt"];

pub fn is_read_only_field(name: &str) -> bool {
    READONLY_FIELDS.contains(&name)
}

pub fn is_date_field(name: &str) -> bool {
    DATE_FIELDS.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("field {0} is read-only")]
    ReadOnly(String),
    #[error("field {0} cannot be edited")]
    NotEditable(String),
    #[error("field {field} expects a number, got {value:?}")]
    InvalidNumber { field: String, value: String },
}

/// Opaque store-assigned identifier. Accepts JSON strings and numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawId", into = "String")]
pub struct TaskId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl From<RawId> for TaskId {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(text) => Self(text),
            RawId::Number(number) => Self(number.to_string()),
        }
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().to_string()))
    }
}

/// Board column a task belongs to. Anything the store sends outside the
/// fixed set is kept verbatim in `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Open,
    InProgress,
    Done,
    Unknown(String),
}

impl TaskStatus {
    /// Column order of the board.
    pub const COLUMNS: [TaskStatus; 3] = [TaskStatus::Open, TaskStatus::InProgress, TaskStatus::Done];

    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Unknown(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, TaskStatus::Unknown(_))
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Unknown(String::new())
    }
}

impl From<String> for TaskStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "open" => TaskStatus::Open,
            "in_progress" => TaskStatus::InProgress,
            "done" => TaskStatus::Done,
            _ => TaskStatus::Unknown(raw),
        }
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TaskId>,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub tags: String,

    #[serde(default, with = "hours_serde")]
    pub pending: f64,

    #[serde(default, with = "hours_serde")]
    pub estimation: f64,

    #[serde(default)]
    pub status: TaskStatus,

    #[serde(default)]
    pub git_status: GitStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for Task {
    fn default() -> Self {
        Self::draft()
    }
}

impl Task {
    /// A new task as sent to the store for creation; the store assigns the id
    /// and timestamps.
    pub fn draft() -> Self {
        Self {
            id: None,
            title: "New task".to_string(),
            tags: String::new(),
            pending: 1.0,
            estimation: 1.0,
            status: TaskStatus::Open,
            git_status: GitStatus::Added,
            created_at: None,
            updated_at: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn has_id(&self, id: &TaskId) -> bool {
        self.id.as_ref() == Some(id)
    }

    /// Every field present on the record, sorted by key.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = ["title", "tags", "pending", "estimation", "status", "gitStatus"]
            .iter()
            .map(|name| name.to_string())
            .collect();
        if self.id.is_some() {
            names.push("id".to_string());
        }
        if self.created_at.is_some() {
            names.push("createdAt".to_string());
        }
        if self.updated_at.is_some() {
            names.push("updatedAt".to_string());
        }
        names.extend(self.extra.keys().cloned());
        names.sort();
        names.dedup();
        names
    }

    /// Reads any field as display text.
    pub fn field_value(&self, name: &str) -> Option<String> {
        match name {
            "id" => self.id.as_ref().map(ToString::to_string),
            "title" => Some(self.title.clone()),
            "tags" => Some(self.tags.clone()),
            "pending" => Some(format_hours(self.pending)),
            "estimation" => Some(format_hours(self.estimation)),
            "status" => Some(self.status.to_string()),
            "gitStatus" => Some(self.git_status.code().to_string()),
            "createdAt" => self.created_at.map(|at| at.to_rfc3339()),
            "updatedAt" => self.updated_at.map(|at| at.to_rfc3339()),
            other => self.extra.get(other).map(|value| match value {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            }),
        }
    }

    /// The generic field editor write path.
    pub fn set_field(&mut self, name: &str, value: &str) -> Result<(), FieldError> {
        if is_read_only_field(name) {
            return Err(FieldError::ReadOnly(name.to_string()));
        }

        match name {
            "title" => self.title = value.to_string(),
            "tags" => self.tags = value.to_string(),
            "pending" => self.pending = parse_hours(name, value)?,
            "estimation" => self.estimation = parse_hours(name, value)?,
            other => {
                self.extra
                    .insert(other.to_string(), serde_json::Value::String(value.to_string()));
            }
        }
        Ok(())
    }
}

pub fn format_hours(hours: f64) -> String {
    if hours.fract() == 0.0 && hours.abs() < 1e15 {
        format!("{}", hours as i64)
    } else {
        hours.to_string()
    }
}

fn parse_hours(field: &str, value: &str) -> Result<f64, FieldError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|hours| hours.is_finite())
        .ok_or_else(|| FieldError::InvalidNumber {
            field: field.to_string(),
            value: value.to_string(),
        })
}

/// Hours arrive as JSON numbers or as numeric strings, depending on how the
/// field was last written.
pub mod hours_serde {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawHours {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S>(hours: &f64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(*hours)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawHours::deserialize(deserializer)? {
            RawHours::Number(hours) => Ok(hours),
            RawHours::Text(text) if text.trim().is_empty() => Ok(0.0),
            RawHours::Text(text) => text
                .trim()
                .parse::<f64>()
                .map_err(|err| D::Error::custom(format!("invalid hours {text:?}: {err}"))),
        }
    }
}
