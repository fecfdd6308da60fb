use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datetime::{self, iso_timestamp};
use crate::error::{GarageError, PROGRESS_INVALID};

const ID_PREFIX: &str = "t_";
const ID_LEN: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// `t_` followed by seven base-36 characters.
    pub fn generate() -> Self {
        let mut value = Uuid::new_v4().as_u128();
        let mut suffix = String::with_capacity(ID_LEN);
        for _ in 0..ID_LEN {
            let digit = (value % 36) as u32;
            value /= 36;
            suffix.push(char::from_digit(digit, 36).unwrap_or('0'));
        }
        Self(format!("{ID_PREFIX}{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored as a lowercase string. Values outside the three known levels are
/// kept verbatim and rank after `Low`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
    Unranked(String),
}

impl Priority {
    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
            Self::Unranked(_) => 99,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Unranked(raw) => raw,
        }
    }

    /// Capitalised badge text, e.g. `High`.
    pub fn label(&self) -> String {
        let raw = self.as_str();
        let mut chars = raw.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl From<String> for Priority {
    fn from(value: String) -> Self {
        match value.as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Unranked(value),
        }
    }
}

impl From<Priority> for String {
    fn from(value: Priority) -> Self {
        match value {
            Priority::Unranked(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

impl FromStr for Priority {
    type Err = GarageError;

    /// User input: empty means medium, anything else must be a known level.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "low" => Ok(Self::Low),
            other => Err(GarageError::validation(
                "priority",
                format!("Priority must be high, medium, or low (got `{other}`)."),
            )),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,

    pub title: String,

    #[serde(default)]
    pub notes: String,

    #[serde(default)]
    pub due: Option<NaiveDate>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub progress: u8,

    #[serde(default)]
    pub completed: bool,

    #[serde(with = "iso_timestamp")]
    pub created_at: DateTime<Utc>,

    #[serde(default, with = "iso_timestamp::option")]
    pub last_notified: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(input: TaskInput, progress: u8, now: DateTime<Utc>) -> Self {
        Self {
            id: TaskId::generate(),
            title: input.title.trim().to_string(),
            notes: input.notes.trim().to_string(),
            due: input.due,
            priority: input.priority,
            progress,
            completed: false,
            created_at: now,
            last_notified: None,
        }
    }

    /// Completed tasks count as fully done regardless of stored progress.
    pub fn effective_progress(&self) -> u8 {
        if self.completed { 100 } else { self.progress }
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.completed && self.due.map(|due| due < today).unwrap_or(false)
    }

    pub fn due_iso(&self) -> Option<String> {
        self.due.map(datetime::format_due_iso)
    }
}

/// Typed field values for create and update. Progress is signed so that
/// negative input reaches validation instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaskInput {
    pub title: String,
    pub notes: String,
    pub due: Option<NaiveDate>,
    pub priority: Priority,
    pub progress: i64,
}

impl TaskInput {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Raw text of the creation form or the edit dialog, before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub notes: String,
    pub due: String,
    pub priority: String,
    pub progress: String,
}

impl Default for TaskDraft {
    fn default() -> Self {
        Self {
            title: String::new(),
            notes: String::new(),
            due: String::new(),
            priority: "medium".to_string(),
            progress: "0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    Title,
    Notes,
    Due,
    Priority,
    Progress,
}

impl FromStr for DraftField {
    type Err = GarageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "title" => Ok(Self::Title),
            "notes" => Ok(Self::Notes),
            "due" => Ok(Self::Due),
            "priority" => Ok(Self::Priority),
            "progress" => Ok(Self::Progress),
            other => Err(GarageError::validation(
                "field",
                format!("unknown field `{other}`"),
            )),
        }
    }
}

impl TaskDraft {
    pub fn from_task(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            notes: task.notes.clone(),
            due: task.due_iso().unwrap_or_default(),
            priority: task.priority.as_str().to_string(),
            progress: task.progress.to_string(),
        }
    }

    pub fn set(&mut self, field: DraftField, value: impl Into<String>) {
        let value = value.into();
        match field {
            DraftField::Title => self.title = value,
            DraftField::Notes => self.notes = value,
            DraftField::Due => self.due = value,
            DraftField::Priority => self.priority = value,
            DraftField::Progress => self.progress = value,
        }
    }

    /// Parses the text fields. Title emptiness and the progress range are
    /// checked by the store so both entry points share one rule.
    pub fn parse(&self) -> Result<TaskInput, GarageError> {
        let due = match self.due.trim() {
            "" => None,
            raw => Some(datetime::parse_due_date(raw).ok_or_else(|| {
                GarageError::validation("due", "Due date must be formatted as YYYY-MM-DD.")
            })?),
        };

        let priority = self.priority.parse::<Priority>()?;

        let progress = leading_integer(&self.progress)
            .ok_or_else(|| GarageError::validation("progress", PROGRESS_INVALID))?;

        Ok(TaskInput {
            title: self.title.clone(),
            notes: self.notes.trim().to_string(),
            due,
            priority,
            progress,
        })
    }
}

/// Reads an optionally signed run of digits at the start of `raw`, so
/// `"40.5"` and `" 50%"` yield 40 and 50. `None` when no digit leads.
fn leading_integer(raw: &str) -> Option<i64> {
    let text = raw.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let mut seen = false;
    let mut value: i64 = 0;
    for digit in digits.chars().map_while(|c| c.to_digit(10)) {
        seen = true;
        value = value.saturating_mul(10).saturating_add(i64::from(digit));
    }

    seen.then_some(if negative { -value } else { value })
}
