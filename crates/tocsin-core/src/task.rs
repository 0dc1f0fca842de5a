use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::datetime::due_date_serde;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn label(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "l" => Ok(Priority::Low),
            "medium" | "med" | "m" => Ok(Priority::Medium),
            "high" | "h" => Ok(Priority::High),
            other => Err(anyhow::anyhow!(
                "invalid priority: {other} (expected low, medium, or high)"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,

    pub text: String,

    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default, with = "due_date_serde")]
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub notes: String,

    /// Set once the one-time "due tomorrow" alert has been delivered (or
    /// judged already past) for the current due date. Cleared when the due
    /// date changes or the task goes from completed back to active.
    #[serde(default)]
    pub due_reminder_sent: bool,
}

impl Task {
    pub fn new(id: u64, draft: TaskDraft) -> Self {
        Self {
            id,
            text: draft.text,
            completed: false,
            priority: draft.priority,
            due_date: draft.due_date,
            notes: draft.notes,
            due_reminder_sent: false,
        }
    }
}

/// Field set for a task about to be created; text is already trimmed and
/// the due date already canonical by the time a draft reaches the store.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub text: String,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub notes: String,
}

/// Partial update applied by the edit operation. `None` leaves a field
/// untouched; `due_date: Some(None)` clears the due date.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub text: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<Option<NaiveDate>>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::Priority;

    #[test]
    fn priority_parses_case_insensitive_aliases() {
        assert_eq!("HIGH".parse::<Priority>().expect("parse"), Priority::High);
        assert_eq!("m".parse::<Priority>().expect("parse"), Priority::Medium);
        assert_eq!("Low".parse::<Priority>().expect("parse"), Priority::Low);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn priority_serializes_lowercase() {
        let json = serde_json::to_string(&Priority::High).expect("serialize");
        assert_eq!(json, "\"high\"");
    }
}
