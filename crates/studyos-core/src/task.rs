//! Tasks and lab reports.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(ValidationError::InvalidValue {
                field: "task_status",
                message: format!("unknown status '{other}'"),
            }),
        }
    }

    /// Completed and cancelled tasks never participate in placement.
    pub fn is_open(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Study,
    Revision,
    Practice,
    Assignment,
    LabWork,
    Break,
    FreeTime,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Study => "study",
            TaskType::Revision => "revision",
            TaskType::Practice => "practice",
            TaskType::Assignment => "assignment",
            TaskType::LabWork => "lab_work",
            TaskType::Break => "break",
            TaskType::FreeTime => "free_time",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "study" => Ok(TaskType::Study),
            "revision" => Ok(TaskType::Revision),
            "practice" => Ok(TaskType::Practice),
            "assignment" => Ok(TaskType::Assignment),
            "lab_work" => Ok(TaskType::LabWork),
            "break" => Ok(TaskType::Break),
            "free_time" => Ok(TaskType::FreeTime),
            other => Err(ValidationError::InvalidValue {
                field: "task_type",
                message: format!("unknown type '{other}'"),
            }),
        }
    }
}

/// A schedulable unit of work.
///
/// `scheduled_start`/`scheduled_end` stay empty until the placer (or an
/// explicit `place` call) assigns a slot; once placed,
/// `scheduled_end - scheduled_start` always equals `duration_mins`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub subject_code: Option<String>,
    /// 1-10, user-facing importance.
    pub priority: u8,
    pub duration_mins: u16,
    pub scheduled_start: Option<NaiveDateTime>,
    pub scheduled_end: Option<NaiveDateTime>,
    /// Hard finish-by timestamp, if any.
    pub deadline: Option<NaiveDateTime>,
    pub status: TaskStatus,
    pub is_deep_work: bool,
    pub task_type: TaskType,
    /// Where the placer synthesized this task from (`revision:<id>`,
    /// `lab:<id>`, `exam:<subject>`); `None` for user-created tasks. Keeps
    /// repeated optimizer runs from materializing the same work twice.
    pub origin: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Task {
    /// Calendar date this task is placed on, if placed.
    pub fn scheduled_date(&self) -> Option<NaiveDate> {
        self.scheduled_start.map(|dt| dt.date())
    }
}

/// Input for creating a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub subject_code: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: u8,
    pub duration_mins: u16,
    #[serde(default)]
    pub deadline: Option<NaiveDateTime>,
    #[serde(default = "default_task_type")]
    pub task_type: TaskType,
    #[serde(default)]
    pub is_deep_work: bool,
}

fn default_priority() -> u8 {
    5
}
fn default_task_type() -> TaskType {
    TaskType::Study
}

impl NewTask {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "title",
                message: "must not be empty".to_string(),
            });
        }
        if self.duration_mins == 0 {
            return Err(ValidationError::InvalidValue {
                field: "duration_mins",
                message: "must be positive".to_string(),
            });
        }
        if !(1..=10).contains(&self.priority) {
            return Err(ValidationError::InvalidValue {
                field: "priority",
                message: format!("{} not in 1..=10", self.priority),
            });
        }
        if let Some(code) = &self.subject_code {
            crate::subject::validate_subject_code(code)?;
        }
        Ok(())
    }
}

/// Partial update for a task; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub priority: Option<u8>,
    pub duration_mins: Option<u16>,
    pub deadline: Option<Option<NaiveDateTime>>,
    pub status: Option<TaskStatus>,
    pub task_type: Option<TaskType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabStatus {
    Pending,
    InProgress,
    DraftComplete,
    Submitted,
}

impl LabStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabStatus::Pending => "pending",
            LabStatus::InProgress => "in_progress",
            LabStatus::DraftComplete => "draft_complete",
            LabStatus::Submitted => "submitted",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "pending" => Ok(LabStatus::Pending),
            "in_progress" => Ok(LabStatus::InProgress),
            "draft_complete" => Ok(LabStatus::DraftComplete),
            "submitted" => Ok(LabStatus::Submitted),
            other => Err(ValidationError::InvalidValue {
                field: "lab_status",
                message: format!("unknown status '{other}'"),
            }),
        }
    }
}

/// How soon a lab report needs attention, derived from days left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Overdue,
    Urgent,
    Soon,
    Normal,
}

impl Urgency {
    /// Classify by days remaining until the due date.
    pub fn from_days_left(days: i64) -> Self {
        if days < 0 {
            Urgency::Overdue
        } else if days <= 1 {
            Urgency::Urgent
        } else if days <= 3 {
            Urgency::Soon
        } else {
            Urgency::Normal
        }
    }
}

/// A tracked lab report with a calendar due date and a hard deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabReport {
    pub id: i64,
    pub subject_code: String,
    pub title: String,
    pub due_date: NaiveDate,
    pub deadline: NaiveDateTime,
    pub status: LabStatus,
    pub created_at: NaiveDateTime,
}

impl LabReport {
    pub fn urgency(&self, today: NaiveDate) -> Urgency {
        Urgency::from_days_left((self.due_date - today).num_days())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_validation() {
        let task = NewTask {
            title: "Read chapter".to_string(),
            subject_code: Some("MATH101".to_string()),
            priority: 5,
            duration_mins: 60,
            deadline: None,
            task_type: TaskType::Study,
            is_deep_work: false,
        };
        assert!(task.validate().is_ok());

        let mut bad = task.clone();
        bad.duration_mins = 0;
        assert!(bad.validate().is_err());

        let mut bad = task.clone();
        bad.priority = 11;
        assert!(bad.validate().is_err());

        let mut bad = task;
        bad.subject_code = Some("bad".to_string());
        assert!(bad.validate().is_err());
    }

    #[test]
    fn urgency_ladder() {
        assert_eq!(Urgency::from_days_left(-1), Urgency::Overdue);
        assert_eq!(Urgency::from_days_left(0), Urgency::Urgent);
        assert_eq!(Urgency::from_days_left(1), Urgency::Urgent);
        assert_eq!(Urgency::from_days_left(2), Urgency::Soon);
        assert_eq!(Urgency::from_days_left(3), Urgency::Soon);
        assert_eq!(Urgency::from_days_left(4), Urgency::Normal);
    }
}
