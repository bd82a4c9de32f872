//! Notification types, delivery preferences, and quiet-hours arithmetic.

pub mod engine;

pub use engine::NotificationEngine;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::clock::{minute_of, parse_hhmm};
use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Reminder,
    Achievement,
    Suggestion,
    Warning,
    Deadline,
    Break,
    Motivation,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Reminder => "reminder",
            NotificationKind::Achievement => "achievement",
            NotificationKind::Suggestion => "suggestion",
            NotificationKind::Warning => "warning",
            NotificationKind::Deadline => "deadline",
            NotificationKind::Break => "break",
            NotificationKind::Motivation => "motivation",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "reminder" => Ok(NotificationKind::Reminder),
            "achievement" => Ok(NotificationKind::Achievement),
            "suggestion" => Ok(NotificationKind::Suggestion),
            "warning" => Ok(NotificationKind::Warning),
            "deadline" => Ok(NotificationKind::Deadline),
            "break" => Ok(NotificationKind::Break),
            "motivation" => Ok(NotificationKind::Motivation),
            other => Err(ValidationError::InvalidValue {
                field: "notification_kind",
                message: format!("unknown kind '{other}'"),
            }),
        }
    }

    pub const ALL: [NotificationKind; 7] = [
        NotificationKind::Reminder,
        NotificationKind::Achievement,
        NotificationKind::Suggestion,
        NotificationKind::Warning,
        NotificationKind::Deadline,
        NotificationKind::Break,
        NotificationKind::Motivation,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationPriority::Low => "low",
            NotificationPriority::Normal => "normal",
            NotificationPriority::High => "high",
            NotificationPriority::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "low" => Ok(NotificationPriority::Low),
            "normal" => Ok(NotificationPriority::Normal),
            "high" => Ok(NotificationPriority::High),
            "urgent" => Ok(NotificationPriority::Urgent),
            other => Err(ValidationError::InvalidValue {
                field: "notification_priority",
                message: format!("unknown priority '{other}'"),
            }),
        }
    }
}

/// A delivered or scheduled notification.
///
/// Timestamp ordering holds whenever both sides are set:
/// `created_at <= scheduled_for <= sent_at <= read_at <= dismissed_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub kind: NotificationKind,
    pub priority: NotificationPriority,
    pub title: String,
    pub message: String,
    pub created_at: NaiveDateTime,
    pub scheduled_for: NaiveDateTime,
    pub sent_at: Option<NaiveDateTime>,
    pub read_at: Option<NaiveDateTime>,
    pub dismissed_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
    pub action_url: Option<String>,
    pub action_label: Option<String>,
    pub action_data: Option<serde_json::Value>,
    pub dedup_key: Option<String>,
}

/// Input for creating a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub priority: NotificationPriority,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub expires_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub action_url: Option<String>,
    #[serde(default)]
    pub action_label: Option<String>,
    #[serde(default)]
    pub action_data: Option<serde_json::Value>,
    /// Suppresses duplicates: an undismissed notification with the same key
    /// blocks re-creation.
    #[serde(default)]
    pub dedup_key: Option<String>,
}

impl NewNotification {
    pub fn new(
        kind: NotificationKind,
        priority: NotificationPriority,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            priority,
            title: title.into(),
            message: message.into(),
            expires_at: None,
            action_url: None,
            action_label: None,
            action_data: None,
            dedup_key: None,
        }
    }

    pub fn dedup(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    pub fn expires(mut self, at: NaiveDateTime) -> Self {
        self.expires_at = Some(at);
        self
    }
}

/// Per-kind delivery preference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub kind: NotificationKind,
    pub enabled: bool,
    /// Quiet window start, HH:MM wall clock.
    pub quiet_hours_start: Option<String>,
    /// Quiet window end, HH:MM wall clock. The window may wrap midnight.
    pub quiet_hours_end: Option<String>,
    /// Max notifications of this kind delivered per rolling hour.
    pub frequency_limit: Option<u32>,
    pub channels: Vec<String>,
}

impl NotificationPreference {
    pub fn allow_all(kind: NotificationKind) -> Self {
        Self {
            kind,
            enabled: true,
            quiet_hours_start: None,
            quiet_hours_end: None,
            frequency_limit: None,
            channels: Vec::new(),
        }
    }

    /// Is `now` inside the quiet window `[start, end)`?
    pub fn in_quiet_hours(&self, now: NaiveDateTime) -> Result<bool, ValidationError> {
        let (Some(start), Some(end)) = (&self.quiet_hours_start, &self.quiet_hours_end) else {
            return Ok(false);
        };
        let start = parse_hhmm(start)?;
        let end = parse_hhmm(end)?;
        let minute = minute_of(now.time());
        Ok(if start <= end {
            (start..end).contains(&minute)
        } else {
            // Overnight window, e.g. 22:00-07:00.
            minute >= start || minute < end
        })
    }

    /// First instant at or after `now` outside the quiet window.
    pub fn next_allowed(&self, now: NaiveDateTime) -> Result<NaiveDateTime, ValidationError> {
        if !self.in_quiet_hours(now)? {
            return Ok(now);
        }
        let end = self
            .quiet_hours_end
            .as_deref()
            .map(parse_hhmm)
            .transpose()?
            .unwrap_or(0);
        let mut candidate = crate::clock::at_minute(now.date(), end);
        if candidate <= now {
            candidate += Duration::days(1);
        }
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn pref(start: &str, end: &str) -> NotificationPreference {
        NotificationPreference {
            kind: NotificationKind::Reminder,
            enabled: true,
            quiet_hours_start: Some(start.to_string()),
            quiet_hours_end: Some(end.to_string()),
            frequency_limit: None,
            channels: Vec::new(),
        }
    }

    #[test]
    fn overnight_quiet_window() {
        let pref = pref("22:00", "07:00");
        assert!(pref.in_quiet_hours(at(22, 30)).unwrap());
        assert!(pref.in_quiet_hours(at(2, 0)).unwrap());
        assert!(pref.in_quiet_hours(at(6, 59)).unwrap());
        assert!(!pref.in_quiet_hours(at(7, 0)).unwrap());
        assert!(!pref.in_quiet_hours(at(12, 0)).unwrap());
        assert!(!pref.in_quiet_hours(at(21, 59)).unwrap());
    }

    #[test]
    fn same_day_quiet_window() {
        let pref = pref("12:00", "14:00");
        assert!(pref.in_quiet_hours(at(12, 0)).unwrap());
        assert!(pref.in_quiet_hours(at(13, 59)).unwrap());
        assert!(!pref.in_quiet_hours(at(14, 0)).unwrap());
        assert!(!pref.in_quiet_hours(at(11, 59)).unwrap());
    }

    #[test]
    fn next_allowed_defers_to_window_end() {
        let pref = pref("22:00", "07:00");
        // 22:30 -> 07:00 the next day.
        assert_eq!(
            pref.next_allowed(at(22, 30)).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 4)
                .unwrap()
                .and_hms_opt(7, 0, 0)
                .unwrap()
        );
        // 02:00 -> 07:00 the same day.
        assert_eq!(pref.next_allowed(at(2, 0)).unwrap(), at(7, 0));
        // Outside quiet hours nothing moves.
        assert_eq!(pref.next_allowed(at(12, 0)).unwrap(), at(12, 0));
    }

    #[test]
    fn no_window_means_never_quiet() {
        let pref = NotificationPreference::allow_all(NotificationKind::Reminder);
        assert!(!pref.in_quiet_hours(at(3, 0)).unwrap());
        assert_eq!(pref.next_allowed(at(3, 0)).unwrap(), at(3, 0));
    }
}
