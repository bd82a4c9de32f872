//! Study sessions, per-session effectiveness, and daily rollups.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::energy::TimeOfDay;

/// Seconds of continuous study that qualify a session as deep work.
pub const DEEP_WORK_SECONDS: i64 = 5400;

/// Seconds of study required before a session counts toward the streak.
pub const STREAK_MIN_SECONDS: i64 = 1800;

/// Cap on points earned from a single session.
pub const SESSION_POINTS_CAP: i64 = 50;

/// Points accrue one per ten minutes, capped.
pub fn session_points(duration_seconds: i64) -> i64 {
    (duration_seconds / 600).min(SESSION_POINTS_CAP)
}

/// A timed study session. At most one session is open (`stopped_at` empty)
/// at any time; the active-timer register points at it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudySession {
    pub id: i64,
    pub subject_code: Option<String>,
    pub chapter_id: Option<i64>,
    pub title: Option<String>,
    pub started_at: NaiveDateTime,
    pub stopped_at: Option<NaiveDateTime>,
    pub duration_seconds: Option<i64>,
    pub is_deep_work: bool,
    pub points_earned: i64,
}

impl StudySession {
    pub fn is_active(&self) -> bool {
        self.stopped_at.is_none()
    }
}

/// Live view of the running timer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerStatus {
    pub session: StudySession,
    pub elapsed_seconds: i64,
    /// Whether the session would already count as deep work if stopped now.
    pub deep_work_reached: bool,
}

/// Effectiveness record appended when a session stops; the pattern analyzer
/// consumes these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEffectiveness {
    pub session_id: i64,
    pub subject_code: Option<String>,
    pub time_of_day: TimeOfDay,
    /// Monday = 0 .. Sunday = 6.
    pub day_of_week: u8,
    pub duration_mins: u32,
    /// 0.0-1.0.
    pub focus_score: f64,
    pub energy_level: Option<u8>,
    pub material_covered: Option<String>,
}

impl SessionEffectiveness {
    /// Default focus heuristic when no explicit score was captured: deep
    /// work reads as high focus, medium-length sessions as decent.
    pub fn default_focus(duration_seconds: i64, is_deep_work: bool) -> f64 {
        if is_deep_work {
            0.85
        } else if duration_seconds >= 2700 {
            0.7
        } else {
            0.6
        }
    }

    pub fn derive(
        session: &StudySession,
        duration_seconds: i64,
        energy_level: Option<u8>,
    ) -> Self {
        use chrono::Timelike;
        Self {
            session_id: session.id,
            subject_code: session.subject_code.clone(),
            time_of_day: TimeOfDay::from_hour(session.started_at.hour() as u8),
            day_of_week: session.started_at.date().weekday().num_days_from_monday() as u8,
            duration_mins: (duration_seconds / 60).max(0) as u32,
            focus_score: Self::default_focus(duration_seconds, session.is_deep_work),
            energy_level,
            material_covered: session.title.clone(),
        }
    }
}

/// Per-calendar-date aggregate of study activity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: Option<NaiveDate>,
    pub study_seconds: i64,
    pub deep_work_seconds: i64,
    pub session_count: u32,
    pub points: i64,
}
