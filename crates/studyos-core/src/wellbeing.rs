//! Daily wellbeing scoring, break management, and the pomodoro register.
//!
//! The wellbeing score estimates how sustainable today's study load is:
//! 0.5 baseline, rewarded for a moderate study volume and taken breaks,
//! penalized for overwork and an overdue backlog.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::store::Store;

/// Hours of study per day considered balanced.
const BALANCED_HOURS: (f64, f64) = (4.0, 8.0);

/// Above this many hours the monitor tells the student to stop.
const STOP_STUDY_HOURS: f64 = 10.0;

/// Score below which the state counts as urgent.
const URGENT_SCORE: f64 = 0.4;

/// Wellbeing score for one day's raw indicators.
///
/// `0.5` base; a balanced study day adds `0.2`, a light one adds `0.05/h`,
/// overshoot costs `0.1` per hour past eight; each completed break adds
/// `0.05` up to `0.2`; each overdue task costs `0.05`. Clamped to `[0, 1]`.
pub fn wellbeing_score(study_hours: f64, break_count: u32, overdue_tasks: u32) -> f64 {
    let study_factor = if (BALANCED_HOURS.0..=BALANCED_HOURS.1).contains(&study_hours) {
        0.2
    } else if study_hours > BALANCED_HOURS.1 {
        -0.1 * (study_hours - BALANCED_HOURS.1)
    } else {
        0.05 * study_hours
    };
    let break_factor = (0.05 * break_count as f64).min(0.2);
    let overdue_factor = -0.05 * overdue_tasks as f64;
    (0.5 + study_factor + break_factor + overdue_factor).clamp(0.0, 1.0)
}

/// Coarse stress classification of a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressLevel {
    Low,
    Moderate,
    High,
}

impl StressLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            StressLevel::Low
        } else if score >= 0.4 {
            StressLevel::Moderate
        } else {
            StressLevel::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StressLevel::Low => "low",
            StressLevel::Moderate => "moderate",
            StressLevel::High => "high",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "low" => Ok(StressLevel::Low),
            "moderate" => Ok(StressLevel::Moderate),
            "high" => Ok(StressLevel::High),
            other => Err(ValidationError::InvalidValue {
                field: "stress_level",
                message: format!("unknown level '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationPriority {
    Low,
    Medium,
    High,
    Urgent,
}

/// One actionable wellbeing recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WellbeingRecommendation {
    pub priority: RecommendationPriority,
    pub action: String,
    pub reason: String,
}

/// Daily wellbeing snapshot, persisted once per date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WellbeingMetric {
    pub date: NaiveDate,
    pub study_hours: f64,
    pub break_count: u32,
    pub overdue_tasks: u32,
    pub deep_work_sessions: u32,
    pub score: f64,
    pub stress_level: StressLevel,
    pub recommendations: Vec<WellbeingRecommendation>,
}

/// Computes and persists the daily wellbeing snapshot. Idempotent: running
/// it again for the same date overwrites the row with fresh numbers.
pub struct WellbeingMonitor<'a> {
    store: &'a Store,
}

impl<'a> WellbeingMonitor<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Score `date` as of `now` and persist the snapshot.
    pub fn evaluate(&self, date: NaiveDate, now: NaiveDateTime) -> Result<WellbeingMetric> {
        let daily = self.store.daily_stats(date)?;
        let study_hours = daily.study_seconds as f64 / 3600.0;
        let (break_count, _break_mins, skipped_breaks) = self.store.break_stats(date)?;
        let overdue = self.store.overdue_open_tasks(now)?.len() as u32;
        let deep_work = self.store.deep_work_session_count(date)?;

        let score = wellbeing_score(study_hours, break_count, overdue);
        let recommendations =
            recommendations_for(score, study_hours, overdue, skipped_breaks);

        let metric = WellbeingMetric {
            date,
            study_hours,
            break_count,
            overdue_tasks: overdue,
            deep_work_sessions: deep_work,
            score,
            stress_level: StressLevel::from_score(score),
            recommendations,
        };
        self.store.upsert_wellbeing(&metric)?;
        Ok(metric)
    }
}

/// Recommendation rules, in severity order.
fn recommendations_for(
    score: f64,
    study_hours: f64,
    overdue: u32,
    skipped_breaks: u32,
) -> Vec<WellbeingRecommendation> {
    let mut recs = Vec::new();
    if score < URGENT_SCORE {
        recs.push(WellbeingRecommendation {
            priority: RecommendationPriority::Urgent,
            action: "Take a 30-minute break".to_string(),
            reason: "Your wellbeing score is critically low; rest now to prevent burnout."
                .to_string(),
        });
    }
    if study_hours > STOP_STUDY_HOURS {
        recs.push(WellbeingRecommendation {
            priority: RecommendationPriority::High,
            action: "Consider stopping for today".to_string(),
            reason: format!(
                "You have studied {study_hours:.1} hours today; rest improves retention."
            ),
        });
    }
    if overdue > 0 {
        recs.push(WellbeingRecommendation {
            priority: RecommendationPriority::High,
            action: "Focus on overdue work first".to_string(),
            reason: format!("{overdue} overdue tasks are adding pressure; clear the oldest."),
        });
    }
    if skipped_breaks > 0 {
        recs.push(WellbeingRecommendation {
            priority: RecommendationPriority::Medium,
            action: "Don't skip your next break".to_string(),
            reason: format!("You skipped {skipped_breaks} breaks today; breaks keep focus sharp."),
        });
    }
    recs
}

// ── Breaks ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakType {
    Short,
    Pomodoro,
    Meal,
    Exercise,
    Meditation,
    Walk,
    Long,
}

impl BreakType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakType::Short => "short",
            BreakType::Pomodoro => "pomodoro",
            BreakType::Meal => "meal",
            BreakType::Exercise => "exercise",
            BreakType::Meditation => "meditation",
            BreakType::Walk => "walk",
            BreakType::Long => "long",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "short" => Ok(BreakType::Short),
            "pomodoro" => Ok(BreakType::Pomodoro),
            "meal" => Ok(BreakType::Meal),
            "exercise" => Ok(BreakType::Exercise),
            "meditation" => Ok(BreakType::Meditation),
            "walk" => Ok(BreakType::Walk),
            "long" => Ok(BreakType::Long),
            other => Err(ValidationError::InvalidValue {
                field: "break_type",
                message: format!("unknown type '{other}'"),
            }),
        }
    }

    /// Suggested duration range in minutes.
    pub fn duration_range(&self) -> (u16, u16) {
        match self {
            BreakType::Short => (5, 10),
            BreakType::Pomodoro => (5, 5),
            BreakType::Meal => (30, 60),
            BreakType::Exercise => (15, 30),
            BreakType::Meditation => (5, 15),
            BreakType::Walk => (10, 20),
            BreakType::Long => (15, 20),
        }
    }
}

/// Break type and length to suggest after `continuous_mins` of study.
pub fn suggest_break(continuous_mins: u32) -> (BreakType, u16) {
    let (break_type, range) = if continuous_mins >= 120 {
        (BreakType::Long, BreakType::Long.duration_range())
    } else if continuous_mins >= 90 {
        (BreakType::Walk, BreakType::Walk.duration_range())
    } else if continuous_mins >= 50 {
        (BreakType::Short, BreakType::Short.duration_range())
    } else {
        (BreakType::Pomodoro, BreakType::Pomodoro.duration_range())
    };
    (break_type, range.1)
}

/// A logged break.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakSession {
    pub id: i64,
    pub break_type: BreakType,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
    pub suggested_duration_mins: u16,
    pub actual_duration_mins: Option<u16>,
    pub was_completed: bool,
}

// ── Pomodoro register ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PomodoroPhase {
    #[default]
    Idle,
    Work,
    ShortBreak,
    LongBreak,
}

/// Singleton pomodoro state, stored as a register cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PomodoroStatus {
    pub current_phase: PomodoroPhase,
    pub cycles_completed: u32,
    pub phase_started_at: Option<NaiveDateTime>,
}

/// Work phases before a long break.
const CYCLES_PER_LONG_BREAK: u32 = 4;

impl PomodoroStatus {
    pub fn start_work(&mut self, now: NaiveDateTime) {
        self.current_phase = PomodoroPhase::Work;
        self.phase_started_at = Some(now);
    }

    /// Finish a work phase; every fourth completed cycle earns the long
    /// break.
    pub fn finish_work(&mut self, now: NaiveDateTime) {
        if self.current_phase != PomodoroPhase::Work {
            return;
        }
        self.cycles_completed += 1;
        self.current_phase = if self.cycles_completed % CYCLES_PER_LONG_BREAK == 0 {
            PomodoroPhase::LongBreak
        } else {
            PomodoroPhase::ShortBreak
        };
        self.phase_started_at = Some(now);
    }

    pub fn stop(&mut self) {
        self.current_phase = PomodoroPhase::Idle;
        self.phase_started_at = None;
    }

    pub fn reset(&mut self) {
        *self = PomodoroStatus::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_is_balanced_midrange() {
        // 5h study, 3 breaks, nothing overdue: 0.5 + 0.2 + 0.15 = 0.85
        let score = wellbeing_score(5.0, 3, 0);
        assert!((score - 0.85).abs() < 1e-9);
    }

    #[test]
    fn light_study_scales_linearly() {
        // 2h study: 0.5 + 0.1 = 0.6
        assert!((wellbeing_score(2.0, 0, 0) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn overwork_pulls_score_down() {
        // 12h study: 0.5 - 0.4 = 0.1
        assert!((wellbeing_score(12.0, 0, 0) - 0.1).abs() < 1e-9);
        // Break bonus caps at 0.2.
        assert!((wellbeing_score(12.0, 10, 0) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn overdue_tasks_cost_and_score_clamps() {
        assert!((wellbeing_score(0.0, 0, 4) - 0.3).abs() < 1e-9);
        assert_eq!(wellbeing_score(20.0, 0, 10), 0.0);
        assert_eq!(wellbeing_score(5.0, 20, 0), 0.9);
    }

    #[test]
    fn stress_levels() {
        assert_eq!(StressLevel::from_score(0.8), StressLevel::Low);
        assert_eq!(StressLevel::from_score(0.5), StressLevel::Moderate);
        assert_eq!(StressLevel::from_score(0.2), StressLevel::High);
    }

    #[test]
    fn urgent_recommendation_below_threshold() {
        let recs = recommendations_for(0.3, 2.0, 0, 0);
        assert!(matches!(recs[0].priority, RecommendationPriority::Urgent));
        assert!(recs[0].action.contains("30-minute break"));
    }

    #[test]
    fn long_day_and_overdue_rules() {
        let recs = recommendations_for(0.6, 11.0, 2, 1);
        let actions: Vec<&str> = recs.iter().map(|r| r.action.as_str()).collect();
        assert!(actions.iter().any(|a| a.contains("stopping")));
        assert!(actions.iter().any(|a| a.contains("overdue")));
        assert!(actions.iter().any(|a| a.contains("skip")));
    }

    #[test]
    fn break_suggestion_scales_with_continuous_study() {
        assert_eq!(suggest_break(20).0, BreakType::Pomodoro);
        assert_eq!(suggest_break(60).0, BreakType::Short);
        assert_eq!(suggest_break(95).0, BreakType::Walk);
        assert_eq!(suggest_break(150).0, BreakType::Long);
    }

    #[test]
    fn pomodoro_long_break_every_fourth_cycle() {
        let now = NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let mut status = PomodoroStatus::default();
        for cycle in 1..=4u32 {
            status.start_work(now);
            status.finish_work(now);
            if cycle == 4 {
                assert_eq!(status.current_phase, PomodoroPhase::LongBreak);
            } else {
                assert_eq!(status.current_phase, PomodoroPhase::ShortBreak);
            }
        }
        assert_eq!(status.cycles_completed, 4);
        status.stop();
        assert_eq!(status.current_phase, PomodoroPhase::Idle);
    }
}
