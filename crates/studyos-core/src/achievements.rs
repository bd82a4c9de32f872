//! Achievement catalog and evaluator.
//!
//! The catalog is fixed at compile time. On every relevant event (session
//! stop, revision or task completion, daily tick) the evaluator recomputes
//! each definition's progress from the store's counters, upserts the user
//! rows, and awards anything whose threshold was crossed. Freshly earned
//! achievements are left `notified = false` for the notification engine to
//! flush.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementCategory {
    Streak,
    Study,
    Goal,
    Revision,
    Special,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

/// One entry in the fixed achievement catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementDef {
    pub code: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: AchievementCategory,
    pub threshold_value: u64,
    pub points: u64,
    pub rarity: Rarity,
    /// Must be complete before this one can be awarded.
    pub prerequisite_code: Option<&'static str>,
}

/// Per-achievement user state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAchievement {
    pub code: String,
    pub progress_value: u64,
    pub is_complete: bool,
    pub earned_at: Option<NaiveDateTime>,
    pub notified: bool,
}

/// The fixed catalog, evaluated in order so prerequisites resolve within a
/// single pass.
pub const CATALOG: &[AchievementDef] = &[
    AchievementDef {
        code: "streak_3",
        name: "Getting Started",
        description: "Maintain a 3-day study streak",
        category: AchievementCategory::Streak,
        threshold_value: 3,
        points: 10,
        rarity: Rarity::Common,
        prerequisite_code: None,
    },
    AchievementDef {
        code: "streak_7",
        name: "Week Warrior",
        description: "Maintain a 7-day study streak",
        category: AchievementCategory::Streak,
        threshold_value: 7,
        points: 25,
        rarity: Rarity::Common,
        prerequisite_code: Some("streak_3"),
    },
    AchievementDef {
        code: "streak_30",
        name: "Month Master",
        description: "Maintain a 30-day study streak",
        category: AchievementCategory::Streak,
        threshold_value: 30,
        points: 100,
        rarity: Rarity::Rare,
        prerequisite_code: Some("streak_7"),
    },
    AchievementDef {
        code: "streak_100",
        name: "Centurion",
        description: "Maintain a 100-day study streak",
        category: AchievementCategory::Streak,
        threshold_value: 100,
        points: 500,
        rarity: Rarity::Legendary,
        prerequisite_code: Some("streak_30"),
    },
    AchievementDef {
        code: "deep_work_1",
        name: "Deep Diver",
        description: "Complete your first 90+ minute deep work session",
        category: AchievementCategory::Study,
        threshold_value: 1,
        points: 15,
        rarity: Rarity::Common,
        prerequisite_code: None,
    },
    AchievementDef {
        code: "deep_work_10",
        name: "Focus Master",
        description: "Complete 10 deep work sessions",
        category: AchievementCategory::Study,
        threshold_value: 10,
        points: 50,
        rarity: Rarity::Rare,
        prerequisite_code: Some("deep_work_1"),
    },
    AchievementDef {
        code: "tasks_10",
        name: "Task Tackler",
        description: "Complete 10 tasks",
        category: AchievementCategory::Goal,
        threshold_value: 10,
        points: 10,
        rarity: Rarity::Common,
        prerequisite_code: None,
    },
    AchievementDef {
        code: "tasks_100",
        name: "Productivity Pro",
        description: "Complete 100 tasks",
        category: AchievementCategory::Goal,
        threshold_value: 100,
        points: 100,
        rarity: Rarity::Rare,
        prerequisite_code: Some("tasks_10"),
    },
    AchievementDef {
        code: "revisions_25",
        name: "Memory Champion",
        description: "Complete 25 spaced revisions",
        category: AchievementCategory::Revision,
        threshold_value: 25,
        points: 30,
        rarity: Rarity::Rare,
        prerequisite_code: None,
    },
    AchievementDef {
        code: "early_bird",
        name: "Early Bird",
        description: "Start studying before 7 AM",
        category: AchievementCategory::Special,
        threshold_value: 1,
        points: 20,
        rarity: Rarity::Common,
        prerequisite_code: None,
    },
    AchievementDef {
        code: "night_owl",
        name: "Night Owl",
        description: "Put in a productive session after midnight",
        category: AchievementCategory::Special,
        threshold_value: 1,
        points: 20,
        rarity: Rarity::Common,
        prerequisite_code: None,
    },
    AchievementDef {
        code: "perfectionist",
        name: "Perfectionist",
        description: "Complete every planned task on 7 days within a month",
        category: AchievementCategory::Special,
        threshold_value: 7,
        points: 75,
        rarity: Rarity::Epic,
        prerequisite_code: None,
    },
];

pub fn definition(code: &str) -> Option<&'static AchievementDef> {
    CATALOG.iter().find(|d| d.code == code)
}

/// Evaluates the catalog against the store's counters.
pub struct AchievementEvaluator<'a> {
    store: &'a Store,
}

impl<'a> AchievementEvaluator<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Recompute all progress values and award crossed thresholds. Returns
    /// the codes earned in this pass.
    pub fn check(&self, now: NaiveDateTime) -> Result<Vec<String>> {
        let mut newly_awarded = Vec::new();
        for def in CATALOG {
            let progress = self.progress_for(def, now)?;
            let state = self.store.achievement_state(def.code)?;
            if state.as_ref().is_some_and(|s| s.is_complete) {
                // Completed rows never regress; keep the high-water mark.
                let held = state.map(|s| s.progress_value).unwrap_or(0);
                self.store
                    .record_achievement_progress(def.code, progress.max(held))?;
                continue;
            }

            let prerequisite_met = match def.prerequisite_code {
                Some(code) => self
                    .store
                    .achievement_state(code)?
                    .is_some_and(|s| s.is_complete),
                None => true,
            };

            if progress >= def.threshold_value && prerequisite_met {
                self.store.award_achievement(def.code, progress, now)?;
                self.store.add_streak_points(def.points)?;
                newly_awarded.push(def.code.to_string());
            } else {
                self.store.record_achievement_progress(def.code, progress)?;
            }
        }
        Ok(newly_awarded)
    }

    fn progress_for(&self, def: &AchievementDef, now: NaiveDateTime) -> Result<u64> {
        Ok(match def.code {
            "streak_3" | "streak_7" | "streak_30" | "streak_100" => {
                self.store.streak()?.longest_streak as u64
            }
            "deep_work_1" | "deep_work_10" => self.store.count_deep_work_sessions()?,
            "tasks_10" | "tasks_100" => self.store.count_completed_tasks()?,
            "revisions_25" => self.store.count_completed_revisions()?,
            "early_bird" => self.store.count_sessions_started_before_hour(7)?,
            "night_owl" => self.store.count_late_night_sessions()?,
            "perfectionist" => self.store.count_perfect_days(now.date(), 30)? as u64,
            _ => 0,
        })
    }
}
