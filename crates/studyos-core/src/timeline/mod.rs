//! Day timelines: labeled, contiguous block sequences.
//!
//! A [`Timeline`] is the renderable product of the engine: every minute of
//! the civil day is covered by exactly one block, labeled with an activity
//! from a closed set and annotated with the energy level of its start hour.

pub mod builder;
pub mod gap;

pub use builder::TimelineBuilder;
pub use gap::{find_gaps, BusySpan, Gap, GapClass};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::clock::{fmt_minutes, DAY_MINUTES};
use crate::task::TaskType;

/// Activity label of a timeline block. Closed set; unknown values are
/// refused at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Sleep,
    WakeRoutine,
    Breakfast,
    Lunch,
    Dinner,
    University,
    Study,
    Revision,
    Practice,
    Assignment,
    LabWork,
    DeepWork,
    Break,
    FreeTime,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Sleep => "sleep",
            ActivityType::WakeRoutine => "wake_routine",
            ActivityType::Breakfast => "breakfast",
            ActivityType::Lunch => "lunch",
            ActivityType::Dinner => "dinner",
            ActivityType::University => "university",
            ActivityType::Study => "study",
            ActivityType::Revision => "revision",
            ActivityType::Practice => "practice",
            ActivityType::Assignment => "assignment",
            ActivityType::LabWork => "lab_work",
            ActivityType::DeepWork => "deep_work",
            ActivityType::Break => "break",
            ActivityType::FreeTime => "free_time",
        }
    }

    /// Label for a placed task, folding deep-work study into its own band.
    pub fn for_task(task_type: TaskType, is_deep_work: bool) -> Self {
        match task_type {
            TaskType::Study if is_deep_work => ActivityType::DeepWork,
            TaskType::Study => ActivityType::Study,
            TaskType::Revision => ActivityType::Revision,
            TaskType::Practice => ActivityType::Practice,
            TaskType::Assignment => ActivityType::Assignment,
            TaskType::LabWork => ActivityType::LabWork,
            TaskType::Break => ActivityType::Break,
            TaskType::FreeTime => ActivityType::FreeTime,
        }
    }
}

/// One contiguous labeled interval within a day, in minutes since midnight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub start: u16,
    pub end: u16,
    pub activity: ActivityType,
    pub label: String,
    pub subject_code: Option<String>,
    pub task_id: Option<i64>,
    /// Energy level (1-10) of the block's starting hour.
    pub energy_level: u8,
    /// Routines, classes, and sleep are fixed; task and free-time blocks
    /// can be moved by the placer.
    pub fixed: bool,
}

impl Block {
    pub fn duration_mins(&self) -> u16 {
        self.end - self.start
    }

    pub fn span(&self) -> String {
        format!("{}-{}", fmt_minutes(self.start), fmt_minutes(self.end))
    }
}

/// A full-day timeline. Immutable after construction; safe to share.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    pub date: NaiveDate,
    /// Minute the day's waking window opens.
    pub wake: u16,
    /// Minute the waking window closes (bedtime).
    pub sleep: u16,
    /// Blocks sorted by start, covering `[0, 1440)` without gaps or overlaps.
    pub blocks: Vec<Block>,
}

impl Timeline {
    /// Total scheduled study-like minutes (tasks of any study flavor).
    pub fn study_minutes(&self) -> u32 {
        self.blocks
            .iter()
            .filter(|b| {
                matches!(
                    b.activity,
                    ActivityType::Study
                        | ActivityType::Revision
                        | ActivityType::Practice
                        | ActivityType::Assignment
                        | ActivityType::LabWork
                        | ActivityType::DeepWork
                )
            })
            .map(|b| b.duration_mins() as u32)
            .sum()
    }

    /// Free minutes still open in the waking window.
    pub fn free_minutes(&self) -> u32 {
        self.blocks
            .iter()
            .filter(|b| b.activity == ActivityType::FreeTime)
            .map(|b| b.duration_mins() as u32)
            .sum()
    }

    /// The free-time blocks, as gaps the placer can consume.
    pub fn free_gaps(&self) -> Vec<Gap> {
        self.blocks
            .iter()
            .filter(|b| b.activity == ActivityType::FreeTime)
            .filter_map(|b| Gap::new(b.start, b.end))
            .collect()
    }

    /// True when blocks tile `[0, 1440)` exactly: sorted, touching, no
    /// overlap. The builder guarantees this; tests assert it.
    pub fn is_contiguous_partition(&self) -> bool {
        let mut cursor = 0u16;
        for block in &self.blocks {
            if block.start != cursor || block.end <= block.start {
                return false;
            }
            cursor = block.end;
        }
        cursor == DAY_MINUTES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_for_task_folds_deep_work() {
        assert_eq!(
            ActivityType::for_task(TaskType::Study, true),
            ActivityType::DeepWork
        );
        assert_eq!(
            ActivityType::for_task(TaskType::Study, false),
            ActivityType::Study
        );
        assert_eq!(
            ActivityType::for_task(TaskType::Revision, true),
            ActivityType::Revision
        );
    }

    #[test]
    fn contiguity_check_rejects_gap() {
        let block = |start, end| Block {
            start,
            end,
            activity: ActivityType::Sleep,
            label: "Sleep".to_string(),
            subject_code: None,
            task_id: None,
            energy_level: 1,
            fixed: true,
        };
        let timeline = Timeline {
            date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            wake: 360,
            sleep: 1380,
            blocks: vec![block(0, 360), block(361, 1440)],
        };
        assert!(!timeline.is_contiguous_partition());

        let timeline = Timeline {
            date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            wake: 360,
            sleep: 1380,
            blocks: vec![block(0, 360), block(360, 1440)],
        };
        assert!(timeline.is_contiguous_partition());
    }
}
