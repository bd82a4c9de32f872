//! Full-day timeline composition.
//!
//! Layers the day in precedence order: sleep window, university classes,
//! routines and meals (clipped around classes), placed tasks, then free-time
//! blocks for every remaining gap. Classes win conflicts with meals so a lab
//! running into lunch shortens the meal instead of double-booking the hour.

use chrono::{Datelike, NaiveDate};

use crate::clock::{parse_hhmm, DAY_MINUTES};
use crate::config::{ClassKind, Config};
use crate::energy::EnergyCurve;
use crate::error::Result;
use crate::task::Task;
use crate::timeline::gap::{find_gaps, BusySpan};
use crate::timeline::{ActivityType, Block, Timeline};

/// Composes [`Timeline`]s from configuration plus the day's placed tasks.
pub struct TimelineBuilder<'a> {
    config: &'a Config,
    curve: EnergyCurve,
}

impl<'a> TimelineBuilder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            curve: EnergyCurve::new(config.energy_curve.clone()),
            config,
        }
    }

    /// Build the timeline for `date` given the tasks already placed on it.
    ///
    /// The result tiles `[00:00, 24:00)` exactly; free intervals inside the
    /// waking window come out as `free_time` blocks.
    pub fn build(&self, date: NaiveDate, placed_tasks: &[Task]) -> Result<Timeline> {
        let routine = &self.config.routine;
        let wake = routine.wake_minute()?;
        let sleep = routine.sleep_minute()?;

        let mut blocks: Vec<Block> = Vec::new();

        // Sleep brackets the waking window, split around midnight.
        self.push(&mut blocks, 0, wake, ActivityType::Sleep, "Sleep", None, None, true);
        self.push(
            &mut blocks,
            sleep,
            DAY_MINUTES,
            ActivityType::Sleep,
            "Sleep",
            None,
            None,
            true,
        );

        // University classes are immovable; insert them before meals so a
        // class overrunning a meal slot clips the meal, not the class.
        for class in self.config.timetable.classes_for(date.weekday()) {
            let start = parse_hhmm(&class.start)?;
            let end = parse_hhmm(&class.end)?;
            let kind = match class.kind {
                ClassKind::Lecture => "lecture",
                ClassKind::Lab => "lab",
                ClassKind::Tutorial => "tutorial",
            };
            self.push_clipped(
                &mut blocks,
                start,
                end,
                ActivityType::University,
                &format!("{} ({kind})", class.subject),
                Some(class.subject.clone()),
                None,
            );
        }

        // Wake routine, then breakfast either at its configured time or
        // straight after the routine.
        let routine_end = wake + routine.wake_routine_mins;
        self.push_clipped(
            &mut blocks,
            wake,
            routine_end,
            ActivityType::WakeRoutine,
            "Morning routine",
            None,
            None,
        );
        let breakfast_start = match &routine.breakfast_time {
            Some(t) => parse_hhmm(t)?,
            None => routine_end,
        };
        self.push_clipped(
            &mut blocks,
            breakfast_start,
            breakfast_start + routine.breakfast_mins,
            ActivityType::Breakfast,
            "Breakfast",
            None,
            None,
        );
        let lunch = parse_hhmm(&routine.lunch_time)?;
        self.push_clipped(
            &mut blocks,
            lunch,
            lunch + routine.lunch_mins,
            ActivityType::Lunch,
            "Lunch",
            None,
            None,
        );
        let dinner = parse_hhmm(&routine.dinner_time)?;
        self.push_clipped(
            &mut blocks,
            dinner,
            dinner + routine.dinner_mins,
            ActivityType::Dinner,
            "Dinner",
            None,
            None,
        );

        // Placed tasks. The placer never overlaps fixed blocks, so clipping
        // is a no-op in the normal case; it keeps the partition invariant
        // even if a caller force-placed a task badly.
        for task in placed_tasks {
            let (Some(start_dt), Some(end_dt)) = (task.scheduled_start, task.scheduled_end) else {
                continue;
            };
            if start_dt.date() != date {
                continue;
            }
            let start = crate::clock::minute_of(start_dt.time());
            let end = if end_dt.date() == date {
                crate::clock::minute_of(end_dt.time())
            } else {
                DAY_MINUTES
            };
            let activity = ActivityType::for_task(task.task_type, task.is_deep_work);
            self.push_clipped(
                &mut blocks,
                start,
                end,
                activity,
                &task.title,
                task.subject_code.clone(),
                Some(task.id),
            );
        }

        // Everything still open inside the waking window becomes free time.
        let spans: Vec<BusySpan> = blocks
            .iter()
            .map(|b| BusySpan {
                start: b.start,
                end: b.end,
            })
            .collect();
        for gap in find_gaps(&spans, wake, sleep) {
            self.push(
                &mut blocks,
                gap.start,
                gap.end,
                ActivityType::FreeTime,
                "Free time",
                None,
                None,
                false,
            );
        }

        blocks.sort_by_key(|b| b.start);

        Ok(Timeline {
            date,
            wake,
            sleep,
            blocks,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &self,
        blocks: &mut Vec<Block>,
        start: u16,
        end: u16,
        activity: ActivityType,
        label: &str,
        subject_code: Option<String>,
        task_id: Option<i64>,
        fixed: bool,
    ) {
        if end <= start {
            return;
        }
        blocks.push(Block {
            start,
            end,
            activity,
            label: label.to_string(),
            subject_code,
            task_id,
            energy_level: self.curve.level_at_minute(start),
            fixed,
        });
    }

    /// Insert `[start, end)` minus whatever is already occupied, keeping
    /// each remaining fragment of at least one minute.
    fn push_clipped(
        &self,
        blocks: &mut Vec<Block>,
        start: u16,
        end: u16,
        activity: ActivityType,
        label: &str,
        subject_code: Option<String>,
        task_id: Option<i64>,
    ) {
        let end = end.min(DAY_MINUTES);
        if end <= start {
            return;
        }
        let mut occupied: Vec<(u16, u16)> = blocks
            .iter()
            .filter(|b| b.end > start && b.start < end)
            .map(|b| (b.start.max(start), b.end.min(end)))
            .collect();
        occupied.sort();

        let mut cursor = start;
        for (busy_start, busy_end) in occupied {
            if busy_start > cursor {
                self.push(
                    blocks,
                    cursor,
                    busy_start,
                    activity,
                    label,
                    subject_code.clone(),
                    task_id,
                    task_id.is_none(),
                );
            }
            cursor = cursor.max(busy_end);
        }
        if cursor < end {
            self.push(
                blocks,
                cursor,
                end,
                activity,
                label,
                subject_code,
                task_id,
                task_id.is_none(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskStatus, TaskType};
    use chrono::NaiveDateTime;

    fn monday() -> NaiveDate {
        // 2025-03-03 is a Monday.
        NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
    }

    fn placed_task(id: i64, start: NaiveDateTime, mins: u16) -> Task {
        Task {
            id,
            title: format!("Task {id}"),
            subject_code: Some("MATH101".to_string()),
            priority: 5,
            duration_mins: mins,
            scheduled_start: Some(start),
            scheduled_end: Some(start + chrono::Duration::minutes(mins as i64)),
            deadline: None,
            status: TaskStatus::Pending,
            is_deep_work: mins >= 90,
            task_type: TaskType::Study,
            origin: None,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn empty_day_is_contiguous() {
        let config = Config::default();
        let timeline = TimelineBuilder::new(&config).build(monday(), &[]).unwrap();
        assert!(timeline.is_contiguous_partition());
        assert_eq!(timeline.blocks.first().unwrap().activity, ActivityType::Sleep);
        assert_eq!(timeline.blocks.last().unwrap().activity, ActivityType::Sleep);
    }

    #[test]
    fn monday_has_university_blocks() {
        let config = Config::default();
        let timeline = TimelineBuilder::new(&config).build(monday(), &[]).unwrap();
        let uni: Vec<_> = timeline
            .blocks
            .iter()
            .filter(|b| b.activity == ActivityType::University)
            .collect();
        assert_eq!(uni.len(), 2);
        assert_eq!(uni[0].subject_code.as_deref(), Some("COMP104"));
        assert!(timeline.is_contiguous_partition());
    }

    #[test]
    fn tuesday_lab_clips_lunch() {
        // Tuesday's PHYS102 lab runs 11:30-13:30 over the 13:00 lunch; the
        // meal must be clipped, not double-booked.
        let config = Config::default();
        let tuesday = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        let timeline = TimelineBuilder::new(&config).build(tuesday, &[]).unwrap();
        assert!(timeline.is_contiguous_partition());
        let lunch = timeline
            .blocks
            .iter()
            .find(|b| b.activity == ActivityType::Lunch)
            .unwrap();
        assert_eq!(lunch.start, 13 * 60 + 30);
        assert!(lunch.duration_mins() < config.routine.lunch_mins);
    }

    #[test]
    fn placed_task_appears_with_energy_annotation() {
        let config = Config::default();
        let start = monday().and_hms_opt(10, 0, 0).unwrap();
        let task = placed_task(7, start, 60);
        let timeline = TimelineBuilder::new(&config).build(monday(), &[task]).unwrap();
        let block = timeline.blocks.iter().find(|b| b.task_id == Some(7)).unwrap();
        assert_eq!(block.activity, ActivityType::Study);
        assert_eq!(block.duration_mins(), 60);
        assert_eq!(block.energy_level, 8); // 10:00 on the default curve
        assert!(timeline.is_contiguous_partition());
    }

    #[test]
    fn deep_work_task_gets_deep_work_band() {
        let config = Config::default();
        let start = monday().and_hms_opt(16, 30, 0).unwrap();
        let task = placed_task(9, start, 120);
        let timeline = TimelineBuilder::new(&config).build(monday(), &[task]).unwrap();
        let block = timeline.blocks.iter().find(|b| b.task_id == Some(9)).unwrap();
        assert_eq!(block.activity, ActivityType::DeepWork);
    }

    #[test]
    fn free_time_fills_every_remaining_minute() {
        let config = Config::default();
        let timeline = TimelineBuilder::new(&config).build(monday(), &[]).unwrap();
        let covered: u32 = timeline.blocks.iter().map(|b| b.duration_mins() as u32).sum();
        assert_eq!(covered, DAY_MINUTES as u32);
        assert!(timeline.free_minutes() > 0);
    }
}
