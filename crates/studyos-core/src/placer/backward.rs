//! Backward planning from a deadline.
//!
//! Given required hours and a deadline, spreads the work over the days in
//! `[today, deadline)` with a linear ramp (later days carry more), splits
//! each day's allocation into blocks no longer than the configured maximum,
//! and fits the blocks into that day's free gaps with break slack between
//! them. A day that cannot host its share overflows to the nearest earlier
//! day; work that fits nowhere makes the whole plan unschedulable.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::clock::{at_minute, minute_of};
use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::store::Store;
use crate::task::{NewTask, Task, TaskType};
use crate::timeline::{Gap, TimelineBuilder};

/// Smallest planned block worth sitting down for, minutes.
const MIN_BLOCK_MINS: u16 = 15;

/// What the plan is preparing for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub subject_code: String,
    pub title: String,
    pub deadline: NaiveDateTime,
    pub hours_needed: f64,
}

/// One planned study block.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlannedBlock {
    pub date: NaiveDate,
    pub start_min: u16,
    pub duration_mins: u16,
    pub is_deep_work: bool,
}

/// A day's slice of the ramp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayAllocation {
    pub date: NaiveDate,
    /// Minutes the ramp assigned to this day before overflow.
    pub target_mins: u32,
    pub blocks: Vec<PlannedBlock>,
}

/// A complete backward plan, not yet committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub subject_code: String,
    pub title: String,
    pub deadline: NaiveDateTime,
    pub total_mins: u32,
    pub days: Vec<DayAllocation>,
}

impl Plan {
    pub fn blocks(&self) -> impl Iterator<Item = &PlannedBlock> {
        self.days.iter().flat_map(|d| d.blocks.iter())
    }

    pub fn allocated_mins(&self) -> u32 {
        self.blocks().map(|b| b.duration_mins as u32).sum()
    }
}

/// Ramp allocation: day `i` of `n` gets the `(i+1)/(1+2+..+n)` share of
/// `total`, with cumulative rounding so the shares sum exactly to `total`.
pub fn ramp_allocations(total: u32, n: u32) -> Vec<u32> {
    if n == 0 {
        return Vec::new();
    }
    let weight_sum: u64 = (1..=n as u64).sum();
    let mut allocations = Vec::with_capacity(n as usize);
    let mut assigned: u64 = 0;
    let mut prefix: u64 = 0;
    for i in 1..=n as u64 {
        prefix += i;
        let cumulative = total as u64 * prefix / weight_sum;
        allocations.push((cumulative - assigned) as u32);
        assigned = cumulative;
    }
    allocations
}

pub struct BackwardPlanner<'a> {
    store: &'a Store,
    config: &'a Config,
}

impl<'a> BackwardPlanner<'a> {
    pub fn new(store: &'a Store, config: &'a Config) -> Self {
        Self { store, config }
    }

    /// Build a plan without committing anything to the store.
    pub fn plan(&self, request: &PlanRequest, now: NaiveDateTime) -> Result<Plan> {
        if request.deadline <= now {
            return Err(CoreError::DeadlineConflict(format!(
                "deadline {} is already past",
                request.deadline
            )));
        }
        if request.hours_needed <= 0.0 {
            return Err(crate::error::ValidationError::InvalidValue {
                field: "hours_needed",
                message: "must be positive".to_string(),
            }
            .into());
        }

        let today = now.date();
        let span = (request.deadline.date() - today).num_days();
        let dates: Vec<NaiveDate> = if span <= 0 {
            vec![today]
        } else {
            (0..span).map(|i| today + Duration::days(i)).collect()
        };

        let total_mins = (request.hours_needed * 60.0).round() as u32;
        let targets = ramp_allocations(total_mins, dates.len() as u32);
        let max_block = self.config.routine.max_study_block_mins;
        let slack = self.config.routine.min_break_after_study;

        // Free gaps per day, today clipped to the future.
        let builder = TimelineBuilder::new(self.config);
        let mut day_gaps: Vec<Vec<Gap>> = Vec::with_capacity(dates.len());
        for date in &dates {
            let timeline = builder.build(*date, &self.store.tasks_for_date(*date)?)?;
            let mut gaps = timeline.free_gaps();
            if *date == today {
                let cursor = minute_of(now.time());
                gaps = gaps
                    .into_iter()
                    .filter_map(|g| Gap::new(g.start.max(cursor), g.end))
                    .collect();
            }
            day_gaps.push(gaps);
        }

        let mut days: Vec<DayAllocation> = dates
            .iter()
            .zip(&targets)
            .map(|(date, target)| DayAllocation {
                date: *date,
                target_mins: *target,
                blocks: Vec::new(),
            })
            .collect();

        for i in 0..days.len() {
            let mut remaining = days[i].target_mins;
            // This day first, then overflow backward toward today.
            for host in (0..=i).rev() {
                if remaining == 0 {
                    break;
                }
                remaining = fill_day(
                    &mut day_gaps[host],
                    &mut days,
                    host,
                    remaining,
                    max_block,
                    slack,
                    self.config.routine.deep_work_min_duration,
                );
            }
            if remaining > 0 {
                return Err(CoreError::Unschedulable {
                    item: request.title.clone(),
                    reason: format!(
                        "no free gap can host {remaining} minutes of the {} allocation",
                        days[i].date
                    ),
                });
            }
        }

        Ok(Plan {
            subject_code: request.subject_code.clone(),
            title: request.title.clone(),
            deadline: request.deadline,
            total_mins,
            days,
        })
    }

    /// Commit a plan: create one prep task per block and place it.
    pub fn apply(&self, plan: &Plan, now: NaiveDateTime) -> Result<Vec<Task>> {
        let origin = format!(
            "exam:{}:{}",
            plan.subject_code,
            plan.deadline.date().format("%Y-%m-%d")
        );
        let mut created = Vec::new();
        for block in plan.blocks() {
            let task = self.store.create_origin_task(
                &NewTask {
                    title: format!("{} ({})", plan.title, plan.subject_code),
                    subject_code: Some(plan.subject_code.clone()),
                    priority: 9,
                    duration_mins: block.duration_mins,
                    deadline: Some(plan.deadline),
                    task_type: TaskType::Study,
                    is_deep_work: block.is_deep_work,
                },
                &origin,
                now,
            )?;
            let placed =
                self.store
                    .place_task(task.id, at_minute(block.date, block.start_min), now)?;
            created.push(placed);
        }
        Ok(created)
    }
}

/// Pour up to `remaining` minutes into one day's gaps as blocks of at most
/// `max_block` minutes, reserving `slack` after each block. Returns what
/// could not be hosted.
fn fill_day(
    gaps: &mut Vec<Gap>,
    days: &mut [DayAllocation],
    day_idx: usize,
    mut remaining: u32,
    max_block: u16,
    slack: u16,
    deep_work_min: u16,
) -> u32 {
    let mut gap_idx = 0;
    while remaining >= MIN_BLOCK_MINS as u32 && gap_idx < gaps.len() {
        let gap = gaps[gap_idx];
        let block_len = (remaining.min(max_block as u32) as u16).min(gap.duration_mins());
        if block_len < MIN_BLOCK_MINS {
            gap_idx += 1;
            continue;
        }
        days[day_idx].blocks.push(PlannedBlock {
            date: days[day_idx].date,
            start_min: gap.start,
            duration_mins: block_len,
            is_deep_work: block_len >= deep_work_min,
        });
        remaining -= block_len as u32;

        let consumed_end = (gap.start + block_len + slack).min(gap.end);
        match Gap::new(consumed_end, gap.end) {
            Some(rest) => gaps[gap_idx] = rest,
            None => {
                gaps.remove(gap_idx);
            }
        }
    }
    // Allocations under the minimum block size are considered hosted.
    if remaining < MIN_BLOCK_MINS as u32 {
        0
    } else {
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_is_linear_and_exact() {
        assert_eq!(ramp_allocations(600, 4), vec![60, 120, 180, 240]);
        assert_eq!(ramp_allocations(600, 1), vec![600]);
        let allocations = ramp_allocations(500, 3);
        assert_eq!(allocations.iter().sum::<u32>(), 500);
        assert!(allocations.windows(2).all(|w| w[0] <= w[1]));
        assert!(ramp_allocations(100, 0).is_empty());
    }

    #[test]
    fn monday_to_friday_exam_plan() {
        // S1: Monday 09:00, deadline Friday 23:59, ten hours of MATH101.
        let store = Store::open_memory().unwrap();
        let config = Config::default();
        let planner = BackwardPlanner::new(&store, &config);
        let now = NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let request = PlanRequest {
            subject_code: "MATH101".to_string(),
            title: "Prepare for exam".to_string(),
            deadline: NaiveDate::from_ymd_opt(2025, 3, 7)
                .unwrap()
                .and_hms_opt(23, 59, 0)
                .unwrap(),
            hours_needed: 10.0,
        };

        let plan = planner.plan(&request, now).unwrap();
        assert_eq!(plan.days.len(), 4);
        assert_eq!(plan.allocated_mins(), 600);

        // The ramp: the last day carries more than the first.
        let first_day: u32 = plan.days[0].blocks.iter().map(|b| b.duration_mins as u32).sum();
        let last_day: u32 = plan.days[3].blocks.iter().map(|b| b.duration_mins as u32).sum();
        assert!(last_day > first_day);

        // Every block respects the maximum length.
        for block in plan.blocks() {
            assert!(block.duration_mins <= config.routine.max_study_block_mins);
            assert!(block.duration_mins >= MIN_BLOCK_MINS);
        }

        // Blocks on the same day are separated by at least the break slack
        // and never overlap.
        for day in &plan.days {
            let mut blocks = day.blocks.clone();
            blocks.sort_by_key(|b| b.start_min);
            for pair in blocks.windows(2) {
                assert!(
                    pair[1].start_min
                        >= pair[0].start_min
                            + pair[0].duration_mins
                            + config.routine.min_break_after_study
                );
            }
        }

        // Nothing lands on a weekday class: Monday's COMP104 lecture
        // (08:00-09:30) and THER105 lab (14:00-16:00).
        for block in &plan.days[0].blocks {
            let start = block.start_min;
            let end = start + block.duration_mins;
            assert!(!(start < 9 * 60 + 30 && end > 8 * 60));
            assert!(!(start < 16 * 60 && end > 14 * 60));
        }
    }

    #[test]
    fn past_deadline_is_a_deadline_conflict() {
        let store = Store::open_memory().unwrap();
        let config = Config::default();
        let planner = BackwardPlanner::new(&store, &config);
        let now = NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let request = PlanRequest {
            subject_code: "MATH101".to_string(),
            title: "too late".to_string(),
            deadline: now - Duration::hours(1),
            hours_needed: 2.0,
        };
        let err = planner.plan(&request, now).unwrap_err();
        assert!(matches!(err, CoreError::DeadlineConflict(_)));
    }

    #[test]
    fn impossible_volume_is_unschedulable() {
        let store = Store::open_memory().unwrap();
        let config = Config::default();
        let planner = BackwardPlanner::new(&store, &config);
        let now = NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let request = PlanRequest {
            subject_code: "MATH101".to_string(),
            title: "cram everything".to_string(),
            deadline: now + Duration::days(1),
            hours_needed: 40.0,
        };
        let err = planner.plan(&request, now).unwrap_err();
        assert!(matches!(err, CoreError::Unschedulable { .. }));
    }

    #[test]
    fn apply_commits_placed_tasks() {
        let store = Store::open_memory().unwrap();
        let config = Config::default();
        let planner = BackwardPlanner::new(&store, &config);
        let now = NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let request = PlanRequest {
            subject_code: "MATH101".to_string(),
            title: "Prepare for quiz".to_string(),
            deadline: now + Duration::days(2),
            hours_needed: 2.0,
        };
        let plan = planner.plan(&request, now).unwrap();
        let tasks = planner.apply(&plan, now).unwrap();
        assert_eq!(tasks.len(), plan.blocks().count());
        for task in &tasks {
            assert!(task.scheduled_start.is_some());
            assert_eq!(task.origin.as_deref(), Some("exam:MATH101:2025-03-05"));
        }
    }
}
