//! Priority-driven placement of pending work into free gaps.
//!
//! One placer run owns its pending set: it collects unplaced tasks, due
//! revisions, and urgent lab prep, ranks them with explicit stable keys,
//! and commits placements one at a time through the store (which re-checks
//! overlap on write, so interleaved runs cannot double-book a slot).
//! Identical state always yields identical placements.

pub mod backward;

use chrono::{NaiveDate, NaiveDateTime};
use std::time::Instant;

use crate::clock::{at_minute, minute_of};
use crate::config::Config;
use crate::energy::{EnergyCurve, TimeOfDay};
use crate::error::Result;
use crate::revision::PendingRevision;
use crate::store::Store;
use crate::subject::SubjectKind;
use crate::task::{LabReport, NewTask, Task, TaskType, Urgency};
use crate::timeline::{Gap, GapClass, TimelineBuilder};

/// Priority weights for the pending-set ordering.
pub mod priority {
    pub const OVERDUE: i32 = 100;
    pub const DUE_TODAY: i32 = 90;
    pub const EXAM_PREP: i32 = 85;
    pub const URGENT_LAB: i32 = 75;
    pub const REVISION_DUE: i32 = 65;
    pub const ASSIGNMENT: i32 = 60;
    pub const REGULAR_STUDY: i32 = 50;
    pub const FREE_TIME: i32 = 10;
}

/// Default length of a synthesized revision block, minutes.
const REVISION_BLOCK_MINS: u16 = 30;

/// Default length of a synthesized lab-prep block, minutes.
const LAB_PREP_BLOCK_MINS: u16 = 120;

/// What a pending item is backed by.
#[derive(Debug, Clone)]
pub enum PendingSource {
    Task(Task),
    Revision(PendingRevision),
    LabPrep(LabReport),
}

/// One entry of the pending set, with its ranking keys precomputed.
#[derive(Debug, Clone)]
pub struct PendingItem {
    pub source: PendingSource,
    pub title: String,
    pub subject_code: Option<String>,
    pub subject_kind: Option<SubjectKind>,
    pub credits: u8,
    pub score: i32,
    pub deadline: Option<NaiveDateTime>,
    pub duration_mins: u16,
    pub deep_work: bool,
    pub user_priority: u8,
    /// `(source discriminant, row id)`, the final total tie-break.
    sort_id: (u8, i64),
}

impl PendingItem {
    /// Stable ranking: score, credits, earliest deadline, longer duration,
    /// user priority, then row identity. Total order, so sorts are
    /// reproducible byte for byte.
    fn cmp_rank(&self, other: &Self) -> std::cmp::Ordering {
        other
            .score
            .cmp(&self.score)
            .then_with(|| other.credits.cmp(&self.credits))
            .then_with(|| match (self.deadline, other.deadline) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
            .then_with(|| other.duration_mins.cmp(&self.duration_mins))
            .then_with(|| other.user_priority.cmp(&self.user_priority))
            .then_with(|| self.sort_id.cmp(&other.sort_id))
    }
}

/// A committed placement.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Placement {
    pub task_id: i64,
    pub title: String,
    pub date: NaiveDate,
    pub start_min: u16,
    pub duration_mins: u16,
}

/// An item the run could not fit, with the diagnostic reason.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UnplacedItem {
    pub title: String,
    pub reason: String,
}

/// Result of one optimizer run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct OptimizeReport {
    pub changes_made: usize,
    pub placements: Vec<Placement>,
    pub unplaced: Vec<UnplacedItem>,
    /// True when a run deadline expired before the pending set was
    /// exhausted; committed placements stand.
    pub partially_complete: bool,
}

/// Result of a reschedule-all pass.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RescheduleReport {
    pub reason: String,
    pub cleared: usize,
    pub report: OptimizeReport,
}

pub struct Placer<'a> {
    store: &'a Store,
    config: &'a Config,
    curve: EnergyCurve,
}

impl<'a> Placer<'a> {
    pub fn new(store: &'a Store, config: &'a Config) -> Self {
        Self {
            store,
            config,
            curve: EnergyCurve::new(config.energy_curve.clone()),
        }
    }

    /// Collect and rank the pending set for a target date.
    pub fn pending_items(&self, date: NaiveDate) -> Result<Vec<PendingItem>> {
        let mut items = Vec::new();

        for task in self.store.unplaced_open_tasks()? {
            items.push(self.task_item(task, date)?);
        }

        for pending in self.store.pending_revisions(date)? {
            let origin = format!("revision:{}", pending.revision.id);
            if self.store.has_open_task_with_origin(&origin)? {
                continue;
            }
            items.push(self.revision_item(pending, date)?);
        }

        for lab in self.store.labs_due_within(date, 3)? {
            let origin = format!("lab:{}", lab.id);
            if self.store.has_open_task_with_origin(&origin)? {
                continue;
            }
            items.push(self.lab_item(lab, date)?);
        }

        items.sort_by(PendingItem::cmp_rank);
        Ok(items)
    }

    fn subject_kind_of(&self, code: Option<&str>) -> Result<(Option<SubjectKind>, u8)> {
        match code {
            Some(code) => match self.store.subject_by_code(code) {
                Ok(subject) => Ok((Some(subject.kind), subject.credits)),
                Err(crate::error::CoreError::NotFound { .. }) => Ok((None, 0)),
                Err(e) => Err(e),
            },
            None => Ok((None, 0)),
        }
    }

    fn task_item(&self, task: Task, date: NaiveDate) -> Result<PendingItem> {
        let (kind, credits) = self.subject_kind_of(task.subject_code.as_deref())?;
        let score = match task.deadline {
            Some(deadline) if deadline.date() < date => priority::OVERDUE,
            Some(deadline) if deadline.date() == date => priority::DUE_TODAY,
            _ => match task.task_type {
                TaskType::Assignment => priority::ASSIGNMENT,
                TaskType::FreeTime => priority::FREE_TIME,
                _ => priority::REGULAR_STUDY,
            },
        };
        Ok(PendingItem {
            title: task.title.clone(),
            subject_code: task.subject_code.clone(),
            subject_kind: kind,
            credits,
            score,
            deadline: task.deadline,
            duration_mins: task.duration_mins,
            deep_work: task.is_deep_work
                || task.duration_mins >= self.config.routine.deep_work_min_duration,
            user_priority: task.priority,
            sort_id: (0, task.id),
            source: PendingSource::Task(task),
        })
    }

    fn revision_item(&self, pending: PendingRevision, _date: NaiveDate) -> Result<PendingItem> {
        let (kind, _) = self.subject_kind_of(Some(&pending.subject_code))?;
        let deadline = pending.revision.due_date.and_hms_opt(23, 59, 0);
        Ok(PendingItem {
            title: format!(
                "Revise {} ch. {} ({})",
                pending.subject_code, pending.chapter_number, pending.chapter_title
            ),
            subject_code: Some(pending.subject_code.clone()),
            subject_kind: kind,
            credits: pending.subject_credits,
            score: priority::REVISION_DUE,
            deadline,
            duration_mins: REVISION_BLOCK_MINS,
            deep_work: false,
            user_priority: 7,
            sort_id: (1, pending.revision.id),
            source: PendingSource::Revision(pending),
        })
    }

    fn lab_item(&self, lab: LabReport, date: NaiveDate) -> Result<PendingItem> {
        let (kind, credits) = self.subject_kind_of(Some(&lab.subject_code))?;
        let score = match lab.urgency(date) {
            Urgency::Overdue => priority::OVERDUE,
            _ => priority::URGENT_LAB,
        };
        Ok(PendingItem {
            title: format!("Lab report: {} ({})", lab.title, lab.subject_code),
            subject_code: Some(lab.subject_code.clone()),
            subject_kind: kind,
            credits,
            score,
            deadline: Some(lab.deadline),
            duration_mins: LAB_PREP_BLOCK_MINS,
            deep_work: true,
            user_priority: 8,
            sort_id: (2, lab.id),
            source: PendingSource::LabPrep(lab),
        })
    }

    /// Gap affinity score for an item on `date`.
    ///
    /// Deep work wants deep-work gaps; concept-heavy subjects pair with the
    /// morning peak and practice-heavy ones with the evening peak, mismatch
    /// costs; far deadlines reward earlier days (buffer).
    pub fn match_score(&self, item: &PendingItem, gap: &Gap, date: NaiveDate) -> i32 {
        let mut score = 0;
        if item.deep_work && gap.classification == GapClass::DeepWork {
            score += 20;
        }
        let tod = TimeOfDay::from_hour((gap.start / 60) as u8);
        match item.subject_kind {
            Some(SubjectKind::ConceptHeavy) => {
                if tod == TimeOfDay::Morning {
                    score += 20;
                } else if tod == TimeOfDay::Evening {
                    score -= 10;
                }
            }
            Some(SubjectKind::PracticeHeavy) => {
                if tod == TimeOfDay::Evening {
                    score += 20;
                } else if tod == TimeOfDay::Morning {
                    score -= 10;
                }
            }
            None => {}
        }
        if let Some(deadline) = item.deadline {
            let days_until = (deadline.date() - date).num_days().max(0);
            score += (2 * days_until) as i32;
        }
        score
    }

    /// Index of the best-scoring gap that fits, earliest wins ties.
    fn best_gap(&self, item: &PendingItem, gaps: &[Gap], date: NaiveDate) -> Option<usize> {
        let mut best: Option<(usize, i32)> = None;
        for (idx, gap) in gaps.iter().enumerate() {
            if !gap.can_fit(item.duration_mins) {
                continue;
            }
            let score = self.match_score(item, gap, date);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((idx, score));
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// The free gaps of `date`, clipped to the future when the date is
    /// today.
    fn open_gaps(&self, date: NaiveDate, now: NaiveDateTime) -> Result<Vec<Gap>> {
        let timeline =
            TimelineBuilder::new(self.config).build(date, &self.store.tasks_for_date(date)?)?;
        let mut gaps = timeline.free_gaps();
        if date == now.date() {
            let cursor = minute_of(now.time());
            gaps = gaps
                .into_iter()
                .filter_map(|g| Gap::new(g.start.max(cursor), g.end))
                .collect();
        } else if date < now.date() {
            gaps.clear();
        }
        Ok(gaps)
    }

    /// Place the pending set into one day. Committed placements survive
    /// even when later items fail to fit.
    pub fn optimize_day(&self, date: NaiveDate, now: NaiveDateTime) -> Result<OptimizeReport> {
        self.optimize_day_with_deadline(date, now, None)
    }

    fn optimize_day_with_deadline(
        &self,
        date: NaiveDate,
        now: NaiveDateTime,
        run_deadline: Option<Instant>,
    ) -> Result<OptimizeReport> {
        let mut report = OptimizeReport::default();
        let mut gaps = self.open_gaps(date, now)?;
        let items = self.pending_items(date)?;

        for item in items {
            if run_deadline.is_some_and(|d| Instant::now() >= d) {
                report.partially_complete = true;
                break;
            }
            let Some(gap_idx) = self.best_gap(&item, &gaps, date) else {
                report.unplaced.push(UnplacedItem {
                    title: item.title.clone(),
                    reason: format!("no free gap fits {} minutes", item.duration_mins),
                });
                continue;
            };
            let gap = gaps[gap_idx];
            let start = gap.start;

            let task_id = match &item.source {
                PendingSource::Task(task) => task.id,
                PendingSource::Revision(pending) => {
                    self.store
                        .create_origin_task(
                            &NewTask {
                                title: item.title.clone(),
                                subject_code: item.subject_code.clone(),
                                priority: item.user_priority,
                                duration_mins: item.duration_mins,
                                deadline: item.deadline,
                                task_type: TaskType::Revision,
                                is_deep_work: false,
                            },
                            &format!("revision:{}", pending.revision.id),
                            now,
                        )?
                        .id
                }
                PendingSource::LabPrep(lab) => {
                    self.store
                        .create_origin_task(
                            &NewTask {
                                title: item.title.clone(),
                                subject_code: item.subject_code.clone(),
                                priority: item.user_priority,
                                duration_mins: item.duration_mins,
                                deadline: item.deadline,
                                task_type: TaskType::LabWork,
                                is_deep_work: true,
                            },
                            &format!("lab:{}", lab.id),
                            now,
                        )?
                        .id
                }
            };

            self.store.place_task(task_id, at_minute(date, start), now)?;
            report.placements.push(Placement {
                task_id,
                title: item.title.clone(),
                date,
                start_min: start,
                duration_mins: item.duration_mins,
            });
            report.changes_made += 1;

            consume_gap(
                &mut gaps,
                gap_idx,
                item.duration_mins,
                self.slack_after(item.duration_mins),
            );
        }

        Ok(report)
    }

    /// Optimize a run of consecutive days, stopping early (with committed
    /// placements kept) when `run_deadline` passes.
    pub fn optimize_range(
        &self,
        start: NaiveDate,
        days: u32,
        now: NaiveDateTime,
        run_deadline: Option<Instant>,
    ) -> Result<OptimizeReport> {
        let mut total = OptimizeReport::default();
        for offset in 0..days {
            if run_deadline.is_some_and(|d| Instant::now() >= d) {
                total.partially_complete = true;
                break;
            }
            let date = start + chrono::Duration::days(offset as i64);
            let day = self.optimize_day_with_deadline(date, now, run_deadline)?;
            total.changes_made += day.changes_made;
            total.placements.extend(day.placements);
            total.unplaced.extend(day.unplaced);
            total.partially_complete |= day.partially_complete;
        }
        Ok(total)
    }

    /// Unplace every open task in the window, then re-run the priority
    /// sweep over it. Completed and cancelled tasks are untouched.
    pub fn reschedule_all(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        reason: &str,
        now: NaiveDateTime,
    ) -> Result<RescheduleReport> {
        let placed = self.store.placed_open_tasks_in_range(from, to)?;
        let cleared = placed.len();
        for task in &placed {
            self.store.clear_placement(task.id, now)?;
        }
        tracing::info!(cleared, reason, "rescheduling window");

        let days = (to - from).num_days().max(0) as u32 + 1;
        let report = self.optimize_range(from, days, now, None)?;
        Ok(RescheduleReport {
            reason: reason.to_string(),
            cleared,
            report,
        })
    }

    /// Break slack reserved after a placed study block, minutes.
    fn slack_after(&self, duration_mins: u16) -> u16 {
        if duration_mins >= self.config.routine.deep_work_min_duration {
            self.config.routine.min_break_after_study
        } else {
            0
        }
    }
}

/// Shrink `gaps[idx]` by a placement at its start plus trailing slack.
fn consume_gap(gaps: &mut Vec<Gap>, idx: usize, duration_mins: u16, slack: u16) {
    let gap = gaps[idx];
    let consumed_end = (gap.start + duration_mins + slack).min(gap.end);
    match Gap::new(consumed_end, gap.end) {
        Some(rest) => gaps[idx] = rest,
        None => {
            gaps.remove(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::NewSubject;

    fn config() -> Config {
        Config::default()
    }

    // Friday has no classes: one long morning gap and one long afternoon
    // gap around lunch/dinner.
    fn friday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 7).unwrap()
    }

    fn t0() -> NaiveDateTime {
        // Well before the Friday under test.
        NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn seed_subject(store: &Store, code: &str, credits: u8, kind: SubjectKind) {
        store
            .create_subject(
                &NewSubject {
                    code: code.to_string(),
                    name: code.to_string(),
                    credits,
                    kind,
                    color: "#123456".to_string(),
                },
                t0(),
            )
            .unwrap();
    }

    fn study_task(store: &Store, title: &str, mins: u16, subject: Option<&str>) -> Task {
        store
            .create_task(
                &NewTask {
                    title: title.to_string(),
                    subject_code: subject.map(str::to_string),
                    priority: 5,
                    duration_mins: mins,
                    deadline: None,
                    task_type: TaskType::Study,
                    is_deep_work: false,
                },
                t0(),
            )
            .unwrap()
    }

    #[test]
    fn places_pending_task_into_free_gap() {
        let store = Store::open_memory().unwrap();
        let config = config();
        let placer = Placer::new(&store, &config);
        let task = study_task(&store, "Read notes", 60, None);

        let report = placer.optimize_day(friday(), t0()).unwrap();
        assert_eq!(report.changes_made, 1);
        assert!(report.unplaced.is_empty());

        let placed = store.task(task.id).unwrap();
        assert!(placed.scheduled_start.is_some());
        assert_eq!(placed.scheduled_date(), Some(friday()));
    }

    #[test]
    fn optimize_twice_is_deterministic_and_second_is_noop() {
        let store = Store::open_memory().unwrap();
        let config = config();
        let placer = Placer::new(&store, &config);
        seed_subject(&store, "MATH101", 4, SubjectKind::ConceptHeavy);
        study_task(&store, "a", 60, Some("MATH101"));
        study_task(&store, "b", 45, None);
        study_task(&store, "c", 90, Some("MATH101"));

        let first = placer.optimize_day(friday(), t0()).unwrap();
        assert_eq!(first.changes_made, 3);
        let snapshot: Vec<_> = first
            .placements
            .iter()
            .map(|p| (p.task_id, p.start_min, p.duration_mins))
            .collect();

        let second = placer.optimize_day(friday(), t0()).unwrap();
        assert_eq!(second.changes_made, 0);
        assert!(second.placements.is_empty());

        // Re-running from the same initial state reproduces placements.
        let store2 = Store::open_memory().unwrap();
        seed_subject(&store2, "MATH101", 4, SubjectKind::ConceptHeavy);
        study_task(&store2, "a", 60, Some("MATH101"));
        study_task(&store2, "b", 45, None);
        study_task(&store2, "c", 90, Some("MATH101"));
        let placer2 = Placer::new(&store2, &config);
        let replay = placer2.optimize_day(friday(), t0()).unwrap();
        let snapshot2: Vec<_> = replay
            .placements
            .iter()
            .map(|p| (p.task_id, p.start_min, p.duration_mins))
            .collect();
        assert_eq!(snapshot, snapshot2);
    }

    #[test]
    fn due_revision_becomes_a_placed_revision_task() {
        let store = Store::open_memory().unwrap();
        let config = config();
        seed_subject(&store, "MATH101", 4, SubjectKind::ConceptHeavy);
        let subject = store.subject_by_code("MATH101").unwrap();
        let chapter = store.create_chapter(subject.id, 3, "Integrals", t0()).unwrap();
        // Completing reading 7+ days before the target date makes the first
        // revision due.
        store
            .complete_chapter_reading(chapter.id, t0().date() - chrono::Duration::days(7))
            .unwrap();

        let placer = Placer::new(&store, &config);
        let report = placer.optimize_day(t0().date(), t0()).unwrap();
        assert_eq!(report.changes_made, 1);
        assert!(report.placements[0].title.contains("Revise MATH101"));
        assert_eq!(report.placements[0].duration_mins, 30);

        // The revision is not re-materialized on the next run.
        let again = placer.optimize_day(t0().date(), t0()).unwrap();
        assert_eq!(again.changes_made, 0);
    }

    #[test]
    fn oversized_item_reports_unschedulable_reason() {
        let store = Store::open_memory().unwrap();
        let config = config();
        let placer = Placer::new(&store, &config);
        // Longer than any free gap in the default routine.
        study_task(&store, "marathon", 900, None);

        let report = placer.optimize_day(friday(), t0()).unwrap();
        assert_eq!(report.changes_made, 0);
        assert_eq!(report.unplaced.len(), 1);
        assert!(report.unplaced[0].reason.contains("900 minutes"));
    }

    #[test]
    fn higher_priority_takes_the_better_gap() {
        let store = Store::open_memory().unwrap();
        let config = config();
        seed_subject(&store, "MATH101", 5, SubjectKind::ConceptHeavy);
        seed_subject(&store, "ART100", 1, SubjectKind::PracticeHeavy);
        let placer = Placer::new(&store, &config);

        // Same duration; the overdue one must rank first.
        let urgent = store
            .create_task(
                &NewTask {
                    title: "overdue essay".to_string(),
                    subject_code: Some("MATH101".to_string()),
                    priority: 5,
                    duration_mins: 60,
                    deadline: Some(friday().and_hms_opt(0, 0, 0).unwrap() - chrono::Duration::days(1)),
                    task_type: TaskType::Study,
                    is_deep_work: false,
                },
                t0(),
            )
            .unwrap();
        study_task(&store, "casual reading", 60, Some("ART100"));

        let items = placer.pending_items(friday()).unwrap();
        assert_eq!(items[0].score, priority::OVERDUE);
        match &items[0].source {
            PendingSource::Task(t) => assert_eq!(t.id, urgent.id),
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn deep_work_prefers_deep_gap_and_concept_prefers_morning() {
        let store = Store::open_memory().unwrap();
        let config = config();
        seed_subject(&store, "MATH101", 4, SubjectKind::ConceptHeavy);
        let placer = Placer::new(&store, &config);
        let task = study_task(&store, "hard proof", 90, Some("MATH101"));
        let item = placer.task_item(task, friday()).unwrap();

        let morning_deep = Gap::new(8 * 60, 11 * 60).unwrap();
        let evening_deep = Gap::new(18 * 60, 21 * 60).unwrap();
        let morning_short = Gap::new(9 * 60, 10 * 60).unwrap();

        let score_morning = placer.match_score(&item, &morning_deep, friday());
        let score_evening = placer.match_score(&item, &evening_deep, friday());
        let score_short = placer.match_score(&item, &morning_short, friday());
        assert!(score_morning > score_evening);
        assert!(score_morning > score_short);
        // Morning bonus (+20) versus evening penalty (-10) for a
        // concept-heavy subject.
        assert_eq!(score_morning - score_evening, 30);
    }

    #[test]
    fn slack_is_reserved_after_long_blocks() {
        let mut gaps = vec![Gap::new(480, 840).unwrap()];
        consume_gap(&mut gaps, 0, 90, 15);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].start, 480 + 90 + 15);

        let mut gaps = vec![Gap::new(480, 540).unwrap()];
        consume_gap(&mut gaps, 0, 60, 0);
        assert!(gaps.is_empty());
    }

    #[test]
    fn reschedule_all_unplaces_only_open_tasks() {
        let store = Store::open_memory().unwrap();
        let config = config();
        let placer = Placer::new(&store, &config);
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(study_task(&store, &format!("t{i}"), 45, None).id);
        }
        let done_a = study_task(&store, "done a", 30, None);
        let done_b = study_task(&store, "done b", 30, None);

        placer.optimize_day(friday(), t0()).unwrap();
        store.complete_task(done_a.id, t0()).unwrap();
        store.complete_task(done_b.id, t0()).unwrap();
        let done_a_before = store.task(done_a.id).unwrap();

        let result = placer
            .reschedule_all(friday(), friday(), "sick", t0())
            .unwrap();
        assert_eq!(result.cleared, 5);
        assert_eq!(result.report.changes_made, 5);

        // Completed tasks keep their placement and status.
        let done_a_after = store.task(done_a.id).unwrap();
        assert_eq!(done_a_after.status, crate::task::TaskStatus::Completed);
        assert_eq!(done_a_after.scheduled_start, done_a_before.scheduled_start);
    }

    #[test]
    fn past_dates_host_nothing() {
        let store = Store::open_memory().unwrap();
        let config = config();
        let placer = Placer::new(&store, &config);
        study_task(&store, "late", 30, None);
        let yesterday = t0().date() - chrono::Duration::days(1);
        let report = placer.optimize_day(yesterday, t0()).unwrap();
        assert_eq!(report.changes_made, 0);
        assert_eq!(report.unplaced.len(), 1);
    }
}
