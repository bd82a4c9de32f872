//! Integration tests for timeline construction, optimization, backward
//! planning, and reschedule-all.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use studyos_core::{
    ActivityType, Config, Engine, NewSubject, NewTask, PlanRequest, Store, SubjectKind, TaskStatus,
    TaskType,
};

fn monday_9am() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 3)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

fn engine() -> Engine {
    Engine::new(Arc::new(Store::open_memory().unwrap()), Config::default())
}

fn seed_math(engine: &Engine) {
    engine
        .create_subject(
            &NewSubject {
                code: "MATH101".to_string(),
                name: "Calculus I".to_string(),
                credits: 4,
                kind: SubjectKind::ConceptHeavy,
                color: "#6366f1".to_string(),
            },
            monday_9am(),
        )
        .unwrap();
}

fn study_task(engine: &Engine, title: &str, mins: u16) -> i64 {
    engine
        .create_task(
            &NewTask {
                title: title.to_string(),
                subject_code: None,
                priority: 5,
                duration_mins: mins,
                deadline: None,
                task_type: TaskType::Study,
                is_deep_work: false,
            },
            monday_9am(),
        )
        .unwrap()
        .id
}

#[test]
fn every_day_of_the_week_is_a_contiguous_partition() {
    let engine = engine();
    let week = engine.week(monday_9am().date()).unwrap();
    assert_eq!(week.len(), 7);
    for timeline in &week {
        assert!(timeline.is_contiguous_partition(), "{} has holes", timeline.date);
        let total: u32 = timeline.blocks.iter().map(|b| b.duration_mins() as u32).sum();
        assert_eq!(total, 24 * 60);
    }
}

#[test]
fn placed_tasks_never_overlap_and_length_matches_duration() {
    let engine = engine();
    for i in 0..6 {
        study_task(&engine, &format!("task {i}"), 45 + i * 10);
    }
    let friday = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
    engine.optimize(friday, monday_9am()).unwrap();

    let tasks: Vec<_> = engine
        .store()
        .tasks_for_date(friday)
        .unwrap()
        .into_iter()
        .filter(|t| t.status != TaskStatus::Cancelled)
        .collect();
    assert!(!tasks.is_empty());

    for task in &tasks {
        let start = task.scheduled_start.unwrap();
        let end = task.scheduled_end.unwrap();
        assert_eq!(
            (end - start).num_minutes(),
            task.duration_mins as i64,
            "scheduled span must equal duration"
        );
    }
    for a in &tasks {
        for b in &tasks {
            if a.id >= b.id {
                continue;
            }
            let disjoint = a.scheduled_end.unwrap() <= b.scheduled_start.unwrap()
                || b.scheduled_end.unwrap() <= a.scheduled_start.unwrap();
            assert!(disjoint, "tasks {} and {} overlap", a.id, b.id);
        }
    }
}

#[test]
fn optimize_is_deterministic_and_idempotent() {
    let engine = engine();
    seed_math(&engine);
    study_task(&engine, "alpha", 60);
    study_task(&engine, "beta", 90);
    let friday = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();

    let first = engine.optimize(friday, monday_9am()).unwrap();
    assert_eq!(first.changes_made, 2);

    // Optimizing an already-optimal day changes nothing.
    let second = engine.optimize(friday, monday_9am()).unwrap();
    assert_eq!(second.changes_made, 0);
    assert!(second.placements.is_empty());
}

#[test]
fn backward_plan_for_exam_ramps_toward_deadline() {
    // S1: Monday 09:00, deadline Friday 23:59, 10 hours for MATH101.
    let engine = engine();
    seed_math(&engine);
    let request = PlanRequest {
        subject_code: "MATH101".to_string(),
        title: "Prepare for exam".to_string(),
        deadline: NaiveDate::from_ymd_opt(2025, 3, 7)
            .unwrap()
            .and_hms_opt(23, 59, 0)
            .unwrap(),
        hours_needed: 10.0,
    };
    let plan = engine.plan_backward(&request, monday_9am()).unwrap();

    assert_eq!(plan.days.len(), 4);
    assert_eq!(plan.allocated_mins(), 600);
    let day_total = |i: usize| -> u32 {
        plan.days[i].blocks.iter().map(|b| b.duration_mins as u32).sum()
    };
    assert!(day_total(3) > day_total(0), "ramp must grow toward the deadline");
    for block in plan.blocks() {
        assert!(block.duration_mins <= 90);
    }

    // Applying the plan produces placed tasks and a timeline that still
    // tiles cleanly around the fixed classes.
    let tasks = engine.apply_plan(&plan, monday_9am()).unwrap();
    assert_eq!(tasks.len(), plan.blocks().count());
    for date in (0..4).map(|i| monday_9am().date() + Duration::days(i)) {
        let timeline = engine.timeline(date).unwrap();
        assert!(timeline.is_contiguous_partition());
        for block in timeline.blocks.iter().filter(|b| b.task_id.is_some()) {
            assert_ne!(block.activity, ActivityType::University);
        }
    }
}

#[test]
fn reschedule_all_unplaces_open_tasks_only() {
    // S6: five placed pending tasks and two completed ones.
    let engine = engine();
    let friday = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
    let pending_ids: Vec<i64> = (0..5)
        .map(|i| study_task(&engine, &format!("pending {i}"), 45))
        .collect();
    let done_ids: Vec<i64> = (0..2)
        .map(|i| study_task(&engine, &format!("done {i}"), 30))
        .collect();

    engine.optimize(friday, monday_9am()).unwrap();
    for id in &done_ids {
        engine.complete_task(*id, monday_9am()).unwrap();
    }

    let report = engine
        .reschedule_all(friday, friday, "sick", monday_9am())
        .unwrap();
    assert_eq!(report.cleared, 5);
    assert_eq!(report.report.changes_made, 5);

    for id in &pending_ids {
        let task = engine.store().task(*id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.scheduled_start.is_some(), "re-placed after the sweep");
    }
    for id in &done_ids {
        let task = engine.store().task(*id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }
}

#[test]
fn update_task_is_idempotent() {
    let engine = engine();
    let id = study_task(&engine, "report draft", 60);
    let patch = studyos_core::TaskPatch {
        title: Some("final report draft".to_string()),
        priority: Some(8),
        ..Default::default()
    };
    let once = engine.update_task(id, &patch, monday_9am()).unwrap();
    let twice = engine
        .update_task(id, &patch, monday_9am() + Duration::minutes(5))
        .unwrap();
    assert_eq!(once.title, twice.title);
    assert_eq!(once.priority, twice.priority);
    assert_eq!(once.duration_mins, twice.duration_mins);
}
