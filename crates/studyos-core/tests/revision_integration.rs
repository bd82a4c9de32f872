//! Integration tests for the chapter-completion chain and spaced
//! repetition.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use studyos_core::{
    AssignmentStatus, Config, CoreError, Engine, NewSubject, ReadingStatus, Store, SubjectKind,
};

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 3)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

fn engine_with_chapter() -> (Engine, i64) {
    let engine = Engine::new(Arc::new(Store::open_memory().unwrap()), Config::default());
    engine
        .create_subject(
            &NewSubject {
                code: "MATH101".to_string(),
                name: "Calculus I".to_string(),
                credits: 4,
                kind: SubjectKind::ConceptHeavy,
                color: "#6366f1".to_string(),
            },
            t0(),
        )
        .unwrap();
    let chapter = engine.create_chapter("MATH101", 3, "Integrals", t0()).unwrap();
    (engine, chapter.id)
}

#[test]
fn completing_reading_creates_three_revisions_and_unlocks_assignment() {
    // S3: reading completed -> exactly three revisions at +7/+14/+21 and an
    // available assignment, atomically.
    let (engine, chapter_id) = engine_with_chapter();

    let revisions = engine.complete_reading(chapter_id, t0()).unwrap();
    assert_eq!(revisions.len(), 3);
    let today = t0().date();
    assert_eq!(revisions[0].due_date, today + Duration::days(7));
    assert_eq!(revisions[1].due_date, today + Duration::days(14));
    assert_eq!(revisions[2].due_date, today + Duration::days(21));
    assert!(revisions.iter().all(|r| !r.completed));

    let progress = engine.store().chapter_progress(chapter_id).unwrap();
    assert_eq!(progress.reading_status, ReadingStatus::Completed);
    assert_eq!(progress.assignment_status, AssignmentStatus::Available);

    // Completing again is refused and creates no extra revisions.
    let err = engine.complete_reading(chapter_id, t0()).unwrap_err();
    assert!(matches!(err, CoreError::Precondition(_)));
    let pending = engine
        .store()
        .pending_revisions(today + Duration::days(30))
        .unwrap();
    assert_eq!(pending.len(), 3);
}

#[test]
fn explicit_scheduling_uses_forgetting_curve_default() {
    let (engine, chapter_id) = engine_with_chapter();
    let revisions = engine.schedule_revisions(chapter_id, None, t0()).unwrap();
    assert_eq!(revisions.len(), 5);
    let today = t0().date();
    let offsets: Vec<i64> = revisions
        .iter()
        .map(|r| (r.due_date - today).num_days())
        .collect();
    assert_eq!(offsets, vec![1, 3, 7, 14, 30]);
}

#[test]
fn completing_a_revision_awards_credit_points_and_streak() {
    let (engine, chapter_id) = engine_with_chapter();
    let revisions = engine.complete_reading(chapter_id, t0()).unwrap();

    let outcome = engine
        .complete_revision(revisions[0].id, t0() + Duration::days(7))
        .unwrap();
    // 5 x 4 credits.
    assert_eq!(outcome.points, 20);
    assert_eq!(outcome.current_streak, 1);
    assert_eq!(outcome.total_points, 20);

    // Completing the same revision twice is a conflict.
    let err = engine
        .complete_revision(revisions[0].id, t0() + Duration::days(7))
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    let progress = engine.store().chapter_progress(chapter_id).unwrap();
    assert_eq!(progress.revision_count, 1);
}

#[test]
fn due_revisions_feed_the_optimizer() {
    let (engine, chapter_id) = engine_with_chapter();
    engine.complete_reading(chapter_id, t0()).unwrap();

    // A week later the first revision is due; the optimizer materializes
    // and places it.
    let week_later = t0() + Duration::days(7);
    let report = engine.optimize(week_later.date(), week_later).unwrap();
    assert_eq!(report.changes_made, 1);
    assert!(report.placements[0].title.contains("MATH101"));

    let timeline = engine.timeline(week_later.date()).unwrap();
    assert!(timeline
        .blocks
        .iter()
        .any(|b| b.activity == studyos_core::ActivityType::Revision));
}
