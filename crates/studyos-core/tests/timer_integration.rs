//! Integration tests for the session timer and its derived writes.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use studyos_core::{Config, CoreError, Engine, NewSubject, Store, SubjectKind};

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, 3)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

fn engine() -> Engine {
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
    engine
}

#[test]
fn ninety_minute_session_is_deep_work_with_nine_points() {
    // S2: start at T0, stop at T0 + 5400s.
    let engine = engine();
    engine
        .timer_start(Some("MATH101"), None, None, t0())
        .unwrap();
    let outcome = engine.timer_stop(t0() + Duration::seconds(5400)).unwrap();

    assert!(outcome.session.is_deep_work);
    assert_eq!(outcome.session.points_earned, 9);
    assert_eq!(outcome.session.duration_seconds, Some(5400));

    let daily = engine.store().daily_stats(t0().date()).unwrap();
    assert_eq!(daily.study_seconds, 5400);
    assert_eq!(daily.deep_work_seconds, 5400);
    assert_eq!(daily.session_count, 1);

    // First 30+ minute activity of the day bumps the streak.
    assert_eq!(engine.streak().unwrap().current_streak, 1);
}

#[test]
fn double_start_is_conflict_with_no_new_row() {
    // S4: starting while a timer runs must not change state.
    let engine = engine();
    let first = engine
        .timer_start(Some("MATH101"), None, None, t0())
        .unwrap();
    let err = engine
        .timer_start(None, None, Some("sneaky"), t0() + Duration::minutes(1))
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    let status = engine
        .timer_status(t0() + Duration::minutes(2))
        .unwrap()
        .unwrap();
    assert_eq!(status.session.id, first.id);

    // Stopping still works and settles exactly one session.
    let outcome = engine.timer_stop(t0() + Duration::minutes(40)).unwrap();
    assert_eq!(outcome.session.id, first.id);
    assert!(engine.timer_status(t0() + Duration::hours(1)).unwrap().is_none());
}

#[test]
fn at_most_one_open_session_ever() {
    let engine = engine();
    for i in 0..3 {
        let start = t0() + Duration::hours(i * 2);
        engine.timer_start(Some("MATH101"), None, None, start).unwrap();
        // While open, a second start always fails.
        assert!(engine
            .timer_start(Some("MATH101"), None, None, start + Duration::minutes(1))
            .is_err());
        engine.timer_stop(start + Duration::minutes(45)).unwrap();
    }
    let sessions = engine
        .store()
        .sessions_in_window(t0() - Duration::days(1), t0() + Duration::days(1))
        .unwrap();
    assert_eq!(sessions.len(), 3);
    assert!(sessions.iter().all(|s| s.stopped_at.is_some()));
}

#[test]
fn consecutive_days_build_a_streak_and_unlock_streak_achievement() {
    let engine = engine();
    for day in 0..3 {
        let start = t0() + Duration::days(day);
        engine.timer_start(Some("MATH101"), None, None, start).unwrap();
        engine.timer_stop(start + Duration::minutes(35)).unwrap();
    }
    let streak = engine.streak().unwrap();
    assert_eq!(streak.current_streak, 3);
    assert_eq!(streak.longest_streak, 3);

    let state = engine
        .store()
        .achievement_state("streak_3")
        .unwrap()
        .unwrap();
    assert!(state.is_complete);
    assert!(state.earned_at.is_some());
    assert!(state.progress_value >= 3);
}

#[test]
fn short_sessions_never_advance_the_streak() {
    let engine = engine();
    engine.timer_start(None, None, None, t0()).unwrap();
    engine.timer_stop(t0() + Duration::minutes(20)).unwrap();
    assert_eq!(engine.streak().unwrap().current_streak, 0);
}
