//! Study-session timer facade.
//!
//! Thin orchestration over the store's atomic session operations: start
//! enforces the single-active-timer invariant, stop finalizes the session
//! in one transaction and feeds the resulting effectiveness record to the
//! pattern analyzer.

use chrono::{NaiveDateTime, Timelike};

use crate::energy::EnergyCurve;
use crate::error::Result;
use crate::patterns::PatternAnalyzer;
use crate::session::{StudySession, TimerStatus, DEEP_WORK_SECONDS};
use crate::store::{Store, StopOutcome};

pub struct SessionTimer<'a> {
    store: &'a Store,
    curve: EnergyCurve,
}

impl<'a> SessionTimer<'a> {
    pub fn new(store: &'a Store, curve: EnergyCurve) -> Self {
        Self { store, curve }
    }

    /// Start the timer. `Conflict` while a session is already open.
    pub fn start(
        &self,
        subject_code: Option<&str>,
        chapter_id: Option<i64>,
        title: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<StudySession> {
        let session = self.store.start_session(subject_code, chapter_id, title, now)?;
        tracing::info!(
            session_id = session.id,
            subject = subject_code.unwrap_or("-"),
            "timer started"
        );
        Ok(session)
    }

    /// Stop the timer and fold the session into the learning patterns.
    pub fn stop(&self, now: NaiveDateTime) -> Result<StopOutcome> {
        let energy = self
            .store
            .active_session()?
            .map(|s| self.curve.level_at(s.started_at.hour() as u8));
        let outcome = self.store.stop_session(now, energy)?;
        PatternAnalyzer::new(self.store).ingest(&outcome.effectiveness)?;
        tracing::info!(
            session_id = outcome.session.id,
            duration_secs = outcome.session.duration_seconds.unwrap_or(0),
            deep_work = outcome.session.is_deep_work,
            points = outcome.session.points_earned,
            "timer stopped"
        );
        Ok(outcome)
    }

    /// Live view of the running timer, if any.
    pub fn status(&self, now: NaiveDateTime) -> Result<Option<TimerStatus>> {
        let Some(session) = self.store.active_session()? else {
            return Ok(None);
        };
        let elapsed_seconds = (now - session.started_at).num_seconds().max(0);
        Ok(Some(TimerStatus {
            deep_work_reached: elapsed_seconds >= DEEP_WORK_SECONDS,
            session,
            elapsed_seconds,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn timer(store: &Store) -> SessionTimer<'_> {
        SessionTimer::new(store, EnergyCurve::default())
    }

    #[test]
    fn status_reports_elapsed_and_deep_work_flag() {
        let store = Store::open_memory().unwrap();
        let timer = timer(&store);
        assert!(timer.status(t0()).unwrap().is_none());

        timer.start(Some("MATH101"), None, None, t0()).unwrap();
        let status = timer.status(t0() + Duration::seconds(600)).unwrap().unwrap();
        assert_eq!(status.elapsed_seconds, 600);
        assert!(!status.deep_work_reached);

        let status = timer.status(t0() + Duration::seconds(5400)).unwrap().unwrap();
        assert!(status.deep_work_reached);
    }

    #[test]
    fn stop_feeds_pattern_analyzer() {
        let store = Store::open_memory().unwrap();
        let timer = timer(&store);
        timer.start(Some("MATH101"), None, None, t0()).unwrap();
        let outcome = timer.stop(t0() + Duration::seconds(3600)).unwrap();
        // 09:00 on the default curve reads level 10.
        assert_eq!(outcome.effectiveness.energy_level, Some(10));

        let pattern = store.learning_pattern(Some("MATH101")).unwrap().unwrap();
        assert_eq!(pattern.samples_count, 1);
        // The global pattern is updated alongside the subject's.
        let global = store.learning_pattern(None).unwrap().unwrap();
        assert_eq!(global.samples_count, 1);
    }

    #[test]
    fn double_start_leaves_original_session() {
        let store = Store::open_memory().unwrap();
        let timer = timer(&store);
        let first = timer.start(Some("MATH101"), None, None, t0()).unwrap();
        let err = timer
            .start(Some("PHYS102"), None, None, t0() + Duration::minutes(1))
            .unwrap_err();
        assert!(matches!(err, crate::error::CoreError::Conflict(_)));
        let status = timer.status(t0() + Duration::minutes(2)).unwrap().unwrap();
        assert_eq!(status.session.id, first.id);
        assert_eq!(status.session.subject_code.as_deref(), Some("MATH101"));
    }
}
