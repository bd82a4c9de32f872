//! Study sessions, the active-timer register, daily rollups, and learning
//! pattern rows.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::energy::TimeOfDay;
use crate::error::{CoreError, Result, StoreError};
use crate::patterns::LearningPattern;
use crate::session::{
    session_points, DailyStats, SessionEffectiveness, StudySession, DEEP_WORK_SECONDS,
    STREAK_MIN_SECONDS,
};
use crate::streak::UserStreak;

use super::{date_to_sql, dt_from_sql, dt_to_sql, opt_dt_from_sql, Store};

const SESSION_COLS: &str =
    "id, subject_code, chapter_id, title, started_at, stopped_at, duration_seconds,
     is_deep_work, points_earned";

/// Key under which the global learning pattern is stored.
const GLOBAL_PATTERN_KEY: &str = "*";

fn session_from_row(row: &Row) -> rusqlite::Result<(StudySession, String, Option<String>)> {
    Ok((
        StudySession {
            id: row.get(0)?,
            subject_code: row.get(1)?,
            chapter_id: row.get(2)?,
            title: row.get(3)?,
            started_at: NaiveDateTime::default(),
            stopped_at: None,
            duration_seconds: row.get(6)?,
            is_deep_work: row.get::<_, i64>(7)? != 0,
            points_earned: row.get(8)?,
        },
        row.get(4)?,
        row.get(5)?,
    ))
}

fn finish_session(
    parts: (StudySession, String, Option<String>),
) -> Result<StudySession, StoreError> {
    let (mut session, started, stopped) = parts;
    session.started_at = dt_from_sql(&started)?;
    session.stopped_at = opt_dt_from_sql(stopped)?;
    Ok(session)
}

/// Everything the atomic stop wrote, returned to the caller in one piece.
#[derive(Debug, Clone)]
pub struct StopOutcome {
    pub session: StudySession,
    pub effectiveness: SessionEffectiveness,
    pub streak: UserStreak,
    pub streak_advanced: bool,
    pub daily: DailyStats,
}

impl Store {
    /// Start a study session and point the active-timer register at it.
    /// Fails with `Conflict` while another timer is open.
    pub fn start_session(
        &self,
        subject_code: Option<&str>,
        chapter_id: Option<i64>,
        title: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<StudySession> {
        if let Some(code) = subject_code {
            crate::subject::validate_subject_code(code)?;
        }
        let mut conn = self.lock()?;
        if let Some(open) = super::kv_get::<i64>(&conn, super::ACTIVE_TIMER_KEY)? {
            return Err(CoreError::conflict(format!(
                "timer already running (session {open})"
            )));
        }
        let tx = conn.transaction().map_err(StoreError::Query)?;
        tx.execute(
            "INSERT INTO study_sessions (subject_code, chapter_id, title, started_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![subject_code, chapter_id, title, dt_to_sql(now)],
        )
        .map_err(StoreError::Query)?;
        let id = tx.last_insert_rowid();
        Store::set_active_timer(&tx, Some(id))?;
        tx.commit().map_err(StoreError::Query)?;
        drop(conn);
        self.session(id)
    }

    pub fn session(&self, id: i64) -> Result<StudySession> {
        let conn = self.lock()?;
        let parts = conn
            .query_row(
                &format!("SELECT {SESSION_COLS} FROM study_sessions WHERE id = ?1"),
                params![id],
                session_from_row,
            )
            .optional()
            .map_err(StoreError::Query)?
            .ok_or_else(|| CoreError::not_found("session", id))?;
        Ok(finish_session(parts)?)
    }

    /// The open session the active-timer register points at, if any.
    pub fn active_session(&self) -> Result<Option<StudySession>> {
        match self.active_timer()? {
            Some(id) => Ok(Some(self.session(id)?)),
            None => Ok(None),
        }
    }

    /// Atomic session stop.
    ///
    /// In one transaction: finalizes the session row (duration, deep-work
    /// flag, points), clears the active-timer register, rolls the day's
    /// stats forward, advances the streak when the session ran at least 30
    /// minutes, and appends the effectiveness record the pattern analyzer
    /// consumes. `energy_level` is the energy-curve reading at the start
    /// hour, supplied by the timer facade.
    pub fn stop_session(
        &self,
        now: NaiveDateTime,
        energy_level: Option<u8>,
    ) -> Result<StopOutcome> {
        let mut conn = self.lock()?;
        let session_id = super::kv_get::<i64>(&conn, super::ACTIVE_TIMER_KEY)?
            .ok_or_else(|| CoreError::precondition("no active timer"))?;

        let parts = conn
            .query_row(
                &format!("SELECT {SESSION_COLS} FROM study_sessions WHERE id = ?1"),
                params![session_id],
                session_from_row,
            )
            .optional()
            .map_err(StoreError::Query)?
            .ok_or_else(|| CoreError::not_found("session", session_id))?;
        let mut session = finish_session(parts)?;
        if session.stopped_at.is_some() {
            return Err(StoreError::Corrupt(format!(
                "active-timer register points at stopped session {session_id}"
            ))
            .into());
        }

        let duration = (now - session.started_at).num_seconds().max(0);
        let is_deep_work = duration >= DEEP_WORK_SECONDS;
        let points = session_points(duration);
        let date = session.started_at.date();

        session.stopped_at = Some(now);
        session.duration_seconds = Some(duration);
        session.is_deep_work = is_deep_work;
        session.points_earned = points;
        let effectiveness = SessionEffectiveness::derive(&session, duration, energy_level);

        let tx = conn.transaction().map_err(StoreError::Query)?;
        tx.execute(
            "UPDATE study_sessions
             SET stopped_at = ?1, duration_seconds = ?2, is_deep_work = ?3, points_earned = ?4
             WHERE id = ?5",
            params![
                dt_to_sql(now),
                duration,
                is_deep_work as i64,
                points,
                session_id
            ],
        )
        .map_err(StoreError::Query)?;
        Store::set_active_timer(&tx, None)?;

        tx.execute(
            "INSERT INTO daily_stats (date, study_seconds, deep_work_seconds, session_count, points)
             VALUES (?1, ?2, ?3, 1, ?4)
             ON CONFLICT(date) DO UPDATE SET
                study_seconds = study_seconds + excluded.study_seconds,
                deep_work_seconds = deep_work_seconds + excluded.deep_work_seconds,
                session_count = session_count + 1,
                points = points + excluded.points",
            params![
                date_to_sql(date),
                duration,
                if is_deep_work { duration } else { 0 },
                points
            ],
        )
        .map_err(StoreError::Query)?;

        let mut streak = Store::read_streak(&tx)?;
        let streak_advanced = if duration >= STREAK_MIN_SECONDS {
            streak.advance(date)
        } else {
            false
        };
        streak.add_points(points as u64);
        Store::write_streak(&tx, &streak)?;

        tx.execute(
            "INSERT INTO session_effectiveness
                (session_id, subject_code, time_of_day, day_of_week, duration_mins,
                 focus_score, energy_level, material_covered)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                effectiveness.session_id,
                effectiveness.subject_code,
                effectiveness.time_of_day.as_str(),
                effectiveness.day_of_week as i64,
                effectiveness.duration_mins as i64,
                effectiveness.focus_score,
                effectiveness.energy_level.map(|e| e as i64),
                effectiveness.material_covered,
            ],
        )
        .map_err(StoreError::Query)?;
        tx.commit().map_err(StoreError::Query)?;

        let daily = read_daily_stats(&conn, date)?;
        Ok(StopOutcome {
            session,
            effectiveness,
            streak,
            streak_advanced,
            daily,
        })
    }

    /// Completed sessions with `started_at` inside `[from, to)`.
    pub fn sessions_in_window(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<StudySession>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SESSION_COLS} FROM study_sessions
                 WHERE stopped_at IS NOT NULL AND started_at >= ?1 AND started_at < ?2
                 ORDER BY started_at ASC, id ASC"
            ))
            .map_err(StoreError::Query)?;
        let rows = stmt
            .query_map(params![dt_to_sql(from), dt_to_sql(to)], session_from_row)
            .map_err(StoreError::Query)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Query)?;
        rows.into_iter()
            .map(|p| finish_session(p).map_err(CoreError::from))
            .collect()
    }

    /// The day's aggregate (zeros when nothing was recorded).
    pub fn daily_stats(&self, date: NaiveDate) -> Result<DailyStats> {
        let conn = self.lock()?;
        read_daily_stats(&conn, date)
    }

    // ── Achievement counters ────────────────────────────────────────

    pub fn count_deep_work_sessions(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM study_sessions WHERE is_deep_work = 1",
                [],
                |row| row.get(0),
            )
            .map_err(StoreError::Query)?;
        Ok(count as u64)
    }

    /// Completed sessions started before `hour` o'clock (early-bird metric).
    pub fn count_sessions_started_before_hour(&self, hour: u8) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM study_sessions
                 WHERE stopped_at IS NOT NULL
                   AND CAST(strftime('%H', started_at) AS INTEGER) < ?1",
                params![hour as i64],
                |row| row.get(0),
            )
            .map_err(StoreError::Query)?;
        Ok(count as u64)
    }

    /// Productive late-night sessions: started between midnight and 05:00
    /// and at least 25 minutes long (night-owl metric).
    pub fn count_late_night_sessions(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM study_sessions
                 WHERE stopped_at IS NOT NULL
                   AND CAST(strftime('%H', started_at) AS INTEGER) < 5
                   AND duration_seconds >= 1500",
                [],
                |row| row.get(0),
            )
            .map_err(StoreError::Query)?;
        Ok(count as u64)
    }

    // ── Learning pattern rows ────────────────────────────────────────

    /// Pattern aggregate for a subject, or the global one for `None`.
    pub fn learning_pattern(&self, subject_code: Option<&str>) -> Result<Option<LearningPattern>> {
        let key = subject_code.unwrap_or(GLOBAL_PATTERN_KEY);
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT avg_duration_mins, best_study_time, effectiveness, samples_count, tod_stats
                 FROM learning_patterns WHERE pattern_key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, f64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(StoreError::Query)?;
        row.map(|(avg, tod, eff, samples, stats)| {
            Ok(LearningPattern {
                subject_code: subject_code.map(str::to_string),
                avg_duration_mins: avg,
                best_study_time: TimeOfDay::parse(&tod)
                    .ok_or_else(|| StoreError::Corrupt(format!("bad time_of_day '{tod}'")))?,
                effectiveness_score: eff,
                samples_count: samples as u32,
                tod_stats: serde_json::from_str(&stats).map_err(StoreError::from)?,
            })
        })
        .transpose()
        .map_err(CoreError::Backend)
    }

    pub fn upsert_learning_pattern(&self, pattern: &LearningPattern) -> Result<()> {
        let key = pattern.subject_code.as_deref().unwrap_or(GLOBAL_PATTERN_KEY);
        let stats = serde_json::to_string(&pattern.tod_stats).map_err(StoreError::from)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO learning_patterns
                (pattern_key, avg_duration_mins, best_study_time, effectiveness,
                 samples_count, tod_stats, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
             ON CONFLICT(pattern_key) DO UPDATE SET
                avg_duration_mins = excluded.avg_duration_mins,
                best_study_time = excluded.best_study_time,
                effectiveness = excluded.effectiveness,
                samples_count = excluded.samples_count,
                tod_stats = excluded.tod_stats,
                updated_at = excluded.updated_at",
            params![
                key,
                pattern.avg_duration_mins,
                pattern.best_study_time.as_str(),
                pattern.effectiveness_score,
                pattern.samples_count as i64,
                stats
            ],
        )
        .map_err(StoreError::Query)?;
        Ok(())
    }

    /// All per-subject patterns (the global row excluded), sorted by code.
    pub fn subject_learning_patterns(&self) -> Result<Vec<LearningPattern>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT pattern_key, avg_duration_mins, best_study_time, effectiveness,
                        samples_count, tod_stats
                 FROM learning_patterns WHERE pattern_key != ?1
                 ORDER BY pattern_key ASC",
            )
            .map_err(StoreError::Query)?;
        let rows = stmt
            .query_map(params![GLOBAL_PATTERN_KEY], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(StoreError::Query)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Query)?;
        rows.into_iter()
            .map(|(key, avg, tod, eff, samples, stats)| {
                Ok(LearningPattern {
                    subject_code: Some(key),
                    avg_duration_mins: avg,
                    best_study_time: TimeOfDay::parse(&tod)
                        .ok_or_else(|| StoreError::Corrupt(format!("bad time_of_day '{tod}'")))?,
                    effectiveness_score: eff,
                    samples_count: samples as u32,
                    tod_stats: serde_json::from_str(&stats).map_err(StoreError::from)?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()
            .map_err(CoreError::Backend)
    }
}

fn read_daily_stats(conn: &Connection, date: NaiveDate) -> Result<DailyStats> {
    let row = conn
        .query_row(
            "SELECT study_seconds, deep_work_seconds, session_count, points
             FROM daily_stats WHERE date = ?1",
            params![date_to_sql(date)],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )
        .optional()
        .map_err(StoreError::Query)?;
    Ok(match row {
        Some((study, deep, count, points)) => DailyStats {
            date: Some(date),
            study_seconds: study,
            deep_work_seconds: deep,
            session_count: count as u32,
            points,
        },
        None => DailyStats {
            date: Some(date),
            ..Default::default()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    #[test]
    fn double_start_is_conflict_and_leaves_state_unchanged() {
        let store = Store::open_memory().unwrap();
        let first = store
            .start_session(Some("MATH101"), None, Some("limits"), t0())
            .unwrap();
        let err = store
            .start_session(Some("PHYS102"), None, None, t0() + Duration::minutes(5))
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        assert_eq!(store.active_timer().unwrap(), Some(first.id));

        let conn = store.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM study_sessions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn stop_without_timer_is_precondition() {
        let store = Store::open_memory().unwrap();
        let err = store.stop_session(t0(), None).unwrap_err();
        assert!(matches!(err, CoreError::Precondition(_)));
    }

    #[test]
    fn deep_work_boundary_at_ninety_minutes() {
        let store = Store::open_memory().unwrap();
        store
            .start_session(Some("MATH101"), None, None, t0())
            .unwrap();
        let outcome = store
            .stop_session(t0() + Duration::seconds(5400), Some(9))
            .unwrap();
        assert!(outcome.session.is_deep_work);
        assert_eq!(outcome.session.duration_seconds, Some(5400));
        assert_eq!(outcome.session.points_earned, 9);
        assert_eq!(outcome.daily.study_seconds, 5400);
        assert_eq!(outcome.daily.deep_work_seconds, 5400);
        assert_eq!(outcome.daily.session_count, 1);
        assert!(outcome.streak_advanced);
        assert_eq!(outcome.streak.current_streak, 1);
        assert!(store.active_timer().unwrap().is_none());
    }

    #[test]
    fn short_session_earns_no_streak() {
        let store = Store::open_memory().unwrap();
        store.start_session(None, None, None, t0()).unwrap();
        let outcome = store
            .stop_session(t0() + Duration::seconds(1200), None)
            .unwrap();
        assert!(!outcome.streak_advanced);
        assert_eq!(outcome.streak.current_streak, 0);
        assert!(!outcome.session.is_deep_work);
        assert_eq!(outcome.session.points_earned, 2);
    }

    #[test]
    fn effectiveness_row_is_appended_atomically() {
        let store = Store::open_memory().unwrap();
        store
            .start_session(Some("MATH101"), None, Some("integrals"), t0())
            .unwrap();
        let outcome = store
            .stop_session(t0() + Duration::seconds(3600), Some(10))
            .unwrap();
        assert_eq!(outcome.effectiveness.duration_mins, 60);
        assert_eq!(outcome.effectiveness.energy_level, Some(10));

        let conn = store.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM session_effectiveness", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn two_sessions_same_day_accumulate_stats() {
        let store = Store::open_memory().unwrap();
        store.start_session(None, None, None, t0()).unwrap();
        store.stop_session(t0() + Duration::seconds(1800), None).unwrap();
        store
            .start_session(None, None, None, t0() + Duration::hours(3))
            .unwrap();
        store
            .stop_session(t0() + Duration::hours(3) + Duration::seconds(1800), None)
            .unwrap();

        let daily = store.daily_stats(t0().date()).unwrap();
        assert_eq!(daily.study_seconds, 3600);
        assert_eq!(daily.session_count, 2);
        // Second same-day streak advance is a no-op.
        assert_eq!(store.streak().unwrap().current_streak, 1);
    }

    #[test]
    fn pattern_rows_round_trip() {
        let store = Store::open_memory().unwrap();
        assert!(store.learning_pattern(Some("MATH101")).unwrap().is_none());

        let mut pattern = LearningPattern::empty(Some("MATH101".to_string()));
        pattern.ingest(&SessionEffectiveness {
            session_id: 1,
            subject_code: Some("MATH101".to_string()),
            time_of_day: TimeOfDay::Morning,
            day_of_week: 0,
            duration_mins: 60,
            focus_score: 0.8,
            energy_level: Some(9),
            material_covered: None,
        });
        store.upsert_learning_pattern(&pattern).unwrap();

        let loaded = store.learning_pattern(Some("MATH101")).unwrap().unwrap();
        assert_eq!(loaded.samples_count, 1);
        assert_eq!(loaded.best_study_time, TimeOfDay::Morning);
        assert!((loaded.avg_duration_mins - 60.0).abs() < 1e-9);
        assert_eq!(store.subject_learning_patterns().unwrap().len(), 1);
    }
}
