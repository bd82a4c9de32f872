//! SQLite-backed state store.
//!
//! One process-wide [`Store`] owns every durable record. All mutations on a
//! single connection behind a mutex, so entity updates are serialized; the
//! cross-row invariants (stop-session, chapter-completion, revision
//! completion) each run inside one SQLite transaction in their own method.
//!
//! Singletons (active timer, pomodoro phase, streak) are register cells in
//! the `kv` table holding JSON values, exposed through typed accessors.

mod catalog;
mod notifications;
mod sessions;
mod tasks;
mod wellbeing;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::streak::UserStreak;

pub use sessions::StopOutcome;

const ACTIVE_TIMER_KEY: &str = "active_timer";
const STREAK_KEY: &str = "streak";
const POMODORO_KEY: &str = "pomodoro";

/// Process-wide transactional state.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open the store at the given path, creating the schema if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(StoreError::Query)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open the default store at `~/.studyos/studyos.db`.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::config::data_dir().join("studyos.db"))
    }

    /// Open an in-memory store (tests and dry runs).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::Query)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Unavailable)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS subjects (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                code        TEXT NOT NULL UNIQUE,
                name        TEXT NOT NULL,
                credits     INTEGER NOT NULL,
                kind        TEXT NOT NULL,
                color       TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chapters (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_id  INTEGER NOT NULL REFERENCES subjects(id),
                number      INTEGER NOT NULL,
                title       TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                UNIQUE(subject_id, number)
            );

            CREATE TABLE IF NOT EXISTS chapter_progress (
                chapter_id        INTEGER PRIMARY KEY REFERENCES chapters(id),
                reading_status    TEXT NOT NULL,
                assignment_status TEXT NOT NULL,
                mastery_level     INTEGER NOT NULL DEFAULT 0,
                revision_count    INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                title           TEXT NOT NULL,
                subject_code    TEXT,
                priority        INTEGER NOT NULL,
                duration_mins   INTEGER NOT NULL,
                scheduled_start TEXT,
                scheduled_end   TEXT,
                deadline        TEXT,
                status          TEXT NOT NULL,
                is_deep_work    INTEGER NOT NULL DEFAULT 0,
                task_type       TEXT NOT NULL,
                origin          TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_scheduled_start ON tasks(scheduled_start);
            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);

            CREATE TABLE IF NOT EXISTS lab_reports (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_code TEXT NOT NULL,
                title        TEXT NOT NULL,
                due_date     TEXT NOT NULL,
                deadline     TEXT NOT NULL,
                status       TEXT NOT NULL,
                created_at   TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS revisions (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                chapter_id      INTEGER NOT NULL REFERENCES chapters(id),
                revision_number INTEGER NOT NULL,
                due_date        TEXT NOT NULL,
                completed       INTEGER NOT NULL DEFAULT 0,
                completed_at    TEXT,
                points_earned   INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_revisions_due ON revisions(completed, due_date);

            CREATE TABLE IF NOT EXISTS study_sessions (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_code     TEXT,
                chapter_id       INTEGER,
                title            TEXT,
                started_at       TEXT NOT NULL,
                stopped_at       TEXT,
                duration_seconds INTEGER,
                is_deep_work     INTEGER NOT NULL DEFAULT 0,
                points_earned    INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_started ON study_sessions(started_at);

            CREATE TABLE IF NOT EXISTS session_effectiveness (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id       INTEGER NOT NULL REFERENCES study_sessions(id),
                subject_code     TEXT,
                time_of_day      TEXT NOT NULL,
                day_of_week      INTEGER NOT NULL,
                duration_mins    INTEGER NOT NULL,
                focus_score      REAL NOT NULL,
                energy_level     INTEGER,
                material_covered TEXT
            );

            CREATE TABLE IF NOT EXISTS learning_patterns (
                pattern_key       TEXT PRIMARY KEY,
                avg_duration_mins REAL NOT NULL,
                best_study_time   TEXT NOT NULL,
                effectiveness     REAL NOT NULL,
                samples_count     INTEGER NOT NULL,
                tod_stats         TEXT NOT NULL,
                updated_at        TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS daily_stats (
                date              TEXT PRIMARY KEY,
                study_seconds     INTEGER NOT NULL DEFAULT 0,
                deep_work_seconds INTEGER NOT NULL DEFAULT 0,
                session_count     INTEGER NOT NULL DEFAULT 0,
                points            INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS break_sessions (
                id                      INTEGER PRIMARY KEY AUTOINCREMENT,
                break_type              TEXT NOT NULL,
                started_at              TEXT NOT NULL,
                ended_at                TEXT,
                suggested_duration_mins INTEGER NOT NULL,
                actual_duration_mins    INTEGER,
                was_completed           INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS wellbeing_metrics (
                date               TEXT PRIMARY KEY,
                study_hours        REAL NOT NULL,
                break_count        INTEGER NOT NULL,
                overdue_tasks      INTEGER NOT NULL,
                deep_work_sessions INTEGER NOT NULL,
                score              REAL NOT NULL,
                stress_level       TEXT NOT NULL,
                recommendations    TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                kind          TEXT NOT NULL,
                priority      TEXT NOT NULL,
                title         TEXT NOT NULL,
                message       TEXT NOT NULL,
                created_at    TEXT NOT NULL,
                scheduled_for TEXT NOT NULL,
                sent_at       TEXT,
                read_at       TEXT,
                dismissed_at  TEXT,
                expires_at    TEXT,
                action_url    TEXT,
                action_label  TEXT,
                action_data   TEXT,
                dedup_key     TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_notifications_pending ON notifications(sent_at, scheduled_for);
            CREATE INDEX IF NOT EXISTS idx_notifications_dedup ON notifications(dedup_key);

            CREATE TABLE IF NOT EXISTS notification_preferences (
                kind            TEXT PRIMARY KEY,
                enabled         INTEGER NOT NULL DEFAULT 1,
                quiet_start     TEXT,
                quiet_end       TEXT,
                frequency_limit INTEGER,
                channels        TEXT NOT NULL DEFAULT '[]'
            );

            CREATE TABLE IF NOT EXISTS user_achievements (
                code           TEXT PRIMARY KEY,
                progress_value INTEGER NOT NULL DEFAULT 0,
                is_complete    INTEGER NOT NULL DEFAULT 0,
                earned_at      TEXT,
                notified       INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS guidelines (
                id       INTEGER PRIMARY KEY AUTOINCREMENT,
                rule     TEXT NOT NULL,
                priority INTEGER NOT NULL,
                active   INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS memory_facts (
                category   TEXT NOT NULL,
                key        TEXT NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY(category, key)
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(())
    }

    // ── Register cells ───────────────────────────────────────────────

    /// Session id of the open timer, if any.
    pub fn active_timer(&self) -> Result<Option<i64>> {
        let conn = self.lock()?;
        Ok(kv_get(&conn, ACTIVE_TIMER_KEY)?)
    }

    /// Current streak register.
    pub fn streak(&self) -> Result<UserStreak> {
        let conn = self.lock()?;
        Ok(kv_get(&conn, STREAK_KEY)?.unwrap_or_default())
    }

    pub(crate) fn write_streak(conn: &Connection, streak: &UserStreak) -> Result<(), StoreError> {
        kv_set(conn, STREAK_KEY, streak)
    }

    pub(crate) fn read_streak(conn: &Connection) -> Result<UserStreak, StoreError> {
        Ok(kv_get(conn, STREAK_KEY)?.unwrap_or_default())
    }

    pub(crate) fn set_active_timer(
        conn: &Connection,
        session_id: Option<i64>,
    ) -> Result<(), StoreError> {
        match session_id {
            Some(id) => kv_set(conn, ACTIVE_TIMER_KEY, &id),
            None => {
                conn.execute("DELETE FROM kv WHERE key = ?1", params![ACTIVE_TIMER_KEY])?;
                Ok(())
            }
        }
    }

    /// Pomodoro phase register.
    pub fn pomodoro(&self) -> Result<crate::wellbeing::PomodoroStatus> {
        let conn = self.lock()?;
        Ok(kv_get(&conn, POMODORO_KEY)?.unwrap_or_default())
    }

    pub fn set_pomodoro(&self, status: &crate::wellbeing::PomodoroStatus) -> Result<()> {
        let conn = self.lock()?;
        kv_set(&conn, POMODORO_KEY, status)?;
        Ok(())
    }
}

fn kv_get<T: serde::de::DeserializeOwned>(
    conn: &Connection,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

fn kv_set<T: serde::Serialize>(conn: &Connection, key: &str, value: &T) -> Result<(), StoreError> {
    let text = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO kv (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, text],
    )?;
    Ok(())
}

// ── SQL text encodings ──────────────────────────────────────────────
//
// Timestamps are stored as `YYYY-MM-DD HH:MM:SS`, dates as `YYYY-MM-DD`;
// both compare correctly as strings.

pub(crate) fn dt_to_sql(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub(crate) fn dt_from_sql(s: &str) -> Result<NaiveDateTime, StoreError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map_err(|_| StoreError::Corrupt(format!("bad timestamp '{s}'")))
}

pub(crate) fn opt_dt_from_sql(s: Option<String>) -> Result<Option<NaiveDateTime>, StoreError> {
    s.map(|s| dt_from_sql(&s)).transpose()
}

pub(crate) fn date_to_sql(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub(crate) fn date_from_sql(s: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| StoreError::Corrupt(format!("bad date '{s}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_memory_and_registers() {
        let store = Store::open_memory().unwrap();
        assert!(store.active_timer().unwrap().is_none());
        assert_eq!(store.streak().unwrap(), UserStreak::default());
    }

    #[test]
    fn datetime_round_trip() {
        let dt = NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert_eq!(dt_from_sql(&dt_to_sql(dt)).unwrap(), dt);
        let d = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        assert_eq!(date_from_sql(&date_to_sql(d)).unwrap(), d);
    }

    #[test]
    fn kv_round_trip() {
        let store = Store::open_memory().unwrap();
        let conn = store.lock().unwrap();
        kv_set(&conn, "answer", &42i64).unwrap();
        assert_eq!(kv_get::<i64>(&conn, "answer").unwrap(), Some(42));
        assert_eq!(kv_get::<i64>(&conn, "missing").unwrap(), None);
    }
}
