//! Break sessions and wellbeing snapshots.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, OptionalExtension, Row};

use crate::error::{CoreError, Result, StoreError};
use crate::wellbeing::{BreakSession, BreakType, StressLevel, WellbeingMetric};

use super::{date_from_sql, date_to_sql, dt_from_sql, dt_to_sql, opt_dt_from_sql, Store};

const BREAK_COLS: &str =
    "id, break_type, started_at, ended_at, suggested_duration_mins, actual_duration_mins,
     was_completed";

fn break_from_row(row: &Row) -> rusqlite::Result<(BreakSession, String, String, Option<String>)> {
    Ok((
        BreakSession {
            id: row.get(0)?,
            break_type: BreakType::Short, // patched below
            started_at: NaiveDateTime::default(),
            ended_at: None,
            suggested_duration_mins: row.get::<_, i64>(4)? as u16,
            actual_duration_mins: row.get::<_, Option<i64>>(5)?.map(|m| m as u16),
            was_completed: row.get::<_, i64>(6)? != 0,
        },
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
    ))
}

fn finish_break(
    parts: (BreakSession, String, String, Option<String>),
) -> Result<BreakSession, StoreError> {
    let (mut brk, kind, started, ended) = parts;
    brk.break_type = BreakType::parse(&kind).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    brk.started_at = dt_from_sql(&started)?;
    brk.ended_at = opt_dt_from_sql(ended)?;
    Ok(brk)
}

impl Store {
    /// Start a break. A still-open break is a conflict; end it first.
    pub fn start_break(
        &self,
        break_type: BreakType,
        suggested_duration_mins: u16,
        now: NaiveDateTime,
    ) -> Result<BreakSession> {
        let conn = self.lock()?;
        let open: Option<i64> = conn
            .query_row(
                "SELECT id FROM break_sessions WHERE ended_at IS NULL LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::Query)?;
        if let Some(id) = open {
            return Err(CoreError::conflict(format!("break {id} still running")));
        }
        conn.execute(
            "INSERT INTO break_sessions (break_type, started_at, suggested_duration_mins)
             VALUES (?1, ?2, ?3)",
            params![
                break_type.as_str(),
                dt_to_sql(now),
                suggested_duration_mins as i64
            ],
        )
        .map_err(StoreError::Query)?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.break_session(id)
    }

    /// End a break. A break counts as completed when it ran at least half
    /// its suggested length (unless the caller overrides the verdict).
    pub fn end_break(
        &self,
        id: i64,
        completed: Option<bool>,
        now: NaiveDateTime,
    ) -> Result<BreakSession> {
        let brk = self.break_session(id)?;
        if brk.ended_at.is_some() {
            return Err(CoreError::precondition(format!("break {id} already ended")));
        }
        let actual = ((now - brk.started_at).num_minutes()).max(0) as u16;
        let was_completed =
            completed.unwrap_or(actual * 2 >= brk.suggested_duration_mins);
        let conn = self.lock()?;
        conn.execute(
            "UPDATE break_sessions
             SET ended_at = ?1, actual_duration_mins = ?2, was_completed = ?3
             WHERE id = ?4",
            params![dt_to_sql(now), actual as i64, was_completed as i64, id],
        )
        .map_err(StoreError::Query)?;
        drop(conn);
        self.break_session(id)
    }

    pub fn break_session(&self, id: i64) -> Result<BreakSession> {
        let conn = self.lock()?;
        let parts = conn
            .query_row(
                &format!("SELECT {BREAK_COLS} FROM break_sessions WHERE id = ?1"),
                params![id],
                break_from_row,
            )
            .optional()
            .map_err(StoreError::Query)?
            .ok_or_else(|| CoreError::not_found("break", id))?;
        Ok(finish_break(parts)?)
    }

    /// The still-open break, if any.
    pub fn active_break(&self) -> Result<Option<BreakSession>> {
        let conn = self.lock()?;
        let parts = conn
            .query_row(
                &format!("SELECT {BREAK_COLS} FROM break_sessions WHERE ended_at IS NULL LIMIT 1"),
                [],
                break_from_row,
            )
            .optional()
            .map_err(StoreError::Query)?;
        parts
            .map(|p| finish_break(p).map_err(CoreError::from))
            .transpose()
    }

    /// `(completed_count, completed_minutes, skipped_count)` for a date.
    pub fn break_stats(&self, date: NaiveDate) -> Result<(u32, u32, u32)> {
        let day_start = format!("{} 00:00:00", date_to_sql(date));
        let day_end = format!("{} 23:59:59", date_to_sql(date));
        let conn = self.lock()?;
        conn.query_row(
            "SELECT
                SUM(CASE WHEN was_completed = 1 THEN 1 ELSE 0 END),
                COALESCE(SUM(CASE WHEN was_completed = 1 THEN actual_duration_mins ELSE 0 END), 0),
                SUM(CASE WHEN was_completed = 0 AND ended_at IS NOT NULL THEN 1 ELSE 0 END)
             FROM break_sessions
             WHERE started_at >= ?1 AND started_at <= ?2",
            params![day_start, day_end],
            |row| {
                Ok((
                    row.get::<_, Option<i64>>(0)?.unwrap_or(0) as u32,
                    row.get::<_, i64>(1)? as u32,
                    row.get::<_, Option<i64>>(2)?.unwrap_or(0) as u32,
                ))
            },
        )
        .map_err(StoreError::Query)
        .map_err(CoreError::from)
    }

    /// Deep-work sessions recorded on a date.
    pub fn deep_work_session_count(&self, date: NaiveDate) -> Result<u32> {
        let day_start = format!("{} 00:00:00", date_to_sql(date));
        let day_end = format!("{} 23:59:59", date_to_sql(date));
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM study_sessions
                 WHERE is_deep_work = 1 AND stopped_at IS NOT NULL
                   AND started_at >= ?1 AND started_at <= ?2",
                params![day_start, day_end],
                |row| row.get(0),
            )
            .map_err(StoreError::Query)?;
        Ok(count as u32)
    }

    /// Write (or rewrite) the day's wellbeing snapshot.
    pub fn upsert_wellbeing(&self, metric: &WellbeingMetric) -> Result<()> {
        let recommendations =
            serde_json::to_string(&metric.recommendations).map_err(StoreError::from)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO wellbeing_metrics
                (date, study_hours, break_count, overdue_tasks, deep_work_sessions,
                 score, stress_level, recommendations)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(date) DO UPDATE SET
                study_hours = excluded.study_hours,
                break_count = excluded.break_count,
                overdue_tasks = excluded.overdue_tasks,
                deep_work_sessions = excluded.deep_work_sessions,
                score = excluded.score,
                stress_level = excluded.stress_level,
                recommendations = excluded.recommendations",
            params![
                date_to_sql(metric.date),
                metric.study_hours,
                metric.break_count as i64,
                metric.overdue_tasks as i64,
                metric.deep_work_sessions as i64,
                metric.score,
                metric.stress_level.as_str(),
                recommendations
            ],
        )
        .map_err(StoreError::Query)?;
        Ok(())
    }

    pub fn wellbeing_for(&self, date: NaiveDate) -> Result<Option<WellbeingMetric>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT date, study_hours, break_count, overdue_tasks, deep_work_sessions,
                        score, stress_level, recommendations
                 FROM wellbeing_metrics WHERE date = ?1",
                params![date_to_sql(date)],
                wellbeing_row,
            )
            .optional()
            .map_err(StoreError::Query)?;
        row.map(finish_wellbeing).transpose().map_err(CoreError::from)
    }

    /// Snapshots for the last `days` days, oldest first.
    pub fn wellbeing_history(&self, today: NaiveDate, days: u32) -> Result<Vec<WellbeingMetric>> {
        let from = date_to_sql(today - chrono::Duration::days(days as i64));
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT date, study_hours, break_count, overdue_tasks, deep_work_sessions,
                        score, stress_level, recommendations
                 FROM wellbeing_metrics WHERE date >= ?1
                 ORDER BY date ASC",
            )
            .map_err(StoreError::Query)?;
        let rows = stmt
            .query_map(params![from], wellbeing_row)
            .map_err(StoreError::Query)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Query)?;
        rows.into_iter()
            .map(|r| finish_wellbeing(r).map_err(CoreError::from))
            .collect()
    }
}

type WellbeingRow = (String, f64, i64, i64, i64, f64, String, String);

fn wellbeing_row(row: &Row) -> rusqlite::Result<WellbeingRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn finish_wellbeing(row: WellbeingRow) -> Result<WellbeingMetric, StoreError> {
    Ok(WellbeingMetric {
        date: date_from_sql(&row.0)?,
        study_hours: row.1,
        break_count: row.2 as u32,
        overdue_tasks: row.3 as u32,
        deep_work_sessions: row.4 as u32,
        score: row.5,
        stress_level: StressLevel::parse(&row.6).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        recommendations: serde_json::from_str(&row.7)?,
    })
}
