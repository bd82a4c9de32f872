//! Tasks and lab reports.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{CoreError, Result, StoreError, ValidationError};
use crate::task::{LabReport, LabStatus, NewTask, Task, TaskPatch, TaskStatus, TaskType};

use super::{date_to_sql, dt_from_sql, dt_to_sql, opt_dt_from_sql, Store};

const TASK_COLS: &str = "id, title, subject_code, priority, duration_mins, scheduled_start,
    scheduled_end, deadline, status, is_deep_work, task_type, origin, created_at, updated_at";

struct TaskRow {
    task: Task,
    start: Option<String>,
    end: Option<String>,
    deadline: Option<String>,
    status: String,
    task_type: String,
    created: String,
    updated: String,
}

fn task_from_row(row: &Row) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        task: Task {
            id: row.get(0)?,
            title: row.get(1)?,
            subject_code: row.get(2)?,
            priority: row.get::<_, i64>(3)? as u8,
            duration_mins: row.get::<_, i64>(4)? as u16,
            scheduled_start: None,
            scheduled_end: None,
            deadline: None,
            status: TaskStatus::Pending,
            is_deep_work: row.get::<_, i64>(9)? != 0,
            task_type: TaskType::Study,
            origin: row.get(11)?,
            created_at: NaiveDateTime::default(),
            updated_at: NaiveDateTime::default(),
        },
        start: row.get(5)?,
        end: row.get(6)?,
        deadline: row.get(7)?,
        status: row.get(8)?,
        task_type: row.get(10)?,
        created: row.get(12)?,
        updated: row.get(13)?,
    })
}

fn finish_task(row: TaskRow) -> Result<Task, StoreError> {
    let mut task = row.task;
    task.scheduled_start = opt_dt_from_sql(row.start)?;
    task.scheduled_end = opt_dt_from_sql(row.end)?;
    task.deadline = opt_dt_from_sql(row.deadline)?;
    task.status = TaskStatus::parse(&row.status).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    task.task_type =
        TaskType::parse(&row.task_type).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    task.created_at = dt_from_sql(&row.created)?;
    task.updated_at = dt_from_sql(&row.updated)?;
    Ok(task)
}

impl Store {
    pub fn create_task(&self, new: &NewTask, now: NaiveDateTime) -> Result<Task> {
        self.create_task_inner(new, None, now)
    }

    /// Create a task synthesized by the placer, stamped with its origin so
    /// later optimizer runs skip the source item.
    pub fn create_origin_task(
        &self,
        new: &NewTask,
        origin: &str,
        now: NaiveDateTime,
    ) -> Result<Task> {
        self.create_task_inner(new, Some(origin), now)
    }

    fn create_task_inner(
        &self,
        new: &NewTask,
        origin: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<Task> {
        new.validate()?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO tasks (title, subject_code, priority, duration_mins, deadline,
                                status, is_deep_work, task_type, origin, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                new.title,
                new.subject_code,
                new.priority as i64,
                new.duration_mins as i64,
                new.deadline.map(dt_to_sql),
                TaskStatus::Pending.as_str(),
                new.is_deep_work as i64,
                new.task_type.as_str(),
                origin,
                dt_to_sql(now),
            ],
        )
        .map_err(StoreError::Query)?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.task(id)
    }

    /// Is there an open task that was synthesized from `origin`?
    pub fn has_open_task_with_origin(&self, origin: &str) -> Result<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM tasks
                 WHERE origin = ?1 AND status IN ('pending', 'in_progress')
                 LIMIT 1",
                params![origin],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::Query)?;
        Ok(found.is_some())
    }

    pub fn task(&self, id: i64) -> Result<Task> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {TASK_COLS} FROM tasks WHERE id = ?1"),
                params![id],
                task_from_row,
            )
            .optional()
            .map_err(StoreError::Query)?
            .ok_or_else(|| CoreError::not_found("task", id))?;
        Ok(finish_task(row)?)
    }

    /// Apply a partial update. Changing the duration of a placed task moves
    /// its end so the `end - start = duration` invariant holds, re-checking
    /// overlap. Applying the same patch twice is a no-op after the first.
    pub fn update_task(&self, id: i64, patch: &TaskPatch, now: NaiveDateTime) -> Result<Task> {
        let current = self.task(id)?;

        let title = patch.title.clone().unwrap_or(current.title.clone());
        let priority = patch.priority.unwrap_or(current.priority);
        let duration = patch.duration_mins.unwrap_or(current.duration_mins);
        let deadline = match &patch.deadline {
            Some(value) => *value,
            None => current.deadline,
        };
        let status = patch.status.unwrap_or(current.status);
        let task_type = patch.task_type.unwrap_or(current.task_type);

        if duration == 0 {
            return Err(ValidationError::InvalidValue {
                field: "duration_mins",
                message: "must be positive".to_string(),
            }
            .into());
        }
        if !(1..=10).contains(&priority) {
            return Err(ValidationError::InvalidValue {
                field: "priority",
                message: format!("{priority} not in 1..=10"),
            }
            .into());
        }

        let new_end = current
            .scheduled_start
            .map(|start| start + Duration::minutes(duration as i64));

        // Applying the same patch again must not touch the row.
        if title == current.title
            && priority == current.priority
            && duration == current.duration_mins
            && deadline == current.deadline
            && status == current.status
            && task_type == current.task_type
            && new_end == current.scheduled_end
        {
            return Ok(current);
        }

        if let (Some(start), Some(end)) = (current.scheduled_start, new_end) {
            let conn = self.lock()?;
            check_no_overlap(&conn, id, start, end)?;
        }

        let conn = self.lock()?;
        conn.execute(
            "UPDATE tasks SET title = ?1, priority = ?2, duration_mins = ?3, deadline = ?4,
                              status = ?5, task_type = ?6, scheduled_end = ?7, updated_at = ?8
             WHERE id = ?9",
            params![
                title,
                priority as i64,
                duration as i64,
                deadline.map(dt_to_sql),
                status.as_str(),
                task_type.as_str(),
                new_end.map(dt_to_sql),
                dt_to_sql(now),
                id,
            ],
        )
        .map_err(StoreError::Query)?;
        drop(conn);
        self.task(id)
    }

    pub fn delete_task(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])
            .map_err(StoreError::Query)?;
        if changed == 0 {
            return Err(CoreError::not_found("task", id));
        }
        Ok(())
    }

    /// Assign a start slot to a task. Idempotent on an identical start;
    /// conflicts with another placed open task on the same day are refused.
    pub fn place_task(&self, id: i64, start: NaiveDateTime, now: NaiveDateTime) -> Result<Task> {
        let task = self.task(id)?;
        if !task.status.is_open() {
            return Err(CoreError::precondition(format!(
                "task {id} is {}",
                task.status.as_str()
            )));
        }
        if task.scheduled_start == Some(start) {
            return Ok(task);
        }
        let end = start + Duration::minutes(task.duration_mins as i64);

        let conn = self.lock()?;
        check_no_overlap(&conn, id, start, end)?;
        conn.execute(
            "UPDATE tasks SET scheduled_start = ?1, scheduled_end = ?2, updated_at = ?3
             WHERE id = ?4",
            params![dt_to_sql(start), dt_to_sql(end), dt_to_sql(now), id],
        )
        .map_err(StoreError::Query)?;
        drop(conn);
        self.task(id)
    }

    /// Remove a task's placement and return it to the pending pool.
    pub fn clear_placement(&self, id: i64, now: NaiveDateTime) -> Result<Task> {
        let task = self.task(id)?;
        if task.status == TaskStatus::Completed || task.status == TaskStatus::Cancelled {
            return Err(CoreError::precondition(format!(
                "task {id} is {}",
                task.status.as_str()
            )));
        }
        let conn = self.lock()?;
        conn.execute(
            "UPDATE tasks SET scheduled_start = NULL, scheduled_end = NULL,
                              status = ?1, updated_at = ?2
             WHERE id = ?3",
            params![TaskStatus::Pending.as_str(), dt_to_sql(now), id],
        )
        .map_err(StoreError::Query)?;
        drop(conn);
        self.task(id)
    }

    pub fn complete_task(&self, id: i64, now: NaiveDateTime) -> Result<Task> {
        let task = self.task(id)?;
        if task.status == TaskStatus::Completed {
            return Err(CoreError::precondition("task already completed"));
        }
        let conn = self.lock()?;
        conn.execute(
            "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![TaskStatus::Completed.as_str(), dt_to_sql(now), id],
        )
        .map_err(StoreError::Query)?;
        drop(conn);
        self.task(id)
    }

    /// Placed, non-cancelled tasks whose start falls on `date`.
    pub fn tasks_for_date(&self, date: NaiveDate) -> Result<Vec<Task>> {
        let day_start = format!("{} 00:00:00", date_to_sql(date));
        let day_end = format!("{} 23:59:59", date_to_sql(date));
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TASK_COLS} FROM tasks
                 WHERE scheduled_start >= ?1 AND scheduled_start <= ?2 AND status != ?3
                 ORDER BY scheduled_start ASC, id ASC"
            ))
            .map_err(StoreError::Query)?;
        let rows = stmt
            .query_map(
                params![day_start, day_end, TaskStatus::Cancelled.as_str()],
                task_from_row,
            )
            .map_err(StoreError::Query)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Query)?;
        rows.into_iter()
            .map(|r| finish_task(r).map_err(CoreError::from))
            .collect()
    }

    /// Open tasks placed inside `[from, to]` (inclusive dates).
    pub fn placed_open_tasks_in_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Task>> {
        let range_start = format!("{} 00:00:00", date_to_sql(from));
        let range_end = format!("{} 23:59:59", date_to_sql(to));
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TASK_COLS} FROM tasks
                 WHERE scheduled_start >= ?1 AND scheduled_start <= ?2
                   AND status IN ('pending', 'in_progress')
                 ORDER BY scheduled_start ASC, id ASC"
            ))
            .map_err(StoreError::Query)?;
        let rows = stmt
            .query_map(params![range_start, range_end], task_from_row)
            .map_err(StoreError::Query)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Query)?;
        rows.into_iter()
            .map(|r| finish_task(r).map_err(CoreError::from))
            .collect()
    }

    /// Open tasks with no placement yet, oldest first.
    pub fn unplaced_open_tasks(&self) -> Result<Vec<Task>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TASK_COLS} FROM tasks
                 WHERE scheduled_start IS NULL AND status IN ('pending', 'in_progress')
                 ORDER BY id ASC"
            ))
            .map_err(StoreError::Query)?;
        let rows = stmt
            .query_map([], task_from_row)
            .map_err(StoreError::Query)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Query)?;
        rows.into_iter()
            .map(|r| finish_task(r).map_err(CoreError::from))
            .collect()
    }

    /// Open tasks whose deadline or scheduled end has already passed.
    pub fn overdue_open_tasks(&self, now: NaiveDateTime) -> Result<Vec<Task>> {
        let cutoff = dt_to_sql(now);
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {TASK_COLS} FROM tasks
                 WHERE status IN ('pending', 'in_progress')
                   AND ((deadline IS NOT NULL AND deadline < ?1)
                        OR (scheduled_end IS NOT NULL AND scheduled_end < ?1))
                 ORDER BY id ASC"
            ))
            .map_err(StoreError::Query)?;
        let rows = stmt
            .query_map(params![cutoff], task_from_row)
            .map_err(StoreError::Query)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Query)?;
        rows.into_iter()
            .map(|r| finish_task(r).map_err(CoreError::from))
            .collect()
    }

    /// Lifetime count of completed tasks (achievement counter).
    pub fn count_completed_tasks(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM tasks WHERE status = 'completed'",
                [],
                |row| row.get(0),
            )
            .map_err(StoreError::Query)?;
        Ok(count as u64)
    }

    /// Dates in the last `days` days where every placed task was completed
    /// and at least one task existed (achievement counter).
    pub fn count_perfect_days(&self, today: NaiveDate, days: u32) -> Result<u32> {
        let from = format!("{} 00:00:00", date_to_sql(today - Duration::days(days as i64)));
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT DATE(scheduled_start),
                        SUM(CASE WHEN status = 'completed' THEN 0 ELSE 1 END)
                 FROM tasks
                 WHERE scheduled_start IS NOT NULL AND scheduled_start >= ?1
                   AND status != 'cancelled'
                 GROUP BY DATE(scheduled_start)",
            )
            .map_err(StoreError::Query)?;
        let rows = stmt
            .query_map(params![from], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(StoreError::Query)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Query)?;
        Ok(rows.iter().filter(|(_, open)| *open == 0).count() as u32)
    }

    // ── Lab reports ──────────────────────────────────────────────────

    pub fn create_lab_report(
        &self,
        subject_code: &str,
        title: &str,
        due_date: NaiveDate,
        deadline: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<LabReport> {
        crate::subject::validate_subject_code(subject_code)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO lab_reports (subject_code, title, due_date, deadline, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                subject_code,
                title,
                date_to_sql(due_date),
                dt_to_sql(deadline),
                LabStatus::Pending.as_str(),
                dt_to_sql(now)
            ],
        )
        .map_err(StoreError::Query)?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.lab_report(id)
    }

    pub fn lab_report(&self, id: i64) -> Result<LabReport> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, subject_code, title, due_date, deadline, status, created_at
                 FROM lab_reports WHERE id = ?1",
                params![id],
                lab_from_row,
            )
            .optional()
            .map_err(StoreError::Query)?
            .ok_or_else(|| CoreError::not_found("lab_report", id))?;
        Ok(finish_lab(row)?)
    }

    pub fn update_lab_status(&self, id: i64, status: LabStatus) -> Result<LabReport> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE lab_reports SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )
            .map_err(StoreError::Query)?;
        if changed == 0 {
            return Err(CoreError::not_found("lab_report", id));
        }
        drop(conn);
        self.lab_report(id)
    }

    /// Unsubmitted lab reports due within `days` of `today`, soonest first.
    pub fn labs_due_within(&self, today: NaiveDate, days: i64) -> Result<Vec<LabReport>> {
        let cutoff = date_to_sql(today + Duration::days(days));
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, subject_code, title, due_date, deadline, status, created_at
                 FROM lab_reports
                 WHERE status != 'submitted' AND due_date <= ?1
                 ORDER BY due_date ASC, id ASC",
            )
            .map_err(StoreError::Query)?;
        let rows = stmt
            .query_map(params![cutoff], lab_from_row)
            .map_err(StoreError::Query)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Query)?;
        rows.into_iter()
            .map(|r| finish_lab(r).map_err(CoreError::from))
            .collect()
    }
}

type LabRow = (i64, String, String, String, String, String, String);

fn lab_from_row(row: &Row) -> rusqlite::Result<LabRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn finish_lab(row: LabRow) -> Result<LabReport, StoreError> {
    Ok(LabReport {
        id: row.0,
        subject_code: row.1,
        title: row.2,
        due_date: super::date_from_sql(&row.3)?,
        deadline: dt_from_sql(&row.4)?,
        status: LabStatus::parse(&row.5).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        created_at: dt_from_sql(&row.6)?,
    })
}

/// Two non-cancelled placed tasks must never overlap in time.
fn check_no_overlap(
    conn: &Connection,
    task_id: i64,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<()> {
    let clash: Option<i64> = conn
        .query_row(
            "SELECT id FROM tasks
             WHERE id != ?1 AND status != 'cancelled'
               AND scheduled_start IS NOT NULL
               AND scheduled_start < ?3 AND scheduled_end > ?2
             LIMIT 1",
            params![task_id, dt_to_sql(start), dt_to_sql(end)],
            |row| row.get(0),
        )
        .optional()
        .map_err(StoreError::Query)?;
    match clash {
        Some(other) => Err(CoreError::conflict(format!(
            "placement overlaps task {other}"
        ))),
        None => Ok(()),
    }
}
