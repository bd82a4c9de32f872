//! Subjects, chapters, chapter progress, and revisions.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{CoreError, Result, StoreError};
use crate::revision::{
    due_dates, revision_points, PendingRevision, Revision, RevisionOutcome,
    READING_COMPLETION_OFFSETS,
};
use crate::subject::{
    AssignmentStatus, Chapter, ChapterProgress, NewSubject, ReadingStatus, Subject, SubjectKind,
};

use super::{date_from_sql, date_to_sql, dt_from_sql, dt_to_sql, opt_dt_from_sql, Store};

fn subject_from_row(row: &Row) -> rusqlite::Result<(Subject, String, String)> {
    Ok((
        Subject {
            id: row.get(0)?,
            code: row.get(1)?,
            name: row.get(2)?,
            credits: row.get::<_, i64>(3)? as u8,
            kind: SubjectKind::ConceptHeavy, // patched below
            color: row.get(5)?,
            created_at: NaiveDateTime::default(), // patched below
        },
        row.get(4)?,
        row.get(6)?,
    ))
}

fn finish_subject(parts: (Subject, String, String)) -> Result<Subject, StoreError> {
    let (mut subject, kind, created) = parts;
    subject.kind = SubjectKind::parse(&kind).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    subject.created_at = dt_from_sql(&created)?;
    Ok(subject)
}

const SUBJECT_COLS: &str = "id, code, name, credits, kind, color, created_at";

fn revision_from_row(row: &Row) -> rusqlite::Result<(Revision, String, Option<String>)> {
    Ok((
        Revision {
            id: row.get(0)?,
            chapter_id: row.get(1)?,
            revision_number: row.get::<_, i64>(2)? as u32,
            due_date: NaiveDate::default(),
            completed: row.get::<_, i64>(4)? != 0,
            completed_at: None,
            points_earned: row.get(6)?,
        },
        row.get(3)?,
        row.get(5)?,
    ))
}

fn finish_revision(parts: (Revision, String, Option<String>)) -> Result<Revision, StoreError> {
    let (mut revision, due, completed_at) = parts;
    revision.due_date = date_from_sql(&due)?;
    revision.completed_at = opt_dt_from_sql(completed_at)?;
    Ok(revision)
}

const REVISION_COLS: &str =
    "id, chapter_id, revision_number, due_date, completed, completed_at, points_earned";

impl Store {
    // ── Subjects ─────────────────────────────────────────────────────

    pub fn create_subject(&self, new: &NewSubject, now: NaiveDateTime) -> Result<Subject> {
        new.validate()?;
        let conn = self.lock()?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM subjects WHERE code = ?1",
                params![new.code],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::Query)?;
        if existing.is_some() {
            return Err(CoreError::conflict(format!(
                "subject {} already exists",
                new.code
            )));
        }
        conn.execute(
            "INSERT INTO subjects (code, name, credits, kind, color, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new.code,
                new.name,
                new.credits as i64,
                new.kind.as_str(),
                new.color,
                dt_to_sql(now)
            ],
        )
        .map_err(StoreError::Query)?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.subject(id)
    }

    pub fn subject(&self, id: i64) -> Result<Subject> {
        let conn = self.lock()?;
        let parts = conn
            .query_row(
                &format!("SELECT {SUBJECT_COLS} FROM subjects WHERE id = ?1"),
                params![id],
                subject_from_row,
            )
            .optional()
            .map_err(StoreError::Query)?
            .ok_or_else(|| CoreError::not_found("subject", id))?;
        Ok(finish_subject(parts)?)
    }

    pub fn subject_by_code(&self, code: &str) -> Result<Subject> {
        let conn = self.lock()?;
        let parts = conn
            .query_row(
                &format!("SELECT {SUBJECT_COLS} FROM subjects WHERE code = ?1"),
                params![code],
                subject_from_row,
            )
            .optional()
            .map_err(StoreError::Query)?
            .ok_or_else(|| CoreError::not_found("subject", code))?;
        Ok(finish_subject(parts)?)
    }

    pub fn list_subjects(&self) -> Result<Vec<Subject>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {SUBJECT_COLS} FROM subjects ORDER BY code"))
            .map_err(StoreError::Query)?;
        let rows = stmt
            .query_map([], subject_from_row)
            .map_err(StoreError::Query)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Query)?;
        rows.into_iter()
            .map(|p| finish_subject(p).map_err(CoreError::from))
            .collect()
    }

    // ── Chapters & progress ─────────────────────────────────────────

    pub fn create_chapter(
        &self,
        subject_id: i64,
        number: u16,
        title: &str,
        now: NaiveDateTime,
    ) -> Result<Chapter> {
        if number == 0 {
            return Err(crate::error::ValidationError::InvalidValue {
                field: "number",
                message: "chapter numbers start at 1".to_string(),
            }
            .into());
        }
        crate::subject::validate_chapter_slug(&format!("chapter{number:02}"))?;
        let conn = self.lock()?;
        let duplicate: Option<i64> = conn
            .query_row(
                "SELECT id FROM chapters WHERE subject_id = ?1 AND number = ?2",
                params![subject_id, number as i64],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::Query)?;
        if duplicate.is_some() {
            return Err(CoreError::conflict(format!(
                "chapter {number} already exists for subject {subject_id}"
            )));
        }
        conn.execute(
            "INSERT INTO chapters (subject_id, number, title, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![subject_id, number as i64, title, dt_to_sql(now)],
        )
        .map_err(StoreError::Query)?;
        let id = conn.last_insert_rowid();
        let fresh = ChapterProgress::fresh(id);
        conn.execute(
            "INSERT INTO chapter_progress (chapter_id, reading_status, assignment_status)
             VALUES (?1, ?2, ?3)",
            params![
                id,
                fresh.reading_status.as_str(),
                fresh.assignment_status.as_str()
            ],
        )
        .map_err(StoreError::Query)?;
        drop(conn);
        self.chapter(id)
    }

    pub fn chapter(&self, id: i64) -> Result<Chapter> {
        let conn = self.lock()?;
        let chapter = conn
            .query_row(
                "SELECT id, subject_id, number, title, created_at FROM chapters WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(StoreError::Query)?
            .ok_or_else(|| CoreError::not_found("chapter", id))?;
        Ok(Chapter {
            id: chapter.0,
            subject_id: chapter.1,
            number: chapter.2 as u16,
            title: chapter.3,
            created_at: dt_from_sql(&chapter.4)?,
        })
    }

    pub fn chapter_progress(&self, chapter_id: i64) -> Result<ChapterProgress> {
        let conn = self.lock()?;
        read_progress(&conn, chapter_id)
    }

    /// Mark a chapter's reading in progress.
    pub fn start_chapter_reading(&self, chapter_id: i64) -> Result<ChapterProgress> {
        let conn = self.lock()?;
        let progress = read_progress(&conn, chapter_id)?;
        if progress.reading_status == ReadingStatus::Completed {
            return Err(CoreError::precondition("reading already completed"));
        }
        conn.execute(
            "UPDATE chapter_progress SET reading_status = ?1 WHERE chapter_id = ?2",
            params![ReadingStatus::InProgress.as_str(), chapter_id],
        )
        .map_err(StoreError::Query)?;
        drop(conn);
        self.chapter_progress(chapter_id)
    }

    /// Atomic chapter-reading completion: flips the reading status, seeds the
    /// +7/+14/+21 revision sequence, and unlocks the assignment. All three
    /// writes commit together or not at all.
    pub fn complete_chapter_reading(
        &self,
        chapter_id: i64,
        today: NaiveDate,
    ) -> Result<Vec<Revision>> {
        let mut conn = self.lock()?;
        let progress = read_progress(&conn, chapter_id)?;
        if progress.reading_status == ReadingStatus::Completed {
            return Err(CoreError::precondition("reading already completed"));
        }

        let tx = conn.transaction().map_err(StoreError::Query)?;
        tx.execute(
            "UPDATE chapter_progress SET reading_status = ?1, assignment_status = ?2
             WHERE chapter_id = ?3",
            params![
                ReadingStatus::Completed.as_str(),
                AssignmentStatus::Available.as_str(),
                chapter_id
            ],
        )
        .map_err(StoreError::Query)?;

        let mut created = Vec::new();
        for (i, due) in due_dates(today, &READING_COMPLETION_OFFSETS).iter().enumerate() {
            tx.execute(
                "INSERT INTO revisions (chapter_id, revision_number, due_date)
                 VALUES (?1, ?2, ?3)",
                params![chapter_id, (i + 1) as i64, date_to_sql(*due)],
            )
            .map_err(StoreError::Query)?;
            created.push(tx.last_insert_rowid());
        }
        tx.commit().map_err(StoreError::Query)?;
        drop(conn);

        created.into_iter().map(|id| self.revision(id)).collect()
    }

    pub fn set_mastery(&self, chapter_id: i64, level: u8) -> Result<()> {
        if level > 100 {
            return Err(crate::error::ValidationError::InvalidValue {
                field: "mastery_level",
                message: format!("{level} > 100"),
            }
            .into());
        }
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE chapter_progress SET mastery_level = ?1 WHERE chapter_id = ?2",
                params![level as i64, chapter_id],
            )
            .map_err(StoreError::Query)?;
        if changed == 0 {
            return Err(CoreError::not_found("chapter", chapter_id));
        }
        Ok(())
    }

    // ── Revisions ────────────────────────────────────────────────────

    pub fn revision(&self, id: i64) -> Result<Revision> {
        let conn = self.lock()?;
        let parts = conn
            .query_row(
                &format!("SELECT {REVISION_COLS} FROM revisions WHERE id = ?1"),
                params![id],
                revision_from_row,
            )
            .optional()
            .map_err(StoreError::Query)?
            .ok_or_else(|| CoreError::not_found("revision", id))?;
        Ok(finish_revision(parts)?)
    }

    /// Explicitly schedule a revision sequence for a chapter. Refused while
    /// pending revisions already exist for it.
    pub fn schedule_revisions(
        &self,
        chapter_id: i64,
        intervals: &[i64],
        today: NaiveDate,
    ) -> Result<Vec<Revision>> {
        if intervals.is_empty() {
            return Err(crate::error::ValidationError::InvalidValue {
                field: "intervals",
                message: "must not be empty".to_string(),
            }
            .into());
        }
        let mut conn = self.lock()?;
        let pending: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM revisions WHERE chapter_id = ?1 AND completed = 0",
                params![chapter_id],
                |row| row.get(0),
            )
            .map_err(StoreError::Query)?;
        if pending > 0 {
            return Err(CoreError::precondition(format!(
                "chapter {chapter_id} already has {pending} pending revisions"
            )));
        }

        let tx = conn.transaction().map_err(StoreError::Query)?;
        let mut ids = Vec::new();
        for (i, due) in due_dates(today, intervals).iter().enumerate() {
            tx.execute(
                "INSERT INTO revisions (chapter_id, revision_number, due_date)
                 VALUES (?1, ?2, ?3)",
                params![chapter_id, (i + 1) as i64, date_to_sql(*due)],
            )
            .map_err(StoreError::Query)?;
            ids.push(tx.last_insert_rowid());
        }
        tx.commit().map_err(StoreError::Query)?;
        drop(conn);

        ids.into_iter().map(|id| self.revision(id)).collect()
    }

    /// Pending revisions due on or before `due_by`, ordered by due date then
    /// subject credits (heavier subjects first).
    pub fn pending_revisions(&self, due_by: NaiveDate) -> Result<Vec<PendingRevision>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT r.id, r.chapter_id, r.revision_number, r.due_date, r.completed,
                        r.completed_at, r.points_earned,
                        c.number, c.title, s.code, s.credits
                 FROM revisions r
                 JOIN chapters c ON r.chapter_id = c.id
                 JOIN subjects s ON c.subject_id = s.id
                 WHERE r.completed = 0 AND r.due_date <= ?1
                 ORDER BY r.due_date ASC, s.credits DESC, r.id ASC",
            ))
            .map_err(StoreError::Query)?;
        let rows = stmt
            .query_map(params![date_to_sql(due_by)], |row| {
                let parts = revision_from_row(row)?;
                Ok((
                    parts,
                    row.get::<_, i64>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, String>(9)?,
                    row.get::<_, i64>(10)?,
                ))
            })
            .map_err(StoreError::Query)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Query)?;
        rows.into_iter()
            .map(|(parts, number, title, code, credits)| {
                Ok(PendingRevision {
                    revision: finish_revision(parts)?,
                    chapter_number: number as u16,
                    chapter_title: title,
                    subject_code: code,
                    subject_credits: credits as u8,
                })
            })
            .collect()
    }

    /// Atomic revision completion: marks it done, awards `5 x credits`
    /// points, bumps the chapter's revision count, and advances the streak
    /// (no duration guard on this path).
    pub fn complete_revision(&self, revision_id: i64, now: NaiveDateTime) -> Result<RevisionOutcome> {
        let today = now.date();
        let mut conn = self.lock()?;
        let (completed, chapter_id): (bool, i64) = conn
            .query_row(
                "SELECT completed, chapter_id FROM revisions WHERE id = ?1",
                params![revision_id],
                |row| Ok((row.get::<_, i64>(0)? != 0, row.get(1)?)),
            )
            .optional()
            .map_err(StoreError::Query)?
            .ok_or_else(|| CoreError::not_found("revision", revision_id))?;
        if completed {
            return Err(CoreError::conflict("revision already completed"));
        }
        let credits: i64 = conn
            .query_row(
                "SELECT s.credits FROM chapters c JOIN subjects s ON c.subject_id = s.id
                 WHERE c.id = ?1",
                params![chapter_id],
                |row| row.get(0),
            )
            .map_err(StoreError::Query)?;
        let points = revision_points(credits as u8);

        let tx = conn.transaction().map_err(StoreError::Query)?;
        tx.execute(
            "UPDATE revisions SET completed = 1, completed_at = ?1, points_earned = ?2
             WHERE id = ?3",
            params![dt_to_sql(now), points, revision_id],
        )
        .map_err(StoreError::Query)?;
        tx.execute(
            "UPDATE chapter_progress SET revision_count = revision_count + 1
             WHERE chapter_id = ?1",
            params![chapter_id],
        )
        .map_err(StoreError::Query)?;

        let mut streak = Store::read_streak(&tx)?;
        streak.advance(today);
        streak.add_points(points as u64);
        Store::write_streak(&tx, &streak)?;
        tx.commit().map_err(StoreError::Query)?;
        drop(conn);

        Ok(RevisionOutcome {
            revision: self.revision(revision_id)?,
            points,
            current_streak: streak.current_streak,
            total_points: streak.total_points,
        })
    }

    /// Lifetime count of completed revisions (achievement counter).
    pub fn count_completed_revisions(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM revisions WHERE completed = 1", [], |row| {
                row.get(0)
            })
            .map_err(StoreError::Query)?;
        Ok(count as u64)
    }
}

fn read_progress(conn: &Connection, chapter_id: i64) -> Result<ChapterProgress> {
    let row = conn
        .query_row(
            "SELECT reading_status, assignment_status, mastery_level, revision_count
             FROM chapter_progress WHERE chapter_id = ?1",
            params![chapter_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )
        .optional()
        .map_err(StoreError::Query)?
        .ok_or_else(|| CoreError::not_found("chapter", chapter_id))?;
    Ok(ChapterProgress {
        chapter_id,
        reading_status: ReadingStatus::parse(&row.0)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        assignment_status: AssignmentStatus::parse(&row.1)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        mastery_level: row.2 as u8,
        revision_count: row.3 as u32,
    })
}
