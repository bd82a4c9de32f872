//! Notifications, delivery preferences, achievement rows, guidelines, and
//! policy-caller memory facts.

use chrono::{Duration, NaiveDateTime};
use rusqlite::{params, OptionalExtension, Row};

use crate::achievements::UserAchievement;
use crate::error::{CoreError, Result, StoreError};
use crate::notify::{
    NewNotification, Notification, NotificationKind, NotificationPreference, NotificationPriority,
};

use super::{dt_from_sql, dt_to_sql, opt_dt_from_sql, Store};

const NOTIFICATION_COLS: &str =
    "id, kind, priority, title, message, created_at, scheduled_for, sent_at, read_at,
     dismissed_at, expires_at, action_url, action_label, action_data, dedup_key";

struct NotificationRow {
    n: Notification,
    kind: String,
    priority: String,
    created: String,
    scheduled: String,
    sent: Option<String>,
    read: Option<String>,
    dismissed: Option<String>,
    expires: Option<String>,
    data: Option<String>,
}

fn notification_from_row(row: &Row) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        n: Notification {
            id: row.get(0)?,
            kind: NotificationKind::Reminder, // patched below
            priority: NotificationPriority::Normal,
            title: row.get(3)?,
            message: row.get(4)?,
            created_at: NaiveDateTime::default(),
            scheduled_for: NaiveDateTime::default(),
            sent_at: None,
            read_at: None,
            dismissed_at: None,
            expires_at: None,
            action_url: row.get(11)?,
            action_label: row.get(12)?,
            action_data: None,
            dedup_key: row.get(14)?,
        },
        kind: row.get(1)?,
        priority: row.get(2)?,
        created: row.get(5)?,
        scheduled: row.get(6)?,
        sent: row.get(7)?,
        read: row.get(8)?,
        dismissed: row.get(9)?,
        expires: row.get(10)?,
        data: row.get(13)?,
    })
}

fn finish_notification(row: NotificationRow) -> Result<Notification, StoreError> {
    let mut n = row.n;
    n.kind = NotificationKind::parse(&row.kind).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    n.priority =
        NotificationPriority::parse(&row.priority).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    n.created_at = dt_from_sql(&row.created)?;
    n.scheduled_for = dt_from_sql(&row.scheduled)?;
    n.sent_at = opt_dt_from_sql(row.sent)?;
    n.read_at = opt_dt_from_sql(row.read)?;
    n.dismissed_at = opt_dt_from_sql(row.dismissed)?;
    n.expires_at = opt_dt_from_sql(row.expires)?;
    n.action_data = row.data.map(|d| serde_json::from_str(&d)).transpose()?;
    Ok(n)
}

impl Store {
    /// Persist a notification scheduled for `scheduled_for` (creation time
    /// is `now`). Returns `None` when an undismissed notification with the
    /// same dedup key already exists.
    pub fn insert_notification(
        &self,
        new: &NewNotification,
        scheduled_for: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<Option<Notification>> {
        let conn = self.lock()?;
        if let Some(key) = &new.dedup_key {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM notifications WHERE dedup_key = ?1 AND dismissed_at IS NULL",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
                .map_err(StoreError::Query)?;
            if existing.is_some() {
                return Ok(None);
            }
        }
        let data = new
            .action_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(StoreError::from)?;
        conn.execute(
            "INSERT INTO notifications
                (kind, priority, title, message, created_at, scheduled_for, expires_at,
                 action_url, action_label, action_data, dedup_key)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                new.kind.as_str(),
                new.priority.as_str(),
                new.title,
                new.message,
                dt_to_sql(now),
                dt_to_sql(scheduled_for.max(now)),
                new.expires_at.map(dt_to_sql),
                new.action_url,
                new.action_label,
                data,
                new.dedup_key,
            ],
        )
        .map_err(StoreError::Query)?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.notification(id).map(Some)
    }

    pub fn notification(&self, id: i64) -> Result<Notification> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {NOTIFICATION_COLS} FROM notifications WHERE id = ?1"),
                params![id],
                notification_from_row,
            )
            .optional()
            .map_err(StoreError::Query)?
            .ok_or_else(|| CoreError::not_found("notification", id))?;
        Ok(finish_notification(row)?)
    }

    /// Unsent, undismissed, unexpired notifications that are due at `now`,
    /// in scheduled order.
    pub fn due_unsent_notifications(&self, now: NaiveDateTime) -> Result<Vec<Notification>> {
        let cutoff = dt_to_sql(now);
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {NOTIFICATION_COLS} FROM notifications
                 WHERE sent_at IS NULL AND dismissed_at IS NULL
                   AND scheduled_for <= ?1
                   AND (expires_at IS NULL OR expires_at > ?1)
                 ORDER BY scheduled_for ASC, id ASC"
            ))
            .map_err(StoreError::Query)?;
        let rows = stmt
            .query_map(params![cutoff], notification_from_row)
            .map_err(StoreError::Query)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Query)?;
        rows.into_iter()
            .map(|r| finish_notification(r).map_err(CoreError::from))
            .collect()
    }

    pub fn mark_notification_sent(&self, id: i64, now: NaiveDateTime) -> Result<Notification> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE notifications SET sent_at = ?1 WHERE id = ?2 AND sent_at IS NULL",
            params![dt_to_sql(now), id],
        )
        .map_err(StoreError::Query)?;
        drop(conn);
        self.notification(id)
    }

    /// Idempotent: a second call leaves the original read timestamp.
    pub fn mark_notification_read(&self, id: i64, now: NaiveDateTime) -> Result<Notification> {
        let notification = self.notification(id)?;
        if notification.read_at.is_some() {
            return Ok(notification);
        }
        let conn = self.lock()?;
        conn.execute(
            "UPDATE notifications SET read_at = ?1 WHERE id = ?2 AND read_at IS NULL",
            params![dt_to_sql(now), id],
        )
        .map_err(StoreError::Query)?;
        drop(conn);
        self.notification(id)
    }

    pub fn dismiss_notification(&self, id: i64, now: NaiveDateTime) -> Result<Notification> {
        let notification = self.notification(id)?;
        if notification.dismissed_at.is_some() {
            return Ok(notification);
        }
        let conn = self.lock()?;
        conn.execute(
            "UPDATE notifications SET dismissed_at = ?1 WHERE id = ?2 AND dismissed_at IS NULL",
            params![dt_to_sql(now), id],
        )
        .map_err(StoreError::Query)?;
        drop(conn);
        self.notification(id)
    }

    /// Recent undismissed notifications, newest first. `unread_only`
    /// filters to unread, `kind` to one kind.
    pub fn list_notifications(
        &self,
        kind: Option<NotificationKind>,
        unread_only: bool,
        limit: u32,
    ) -> Result<Vec<Notification>> {
        let conn = self.lock()?;
        let mut sql = format!(
            "SELECT {NOTIFICATION_COLS} FROM notifications WHERE dismissed_at IS NULL"
        );
        if kind.is_some() {
            sql.push_str(" AND kind = ?1");
        }
        if unread_only {
            sql.push_str(" AND read_at IS NULL");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ");
        sql.push_str(&limit.to_string());

        let mut stmt = conn.prepare(&sql).map_err(StoreError::Query)?;
        let rows = match kind {
            Some(k) => stmt
                .query_map(params![k.as_str()], notification_from_row)
                .map_err(StoreError::Query)?
                .collect::<rusqlite::Result<Vec<_>>>(),
            None => stmt
                .query_map([], notification_from_row)
                .map_err(StoreError::Query)?
                .collect::<rusqlite::Result<Vec<_>>>(),
        }
        .map_err(StoreError::Query)?;
        rows.into_iter()
            .map(|r| finish_notification(r).map_err(CoreError::from))
            .collect()
    }

    /// Notifications of `kind` sent within the rolling hour ending at `now`
    /// (frequency-limit input).
    pub fn sent_in_last_hour(&self, kind: NotificationKind, now: NaiveDateTime) -> Result<u32> {
        let from = dt_to_sql(now - Duration::hours(1));
        let to = dt_to_sql(now);
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM notifications
                 WHERE kind = ?1 AND sent_at IS NOT NULL AND sent_at > ?2 AND sent_at <= ?3",
                params![kind.as_str(), from, to],
                |row| row.get(0),
            )
            .map_err(StoreError::Query)?;
        Ok(count as u32)
    }

    // ── Preferences ─────────────────────────────────────────────────

    /// Preference for a kind; everything is allowed when none is stored.
    pub fn notification_preference(
        &self,
        kind: NotificationKind,
    ) -> Result<NotificationPreference> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT enabled, quiet_start, quiet_end, frequency_limit, channels
                 FROM notification_preferences WHERE kind = ?1",
                params![kind.as_str()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)? != 0,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(StoreError::Query)?;
        match row {
            Some((enabled, start, end, limit, channels)) => Ok(NotificationPreference {
                kind,
                enabled,
                quiet_hours_start: start,
                quiet_hours_end: end,
                frequency_limit: limit.map(|l| l as u32),
                channels: serde_json::from_str(&channels).map_err(StoreError::from)?,
            }),
            None => Ok(NotificationPreference::allow_all(kind)),
        }
    }

    pub fn upsert_notification_preference(&self, pref: &NotificationPreference) -> Result<()> {
        if let Some(start) = &pref.quiet_hours_start {
            crate::clock::parse_hhmm(start)?;
        }
        if let Some(end) = &pref.quiet_hours_end {
            crate::clock::parse_hhmm(end)?;
        }
        let channels = serde_json::to_string(&pref.channels).map_err(StoreError::from)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO notification_preferences
                (kind, enabled, quiet_start, quiet_end, frequency_limit, channels)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(kind) DO UPDATE SET
                enabled = excluded.enabled,
                quiet_start = excluded.quiet_start,
                quiet_end = excluded.quiet_end,
                frequency_limit = excluded.frequency_limit,
                channels = excluded.channels",
            params![
                pref.kind.as_str(),
                pref.enabled as i64,
                pref.quiet_hours_start,
                pref.quiet_hours_end,
                pref.frequency_limit.map(|l| l as i64),
                channels
            ],
        )
        .map_err(StoreError::Query)?;
        Ok(())
    }

    // ── Achievement rows ────────────────────────────────────────────

    pub fn achievement_state(&self, code: &str) -> Result<Option<UserAchievement>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT code, progress_value, is_complete, earned_at, notified
                 FROM user_achievements WHERE code = ?1",
                params![code],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)? != 0,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, i64>(4)? != 0,
                    ))
                },
            )
            .optional()
            .map_err(StoreError::Query)?;
        row.map(|(code, progress, complete, earned, notified)| {
            Ok(UserAchievement {
                code,
                progress_value: progress as u64,
                is_complete: complete,
                earned_at: opt_dt_from_sql(earned)?,
                notified,
            })
        })
        .transpose()
        .map_err(|e: StoreError| CoreError::Backend(e))
    }

    /// Upsert the progress of an unearned (or already-earned) achievement.
    pub fn record_achievement_progress(&self, code: &str, progress: u64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO user_achievements (code, progress_value) VALUES (?1, ?2)
             ON CONFLICT(code) DO UPDATE SET progress_value = excluded.progress_value",
            params![code, progress as i64],
        )
        .map_err(StoreError::Query)?;
        Ok(())
    }

    /// Mark an achievement complete, pending notification.
    pub fn award_achievement(&self, code: &str, progress: u64, now: NaiveDateTime) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO user_achievements (code, progress_value, is_complete, earned_at, notified)
             VALUES (?1, ?2, 1, ?3, 0)
             ON CONFLICT(code) DO UPDATE SET
                progress_value = excluded.progress_value,
                is_complete = 1,
                earned_at = excluded.earned_at,
                notified = 0",
            params![code, progress as i64, dt_to_sql(now)],
        )
        .map_err(StoreError::Query)?;
        Ok(())
    }

    /// Earned achievements the notification engine has not flushed yet.
    pub fn unnotified_achievements(&self) -> Result<Vec<UserAchievement>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT code, progress_value, is_complete, earned_at, notified
                 FROM user_achievements
                 WHERE is_complete = 1 AND notified = 0
                 ORDER BY earned_at ASC, code ASC",
            )
            .map_err(StoreError::Query)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)? != 0,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)? != 0,
                ))
            })
            .map_err(StoreError::Query)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Query)?;
        rows.into_iter()
            .map(|(code, progress, complete, earned, notified)| {
                Ok(UserAchievement {
                    code,
                    progress_value: progress as u64,
                    is_complete: complete,
                    earned_at: opt_dt_from_sql(earned)?,
                    notified,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()
            .map_err(CoreError::from)
    }

    pub fn mark_achievement_notified(&self, code: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE user_achievements SET notified = 1 WHERE code = ?1",
            params![code],
        )
        .map_err(StoreError::Query)?;
        Ok(())
    }

    /// Add award points to the lifetime total.
    pub fn add_streak_points(&self, points: u64) -> Result<()> {
        let conn = self.lock()?;
        let mut streak = Store::read_streak(&conn)?;
        streak.add_points(points);
        Store::write_streak(&conn, &streak)?;
        Ok(())
    }

    // ── Guidelines & memory facts (policy caller) ───────────────────

    pub fn add_guideline(&self, rule: &str, priority: u8) -> Result<i64> {
        if !(1..=10).contains(&priority) {
            return Err(crate::error::ValidationError::InvalidValue {
                field: "priority",
                message: format!("{priority} not in 1..=10"),
            }
            .into());
        }
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO guidelines (rule, priority) VALUES (?1, ?2)",
            params![rule, priority as i64],
        )
        .map_err(StoreError::Query)?;
        Ok(conn.last_insert_rowid())
    }

    /// `(id, rule, priority, active)` rows, highest priority first.
    pub fn list_guidelines(&self, active_only: bool) -> Result<Vec<(i64, String, u8, bool)>> {
        let conn = self.lock()?;
        let sql = if active_only {
            "SELECT id, rule, priority, active FROM guidelines WHERE active = 1
             ORDER BY priority DESC, id ASC"
        } else {
            "SELECT id, rule, priority, active FROM guidelines ORDER BY priority DESC, id ASC"
        };
        let mut stmt = conn.prepare(sql).map_err(StoreError::Query)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)? as u8,
                    row.get::<_, i64>(3)? != 0,
                ))
            })
            .map_err(StoreError::Query)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Query)?;
        Ok(rows)
    }

    pub fn set_guideline_active(&self, id: i64, active: bool) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE guidelines SET active = ?1 WHERE id = ?2",
                params![active as i64, id],
            )
            .map_err(StoreError::Query)?;
        if changed == 0 {
            return Err(CoreError::not_found("guideline", id));
        }
        Ok(())
    }

    pub fn memory_set(
        &self,
        category: &str,
        key: &str,
        value: &str,
        now: NaiveDateTime,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO memory_facts (category, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(category, key) DO UPDATE SET
                value = excluded.value, updated_at = excluded.updated_at",
            params![category, key, value, dt_to_sql(now)],
        )
        .map_err(StoreError::Query)?;
        Ok(())
    }

    pub fn memory_get(&self, category: &str, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT value FROM memory_facts WHERE category = ?1 AND key = ?2",
            params![category, key],
            |row| row.get(0),
        )
        .optional()
        .map_err(StoreError::Query)
        .map_err(CoreError::from)
    }

    /// `(key, value)` pairs within a category.
    pub fn memory_list(&self, category: &str) -> Result<Vec<(String, String)>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT key, value FROM memory_facts WHERE category = ?1 ORDER BY key")
            .map_err(StoreError::Query)?;
        let rows = stmt
            .query_map(params![category], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(StoreError::Query)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Query)?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn reminder(dedup: Option<&str>) -> NewNotification {
        let mut n = NewNotification::new(
            NotificationKind::Reminder,
            NotificationPriority::Normal,
            "Revision due",
            "MATH101 chapter 3 revision is due today",
        );
        if let Some(key) = dedup {
            n = n.dedup(key);
        }
        n
    }

    #[test]
    fn dedup_key_blocks_duplicates() {
        let store = Store::open_memory().unwrap();
        let first = store
            .insert_notification(&reminder(Some("rev-1")), t0(), t0())
            .unwrap();
        assert!(first.is_some());
        let second = store
            .insert_notification(&reminder(Some("rev-1")), t0(), t0())
            .unwrap();
        assert!(second.is_none());
        // Dismissing frees the key.
        store
            .dismiss_notification(first.unwrap().id, t0())
            .unwrap();
        assert!(store
            .insert_notification(&reminder(Some("rev-1")), t0(), t0())
            .unwrap()
            .is_some());
    }

    #[test]
    fn scheduled_for_never_precedes_creation() {
        let store = Store::open_memory().unwrap();
        let n = store
            .insert_notification(&reminder(None), t0() - Duration::hours(2), t0())
            .unwrap()
            .unwrap();
        assert_eq!(n.scheduled_for, t0());
        assert!(n.created_at <= n.scheduled_for);
    }

    #[test]
    fn due_and_sent_flow() {
        let store = Store::open_memory().unwrap();
        let later = t0() + Duration::hours(5);
        let due_now = store
            .insert_notification(&reminder(None), t0(), t0())
            .unwrap()
            .unwrap();
        store
            .insert_notification(&reminder(None), later, t0())
            .unwrap()
            .unwrap();

        let due = store.due_unsent_notifications(t0()).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, due_now.id);

        store.mark_notification_sent(due_now.id, t0()).unwrap();
        assert!(store.due_unsent_notifications(t0()).unwrap().is_empty());
        assert_eq!(
            store
                .sent_in_last_hour(NotificationKind::Reminder, t0())
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .sent_in_last_hour(NotificationKind::Reminder, t0() + Duration::hours(2))
                .unwrap(),
            0
        );
    }

    #[test]
    fn mark_read_is_idempotent() {
        let store = Store::open_memory().unwrap();
        let n = store
            .insert_notification(&reminder(None), t0(), t0())
            .unwrap()
            .unwrap();
        let first = store.mark_notification_read(n.id, t0()).unwrap();
        let second = store
            .mark_notification_read(n.id, t0() + Duration::hours(1))
            .unwrap();
        assert_eq!(first.read_at, second.read_at);
    }

    #[test]
    fn preference_round_trip_and_default() {
        let store = Store::open_memory().unwrap();
        let default = store
            .notification_preference(NotificationKind::Reminder)
            .unwrap();
        assert!(default.enabled);
        assert!(default.quiet_hours_start.is_none());

        let pref = NotificationPreference {
            kind: NotificationKind::Reminder,
            enabled: true,
            quiet_hours_start: Some("22:00".to_string()),
            quiet_hours_end: Some("07:00".to_string()),
            frequency_limit: Some(3),
            channels: vec!["websocket".to_string()],
        };
        store.upsert_notification_preference(&pref).unwrap();
        let loaded = store
            .notification_preference(NotificationKind::Reminder)
            .unwrap();
        assert_eq!(loaded.quiet_hours_start.as_deref(), Some("22:00"));
        assert_eq!(loaded.frequency_limit, Some(3));
    }

    #[test]
    fn achievement_rows() {
        let store = Store::open_memory().unwrap();
        store.record_achievement_progress("streak_3", 2).unwrap();
        let state = store.achievement_state("streak_3").unwrap().unwrap();
        assert_eq!(state.progress_value, 2);
        assert!(!state.is_complete);

        store.award_achievement("streak_3", 3, t0()).unwrap();
        let state = store.achievement_state("streak_3").unwrap().unwrap();
        assert!(state.is_complete);
        assert!(!state.notified);
        assert_eq!(state.earned_at, Some(t0()));

        assert_eq!(store.unnotified_achievements().unwrap().len(), 1);
        store.mark_achievement_notified("streak_3").unwrap();
        assert!(store.unnotified_achievements().unwrap().is_empty());
    }

    #[test]
    fn guidelines_and_memory() {
        let store = Store::open_memory().unwrap();
        let id = store.add_guideline("Prefer mornings for math", 8).unwrap();
        store.add_guideline("No study after 23:00", 9).unwrap();
        let rules = store.list_guidelines(true).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].2, 9); // highest priority first

        store.set_guideline_active(id, false).unwrap();
        assert_eq!(store.list_guidelines(true).unwrap().len(), 1);

        store.memory_set("schedule", "sleep_start", "23:30", t0()).unwrap();
        store.memory_set("schedule", "sleep_start", "23:00", t0()).unwrap();
        assert_eq!(
            store.memory_get("schedule", "sleep_start").unwrap().as_deref(),
            Some("23:00")
        );
        assert_eq!(store.memory_list("schedule").unwrap().len(), 1);
    }
}
