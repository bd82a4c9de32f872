//! Proactive notification generation and fan-out.
//!
//! The engine owns the publish channel: every delivered notification is
//! appended to the store and then broadcast to live subscribers, who only
//! see notifications published after they subscribed. Delivery honors the
//! per-kind preference: disabled kinds are dropped, quiet hours defer
//! `scheduled_for` to the end of the window, and the rolling-hour frequency
//! limit drops the overflow.

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use tokio::sync::broadcast;

use crate::error::Result;
use crate::notify::{NewNotification, Notification, NotificationKind, NotificationPriority};
use crate::patterns::{PatternAnalyzer, RecommendContext};
use crate::store::Store;

/// Minutes before a task's start that its reminder fires.
const TASK_REMINDER_LEAD_MINS: i64 = 15;

/// Minutes of continuous study before the break suggestion.
const BREAK_SUGGESTION_MINS: i64 = 90;

/// Daily study seconds that trigger the overwork warning.
const OVERWORK_SECONDS: i64 = 8 * 3600;

/// Subscriber channel depth; slow readers miss the oldest entries.
const CHANNEL_CAPACITY: usize = 256;

pub struct NotificationEngine {
    store: Arc<Store>,
    sender: broadcast::Sender<Notification>,
}

impl NotificationEngine {
    pub fn new(store: Arc<Store>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { store, sender }
    }

    /// Subscribe to the live stream. Only notifications published after
    /// this call are received; catch-up after a reconnect goes through
    /// `Store::list_notifications` by last-seen id.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Deliver one notification under the preference contract.
    ///
    /// Returns the stored notification, or `None` when it was dropped
    /// (kind disabled, frequency limit hit, or deduplicated).
    pub fn deliver(
        &self,
        new: NewNotification,
        now: NaiveDateTime,
    ) -> Result<Option<Notification>> {
        let pref = self.store.notification_preference(new.kind)?;
        if !pref.enabled {
            return Ok(None);
        }
        let scheduled_for = pref.next_allowed(now)?;
        if scheduled_for > now {
            // Quiet hours: persist deferred, publish later via flush.
            return self.store.insert_notification(&new, scheduled_for, now);
        }
        if let Some(limit) = pref.frequency_limit {
            if self.store.sent_in_last_hour(new.kind, now)? >= limit {
                return Ok(None);
            }
        }
        let Some(stored) = self.store.insert_notification(&new, now, now)? else {
            return Ok(None);
        };
        let sent = self.store.mark_notification_sent(stored.id, now)?;
        let _ = self.sender.send(sent.clone());
        Ok(Some(sent))
    }

    /// Publish deferred notifications whose time has come. Kinds at their
    /// frequency limit stay queued for the next pass.
    pub fn flush_due(&self, now: NaiveDateTime) -> Result<usize> {
        let mut published = 0;
        for notification in self.store.due_unsent_notifications(now)? {
            let pref = self.store.notification_preference(notification.kind)?;
            if !pref.enabled {
                continue;
            }
            if pref.in_quiet_hours(now)? {
                continue;
            }
            if let Some(limit) = pref.frequency_limit {
                if self.store.sent_in_last_hour(notification.kind, now)? >= limit {
                    continue;
                }
            }
            let sent = self.store.mark_notification_sent(notification.id, now)?;
            let _ = self.sender.send(sent);
            published += 1;
        }
        Ok(published)
    }

    /// One scan pass: reminders, break nudges, due revisions, lab
    /// deadlines, overwork, pattern suggestions, achievement flush, then
    /// the deferred-queue flush. Returns how many notifications were
    /// created or published.
    pub fn tick(&self, now: NaiveDateTime) -> Result<usize> {
        let mut produced = 0;
        produced += self.scan_task_reminders(now)?;
        produced += self.scan_active_timer(now)?;
        produced += self.scan_due_revisions(now)?;
        produced += self.scan_lab_deadlines(now)?;
        produced += self.scan_overwork(now)?;
        produced += self.scan_pattern_suggestions(now)?;
        produced += self.flush_achievements(now)?;
        produced += self.flush_due(now)?;
        Ok(produced)
    }

    fn scan_task_reminders(&self, now: NaiveDateTime) -> Result<usize> {
        let mut produced = 0;
        let horizon = now + Duration::minutes(TASK_REMINDER_LEAD_MINS);
        for task in self.store.tasks_for_date(now.date())? {
            let Some(start) = task.scheduled_start else {
                continue;
            };
            if !task.status.is_open() || start <= now || start > horizon {
                continue;
            }
            let new = NewNotification::new(
                NotificationKind::Reminder,
                NotificationPriority::Normal,
                format!("Starting soon: {}", task.title),
                format!("'{}' starts at {}", task.title, start.format("%H:%M")),
            )
            .dedup(format!("task-reminder:{}", task.id))
            .expires(start + Duration::minutes(task.duration_mins as i64));
            if self.deliver(new, now)?.is_some() {
                produced += 1;
            }
        }
        Ok(produced)
    }

    fn scan_active_timer(&self, now: NaiveDateTime) -> Result<usize> {
        let Some(session) = self.store.active_session()? else {
            return Ok(0);
        };
        let elapsed_mins = (now - session.started_at).num_minutes();
        if elapsed_mins <= BREAK_SUGGESTION_MINS {
            return Ok(0);
        }
        let new = NewNotification::new(
            NotificationKind::Suggestion,
            NotificationPriority::Normal,
            "Time for a break",
            format!("You've been studying for {elapsed_mins} minutes straight."),
        )
        .dedup(format!("break-session:{}", session.id));
        Ok(self.deliver(new, now)?.map_or(0, |_| 1))
    }

    fn scan_due_revisions(&self, now: NaiveDateTime) -> Result<usize> {
        let due = self.store.pending_revisions(now.date())?;
        if due.is_empty() {
            return Ok(0);
        }
        let subjects: Vec<&str> = due.iter().map(|r| r.subject_code.as_str()).collect();
        let new = NewNotification::new(
            NotificationKind::Reminder,
            NotificationPriority::Normal,
            format!("{} revision(s) due today", due.len()),
            format!("Due for revision: {}", subjects.join(", ")),
        )
        .dedup(format!("revisions-due:{}", now.date()));
        Ok(self.deliver(new, now)?.map_or(0, |_| 1))
    }

    fn scan_lab_deadlines(&self, now: NaiveDateTime) -> Result<usize> {
        let mut produced = 0;
        for lab in self.store.labs_due_within(now.date(), 3)? {
            let hours_left = (lab.deadline - now).num_hours();
            let priority = if hours_left <= 24 {
                NotificationPriority::High
            } else {
                NotificationPriority::Normal
            };
            let new = NewNotification::new(
                NotificationKind::Deadline,
                priority,
                format!("Lab report due: {}", lab.title),
                format!("{} report '{}' is due {}", lab.subject_code, lab.title, lab.due_date),
            )
            .dedup(format!("lab-deadline:{}:{}", lab.id, now.date()));
            if self.deliver(new, now)?.is_some() {
                produced += 1;
            }
        }
        Ok(produced)
    }

    fn scan_overwork(&self, now: NaiveDateTime) -> Result<usize> {
        let daily = self.store.daily_stats(now.date())?;
        if daily.study_seconds <= OVERWORK_SECONDS {
            return Ok(0);
        }
        let hours = daily.study_seconds as f64 / 3600.0;
        let new = NewNotification::new(
            NotificationKind::Warning,
            NotificationPriority::High,
            "Long study day",
            format!("{hours:.1} hours studied today. Consider winding down."),
        )
        .dedup(format!("overwork:{}", now.date()));
        Ok(self.deliver(new, now)?.map_or(0, |_| 1))
    }

    fn scan_pattern_suggestions(&self, now: NaiveDateTime) -> Result<usize> {
        let analyzer = PatternAnalyzer::new(&self.store);
        let recs = analyzer.recommendations(&RecommendContext::default())?;
        let Some(rec) = recs.first() else {
            return Ok(0);
        };
        let new = NewNotification::new(
            NotificationKind::Suggestion,
            NotificationPriority::Low,
            "Study pattern insight",
            rec.text.clone(),
        )
        .dedup(format!("pattern:{}", now.date()));
        Ok(self.deliver(new, now)?.map_or(0, |_| 1))
    }

    /// Turn freshly earned achievements into notifications.
    fn flush_achievements(&self, now: NaiveDateTime) -> Result<usize> {
        let mut produced = 0;
        for earned in self.store.unnotified_achievements()? {
            let (title, message) = match crate::achievements::definition(&earned.code) {
                Some(def) => (
                    format!("Achievement unlocked: {}", def.name),
                    format!("{} (+{} points)", def.description, def.points),
                ),
                None => (
                    format!("Achievement unlocked: {}", earned.code),
                    String::new(),
                ),
            };
            let new = NewNotification::new(
                NotificationKind::Achievement,
                NotificationPriority::Normal,
                title,
                message,
            )
            .dedup(format!("achievement:{}", earned.code));
            self.deliver(new, now)?;
            // Marked regardless of preference outcome so a disabled kind
            // doesn't re-surface the same award forever.
            self.store.mark_achievement_notified(&earned.code)?;
            produced += 1;
        }
        Ok(produced)
    }
}
