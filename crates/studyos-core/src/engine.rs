//! The engine facade: the operation surface every front-end (CLI, HTTP,
//! policy caller) goes through.
//!
//! Owns the store handle, the configuration, and the notification engine.
//! Mutating operations that count as achievement events run an evaluator
//! pass afterward; evaluator failures are logged, never propagated, since
//! the primary write has already committed.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::achievements::{AchievementDef, AchievementEvaluator, UserAchievement, CATALOG};
use crate::config::Config;
use crate::energy::EnergyCurve;
use crate::error::Result;
use crate::notify::{NewNotification, Notification, NotificationEngine, NotificationKind, NotificationPreference, NotificationPriority};
use crate::patterns::{PatternAnalyzer, RecommendContext, Recommendation};
use crate::placer::backward::{BackwardPlanner, Plan, PlanRequest};
use crate::placer::{OptimizeReport, Placer, RescheduleReport};
use crate::revision::{Revision, RevisionOutcome, SPACED_REPETITION_INTERVALS};
use crate::session::{StudySession, TimerStatus};
use crate::store::{StopOutcome, Store};
use crate::streak::UserStreak;
use crate::subject::{Chapter, ChapterProgress, NewSubject, Subject};
use crate::task::{LabReport, LabStatus, NewTask, Task, TaskPatch, Urgency};
use crate::timeline::{Timeline, TimelineBuilder};
use crate::timer::SessionTimer;
use crate::wellbeing::{
    suggest_break, BreakSession, BreakType, PomodoroStatus, WellbeingMetric, WellbeingMonitor,
};

/// Compact daily summary for front-ends.
#[derive(Debug, Clone, Serialize)]
pub struct TodayGlance {
    pub date: NaiveDate,
    pub timeline: Timeline,
    pub due_revisions: usize,
    pub urgent_labs: Vec<String>,
    pub study_seconds_today: i64,
    pub deep_work_sessions_today: u32,
    pub active_session: Option<StudySession>,
    pub streak: UserStreak,
}

pub struct Engine {
    store: Arc<Store>,
    config: Config,
    notifications: NotificationEngine,
}

impl Engine {
    pub fn new(store: Arc<Store>, config: Config) -> Self {
        let notifications = NotificationEngine::new(store.clone());
        Self {
            store,
            config,
            notifications,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn notifications(&self) -> &NotificationEngine {
        &self.notifications
    }

    fn curve(&self) -> EnergyCurve {
        EnergyCurve::new(self.config.energy_curve.clone())
    }

    /// Achievement pass after a qualifying event. Never fails the caller.
    fn after_event(&self, now: NaiveDateTime) {
        match AchievementEvaluator::new(&self.store).check(now) {
            Ok(awarded) if !awarded.is_empty() => {
                tracing::info!(?awarded, "achievements earned");
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "achievement pass failed"),
        }
    }

    // ── Timeline ────────────────────────────────────────────────────

    pub fn timeline(&self, date: NaiveDate) -> Result<Timeline> {
        TimelineBuilder::new(&self.config).build(date, &self.store.tasks_for_date(date)?)
    }

    pub fn week(&self, start: NaiveDate) -> Result<Vec<Timeline>> {
        (0..7)
            .map(|i| self.timeline(start + Duration::days(i)))
            .collect()
    }

    pub fn optimize(&self, date: NaiveDate, now: NaiveDateTime) -> Result<OptimizeReport> {
        Placer::new(&self.store, &self.config).optimize_day(date, now)
    }

    /// Optimize a run of days, optionally bounded by a wall-clock run
    /// deadline; the report carries already-committed placements with
    /// `partially_complete` set when time ran out.
    pub fn optimize_window(
        &self,
        start: NaiveDate,
        days: u32,
        now: NaiveDateTime,
        run_deadline: Option<std::time::Instant>,
    ) -> Result<OptimizeReport> {
        Placer::new(&self.store, &self.config).optimize_range(start, days, now, run_deadline)
    }

    pub fn reschedule_all(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        reason: &str,
        now: NaiveDateTime,
    ) -> Result<RescheduleReport> {
        Placer::new(&self.store, &self.config).reschedule_all(from, to, reason, now)
    }

    pub fn plan_backward(&self, request: &PlanRequest, now: NaiveDateTime) -> Result<Plan> {
        BackwardPlanner::new(&self.store, &self.config).plan(request, now)
    }

    pub fn apply_plan(&self, plan: &Plan, now: NaiveDateTime) -> Result<Vec<Task>> {
        BackwardPlanner::new(&self.store, &self.config).apply(plan, now)
    }

    // ── Subjects & chapters ─────────────────────────────────────────

    pub fn create_subject(&self, new: &NewSubject, now: NaiveDateTime) -> Result<Subject> {
        self.store.create_subject(new, now)
    }

    pub fn subjects(&self) -> Result<Vec<Subject>> {
        self.store.list_subjects()
    }

    pub fn create_chapter(
        &self,
        subject_code: &str,
        number: u16,
        title: &str,
        now: NaiveDateTime,
    ) -> Result<Chapter> {
        let subject = self.store.subject_by_code(subject_code)?;
        self.store.create_chapter(subject.id, number, title, now)
    }

    pub fn start_reading(&self, chapter_id: i64) -> Result<ChapterProgress> {
        self.store.start_chapter_reading(chapter_id)
    }

    /// Complete a chapter's reading: seeds the default revision sequence
    /// and unlocks the assignment, atomically.
    pub fn complete_reading(&self, chapter_id: i64, now: NaiveDateTime) -> Result<Vec<Revision>> {
        let revisions = self.store.complete_chapter_reading(chapter_id, now.date())?;
        self.after_event(now);
        Ok(revisions)
    }

    // ── Tasks ───────────────────────────────────────────────────────

    pub fn create_task(&self, new: &NewTask, now: NaiveDateTime) -> Result<Task> {
        self.store.create_task(new, now)
    }

    pub fn update_task(&self, id: i64, patch: &TaskPatch, now: NaiveDateTime) -> Result<Task> {
        self.store.update_task(id, patch, now)
    }

    pub fn delete_task(&self, id: i64) -> Result<()> {
        self.store.delete_task(id)
    }

    pub fn place_task(&self, id: i64, start: NaiveDateTime, now: NaiveDateTime) -> Result<Task> {
        self.store.place_task(id, start, now)
    }

    pub fn complete_task(&self, id: i64, now: NaiveDateTime) -> Result<Task> {
        let task = self.store.complete_task(id, now)?;
        self.after_event(now);
        Ok(task)
    }

    // ── Lab reports ─────────────────────────────────────────────────

    pub fn create_lab_report(
        &self,
        subject_code: &str,
        title: &str,
        due_date: NaiveDate,
        deadline: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<LabReport> {
        self.store
            .create_lab_report(subject_code, title, due_date, deadline, now)
    }

    pub fn update_lab_status(&self, id: i64, status: LabStatus) -> Result<LabReport> {
        self.store.update_lab_status(id, status)
    }

    // ── Revisions ───────────────────────────────────────────────────

    /// Explicit spaced-repetition scheduling; `None` intervals use the
    /// forgetting-curve default `[1, 3, 7, 14, 30]`.
    pub fn schedule_revisions(
        &self,
        chapter_id: i64,
        intervals: Option<&[i64]>,
        now: NaiveDateTime,
    ) -> Result<Vec<Revision>> {
        let intervals = intervals.unwrap_or(&SPACED_REPETITION_INTERVALS);
        self.store.schedule_revisions(chapter_id, intervals, now.date())
    }

    pub fn complete_revision(&self, id: i64, now: NaiveDateTime) -> Result<RevisionOutcome> {
        let outcome = self.store.complete_revision(id, now)?;
        self.after_event(now);
        Ok(outcome)
    }

    // ── Timer ───────────────────────────────────────────────────────

    pub fn timer_start(
        &self,
        subject_code: Option<&str>,
        chapter_id: Option<i64>,
        title: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<StudySession> {
        SessionTimer::new(&self.store, self.curve()).start(subject_code, chapter_id, title, now)
    }

    pub fn timer_stop(&self, now: NaiveDateTime) -> Result<StopOutcome> {
        let outcome = SessionTimer::new(&self.store, self.curve()).stop(now)?;
        self.after_event(now);
        Ok(outcome)
    }

    pub fn timer_status(&self, now: NaiveDateTime) -> Result<Option<TimerStatus>> {
        SessionTimer::new(&self.store, self.curve()).status(now)
    }

    // ── Wellbeing & breaks ──────────────────────────────────────────

    /// Score the date and route any recommendations as suggestion-type
    /// notifications.
    pub fn wellbeing_score(&self, date: NaiveDate, now: NaiveDateTime) -> Result<WellbeingMetric> {
        let metric = WellbeingMonitor::new(&self.store).evaluate(date, now)?;
        for (i, rec) in metric.recommendations.iter().enumerate() {
            let new = NewNotification::new(
                NotificationKind::Suggestion,
                match rec.priority {
                    crate::wellbeing::RecommendationPriority::Urgent => {
                        NotificationPriority::Urgent
                    }
                    crate::wellbeing::RecommendationPriority::High => NotificationPriority::High,
                    crate::wellbeing::RecommendationPriority::Medium => {
                        NotificationPriority::Normal
                    }
                    crate::wellbeing::RecommendationPriority::Low => NotificationPriority::Low,
                },
                rec.action.clone(),
                rec.reason.clone(),
            )
            .dedup(format!("wellbeing:{}:{}", date, i));
            self.notifications.deliver(new, now)?;
        }
        Ok(metric)
    }

    pub fn wellbeing_history(&self, today: NaiveDate, days: u32) -> Result<Vec<WellbeingMetric>> {
        self.store.wellbeing_history(today, days)
    }

    pub fn start_break(
        &self,
        break_type: BreakType,
        duration_hint: Option<u16>,
        now: NaiveDateTime,
    ) -> Result<BreakSession> {
        let suggested = duration_hint.unwrap_or(break_type.duration_range().1);
        self.store.start_break(break_type, suggested, now)
    }

    pub fn end_break(
        &self,
        id: i64,
        completed: Option<bool>,
        now: NaiveDateTime,
    ) -> Result<BreakSession> {
        self.store.end_break(id, completed, now)
    }

    /// Suggest a break type from the running timer's elapsed time.
    pub fn suggest_break_now(&self, now: NaiveDateTime) -> Result<(BreakType, u16)> {
        let continuous = match self.store.active_session()? {
            Some(session) => ((now - session.started_at).num_minutes()).max(0) as u32,
            None => 0,
        };
        Ok(suggest_break(continuous))
    }

    pub fn pomodoro(&self) -> Result<PomodoroStatus> {
        self.store.pomodoro()
    }

    pub fn pomodoro_start(&self, now: NaiveDateTime) -> Result<PomodoroStatus> {
        let mut status = self.store.pomodoro()?;
        status.start_work(now);
        self.store.set_pomodoro(&status)?;
        Ok(status)
    }

    pub fn pomodoro_advance(&self, now: NaiveDateTime) -> Result<PomodoroStatus> {
        let mut status = self.store.pomodoro()?;
        status.finish_work(now);
        self.store.set_pomodoro(&status)?;
        Ok(status)
    }

    pub fn pomodoro_stop(&self) -> Result<PomodoroStatus> {
        let mut status = self.store.pomodoro()?;
        status.stop();
        self.store.set_pomodoro(&status)?;
        Ok(status)
    }

    // ── Notifications ───────────────────────────────────────────────

    pub fn notifications_list(
        &self,
        kind: Option<NotificationKind>,
        unread_only: bool,
        limit: u32,
    ) -> Result<Vec<Notification>> {
        self.store.list_notifications(kind, unread_only, limit)
    }

    pub fn notification_mark_read(&self, id: i64, now: NaiveDateTime) -> Result<Notification> {
        self.store.mark_notification_read(id, now)
    }

    pub fn notification_dismiss(&self, id: i64, now: NaiveDateTime) -> Result<Notification> {
        self.store.dismiss_notification(id, now)
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub fn notification_preference(&self, kind: NotificationKind) -> Result<NotificationPreference> {
        self.store.notification_preference(kind)
    }

    pub fn set_notification_preference(&self, pref: &NotificationPreference) -> Result<()> {
        self.store.upsert_notification_preference(pref)
    }

    // ── Patterns ────────────────────────────────────────────────────

    pub fn recommendations(&self, context: &RecommendContext) -> Result<Vec<Recommendation>> {
        PatternAnalyzer::new(&self.store).recommendations(context)
    }

    // ── Achievements ────────────────────────────────────────────────

    /// Run the evaluator and return freshly awarded codes.
    pub fn check_achievements(&self, now: NaiveDateTime) -> Result<Vec<String>> {
        AchievementEvaluator::new(&self.store).check(now)
    }

    /// Catalog definitions paired with the user's current state.
    pub fn achievements_overview(
        &self,
    ) -> Result<Vec<(&'static AchievementDef, Option<UserAchievement>)>> {
        CATALOG
            .iter()
            .map(|def| Ok((def, self.store.achievement_state(def.code)?)))
            .collect()
    }

    pub fn streak(&self) -> Result<UserStreak> {
        self.store.streak()
    }

    // ── Summary ─────────────────────────────────────────────────────

    pub fn glance(&self, now: NaiveDateTime) -> Result<TodayGlance> {
        let date = now.date();
        let daily = self.store.daily_stats(date)?;
        let urgent_labs = self
            .store
            .labs_due_within(date, 3)?
            .into_iter()
            .filter(|lab| {
                matches!(lab.urgency(date), Urgency::Overdue | Urgency::Urgent)
            })
            .map(|lab| format!("{} ({})", lab.title, lab.subject_code))
            .collect();
        Ok(TodayGlance {
            date,
            timeline: self.timeline(date)?,
            due_revisions: self.store.pending_revisions(date)?.len(),
            urgent_labs,
            study_seconds_today: daily.study_seconds,
            deep_work_sessions_today: self.store.deep_work_session_count(date)?,
            active_session: self.store.active_session()?,
            streak: self.store.streak()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 3)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn engine() -> Engine {
        Engine::new(Arc::new(Store::open_memory().unwrap()), Config::default())
    }

    #[test]
    fn stop_timer_triggers_achievement_pass() {
        let engine = engine();
        engine.timer_start(None, None, None, t0()).unwrap();
        engine
            .timer_stop(t0() + Duration::seconds(5400))
            .unwrap();
        // Deep Diver is earned and queued for notification.
        let state = engine.store().achievement_state("deep_work_1").unwrap().unwrap();
        assert!(state.is_complete);
        assert!(!state.notified);
    }

    #[test]
    fn glance_reflects_state() {
        let engine = engine();
        engine.timer_start(Some("MATH101"), None, None, t0()).unwrap();
        let glance = engine.glance(t0() + Duration::minutes(10)).unwrap();
        assert!(glance.active_session.is_some());
        assert!(glance.timeline.is_contiguous_partition());
        assert_eq!(glance.due_revisions, 0);
    }

    #[test]
    fn wellbeing_score_emits_suggestions_for_overdue_backlog() {
        let engine = engine();
        let task = engine
            .create_task(
                &NewTask {
                    title: "late homework".to_string(),
                    subject_code: None,
                    priority: 5,
                    duration_mins: 60,
                    deadline: Some(t0() - Duration::days(1)),
                    task_type: crate::task::TaskType::Assignment,
                    is_deep_work: false,
                },
                t0() - Duration::days(2),
            )
            .unwrap();
        let _ = task;

        let metric = engine.wellbeing_score(t0().date(), t0()).unwrap();
        assert_eq!(metric.overdue_tasks, 1);
        assert!(!metric.recommendations.is_empty());

        let suggestions = engine
            .notifications_list(Some(NotificationKind::Suggestion), false, 10)
            .unwrap();
        assert!(!suggestions.is_empty());
    }
}
