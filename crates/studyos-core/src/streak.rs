//! Daily activity streak.
//!
//! Singleton register: one streak per user. The advance rule lives here as a
//! pure function so the invariant (`longest >= current`) is enforced by the
//! type, not by a database constraint.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The user's activity streak and lifetime points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStreak {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_points: u64,
    pub last_activity: Option<NaiveDate>,
}

impl UserStreak {
    /// Register qualifying activity on `today`.
    ///
    /// Consecutive days extend the streak, a missed day resets it to 1, and
    /// repeat activity on the same day is a no-op. Returns true when the
    /// streak value changed.
    pub fn advance(&mut self, today: NaiveDate) -> bool {
        let yesterday = today.pred_opt();
        match self.last_activity {
            Some(last) if last >= today => false,
            Some(last) if Some(last) == yesterday => {
                self.current_streak += 1;
                self.longest_streak = self.longest_streak.max(self.current_streak);
                self.last_activity = Some(today);
                true
            }
            _ => {
                self.current_streak = 1;
                self.longest_streak = self.longest_streak.max(1);
                self.last_activity = Some(today);
                true
            }
        }
    }

    pub fn add_points(&mut self, points: u64) {
        self.total_points += points;
    }

    /// True when no qualifying activity has happened today and a missed day
    /// would break the streak tomorrow.
    pub fn at_risk(&self, today: NaiveDate) -> bool {
        self.current_streak > 0 && self.last_activity.is_some_and(|d| d < today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn first_activity_starts_streak() {
        let mut streak = UserStreak::default();
        assert!(streak.advance(day(10)));
        assert_eq!(streak.current_streak, 1);
        assert_eq!(streak.longest_streak, 1);
        assert_eq!(streak.last_activity, Some(day(10)));
    }

    #[test]
    fn consecutive_days_extend() {
        let mut streak = UserStreak::default();
        streak.advance(day(10));
        streak.advance(day(11));
        streak.advance(day(12));
        assert_eq!(streak.current_streak, 3);
        assert_eq!(streak.longest_streak, 3);
    }

    #[test]
    fn missed_day_resets_but_keeps_longest() {
        let mut streak = UserStreak::default();
        for d in 10..=14 {
            streak.advance(day(d));
        }
        assert_eq!(streak.current_streak, 5);
        streak.advance(day(17));
        assert_eq!(streak.current_streak, 1);
        assert_eq!(streak.longest_streak, 5);
        assert!(streak.longest_streak >= streak.current_streak);
    }

    #[test]
    fn same_day_is_noop() {
        let mut streak = UserStreak::default();
        assert!(streak.advance(day(10)));
        assert!(!streak.advance(day(10)));
        assert_eq!(streak.current_streak, 1);
    }

    #[test]
    fn at_risk_only_before_todays_activity() {
        let mut streak = UserStreak::default();
        streak.advance(day(10));
        assert!(streak.at_risk(day(11)));
        streak.advance(day(11));
        assert!(!streak.at_risk(day(11)));
    }
}
