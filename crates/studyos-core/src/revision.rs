//! Spaced-repetition revision scheduling.
//!
//! Completing a chapter's reading seeds three revisions at +7, +14, and +21
//! days. The explicit scheduling tool uses the denser forgetting-curve
//! ladder `[1, 3, 7, 14, 30]` instead; the two defaults are intentionally
//! different and must not be unified.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Offsets applied automatically when a chapter's reading completes.
pub const READING_COMPLETION_OFFSETS: [i64; 3] = [7, 14, 21];

/// Default intervals for the explicit scheduling tool.
pub const SPACED_REPETITION_INTERVALS: [i64; 5] = [1, 3, 7, 14, 30];

/// Points for completing a revision: `5 x subject credits`.
pub fn revision_points(credits: u8) -> i64 {
    5 * credits as i64
}

/// One scheduled revision pass over a chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    pub id: i64,
    pub chapter_id: i64,
    /// 1-based position in the chapter's revision sequence.
    pub revision_number: u32,
    pub due_date: NaiveDate,
    pub completed: bool,
    pub completed_at: Option<NaiveDateTime>,
    pub points_earned: i64,
}

/// A pending revision joined with its chapter and subject context, as the
/// placer and the notification engine consume it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRevision {
    pub revision: Revision,
    pub chapter_number: u16,
    pub chapter_title: String,
    pub subject_code: String,
    pub subject_credits: u8,
}

/// Due dates for a revision sequence starting from `base`.
pub fn due_dates(base: NaiveDate, intervals: &[i64]) -> Vec<NaiveDate> {
    intervals.iter().map(|d| base + Duration::days(*d)).collect()
}

/// Outcome of completing a revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionOutcome {
    pub revision: Revision,
    pub points: i64,
    pub current_streak: u32,
    pub total_points: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_completion_offsets() {
        let base = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let dates = due_dates(base, &READING_COMPLETION_OFFSETS);
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2025, 3, 8).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 22).unwrap(),
            ]
        );
    }

    #[test]
    fn tool_default_is_forgetting_curve() {
        assert_eq!(SPACED_REPETITION_INTERVALS, [1, 3, 7, 14, 30]);
    }

    #[test]
    fn points_scale_with_credits() {
        assert_eq!(revision_points(1), 5);
        assert_eq!(revision_points(4), 20);
        assert_eq!(revision_points(6), 30);
    }
}
