//! Free-interval detection between a day's fixed blocks.
//!
//! Given the immutable blocks of a day (routines, classes, placed tasks) and
//! the wake/sleep window, enumerates the free intervals between them and
//! classifies each by how much focused work it can host.

use serde::{Deserialize, Serialize};

use crate::clock::fmt_minutes;

/// Size class of a free interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapClass {
    /// Up to 30 minutes: enough for a quick review or a break.
    Micro,
    /// 31-89 minutes: a standard study slot.
    Standard,
    /// 90 minutes or more: can host deep work.
    DeepWork,
}

impl GapClass {
    pub fn from_minutes(minutes: u16) -> Self {
        if minutes <= 30 {
            GapClass::Micro
        } else if minutes < 90 {
            GapClass::Standard
        } else {
            GapClass::DeepWork
        }
    }
}

/// A free interval within the day, in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    pub start: u16,
    pub end: u16,
    pub classification: GapClass,
}

impl Gap {
    pub fn new(start: u16, end: u16) -> Option<Self> {
        if end <= start {
            return None;
        }
        Some(Self {
            start,
            end,
            classification: GapClass::from_minutes(end - start),
        })
    }

    pub fn duration_mins(&self) -> u16 {
        self.end - self.start
    }

    pub fn can_fit(&self, minutes: u16) -> bool {
        self.duration_mins() >= minutes
    }

    pub fn label(&self) -> String {
        format!("{}-{}", fmt_minutes(self.start), fmt_minutes(self.end))
    }
}

/// An occupied interval, minutes since midnight. Inputs to the analyzer are
/// assumed disjoint; overlapping input is a programming error upstream.
#[derive(Debug, Clone, Copy)]
pub struct BusySpan {
    pub start: u16,
    pub end: u16,
}

/// Sweep over a day's busy spans and emit the free intervals inside
/// `[day_start, day_end]`.
pub fn find_gaps(spans: &[BusySpan], day_start: u16, day_end: u16) -> Vec<Gap> {
    let mut sorted: Vec<BusySpan> = spans.to_vec();
    sorted.sort_by_key(|s| s.start);

    let mut gaps = Vec::new();
    let mut cursor = day_start;

    for span in &sorted {
        if span.end <= cursor {
            continue;
        }
        if span.start >= day_end {
            break;
        }
        debug_assert!(span.start >= cursor, "overlapping busy spans");
        if span.start > cursor {
            if let Some(gap) = Gap::new(cursor, span.start.min(day_end)) {
                gaps.push(gap);
            }
        }
        cursor = cursor.max(span.end.min(day_end));
    }

    if cursor < day_end {
        if let Some(gap) = Gap::new(cursor, day_end) {
            gaps.push(gap);
        }
    }

    gaps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_boundaries() {
        assert_eq!(GapClass::from_minutes(1), GapClass::Micro);
        assert_eq!(GapClass::from_minutes(30), GapClass::Micro);
        assert_eq!(GapClass::from_minutes(31), GapClass::Standard);
        assert_eq!(GapClass::from_minutes(89), GapClass::Standard);
        assert_eq!(GapClass::from_minutes(90), GapClass::DeepWork);
        assert_eq!(GapClass::from_minutes(240), GapClass::DeepWork);
    }

    #[test]
    fn empty_day_is_one_gap() {
        let gaps = find_gaps(&[], 360, 1380);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].start, 360);
        assert_eq!(gaps[0].end, 1380);
        assert_eq!(gaps[0].classification, GapClass::DeepWork);
    }

    #[test]
    fn brackets_before_first_and_after_last_block() {
        // Wake 06:00, class 08:00-10:00, sleep 23:00.
        let spans = [BusySpan { start: 480, end: 600 }];
        let gaps = find_gaps(&spans, 360, 1380);
        assert_eq!(gaps.len(), 2);
        assert_eq!((gaps[0].start, gaps[0].end), (360, 480));
        assert_eq!((gaps[1].start, gaps[1].end), (600, 1380));
    }

    #[test]
    fn adjacent_blocks_leave_no_gap() {
        let spans = [
            BusySpan { start: 360, end: 480 },
            BusySpan { start: 480, end: 600 },
        ];
        let gaps = find_gaps(&spans, 360, 600);
        assert!(gaps.is_empty());
    }

    #[test]
    fn one_minute_gap_is_emitted() {
        let spans = [
            BusySpan { start: 360, end: 480 },
            BusySpan { start: 481, end: 600 },
        ];
        let gaps = find_gaps(&spans, 360, 600);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].duration_mins(), 1);
        assert_eq!(gaps[0].classification, GapClass::Micro);
    }

    #[test]
    fn unsorted_input_is_handled() {
        let spans = [
            BusySpan { start: 780, end: 825 },
            BusySpan { start: 480, end: 540 },
        ];
        let gaps = find_gaps(&spans, 360, 1380);
        assert_eq!(gaps.len(), 3);
        assert_eq!((gaps[1].start, gaps[1].end), (540, 780));
    }

    #[test]
    fn spans_outside_window_are_clipped() {
        let spans = [BusySpan { start: 0, end: 400 }, BusySpan { start: 1370, end: 1440 }];
        let gaps = find_gaps(&spans, 360, 1380);
        assert_eq!(gaps.len(), 1);
        assert_eq!((gaps[0].start, gaps[0].end), (400, 1370));
    }
}
