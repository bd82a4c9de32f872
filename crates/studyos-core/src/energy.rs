//! Hour-of-day energy model.
//!
//! Maps clock hours to an integer energy level 1-10 via a sparse, piecewise
//! constant curve, and classifies hours into time-of-day bands. The placer
//! uses both to pair task difficulty with the student's rhythm.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Time-of-day band for a clock hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    LateNight,
    EarlyMorning,
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    /// Classify a clock hour (0-23).
    pub fn from_hour(hour: u8) -> Self {
        match hour {
            0..=4 => TimeOfDay::LateNight,
            5 => TimeOfDay::EarlyMorning,
            6..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            17..=20 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::LateNight => "late_night",
            TimeOfDay::EarlyMorning => "early_morning",
            TimeOfDay::Morning => "morning",
            TimeOfDay::Afternoon => "afternoon",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "late_night" => Some(TimeOfDay::LateNight),
            "early_morning" => Some(TimeOfDay::EarlyMorning),
            "morning" => Some(TimeOfDay::Morning),
            "afternoon" => Some(TimeOfDay::Afternoon),
            "evening" => Some(TimeOfDay::Evening),
            "night" => Some(TimeOfDay::Night),
            _ => None,
        }
    }

    /// All bands, in chronological order starting at midnight.
    pub const ALL: [TimeOfDay; 6] = [
        TimeOfDay::LateNight,
        TimeOfDay::EarlyMorning,
        TimeOfDay::Morning,
        TimeOfDay::Afternoon,
        TimeOfDay::Evening,
        TimeOfDay::Night,
    ];
}

/// Sparse hour -> energy curve.
///
/// Hours without an entry inherit the nearest preceding entry; hours before
/// the first entry wrap around to the last one (late evening carries into
/// the small hours).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyCurve {
    levels: BTreeMap<u8, u8>,
}

impl EnergyCurve {
    pub fn new(levels: BTreeMap<u8, u8>) -> Self {
        Self { levels }
    }

    /// Energy level (1-10) for a clock hour.
    pub fn level_at(&self, hour: u8) -> u8 {
        let hour = hour.min(23);
        if let Some((_, level)) = self.levels.range(..=hour).next_back() {
            return *level;
        }
        // Before the first configured hour: wrap to the last entry.
        self.levels.values().next_back().copied().unwrap_or(5)
    }

    /// Energy level for a minute-of-day offset.
    pub fn level_at_minute(&self, minute: u16) -> u8 {
        self.level_at((minute / 60) as u8)
    }

    /// Hours (0-23) whose level is at least `min_level`.
    pub fn hours_at_or_above(&self, min_level: u8) -> Vec<u8> {
        (0u8..24).filter(|h| self.level_at(*h) >= min_level).collect()
    }

    /// The highest-energy hour of the day, earliest wins ties.
    pub fn peak_hour(&self) -> u8 {
        (0u8..24)
            .max_by_key(|h| (self.level_at(*h), 23 - *h))
            .unwrap_or(9)
    }
}

impl Default for EnergyCurve {
    fn default() -> Self {
        Self::new(crate::config::Config::default().energy_curve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve() -> EnergyCurve {
        EnergyCurve::default()
    }

    #[test]
    fn time_of_day_bands() {
        assert_eq!(TimeOfDay::from_hour(0), TimeOfDay::LateNight);
        assert_eq!(TimeOfDay::from_hour(4), TimeOfDay::LateNight);
        assert_eq!(TimeOfDay::from_hour(5), TimeOfDay::EarlyMorning);
        assert_eq!(TimeOfDay::from_hour(6), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(11), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(12), TimeOfDay::Afternoon);
        assert_eq!(TimeOfDay::from_hour(16), TimeOfDay::Afternoon);
        assert_eq!(TimeOfDay::from_hour(17), TimeOfDay::Evening);
        assert_eq!(TimeOfDay::from_hour(20), TimeOfDay::Evening);
        assert_eq!(TimeOfDay::from_hour(21), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(23), TimeOfDay::Night);
    }

    #[test]
    fn morning_peak_beats_post_lunch_dip() {
        let curve = curve();
        assert!(curve.level_at(9) >= 9);
        assert!(curve.level_at(12) <= 6);
        assert!(curve.level_at(9) > curve.level_at(14));
    }

    #[test]
    fn missing_hours_inherit_preceding_entry() {
        let curve = EnergyCurve::new(BTreeMap::from([(6, 5), (12, 8)]));
        assert_eq!(curve.level_at(7), 5);
        assert_eq!(curve.level_at(11), 5);
        assert_eq!(curve.level_at(12), 8);
        assert_eq!(curve.level_at(23), 8);
    }

    #[test]
    fn hours_before_first_entry_wrap_to_last() {
        let curve = EnergyCurve::new(BTreeMap::from([(6, 5), (22, 3)]));
        assert_eq!(curve.level_at(2), 3);
        assert_eq!(curve.level_at(5), 3);
    }

    #[test]
    fn peak_hour_is_stable() {
        let curve = curve();
        assert_eq!(curve.peak_hour(), 9);
    }
}
