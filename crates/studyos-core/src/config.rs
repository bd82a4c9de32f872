//! TOML-based engine configuration.
//!
//! Holds the daily routine (sleep window, meals, study-block limits), the
//! sparse energy curve, and the fixed university timetable. Stored at
//! `~/.studyos/config.toml`; every field has a default so a missing or
//! partial file still yields a working configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::clock::parse_hhmm;
use crate::error::{Result, ValidationError};

/// Returns `~/.studyos/`, creating it if it doesn't exist.
pub fn data_dir() -> PathBuf {
    let dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".studyos");
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// Daily routine configuration: the fixed skeleton every timeline is built
/// around.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineConfig {
    /// Bedtime, HH:MM.
    #[serde(default = "default_sleep_start")]
    pub sleep_start: String,
    /// Wake-up, HH:MM.
    #[serde(default = "default_sleep_end")]
    pub sleep_end: String,
    #[serde(default = "default_wake_routine_mins")]
    pub wake_routine_mins: u16,
    /// Breakfast start, HH:MM. Defaults to right after the wake routine.
    #[serde(default)]
    pub breakfast_time: Option<String>,
    #[serde(default = "default_breakfast_mins")]
    pub breakfast_mins: u16,
    #[serde(default = "default_lunch_time")]
    pub lunch_time: String,
    #[serde(default = "default_lunch_mins")]
    pub lunch_mins: u16,
    #[serde(default = "default_dinner_time")]
    pub dinner_time: String,
    #[serde(default = "default_dinner_mins")]
    pub dinner_mins: u16,
    /// Longest single study block the placer will emit.
    #[serde(default = "default_max_study_block")]
    pub max_study_block_mins: u16,
    /// Slack left after any placed study block of 90 minutes or more.
    #[serde(default = "default_min_break_after_study")]
    pub min_break_after_study: u16,
    /// Minimum block length that counts as deep work.
    #[serde(default = "default_deep_work_min")]
    pub deep_work_min_duration: u16,
}

fn default_sleep_start() -> String {
    "23:00".to_string()
}
fn default_sleep_end() -> String {
    "06:00".to_string()
}
fn default_wake_routine_mins() -> u16 {
    30
}
fn default_breakfast_mins() -> u16 {
    30
}
fn default_lunch_time() -> String {
    "13:00".to_string()
}
fn default_lunch_mins() -> u16 {
    45
}
fn default_dinner_time() -> String {
    "19:30".to_string()
}
fn default_dinner_mins() -> u16 {
    45
}
fn default_max_study_block() -> u16 {
    90
}
fn default_min_break_after_study() -> u16 {
    15
}
fn default_deep_work_min() -> u16 {
    90
}

impl Default for RoutineConfig {
    fn default() -> Self {
        Self {
            sleep_start: default_sleep_start(),
            sleep_end: default_sleep_end(),
            wake_routine_mins: default_wake_routine_mins(),
            breakfast_time: None,
            breakfast_mins: default_breakfast_mins(),
            lunch_time: default_lunch_time(),
            lunch_mins: default_lunch_mins(),
            dinner_time: default_dinner_time(),
            dinner_mins: default_dinner_mins(),
            max_study_block_mins: default_max_study_block(),
            min_break_after_study: default_min_break_after_study(),
            deep_work_min_duration: default_deep_work_min(),
        }
    }
}

impl RoutineConfig {
    /// Wake-up as minutes since midnight.
    pub fn wake_minute(&self) -> Result<u16, ValidationError> {
        parse_hhmm(&self.sleep_end)
    }

    /// Bedtime as minutes since midnight.
    pub fn sleep_minute(&self) -> Result<u16, ValidationError> {
        parse_hhmm(&self.sleep_start)
    }
}

/// One fixed class in the university timetable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassEntry {
    /// HH:MM.
    pub start: String,
    /// HH:MM.
    pub end: String,
    pub subject: String,
    #[serde(default)]
    pub kind: ClassKind,
    #[serde(default)]
    pub room: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClassKind {
    #[default]
    Lecture,
    Lab,
    Tutorial,
}

/// Fixed weekly university timetable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timetable {
    #[serde(default)]
    pub monday: Vec<ClassEntry>,
    #[serde(default)]
    pub tuesday: Vec<ClassEntry>,
    #[serde(default)]
    pub wednesday: Vec<ClassEntry>,
    #[serde(default)]
    pub thursday: Vec<ClassEntry>,
    #[serde(default)]
    pub friday: Vec<ClassEntry>,
    #[serde(default)]
    pub saturday: Vec<ClassEntry>,
    #[serde(default)]
    pub sunday: Vec<ClassEntry>,
}

impl Timetable {
    /// Classes for a given weekday.
    pub fn classes_for(&self, day: chrono::Weekday) -> &[ClassEntry] {
        use chrono::Weekday::*;
        match day {
            Mon => &self.monday,
            Tue => &self.tuesday,
            Wed => &self.wednesday,
            Thu => &self.thursday,
            Fri => &self.friday,
            Sat => &self.saturday,
            Sun => &self.sunday,
        }
    }

    /// Sample timetable used when no config file exists: Sunday–Thursday
    /// teaching week with two lab afternoons.
    pub fn sample() -> Self {
        let entry = |start: &str, end: &str, subject: &str, kind: ClassKind, room: &str| ClassEntry {
            start: start.to_string(),
            end: end.to_string(),
            subject: subject.to_string(),
            kind,
            room: room.to_string(),
        };
        Self {
            sunday: vec![
                entry("08:00", "09:00", "MATH101", ClassKind::Lecture, "ENG-101"),
                entry("09:00", "10:00", "PHYS102", ClassKind::Lecture, "ENG-201"),
                entry("10:30", "12:30", "CHEM103", ClassKind::Lab, "LAB-A"),
            ],
            monday: vec![
                entry("08:00", "09:30", "COMP104", ClassKind::Lecture, "IT-301"),
                entry("14:00", "16:00", "THER105", ClassKind::Lab, "MECH-LAB"),
            ],
            tuesday: vec![
                entry("08:00", "09:00", "MATH101", ClassKind::Lecture, "ENG-101"),
                entry("09:00", "10:00", "PHYS102", ClassKind::Lecture, "ENG-201"),
                entry("10:00", "11:00", "CHEM103", ClassKind::Lecture, "ENG-102"),
                entry("11:30", "13:30", "PHYS102", ClassKind::Lab, "PHYS-LAB"),
            ],
            wednesday: vec![
                entry("08:00", "09:30", "COMP104", ClassKind::Lecture, "IT-301"),
                entry("10:00", "11:00", "THER105", ClassKind::Lecture, "MECH-201"),
            ],
            thursday: vec![
                entry("08:00", "09:00", "MATH101", ClassKind::Lecture, "ENG-101"),
                entry("09:00", "10:00", "PHYS102", ClassKind::Lecture, "ENG-201"),
                entry("10:00", "11:00", "CHEM103", ClassKind::Lecture, "ENG-102"),
                entry("14:00", "16:00", "CHEM103", ClassKind::Lab, "CHEM-LAB"),
            ],
            friday: Vec::new(),
            saturday: Vec::new(),
        }
    }
}

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.studyos/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub routine: RoutineConfig,
    /// Sparse hour-of-day -> energy level (1-10) map. Hours not present
    /// inherit the nearest preceding entry, wrapping past midnight.
    #[serde(default = "default_energy_curve")]
    pub energy_curve: BTreeMap<u8, u8>,
    #[serde(default = "Timetable::sample")]
    pub timetable: Timetable,
}

fn default_energy_curve() -> BTreeMap<u8, u8> {
    BTreeMap::from([
        (6, 5),
        (8, 9),
        (9, 10),
        (10, 8),
        (12, 4),
        (13, 6),
        (15, 7),
        (16, 8),
        (17, 6),
        (19, 5),
        (21, 3),
        (23, 2),
    ])
}

impl Default for Config {
    fn default() -> Self {
        Self {
            routine: RoutineConfig::default(),
            energy_curve: default_energy_curve(),
            timetable: Timetable::sample(),
        }
    }
}

impl Config {
    fn path() -> PathBuf {
        data_dir().join("config.toml")
    }

    /// Load the config file, falling back to defaults if it doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path).map_err(|e| ValidationError::InvalidValue {
            field: "config",
            message: e.to_string(),
        })?;
        let config: Config = toml::from_str(&text).map_err(|e| ValidationError::InvalidValue {
            field: "config",
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Persist the configuration.
    pub fn save(&self) -> Result<()> {
        let text = toml::to_string_pretty(self).map_err(|e| ValidationError::InvalidValue {
            field: "config",
            message: e.to_string(),
        })?;
        std::fs::write(Self::path(), text).map_err(|e| ValidationError::InvalidValue {
            field: "config",
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Reject configurations the timeline builder cannot work with.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.routine.wake_minute()?;
        self.routine.sleep_minute()?;
        parse_hhmm(&self.routine.lunch_time)?;
        parse_hhmm(&self.routine.dinner_time)?;
        if let Some(t) = &self.routine.breakfast_time {
            parse_hhmm(t)?;
        }
        for (hour, level) in &self.energy_curve {
            if *hour > 23 || *level == 0 || *level > 10 {
                return Err(ValidationError::InvalidValue {
                    field: "energy_curve",
                    message: format!("hour {hour} -> level {level} out of range"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.routine.max_study_block_mins, 90);
        assert_eq!(config.routine.min_break_after_study, 15);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [routine]
            sleep_start = "23:30"
            "#,
        )
        .unwrap();
        assert_eq!(config.routine.sleep_start, "23:30");
        assert_eq!(config.routine.sleep_end, "06:00");
        assert!(!config.energy_curve.is_empty());
    }

    #[test]
    fn sample_timetable_has_teaching_days() {
        let tt = Timetable::sample();
        assert!(!tt.classes_for(chrono::Weekday::Sun).is_empty());
        assert!(tt.classes_for(chrono::Weekday::Fri).is_empty());
    }

    #[test]
    fn out_of_range_energy_level_rejected() {
        let mut config = Config::default();
        config.energy_curve.insert(3, 11);
        assert!(config.validate().is_err());
    }
}
