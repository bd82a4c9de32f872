//! Wall-clock helpers.
//!
//! The scheduling core works at one-minute resolution on minutes since
//! midnight; timestamps are naive local wall-clock values.

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::ValidationError;

/// Minutes in a civil day.
pub const DAY_MINUTES: u16 = 24 * 60;

/// Parse an `HH:MM` string into minutes since midnight.
pub fn parse_hhmm(s: &str) -> Result<u16, ValidationError> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| ValidationError::Time(s.to_string()))?;
    let hour: u16 = h.parse().map_err(|_| ValidationError::Time(s.to_string()))?;
    let min: u16 = m.parse().map_err(|_| ValidationError::Time(s.to_string()))?;
    if hour > 23 || min > 59 {
        return Err(ValidationError::Time(s.to_string()));
    }
    Ok(hour * 60 + min)
}

/// Format minutes since midnight as `HH:MM`.
pub fn fmt_minutes(minutes: u16) -> String {
    let m = minutes % DAY_MINUTES;
    format!("{:02}:{:02}", m / 60, m % 60)
}

/// Minutes since midnight of a time value.
pub fn minute_of(t: NaiveTime) -> u16 {
    (t.hour() * 60 + t.minute()) as u16
}

/// Combine a date with minutes since midnight. Minutes are clamped into the
/// day, so callers splitting blocks across midnight pass the next date.
pub fn at_minute(date: NaiveDate, minutes: u16) -> NaiveDateTime {
    let m = minutes.min(DAY_MINUTES - 1) as u32;
    date.and_time(NaiveTime::from_num_seconds_from_midnight_opt(m * 60, 0).unwrap_or_default())
}

/// Current local wall-clock timestamp.
pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Current local calendar date.
pub fn today() -> NaiveDate {
    now().date()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_format_round_trip() {
        assert_eq!(parse_hhmm("06:30").unwrap(), 390);
        assert_eq!(fmt_minutes(390), "06:30");
        assert_eq!(parse_hhmm("23:59").unwrap(), 1439);
        assert_eq!(fmt_minutes(0), "00:00");
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(parse_hhmm("24:00").is_err());
        assert!(parse_hhmm("12:60").is_err());
        assert!(parse_hhmm("noon").is_err());
        assert!(parse_hhmm("12").is_err());
    }
}
