pub mod achievements;
pub mod notify;
pub mod serve;
pub mod study;
pub mod task;
pub mod timeline;
pub mod timer;
pub mod wellbeing;

use std::sync::Arc;

use studyos_core::{clock, Config, Engine, Store};

pub type CliError = Box<dyn std::error::Error>;

/// Open the default store and configuration.
pub fn open_engine() -> Result<Engine, CliError> {
    let config = Config::load()?;
    let store = Arc::new(Store::open_default()?);
    Ok(Engine::new(store, config))
}

/// Parse a `YYYY-MM-DD` argument, defaulting to today.
pub fn parse_date(arg: Option<&str>) -> Result<chrono::NaiveDate, CliError> {
    match arg {
        Some(s) => Ok(chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")?),
        None => Ok(clock::today()),
    }
}

/// Parse a `YYYY-MM-DD HH:MM` argument.
pub fn parse_datetime(s: &str) -> Result<chrono::NaiveDateTime, CliError> {
    Ok(chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")?)
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
