use clap::Subcommand;
use studyos_core::{clock, BreakType};

use super::{open_engine, parse_date, print_json, CliError};

#[derive(Subcommand)]
pub enum WellbeingAction {
    /// Compute today's wellbeing score (or a past date's)
    Score {
        #[arg(long)]
        date: Option<String>,
    },
    /// Score history for the last N days
    History {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// Suggest a break for the current study stretch
    Suggest,
    /// Start a break: short, pomodoro, meal, exercise, meditation, walk, long
    StartBreak {
        kind: String,
        /// Minutes, defaults per break type
        #[arg(long)]
        mins: Option<u16>,
    },
    /// End a break by id
    EndBreak {
        id: i64,
        /// Override the completed verdict
        #[arg(long)]
        skipped: bool,
    },
    /// Pomodoro register status
    Pomodoro,
    /// Start a pomodoro work phase
    PomodoroStart,
    /// Finish the work phase and move to a break
    PomodoroAdvance,
    /// Stop the pomodoro cycle
    PomodoroStop,
}

pub fn run(action: WellbeingAction) -> Result<(), CliError> {
    let engine = open_engine()?;
    let now = clock::now();

    match action {
        WellbeingAction::Score { date } => {
            let metric = engine.wellbeing_score(parse_date(date.as_deref())?, now)?;
            print_json(&metric)?;
        }
        WellbeingAction::History { days } => {
            let history = engine.wellbeing_history(now.date(), days)?;
            print_json(&history)?;
        }
        WellbeingAction::Suggest => {
            let (kind, mins) = engine.suggest_break_now(now)?;
            println!("{} break, about {} minutes", kind.as_str(), mins);
        }
        WellbeingAction::StartBreak { kind, mins } => {
            let brk = engine.start_break(BreakType::parse(&kind)?, mins, now)?;
            print_json(&brk)?;
        }
        WellbeingAction::EndBreak { id, skipped } => {
            let completed = if skipped { Some(false) } else { None };
            let brk = engine.end_break(id, completed, now)?;
            print_json(&brk)?;
        }
        WellbeingAction::Pomodoro => print_json(&engine.pomodoro()?)?,
        WellbeingAction::PomodoroStart => print_json(&engine.pomodoro_start(now)?)?,
        WellbeingAction::PomodoroAdvance => print_json(&engine.pomodoro_advance(now)?)?,
        WellbeingAction::PomodoroStop => print_json(&engine.pomodoro_stop()?)?,
    }

    Ok(())
}
