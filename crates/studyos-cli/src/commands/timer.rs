use clap::Subcommand;
use studyos_core::clock;

use super::{open_engine, print_json, CliError};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start a study session
    Start {
        /// Subject code, e.g. MATH101
        #[arg(long)]
        subject: Option<String>,
        /// Chapter id
        #[arg(long)]
        chapter: Option<i64>,
        /// Free-form session title
        #[arg(long)]
        title: Option<String>,
    },
    /// Stop the running session
    Stop,
    /// Print the running session as JSON
    Status,
}

pub fn run(action: TimerAction) -> Result<(), CliError> {
    let engine = open_engine()?;
    let now = clock::now();

    match action {
        TimerAction::Start {
            subject,
            chapter,
            title,
        } => {
            let session =
                engine.timer_start(subject.as_deref(), chapter, title.as_deref(), now)?;
            print_json(&session)?;
        }
        TimerAction::Stop => {
            let outcome = engine.timer_stop(now)?;
            print_json(&outcome.session)?;
            if outcome.session.is_deep_work {
                eprintln!("deep work session, +{} points", outcome.session.points_earned);
            }
            if outcome.streak_advanced {
                eprintln!("streak: {} days", outcome.streak.current_streak);
            }
        }
        TimerAction::Status => match engine.timer_status(now)? {
            Some(status) => print_json(&status)?,
            None => eprintln!("no active timer"),
        },
    }

    Ok(())
}
