use clap::Subcommand;
use studyos_core::clock;

use super::{open_engine, print_json, CliError};

#[derive(Subcommand)]
pub enum AchievementsAction {
    /// Catalog with current progress
    List,
    /// Run an evaluator pass and print newly earned codes
    Check,
    /// Current streak and lifetime points
    Streak,
}

pub fn run(action: AchievementsAction) -> Result<(), CliError> {
    let engine = open_engine()?;

    match action {
        AchievementsAction::List => {
            for (def, state) in engine.achievements_overview()? {
                let (progress, done) = state
                    .map(|s| (s.progress_value, s.is_complete))
                    .unwrap_or((0, false));
                let marker = if done { "x" } else { " " };
                println!(
                    "[{marker}] {:<14} {:<18} {}/{} ({} pts)",
                    def.code, def.name, progress, def.threshold_value, def.points
                );
            }
        }
        AchievementsAction::Check => {
            let awarded = engine.check_achievements(clock::now())?;
            if awarded.is_empty() {
                eprintln!("nothing new");
            } else {
                print_json(&awarded)?;
            }
        }
        AchievementsAction::Streak => print_json(&engine.streak()?)?,
    }

    Ok(())
}
