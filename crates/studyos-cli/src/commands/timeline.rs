use clap::Subcommand;
use studyos_core::{clock, PlanRequest};

use super::{open_engine, parse_date, parse_datetime, print_json, CliError};

#[derive(Subcommand)]
pub enum TimelineAction {
    /// Print a day's timeline (default today)
    Show {
        #[arg(long)]
        date: Option<String>,
    },
    /// Print the week starting at a date (default today)
    Week {
        #[arg(long)]
        start: Option<String>,
    },
    /// Place pending work into the day's free gaps
    Optimize {
        #[arg(long)]
        date: Option<String>,
    },
    /// Backward-plan study hours toward a deadline
    Plan {
        subject: String,
        /// Deadline, "YYYY-MM-DD HH:MM"
        deadline: String,
        /// Hours of work needed
        hours: f64,
        #[arg(long, default_value = "Prepare for exam")]
        title: String,
        /// Commit the plan as placed tasks
        #[arg(long)]
        apply: bool,
    },
    /// Today-at-a-glance summary
    Glance,
}

pub fn run(action: TimelineAction) -> Result<(), CliError> {
    let engine = open_engine()?;
    let now = clock::now();

    match action {
        TimelineAction::Show { date } => {
            let timeline = engine.timeline(parse_date(date.as_deref())?)?;
            for block in &timeline.blocks {
                println!(
                    "{}  {:<12} e{:<2} {}",
                    block.span(),
                    block.activity.as_str(),
                    block.energy_level,
                    block.label
                );
            }
        }
        TimelineAction::Week { start } => {
            let week = engine.week(parse_date(start.as_deref())?)?;
            print_json(&week)?;
        }
        TimelineAction::Optimize { date } => {
            let report = engine.optimize(parse_date(date.as_deref())?, now)?;
            print_json(&report)?;
            if !report.unplaced.is_empty() {
                eprintln!("{} item(s) did not fit", report.unplaced.len());
            }
        }
        TimelineAction::Plan {
            subject,
            deadline,
            hours,
            title,
            apply,
        } => {
            let request = PlanRequest {
                subject_code: subject,
                title,
                deadline: parse_datetime(&deadline)?,
                hours_needed: hours,
            };
            let plan = engine.plan_backward(&request, now)?;
            print_json(&plan)?;
            if apply {
                let tasks = engine.apply_plan(&plan, now)?;
                eprintln!("committed {} study blocks", tasks.len());
            }
        }
        TimelineAction::Glance => {
            let glance = engine.glance(now)?;
            print_json(&glance)?;
        }
    }

    Ok(())
}
