use clap::Subcommand;
use studyos_core::{clock, NewTask, TaskPatch, TaskType};

use super::{open_engine, parse_date, parse_datetime, print_json, CliError};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a task
    Add {
        title: String,
        /// Duration in minutes
        #[arg(long, default_value_t = 60)]
        mins: u16,
        #[arg(long)]
        subject: Option<String>,
        /// Priority 1-10
        #[arg(long, default_value_t = 5)]
        priority: u8,
        /// Deadline, "YYYY-MM-DD HH:MM"
        #[arg(long)]
        deadline: Option<String>,
        /// Task type: study, revision, practice, assignment, lab_work
        #[arg(long, default_value = "study")]
        kind: String,
    },
    /// Assign a start slot, "YYYY-MM-DD HH:MM"
    Place { id: i64, start: String },
    /// Mark a task completed
    Done { id: i64 },
    /// Delete a task
    Remove { id: i64 },
    /// Change title or priority
    Edit {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        priority: Option<u8>,
        #[arg(long)]
        mins: Option<u16>,
    },
    /// List tasks placed on a date (default today)
    List {
        #[arg(long)]
        date: Option<String>,
    },
    /// Unplace every open task in a date range and re-run placement
    RescheduleAll {
        /// First date, YYYY-MM-DD
        from: String,
        /// Last date, YYYY-MM-DD
        to: String,
        #[arg(long, default_value = "manual reschedule")]
        reason: String,
    },
}

pub fn run(action: TaskAction) -> Result<(), CliError> {
    let engine = open_engine()?;
    let now = clock::now();

    match action {
        TaskAction::Add {
            title,
            mins,
            subject,
            priority,
            deadline,
            kind,
        } => {
            let task = engine.create_task(
                &NewTask {
                    title,
                    subject_code: subject,
                    priority,
                    duration_mins: mins,
                    deadline: deadline.as_deref().map(parse_datetime).transpose()?,
                    task_type: TaskType::parse(&kind)?,
                    is_deep_work: mins >= 90,
                },
                now,
            )?;
            print_json(&task)?;
        }
        TaskAction::Place { id, start } => {
            let task = engine.place_task(id, parse_datetime(&start)?, now)?;
            print_json(&task)?;
        }
        TaskAction::Done { id } => {
            let task = engine.complete_task(id, now)?;
            print_json(&task)?;
        }
        TaskAction::Remove { id } => {
            engine.delete_task(id)?;
            eprintln!("deleted task {id}");
        }
        TaskAction::Edit {
            id,
            title,
            priority,
            mins,
        } => {
            let task = engine.update_task(
                id,
                &TaskPatch {
                    title,
                    priority,
                    duration_mins: mins,
                    ..Default::default()
                },
                now,
            )?;
            print_json(&task)?;
        }
        TaskAction::List { date } => {
            let date = parse_date(date.as_deref())?;
            let tasks = engine.store().tasks_for_date(date)?;
            print_json(&tasks)?;
        }
        TaskAction::RescheduleAll { from, to, reason } => {
            let report = engine.reschedule_all(
                parse_date(Some(&from))?,
                parse_date(Some(&to))?,
                &reason,
                now,
            )?;
            print_json(&report)?;
        }
    }

    Ok(())
}
