use clap::Subcommand;
use studyos_core::{clock, NewSubject, RecommendContext, SubjectKind};

use super::{open_engine, print_json, CliError};

#[derive(Subcommand)]
pub enum StudyAction {
    /// Register a subject
    AddSubject {
        /// Code like MATH101
        code: String,
        name: String,
        #[arg(long, default_value_t = 3)]
        credits: u8,
        /// practice_heavy or concept_heavy
        #[arg(long, default_value = "concept_heavy")]
        kind: String,
        #[arg(long, default_value = "#6366f1")]
        color: String,
    },
    /// Add a chapter to a subject
    AddChapter {
        subject: String,
        number: u16,
        title: String,
    },
    /// Mark a chapter's reading in progress
    StartReading { chapter: i64 },
    /// Complete a chapter's reading (seeds +7/+14/+21 revisions)
    FinishReading { chapter: i64 },
    /// Schedule spaced revisions explicitly (default 1,3,7,14,30)
    ScheduleRevisions {
        chapter: i64,
        /// Comma-separated day offsets
        #[arg(long)]
        intervals: Option<String>,
    },
    /// Complete a revision by id
    CompleteRevision { id: i64 },
    /// Pending revisions due by today
    DueRevisions,
    /// Study recommendations from learned patterns
    Recommend {
        #[arg(long)]
        subject: Option<String>,
    },
}

pub fn run(action: StudyAction) -> Result<(), CliError> {
    let engine = open_engine()?;
    let now = clock::now();

    match action {
        StudyAction::AddSubject {
            code,
            name,
            credits,
            kind,
            color,
        } => {
            let subject = engine.create_subject(
                &NewSubject {
                    code,
                    name,
                    credits,
                    kind: SubjectKind::parse(&kind)?,
                    color,
                },
                now,
            )?;
            print_json(&subject)?;
        }
        StudyAction::AddChapter {
            subject,
            number,
            title,
        } => {
            let chapter = engine.create_chapter(&subject, number, &title, now)?;
            print_json(&chapter)?;
        }
        StudyAction::StartReading { chapter } => {
            let progress = engine.start_reading(chapter)?;
            print_json(&progress)?;
        }
        StudyAction::FinishReading { chapter } => {
            let revisions = engine.complete_reading(chapter, now)?;
            print_json(&revisions)?;
            eprintln!("{} revisions scheduled", revisions.len());
        }
        StudyAction::ScheduleRevisions { chapter, intervals } => {
            let parsed: Option<Vec<i64>> = intervals
                .map(|s| {
                    s.split(',')
                        .map(|part| part.trim().parse::<i64>())
                        .collect::<Result<Vec<_>, _>>()
                })
                .transpose()?;
            let revisions = engine.schedule_revisions(chapter, parsed.as_deref(), now)?;
            print_json(&revisions)?;
        }
        StudyAction::CompleteRevision { id } => {
            let outcome = engine.complete_revision(id, now)?;
            print_json(&outcome)?;
            eprintln!(
                "+{} points, streak {} days",
                outcome.points, outcome.current_streak
            );
        }
        StudyAction::DueRevisions => {
            let pending = engine.store().pending_revisions(now.date())?;
            print_json(&pending)?;
        }
        StudyAction::Recommend { subject } => {
            let recs = engine.recommendations(&RecommendContext {
                subject_code: subject,
            })?;
            if recs.is_empty() {
                eprintln!("not enough session data yet");
            } else {
                print_json(&recs)?;
            }
        }
    }

    Ok(())
}
