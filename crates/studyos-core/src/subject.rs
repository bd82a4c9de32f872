//! Subjects, chapters, and per-chapter progress.

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::ValidationError;

fn subject_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^[A-Z]{2,5}[0-9]{3}$").expect("static regex"))
}

fn chapter_slug_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^chapter[0-9]{2}$").expect("static regex"))
}

/// Validate a subject code like `MATH101`.
pub fn validate_subject_code(code: &str) -> Result<(), ValidationError> {
    if subject_code_re().is_match(code) {
        Ok(())
    } else {
        Err(ValidationError::SubjectCode(code.to_string()))
    }
}

/// Validate a chapter slug like `chapter03`.
pub fn validate_chapter_slug(slug: &str) -> Result<(), ValidationError> {
    if chapter_slug_re().is_match(slug) {
        Ok(())
    } else {
        Err(ValidationError::ChapterSlug(slug.to_string()))
    }
}

/// Whether a subject rewards drilling problems or absorbing concepts.
/// Drives the placer's time-of-day pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    PracticeHeavy,
    ConceptHeavy,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::PracticeHeavy => "practice_heavy",
            SubjectKind::ConceptHeavy => "concept_heavy",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "practice_heavy" => Ok(SubjectKind::PracticeHeavy),
            "concept_heavy" => Ok(SubjectKind::ConceptHeavy),
            other => Err(ValidationError::InvalidValue {
                field: "subject_kind",
                message: format!("unknown kind '{other}'"),
            }),
        }
    }
}

/// A university subject. Immutable after creation; used for grouping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub code: String,
    pub name: String,
    /// Credit hours, 1-6. Feeds revision points and placer tie-breaks.
    pub credits: u8,
    pub kind: SubjectKind,
    pub color: String,
    pub created_at: NaiveDateTime,
}

/// Input for creating a subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubject {
    pub code: String,
    pub name: String,
    pub credits: u8,
    pub kind: SubjectKind,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    "#6366f1".to_string()
}

impl NewSubject {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_subject_code(&self.code)?;
        if !(1..=6).contains(&self.credits) {
            return Err(ValidationError::InvalidValue {
                field: "credits",
                message: format!("{} not in 1..=6", self.credits),
            });
        }
        Ok(())
    }
}

/// A chapter within a subject. `number` is unique per subject and capped
/// at 99 so the slug form stays two digits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: i64,
    pub subject_id: i64,
    pub number: u16,
    pub title: String,
    pub created_at: NaiveDateTime,
}

impl Chapter {
    /// Canonical slug, e.g. `chapter03`.
    pub fn slug(&self) -> String {
        format!("chapter{:02}", self.number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl ReadingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingStatus::NotStarted => "not_started",
            ReadingStatus::InProgress => "in_progress",
            ReadingStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "not_started" => Ok(ReadingStatus::NotStarted),
            "in_progress" => Ok(ReadingStatus::InProgress),
            "completed" => Ok(ReadingStatus::Completed),
            other => Err(ValidationError::InvalidValue {
                field: "reading_status",
                message: format!("unknown status '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    /// Locked until the chapter reading is completed.
    Locked,
    Available,
    InProgress,
    Submitted,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Locked => "locked",
            AssignmentStatus::Available => "available",
            AssignmentStatus::InProgress => "in_progress",
            AssignmentStatus::Submitted => "submitted",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "locked" => Ok(AssignmentStatus::Locked),
            "available" => Ok(AssignmentStatus::Available),
            "in_progress" => Ok(AssignmentStatus::InProgress),
            "submitted" => Ok(AssignmentStatus::Submitted),
            other => Err(ValidationError::InvalidValue {
                field: "assignment_status",
                message: format!("unknown status '{other}'"),
            }),
        }
    }
}

/// 1-1 progress record for a chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterProgress {
    pub chapter_id: i64,
    pub reading_status: ReadingStatus,
    pub assignment_status: AssignmentStatus,
    /// 0-100.
    pub mastery_level: u8,
    pub revision_count: u32,
}

impl ChapterProgress {
    pub fn fresh(chapter_id: i64) -> Self {
        Self {
            chapter_id,
            reading_status: ReadingStatus::NotStarted,
            assignment_status: AssignmentStatus::Locked,
            mastery_level: 0,
            revision_count: 0,
        }
    }
}
