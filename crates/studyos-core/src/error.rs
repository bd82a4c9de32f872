//! Core error types for studyos-core.
//!
//! Every operation on the engine surfaces one of the variants below. Store
//! errors bubble to the operation caller verbatim; background loops log and
//! continue instead of propagating.

use thiserror::Error;

/// Core error type for studyos-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Entity lookup by id failed.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// An invariant would be violated (double-started timer, overlapping
    /// placement, completing an already-completed revision).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The operation is refused given current state.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Bad input at the boundary.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The placer could not fit an item anywhere in the window.
    #[error("Unschedulable '{item}': {reason}")]
    Unschedulable { item: String, reason: String },

    /// The item's latest possible finish is already in the past.
    #[error("Deadline conflict: {0}")]
    DeadlineConflict(String),

    /// A long-running placer run hit its deadline; placements committed so
    /// far are listed and remain valid.
    #[error("Partially complete: {placed} of {total} items placed")]
    PartiallyComplete { placed: usize, total: usize },

    /// Database-layer errors, including backend unavailability.
    #[error("Storage error: {0}")]
    Backend(#[from] StoreError),
}

/// Storage-layer errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Query execution failed.
    #[error("query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// Schema migration failed.
    #[error("migration failed: {0}")]
    Migration(String),

    /// The store is unreachable; callers fail fast and background loops
    /// back off before retrying.
    #[error("store unavailable")]
    Unavailable,

    /// A stored value could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// Validation errors raised at the operation boundary.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Subject codes must match `[A-Z]{2,5}[0-9]{3}`.
    #[error("invalid subject code '{0}' (expected e.g. MATH101)")]
    SubjectCode(String),

    /// Chapter slugs must match `chapter[0-9]{2}`.
    #[error("invalid chapter slug '{0}' (expected e.g. chapter03)")]
    ChapterSlug(String),

    /// Invalid value for a named field.
    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: &'static str, message: String },

    /// A wall-clock string could not be parsed as HH:MM.
    #[error("invalid time '{0}' (expected HH:MM)")]
    Time(String),

    /// Invalid time range.
    #[error("invalid range: end ({end}) must be after start ({start})")]
    Range { start: String, end: String },
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        CoreError::Conflict(message.into())
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        CoreError::Precondition(message.into())
    }
}

/// Result type alias for CoreError.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
