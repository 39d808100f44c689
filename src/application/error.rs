//! Application-level errors (wraps domain errors)

use thiserror::Error;

use crate::domain::{DomainError, Resources};

/// Application errors wrap domain errors and add business-rule rejections.
///
/// Every variant maps to a stable `code()` so clients can render a
/// specific message.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("unknown profile: {0}")]
    UnknownProfile(String),

    #[error("unknown course: {0}")]
    UnknownCourse(String),

    #[error("unknown lesson: {0}")]
    UnknownLesson(String),

    #[error("unknown branching: {0}")]
    UnknownBranching(String),

    #[error("{0} has not been reached yet")]
    NotReached(String),

    #[error("branching {0} is resolved by profile attributes")]
    NotChoosable(String),

    #[error("branching {0} already chosen")]
    AlreadyChosen(String),

    #[error("lesson {0} already completed")]
    AlreadyCompleted(String),

    #[error("invalid choice at {branching}: {reason}")]
    InvalidChoice { branching: String, reason: String },

    #[error("choice at {branching} must fill {expected} slot(s), got {actual}")]
    WrongChoiceCount {
        branching: String,
        expected: usize,
        actual: usize,
    },

    #[error("insufficient resources: need {required}, have {available}")]
    InsufficientResources {
        required: Resources,
        available: Resources,
    },

    #[error("progress conflict: {0}")]
    Conflict(String),

    #[error("config error: {message}")]
    Config { message: String },

    #[error("operation failed: {context}")]
    OperationFailed {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ApplicationError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ApplicationError::Domain(_) => "malformed_graph",
            ApplicationError::UnknownProfile(_) => "unknown_profile",
            ApplicationError::UnknownCourse(_) => "unknown_course",
            ApplicationError::UnknownLesson(_) => "unknown_lesson",
            ApplicationError::UnknownBranching(_) => "unknown_branching",
            ApplicationError::NotReached(_) => "not_reached",
            ApplicationError::NotChoosable(_) => "not_choosable",
            ApplicationError::AlreadyChosen(_) => "already_chosen",
            ApplicationError::AlreadyCompleted(_) => "already_completed",
            ApplicationError::InvalidChoice { .. } => "invalid_choice",
            ApplicationError::WrongChoiceCount { .. } => "wrong_choice_count",
            ApplicationError::InsufficientResources { .. } => "insufficient_resources",
            ApplicationError::Conflict(_) => "conflict",
            ApplicationError::Config { .. } => "config",
            ApplicationError::OperationFailed { .. } => "storage",
        }
    }

    /// Rejections the caller can correct; nothing was mutated.
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            ApplicationError::NotReached(_)
                | ApplicationError::NotChoosable(_)
                | ApplicationError::AlreadyChosen(_)
                | ApplicationError::AlreadyCompleted(_)
                | ApplicationError::InvalidChoice { .. }
                | ApplicationError::WrongChoiceCount { .. }
                | ApplicationError::InsufficientResources { .. }
                | ApplicationError::Conflict(_)
        )
    }

    /// Lookups of identities that do not exist.
    pub fn is_unknown(&self) -> bool {
        matches!(
            self,
            ApplicationError::UnknownProfile(_)
                | ApplicationError::UnknownCourse(_)
                | ApplicationError::UnknownLesson(_)
                | ApplicationError::UnknownBranching(_)
        )
    }
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
