//! Domain-level errors (no external dependencies)

use thiserror::Error;

/// Domain errors represent malformed authored content.
/// They are fatal for the request that hit them and are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("node not found in {scope}: {id}")]
    NodeNotFound { id: String, scope: String },

    #[error("branching {branching} has no target for profile attribute value '{value}'")]
    UnmappedParameter { branching: String, value: String },

    #[error("recorded choice at {branching} references unknown identity '{id}'")]
    MalformedChoice { branching: String, id: String },

    #[error("cycle detected in content graph at: {0}")]
    CycleDetected(String),

    #[error("quest nesting deeper than {limit} levels at: {quest}")]
    NestingTooDeep { quest: String, limit: usize },

    #[error("content scope has no entry: {0}")]
    MissingEntry(String),

    #[error("unit not found in lesson {lesson}: {unit}")]
    UnitNotFound { lesson: String, unit: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
