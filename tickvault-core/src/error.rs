//! Error types for bucket storage and query operations.
//!
//! Every failure the engine can report on bad input is a variant of
//! [`TsError`]. Variants carry enough context for a human-readable message
//! and map to a stable machine code through [`TsError::code`], which the
//! request layer puts on the wire.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TsError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TsError {
    #[error("bucket already exists: {0}")]
    AlreadyExists(String),

    #[error("bucket not found: {0}")]
    NotFound(String),

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("bucket '{0}' has no 'timestamp' field")]
    MissingTimeField(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("type mismatch for field '{field}': {reason}")]
    TypeMismatch { field: String, reason: String },

    #[error("bucket '{0}' is empty")]
    EmptyBucket(String),

    #[error("no records in range to calculate {0}")]
    EmptyRange(String),

    #[error("time range start {start} is after end {end}")]
    InvalidRange { start: i64, end: i64 },

    #[error("unsupported aggregation: {0}")]
    InvalidAggregation(String),

    #[error("{0} exceeds the representable range")]
    AggregateOverflow(String),
}

impl TsError {
    /// Stable identifier for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidSchema(_) => "INVALID_SCHEMA",
            Self::MissingTimeField(_) => "MISSING_TIME_FIELD",
            Self::MissingField(_) => "MISSING_FIELD",
            Self::UnknownField(_) => "UNKNOWN_FIELD",
            Self::TypeMismatch { .. } => "TYPE_MISMATCH",
            Self::EmptyBucket(_) => "EMPTY_BUCKET",
            Self::EmptyRange(_) => "EMPTY_RANGE",
            Self::InvalidRange { .. } => "INVALID_RANGE",
            Self::InvalidAggregation(_) => "INVALID_AGGREGATION",
            Self::AggregateOverflow(_) => "AGGREGATE_OVERFLOW",
        }
    }

    pub(crate) fn type_mismatch(field: &str, reason: impl Into<String>) -> Self {
        Self::TypeMismatch {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
