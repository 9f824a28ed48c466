//! Error types for the psyche core library.

use thiserror::Error;

use crate::engine::DeltaPhase;
use crate::types::RecordRef;

/// Top-level error type for all psyche operations.
///
/// Validation failures (`SchemaViolation` through `Rejected`) are detected
/// before anything is persisted and are never worth retrying as-is.
/// `Conflict` and `Unavailable` are the only failures that can happen after
/// validation passed; both are safe to retry with a recomputed delta.
#[derive(Error, Debug)]
pub enum PsycheError {
    /// Structural or numeric-kind mismatch in a payload.
    #[error("Schema violation at `{field}`: {reason}")]
    SchemaViolation {
        /// Dotted path of the offending field.
        field: String,
        /// What invariant was violated.
        reason: String,
    },

    /// A required top-level key is absent from a record candidate.
    #[error("Missing required field: `{field}`")]
    MissingRequiredField {
        /// Name of the absent key.
        field: String,
    },

    /// An update payload tried to set trait bounds.
    #[error("Bounds of `{field}` are fixed at creation and cannot be updated")]
    ImmutableBoundsViolation {
        /// Dotted path of the trait whose bounds were targeted.
        field: String,
    },

    /// A relationship value outside its closed set.
    #[error("Invalid value `{value}` for `{field}` (allowed: {})", .allowed.join(", "))]
    EnumViolation {
        /// Field name.
        field: String,
        /// The rejected value.
        value: String,
        /// Every accepted value.
        allowed: &'static [&'static str],
    },

    /// Semantically invalid delta (future-dated memory, empty event, ...).
    #[error("Delta rejected at `{field}`: {reason}")]
    Rejected {
        /// Dotted path of the offending field.
        field: String,
        /// Why the delta was rejected.
        reason: String,
    },

    /// Lost the optimistic-concurrency race.
    #[error("Record was modified concurrently, try again")]
    Conflict {
        /// Record that was contended.
        record: RecordRef,
    },

    /// Storage collaborator unreachable or deadline exceeded.
    #[error("Record store unavailable, try again later")]
    Unavailable {
        /// Phase during which the store gave up.
        phase: DeltaPhase,
        /// Underlying cause, for logs only.
        cause: String,
    },

    /// No record exists under the given reference.
    #[error("Record not found: {0}")]
    NotFound(RecordRef),

    /// A record already exists under the given identity.
    #[error("Record already exists: {0}")]
    AlreadyExists(RecordRef),

    /// Stored content no longer satisfies the record schema.
    #[error("Stored record {record} is corrupt: {reason}")]
    CorruptRecord {
        /// Affected record.
        record: RecordRef,
        /// Validation failure describing the corruption.
        reason: String,
    },

    /// The engine has been shut down.
    #[error("State engine is shut down")]
    ShutDown,

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PsycheError {
    /// Shorthand for a [`PsycheError::SchemaViolation`].
    pub fn schema(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`PsycheError::Rejected`].
    pub fn rejected(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether a caller may retry after recomputing its delta.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Unavailable { .. })
    }

    /// Whether the failure came from payload validation.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::SchemaViolation { .. }
                | Self::MissingRequiredField { .. }
                | Self::ImmutableBoundsViolation { .. }
                | Self::EnumViolation { .. }
                | Self::Rejected { .. }
        )
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, PsycheError>;
