//! Record storage collaborator.
//!
//! The engine talks to storage only through [`RecordStore`]: a versioned
//! key-value interface with a conditional write. Stores hold record content
//! as opaque JSON and hand it back unchanged; all validation is the engine's
//! business.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::types::{RecordKind, RecordRef, Version};

/// Errors from storage operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Backend unreachable (connection lost, injected outage, ...).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Backend answered with an error.
    #[error("store query failed: {0}")]
    Query(String),

    /// Stored bytes could not be decoded.
    #[error("stored content for {record} is unreadable: {reason}")]
    Corrupt {
        /// Affected record.
        record: RecordRef,
        /// Decoder failure.
        reason: String,
    },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Query(e.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Stored content together with the version it was written at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    /// Record JSON, exactly as it was written.
    pub content: Value,
    /// Version of that content.
    pub version: Version,
}

/// Outcome of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Written; the record is now at this version.
    Stored(Version),
    /// The record moved on (or vanished) since it was read.
    VersionMismatch {
        /// Version actually stored, if the record still exists.
        current: Option<Version>,
    },
}

/// Outcome of an insert-only write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// Inserted at this version.
    Created(Version),
    /// A record with that identity already exists; nothing was written.
    AlreadyExists,
}

/// Versioned record storage.
///
/// Implementations must make `put_if_version` atomic: the compare and the
/// write happen as one step, so two writers holding the same version can
/// never both succeed.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Load a record and its version. `None` if it does not exist.
    async fn get(&self, record: &RecordRef) -> StoreResult<Option<Versioned>>;

    /// Replace a record's content if it is still at `expected`.
    async fn put_if_version(
        &self,
        record: &RecordRef,
        expected: Version,
        content: Value,
    ) -> StoreResult<PutOutcome>;

    /// Insert a new record at [`Version::INITIAL`].
    async fn create(&self, record: &RecordRef, content: Value) -> StoreResult<CreateOutcome>;

    /// References of every stored record, optionally of one kind, ordered
    /// by kind then id.
    async fn list(&self, kind: Option<RecordKind>) -> StoreResult<Vec<RecordRef>>;
}
