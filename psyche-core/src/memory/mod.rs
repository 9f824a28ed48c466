//! Memory entries and the append-only ledger that holds them.
//!
//! A memory is "what happened" plus "what I thought about it", stamped with
//! the instant it happened. Memories are never edited; a correction is a new
//! entry.

pub mod ledger;

pub use ledger::{MemoryLedger, MemoryQuery};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PsycheError, Result};

/// A single remembered event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryEntry {
    /// What happened. Never empty.
    pub event: String,
    /// What the entity thought about it. May be empty.
    pub thought: String,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

impl MemoryEntry {
    /// Create a new memory entry.
    #[must_use]
    pub fn new(
        event: impl Into<String>,
        thought: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event: event.into(),
            thought: thought.into(),
            timestamp,
        }
    }

    /// Check that the entry may be appended at `latest_allowed`.
    ///
    /// # Errors
    /// [`PsycheError::Rejected`] for an empty event or a timestamp later
    /// than `latest_allowed`.
    pub fn check_appendable(&self, path: &str, latest_allowed: DateTime<Utc>) -> Result<()> {
        if self.event.trim().is_empty() {
            return Err(PsycheError::rejected(
                format!("{path}.event"),
                "memory event must not be empty",
            ));
        }
        if self.timestamp > latest_allowed {
            return Err(PsycheError::rejected(
                format!("{path}.timestamp"),
                format!(
                    "memory timestamp {} is in the future (latest allowed {})",
                    self.timestamp.to_rfc3339(),
                    latest_allowed.to_rfc3339()
                ),
            ));
        }
        Ok(())
    }
}

/// The agent's single current thought. Replaced, never accumulated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Thought {
    /// The thought itself.
    pub thought: String,
    /// When it was formed.
    pub timestamp: DateTime<Utc>,
}

impl Thought {
    /// Create a new thought.
    #[must_use]
    pub fn new(thought: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            thought: thought.into(),
            timestamp,
        }
    }
}
