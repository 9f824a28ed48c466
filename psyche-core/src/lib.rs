//! # Psyche Core Library
//!
//! Persistent, bounded state for a conversational agent: who it is, how it
//! feels, what it remembers, and how it regards each user it talks to.
//!
//! Two record shapes are stored:
//!
//! - **Agent** — personality (34 traits), emotions (27), a memory ledger and
//!   the current thought.
//! - **User** — sentiments toward that user (64), relationship standing, a
//!   summary, a memory ledger and the last interaction time.
//!
//! Every trait carries `min`/`max` bounds fixed at creation. Records change
//! only through [`Delta`]s applied by the [`StateEngine`], which clamps
//! values into bounds, appends memories, and persists the result with a
//! version-conditioned write so concurrent updates to one record are
//! linearized.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod config;
pub mod delta;
pub mod engine;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod record;
pub mod retry;
pub mod store;
pub mod traits;
pub mod types;

pub use config::PsycheConfig;
pub use delta::Delta;
pub use engine::{AppliedDelta, DeltaPhase, StateEngine, VersionedRecord};
pub use error::{PsycheError, Result};
pub use memory::{MemoryEntry, MemoryLedger, Thought};
pub use record::{AgentRecord, Record, UserRecord};
pub use traits::{MatrixDelta, MatrixKind, TraitChange, TraitMatrix, TraitPatch, TraitValue};
pub use types::*;
