//! Entity records: the full persisted shape of an agent or a user.
//!
//! Records are read-only outside the crate: they are built by
//! [`schema::validate_record`] or the baseline constructors, and only the
//! state engine produces new versions of them.

pub mod schema;

pub use schema::validate_record;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::BoundsConfig;
use crate::error::{PsycheError, Result};
use crate::memory::{MemoryLedger, Thought};
use crate::traits::{MatrixKind, TraitMatrix};
use crate::types::{ExtrinsicRelationship, IntrinsicRelationship, RecordKind, RecordRef};

/// The conversational agent's own state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRecord {
    pub(crate) name: String,
    pub(crate) identity: String,
    pub(crate) personality: TraitMatrix,
    pub(crate) memory: MemoryLedger,
    pub(crate) emotional_status: TraitMatrix,
    pub(crate) thoughts: Thought,
}

impl AgentRecord {
    /// Top-level keys every agent record must carry, in layout order.
    pub const REQUIRED: &'static [&'static str] = &[
        "name",
        "identity",
        "personality",
        "memory",
        "emotional_status",
        "thoughts",
    ];

    /// An agent with every trait at the midpoint of `bounds` and no memories.
    #[must_use]
    pub fn baseline(
        name: impl Into<String>,
        identity: impl Into<String>,
        bounds: &BoundsConfig,
        thoughts: Thought,
    ) -> Self {
        Self {
            name: name.into(),
            identity: identity.into(),
            personality: TraitMatrix::baseline(MatrixKind::Personality, bounds),
            memory: MemoryLedger::new(),
            emotional_status: TraitMatrix::baseline(MatrixKind::Emotion, bounds),
            thoughts,
        }
    }

    /// Agent name (its identity key).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free-text description of who the agent is.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Personality matrix.
    #[must_use]
    pub fn personality(&self) -> &TraitMatrix {
        &self.personality
    }

    /// Emotion matrix.
    #[must_use]
    pub fn emotional_status(&self) -> &TraitMatrix {
        &self.emotional_status
    }

    /// Memory ledger.
    #[must_use]
    pub fn memory(&self) -> &MemoryLedger {
        &self.memory
    }

    /// Current thought.
    #[must_use]
    pub fn thoughts(&self) -> &Thought {
        &self.thoughts
    }
}

/// The agent's relationship context with one human user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub(crate) username: String,
    pub(crate) summary: String,
    pub(crate) intrinsic_relationship: IntrinsicRelationship,
    pub(crate) extrinsic_relationship: ExtrinsicRelationship,
    pub(crate) memory: MemoryLedger,
    pub(crate) sentiment_status: TraitMatrix,
    pub(crate) last_interaction: DateTime<Utc>,
}

impl UserRecord {
    /// Top-level keys every user record must carry, in layout order.
    pub const REQUIRED: &'static [&'static str] = &[
        "username",
        "summary",
        "intrinsic_relationship",
        "extrinsic_relationship",
        "memory",
        "sentiment_status",
        "last_interaction",
    ];

    /// A user with every sentiment at the midpoint of `bounds` and no
    /// memories.
    #[must_use]
    pub fn baseline(
        username: impl Into<String>,
        summary: impl Into<String>,
        intrinsic: IntrinsicRelationship,
        extrinsic: ExtrinsicRelationship,
        bounds: &BoundsConfig,
        last_interaction: DateTime<Utc>,
    ) -> Self {
        Self {
            username: username.into(),
            summary: summary.into(),
            intrinsic_relationship: intrinsic,
            extrinsic_relationship: extrinsic,
            memory: MemoryLedger::new(),
            sentiment_status: TraitMatrix::baseline(MatrixKind::Sentiment, bounds),
            last_interaction,
        }
    }

    /// Username (identity key).
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Narrative summary of the user.
    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Fixed role.
    #[must_use]
    pub fn intrinsic_relationship(&self) -> IntrinsicRelationship {
        self.intrinsic_relationship
    }

    /// Current social standing.
    #[must_use]
    pub fn extrinsic_relationship(&self) -> ExtrinsicRelationship {
        self.extrinsic_relationship
    }

    /// Sentiment matrix.
    #[must_use]
    pub fn sentiment_status(&self) -> &TraitMatrix {
        &self.sentiment_status
    }

    /// Memory ledger.
    #[must_use]
    pub fn memory(&self) -> &MemoryLedger {
        &self.memory
    }

    /// Last time the agent interacted with this user.
    #[must_use]
    pub fn last_interaction(&self) -> DateTime<Utc> {
        self.last_interaction
    }
}

/// Either record shape. Serialises as the bare record (no tag).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    /// An agent record.
    Agent(AgentRecord),
    /// A user record.
    User(UserRecord),
}

impl Record {
    /// Which shape this is.
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Agent(_) => RecordKind::Agent,
            Self::User(_) => RecordKind::User,
        }
    }

    /// Identity key (agent name or username).
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Agent(a) => &a.name,
            Self::User(u) => &u.username,
        }
    }

    /// Reference to this record.
    #[must_use]
    pub fn record_ref(&self) -> RecordRef {
        RecordRef::new(self.kind(), self.id())
    }

    /// Memory ledger.
    #[must_use]
    pub fn memory(&self) -> &MemoryLedger {
        match self {
            Self::Agent(a) => &a.memory,
            Self::User(u) => &u.memory,
        }
    }

    pub(crate) fn memory_mut(&mut self) -> &mut MemoryLedger {
        match self {
            Self::Agent(a) => &mut a.memory,
            Self::User(u) => &mut u.memory,
        }
    }

    /// The matrix of `kind`, if this record shape has one.
    #[must_use]
    pub fn matrix(&self, kind: MatrixKind) -> Option<&TraitMatrix> {
        match (self, kind) {
            (Self::Agent(a), MatrixKind::Personality) => Some(&a.personality),
            (Self::Agent(a), MatrixKind::Emotion) => Some(&a.emotional_status),
            (Self::User(u), MatrixKind::Sentiment) => Some(&u.sentiment_status),
            _ => None,
        }
    }

    pub(crate) fn matrix_mut(&mut self, kind: MatrixKind) -> Option<&mut TraitMatrix> {
        match (self, kind) {
            (Self::Agent(a), MatrixKind::Personality) => Some(&mut a.personality),
            (Self::Agent(a), MatrixKind::Emotion) => Some(&mut a.emotional_status),
            (Self::User(u), MatrixKind::Sentiment) => Some(&mut u.sentiment_status),
            _ => None,
        }
    }

    /// Agent view, if this is an agent.
    #[must_use]
    pub fn as_agent(&self) -> Option<&AgentRecord> {
        match self {
            Self::Agent(a) => Some(a),
            Self::User(_) => None,
        }
    }

    /// User view, if this is a user.
    #[must_use]
    pub fn as_user(&self) -> Option<&UserRecord> {
        match self {
            Self::User(u) => Some(u),
            Self::Agent(_) => None,
        }
    }

    /// Persisted JSON layout.
    ///
    /// # Errors
    /// [`PsycheError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| PsycheError::Serialization(e.to_string()))
    }
}

impl From<AgentRecord> for Record {
    fn from(a: AgentRecord) -> Self {
        Self::Agent(a)
    }
}

impl From<UserRecord> for Record {
    fn from(u: UserRecord) -> Self {
        Self::User(u)
    }
}
