//! Deltas: proposed changes to exactly one record.
//!
//! A delta is computed by the conversational layer and handed to the state
//! engine. Applying it is a pure function of `(record, delta, now)`: it
//! either yields the complete next record or fails without side effects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PsycheError, Result};
use crate::memory::{MemoryEntry, Thought};
use crate::record::Record;
use crate::traits::{MatrixDelta, MatrixKind, TraitChange, TraitPatch};
use crate::types::{ExtrinsicRelationship, Version};

/// A proposed change set for one record.
///
/// The JSON form mirrors the record layout: matrix deltas sit under the same
/// keys as the matrices they patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Delta {
    /// Version the delta was computed against. A mismatch is a conflict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_version: Option<Version>,
    /// Agent personality changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality: Option<MatrixDelta>,
    /// Agent emotion changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotional_status: Option<MatrixDelta>,
    /// User sentiment changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment_status: Option<MatrixDelta>,
    /// At most one new memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryEntry>,
    /// Replacement for the agent's current thought.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoughts: Option<Thought>,
    /// Replacement user summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// New extrinsic relationship (wire name, e.g. `"best friend"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extrinsic_relationship: Option<String>,
    /// Present only to be refused: the intrinsic relationship is fixed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intrinsic_relationship: Option<String>,
    /// Interaction stamp for a user record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_interaction: Option<DateTime<Utc>>,
}

/// Result of applying a delta to a record in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaOutcome {
    /// The complete next record.
    pub record: Record,
    /// Every trait the delta touched.
    pub changes: Vec<TraitChange>,
    /// Whether a memory entry was appended.
    pub memory_appended: bool,
}

impl Delta {
    /// An empty delta.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a delta from JSON sent by the conversational layer.
    ///
    /// # Errors
    /// [`PsycheError::SchemaViolation`] if the payload does not have the
    /// delta shape. Bounds inside trait patches parse fine and are refused
    /// later with [`PsycheError::ImmutableBoundsViolation`].
    pub fn from_json(value: &Value) -> Result<Self> {
        Self::deserialize(value).map_err(|e| PsycheError::schema("delta", e.to_string()))
    }

    /// Pin the delta to the version it was computed against.
    #[must_use]
    pub fn based_on(mut self, version: Version) -> Self {
        self.base_version = Some(version);
        self
    }

    /// Patch one trait.
    #[must_use]
    pub fn adjust(mut self, kind: MatrixKind, name: impl Into<String>, patch: TraitPatch) -> Self {
        let slot = self.matrix_slot(kind).get_or_insert_with(MatrixDelta::default);
        slot.traits.insert(name.into(), patch);
        self
    }

    /// Replace a matrix's rationale.
    #[must_use]
    pub fn reason(mut self, kind: MatrixKind, reason: impl Into<String>) -> Self {
        self.matrix_slot(kind)
            .get_or_insert_with(MatrixDelta::default)
            .reason = Some(reason.into());
        self
    }

    /// Append a memory.
    #[must_use]
    pub fn remember(mut self, entry: MemoryEntry) -> Self {
        self.memory = Some(entry);
        self
    }

    /// Replace the agent's current thought.
    #[must_use]
    pub fn think(mut self, thought: Thought) -> Self {
        self.thoughts = Some(thought);
        self
    }

    /// Replace the user summary.
    #[must_use]
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Move the user to a new extrinsic relationship.
    #[must_use]
    pub fn relationship(mut self, to: ExtrinsicRelationship) -> Self {
        self.extrinsic_relationship = Some(to.as_str().to_string());
        self
    }

    /// Stamp the user's last interaction.
    #[must_use]
    pub fn interacted_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_interaction = Some(at);
        self
    }

    /// Matrix deltas present in this delta.
    pub fn matrix_deltas(&self) -> impl Iterator<Item = (MatrixKind, &MatrixDelta)> {
        [
            (MatrixKind::Personality, self.personality.as_ref()),
            (MatrixKind::Emotion, self.emotional_status.as_ref()),
            (MatrixKind::Sentiment, self.sentiment_status.as_ref()),
        ]
        .into_iter()
        .filter_map(|(kind, delta)| delta.map(|d| (kind, d)))
    }

    /// Whether applying the delta would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matrix_deltas().all(|(_, d)| d.is_empty())
            && self.memory.is_none()
            && self.thoughts.is_none()
            && self.summary.is_none()
            && self.extrinsic_relationship.is_none()
            && self.intrinsic_relationship.is_none()
            && self.last_interaction.is_none()
    }

    fn matrix_slot(&mut self, kind: MatrixKind) -> &mut Option<MatrixDelta> {
        match kind {
            MatrixKind::Personality => &mut self.personality,
            MatrixKind::Emotion => &mut self.emotional_status,
            MatrixKind::Sentiment => &mut self.sentiment_status,
        }
    }

    /// Validate the delta against `current` and compute the next record.
    ///
    /// Bounds and shape are read from `current` only. `latest_allowed` is the
    /// newest acceptable memory / interaction timestamp (now plus skew
    /// tolerance). Deterministic: the engine clock only gates acceptance,
    /// it never leaks into the content.
    ///
    /// # Errors
    /// Any validation failure; `current` is never modified.
    pub fn apply_to(&self, current: &Record, latest_allowed: DateTime<Utc>) -> Result<DeltaOutcome> {
        if self.is_empty() {
            return Err(PsycheError::rejected("delta", "delta changes nothing"));
        }
        if self.intrinsic_relationship.is_some() {
            return Err(PsycheError::rejected(
                "intrinsic_relationship",
                "intrinsic relationship is fixed at creation",
            ));
        }

        let kind = current.kind();
        let mut next = current.clone();
        let mut changes = Vec::new();

        for (matrix_kind, matrix_delta) in self.matrix_deltas() {
            let Some(matrix) = current.matrix(matrix_kind) else {
                return Err(PsycheError::schema(
                    matrix_kind.field_name(),
                    format!("{kind} records have no `{}`", matrix_kind.field_name()),
                ));
            };
            let (updated, touched) = matrix.clamp_and_apply(matrix_delta)?;
            if let Some(slot) = next.matrix_mut(matrix_kind) {
                *slot = updated;
            }
            changes.extend(touched);
        }

        match &mut next {
            Record::Agent(agent) => {
                for (field, present) in [
                    ("summary", self.summary.is_some()),
                    ("extrinsic_relationship", self.extrinsic_relationship.is_some()),
                    ("last_interaction", self.last_interaction.is_some()),
                ] {
                    if present {
                        return Err(PsycheError::schema(field, "agent records have no such field"));
                    }
                }
                if let Some(thought) = &self.thoughts {
                    if thought.timestamp > latest_allowed {
                        return Err(PsycheError::rejected(
                            "thoughts.timestamp",
                            "thought timestamp is in the future",
                        ));
                    }
                    agent.thoughts = thought.clone();
                }
            }
            Record::User(user) => {
                if self.thoughts.is_some() {
                    return Err(PsycheError::schema("thoughts", "user records have no such field"));
                }
                if let Some(summary) = &self.summary {
                    user.summary.clone_from(summary);
                }
                if let Some(raw) = &self.extrinsic_relationship {
                    user.extrinsic_relationship = raw.parse::<ExtrinsicRelationship>()?;
                }
                if let Some(at) = self.last_interaction {
                    if at > latest_allowed {
                        return Err(PsycheError::rejected(
                            "last_interaction",
                            "interaction stamp is in the future",
                        ));
                    }
                    user.last_interaction = user.last_interaction.max(at);
                }
                if let Some(entry) = &self.memory {
                    user.last_interaction = user.last_interaction.max(entry.timestamp);
                }
            }
        }

        let memory_appended = if let Some(entry) = &self.memory {
            next.memory_mut().append(entry.clone(), latest_allowed)?;
            true
        } else {
            false
        };

        Ok(DeltaOutcome {
            record: next,
            changes,
            memory_appended,
        })
    }
}
