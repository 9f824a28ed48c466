//! Core type definitions shared across the engine.
//!
//! Identity, versions, the numeric scalar carried by every trait and the two
//! closed relationship enums.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PsycheError;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Which record shape an identity refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// The conversational agent itself.
    Agent,
    /// A human user the agent talks to.
    User,
}

impl RecordKind {
    /// Lowercase name used in storage keys and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::User => "user",
        }
    }

    /// JSON key holding the record's identity.
    #[must_use]
    pub fn identity_key(self) -> &'static str {
        match self {
            Self::Agent => "name",
            Self::User => "username",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = PsycheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(Self::Agent),
            "user" => Ok(Self::User),
            other => Err(PsycheError::EnumViolation {
                field: "kind".to_string(),
                value: other.to_string(),
                allowed: &["agent", "user"],
            }),
        }
    }
}

/// Handle to one persisted record: its kind plus its identity key
/// (agent `name` or user `username`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    /// Record shape.
    pub kind: RecordKind,
    /// Identity within that kind.
    pub id: String,
}

impl RecordRef {
    /// Build a reference from a kind and identity.
    pub fn new(kind: RecordKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Opaque token naming one exact persisted state of a record.
///
/// Versions are assigned by the store; callers only compare them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(pub u64);

impl Version {
    /// Version assigned to a freshly created record.
    pub const INITIAL: Self = Self(1);

    /// The version that follows this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

/// Declared numeric kind of a trait's `value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericKind {
    /// Whole numbers only.
    Integer,
    /// Any finite floating-point number.
    Float,
}

impl fmt::Display for NumericKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => f.write_str("integer"),
            Self::Float => f.write_str("float"),
        }
    }
}

/// A trait value that remembers whether it is an integer or a float.
///
/// Serialised as a bare JSON number; integers keep no decimal point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Integer value.
    Integer(i64),
    /// Floating-point value.
    Float(f64),
}

impl Scalar {
    /// The value as `f64`, for comparisons across kinds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Integer(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    /// Numeric kind this scalar currently carries.
    #[must_use]
    pub fn kind(self) -> NumericKind {
        match self {
            Self::Integer(_) => NumericKind::Integer,
            Self::Float(_) => NumericKind::Float,
        }
    }

    /// Convert to the declared kind without losing information.
    ///
    /// Integral floats become integers and integers become floats; a
    /// fractional or non-finite value can never be coerced into an integer
    /// field, and non-finite values are refused for floats too.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn coerce(self, kind: NumericKind) -> Option<Self> {
        match (self, kind) {
            (Self::Integer(v), NumericKind::Integer) => Some(Self::Integer(v)),
            (Self::Integer(v), NumericKind::Float) => Some(Self::Float(v as f64)),
            (Self::Float(v), _) if !v.is_finite() => None,
            (Self::Float(v), NumericKind::Float) => Some(Self::Float(v)),
            (Self::Float(v), NumericKind::Integer) => {
                let in_range = v >= i64::MIN as f64 && v <= i64::MAX as f64;
                if v.fract() == 0.0 && in_range {
                    Some(Self::Integer(v as i64))
                } else {
                    None
                }
            }
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

/// Assigned or biological role of a user toward the agent.
///
/// Fixed when the user record is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntrinsicRelationship {
    /// The person who built the agent.
    Creator,
    /// Brother.
    Brother,
    /// Sister.
    Sister,
    /// Mother.
    Mother,
    /// Father.
    Father,
    /// Son.
    Son,
    /// Daughter.
    Daughter,
    /// No assigned role.
    None,
}

impl IntrinsicRelationship {
    /// Every accepted wire value, in declaration order.
    pub const ALLOWED: &'static [&'static str] = &[
        "creator", "brother", "sister", "mother", "father", "son", "daughter", "none",
    ];

    /// Wire value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Creator => "creator",
            Self::Brother => "brother",
            Self::Sister => "sister",
            Self::Mother => "mother",
            Self::Father => "father",
            Self::Son => "son",
            Self::Daughter => "daughter",
            Self::None => "none",
        }
    }
}

impl FromStr for IntrinsicRelationship {
    type Err = PsycheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "creator" => Self::Creator,
            "brother" => Self::Brother,
            "sister" => Self::Sister,
            "mother" => Self::Mother,
            "father" => Self::Father,
            "son" => Self::Son,
            "daughter" => Self::Daughter,
            "none" => Self::None,
            other => {
                return Err(PsycheError::EnumViolation {
                    field: "intrinsic_relationship".to_string(),
                    value: other.to_string(),
                    allowed: Self::ALLOWED,
                });
            }
        })
    }
}

/// Social standing of a user with the agent. The one enumerated field that
/// changes at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtrinsicRelationship {
    /// Never met or barely known.
    #[serde(rename = "stranger")]
    Stranger,
    /// Known in passing.
    #[serde(rename = "acquaintance")]
    Acquaintance,
    /// Friend.
    #[serde(rename = "friend")]
    Friend,
    /// Closest friend.
    #[serde(rename = "best friend")]
    BestFriend,
    /// Romantic partner.
    #[serde(rename = "romantic partner")]
    RomanticPartner,
    /// Hostile relationship.
    #[serde(rename = "enemy")]
    Enemy,
}

impl ExtrinsicRelationship {
    /// Every accepted wire value, in declaration order.
    pub const ALLOWED: &'static [&'static str] = &[
        "stranger",
        "acquaintance",
        "friend",
        "best friend",
        "romantic partner",
        "enemy",
    ];

    /// Wire value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stranger => "stranger",
            Self::Acquaintance => "acquaintance",
            Self::Friend => "friend",
            Self::BestFriend => "best friend",
            Self::RomanticPartner => "romantic partner",
            Self::Enemy => "enemy",
        }
    }
}

impl fmt::Display for ExtrinsicRelationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtrinsicRelationship {
    type Err = PsycheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "stranger" => Self::Stranger,
            "acquaintance" => Self::Acquaintance,
            "friend" => Self::Friend,
            "best friend" => Self::BestFriend,
            "romantic partner" => Self::RomanticPartner,
            "enemy" => Self::Enemy,
            other => {
                return Err(PsycheError::EnumViolation {
                    field: "extrinsic_relationship".to_string(),
                    value: other.to_string(),
                    allowed: Self::ALLOWED,
                });
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Inclusive time window for memory queries. `None` leaves a side open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Earliest timestamp included.
    pub from: Option<DateTime<Utc>>,
    /// Latest timestamp included.
    pub to: Option<DateTime<Utc>>,
}

impl TimeWindow {
    /// Window covering all of time.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// `[from, to]`, both ends included.
    #[must_use]
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    /// Everything at or after `from`.
    #[must_use]
    pub fn since(from: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: None,
        }
    }

    /// Everything at or before `to`.
    #[must_use]
    pub fn until(to: DateTime<Utc>) -> Self {
        Self {
            from: None,
            to: Some(to),
        }
    }

    /// Whether `ts` falls inside the window.
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| ts >= from) && self.to.is_none_or(|to| ts <= to)
    }

    /// Whether the window can never contain anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!((self.from, self.to), (Some(from), Some(to)) if from > to)
    }
}
