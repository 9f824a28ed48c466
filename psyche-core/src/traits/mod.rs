//! Bounded scalar traits.
//!
//! A [`TraitValue`] is one named scalar with immutable bounds. Updates come
//! in as [`TraitPatch`]es (additive or absolute) and are always clamped into
//! the bounds, never rejected for overshooting them.

pub mod catalog;
pub mod matrix;

pub use catalog::{MatrixKind, TraitSpec};
pub use matrix::{MatrixDelta, TraitMatrix};

use serde::{Deserialize, Serialize};

use crate::error::{PsycheError, Result};
use crate::types::{NumericKind, Scalar};

/// A single bounded scalar.
///
/// `min <= value <= max` holds for every instance; bounds never change
/// after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraitValue {
    description: String,
    value: Scalar,
    min: i64,
    max: i64,
}

impl TraitValue {
    /// Build a trait value, checking kind and bounds.
    ///
    /// `path` is the dotted field path used in error messages.
    ///
    /// # Errors
    /// Returns [`PsycheError::SchemaViolation`] if `min > max`, the value is
    /// not representable in `kind`, or the value lies outside the bounds.
    pub fn new(
        path: &str,
        description: impl Into<String>,
        value: Scalar,
        min: i64,
        max: i64,
        kind: NumericKind,
    ) -> Result<Self> {
        if min > max {
            return Err(PsycheError::schema(
                format!("{path}.min"),
                format!("min ({min}) exceeds max ({max})"),
            ));
        }
        let value = coerce(path, value, kind)?;
        if !within(value, min, max) {
            return Err(PsycheError::schema(
                format!("{path}.value"),
                format!("{value} lies outside [{min}, {max}]"),
            ));
        }
        Ok(Self {
            description: description.into(),
            value,
            min,
            max,
        })
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Current value.
    #[must_use]
    pub fn value(&self) -> Scalar {
        self.value
    }

    /// Lower bound.
    #[must_use]
    pub fn min(&self) -> i64 {
        self.min
    }

    /// Upper bound.
    #[must_use]
    pub fn max(&self) -> i64 {
        self.max
    }

    /// Apply one patch, returning the new value and whether it saturated.
    ///
    /// # Errors
    /// Fails if the patch carries bounds, is malformed, or its operand does
    /// not fit the trait's numeric kind.
    pub fn apply(&self, path: &str, patch: &TraitPatch, kind: NumericKind) -> Result<(Self, bool)> {
        let op = patch.op(path)?;
        match kind {
            NumericKind::Integer => {
                let raw = match op {
                    PatchOp::Add(delta) => {
                        i128::from(int_of(self.value)) + i128::from(int_of(coerce(path, delta, kind)?))
                    }
                    PatchOp::Set(target) => i128::from(int_of(coerce(path, target, kind)?)),
                };
                let clamped = clamp_int(raw, self.min, self.max);
                let next = Self {
                    value: Scalar::Integer(clamped),
                    ..self.clone()
                };
                Ok((next, raw != i128::from(clamped)))
            }
            NumericKind::Float => {
                let raw = match op {
                    PatchOp::Add(delta) => self.value.as_f64() + coerce(path, delta, kind)?.as_f64(),
                    PatchOp::Set(target) => coerce(path, target, kind)?.as_f64(),
                };
                Ok(self.with_float(raw))
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn with_float(&self, raw: f64) -> (Self, bool) {
        let clamped = raw.clamp(self.min as f64, self.max as f64);
        let next = Self {
            value: Scalar::Float(clamped),
            ..self.clone()
        };
        (next, clamped != raw)
    }
}

#[allow(clippy::cast_precision_loss)]
fn within(value: Scalar, min: i64, max: i64) -> bool {
    match value {
        Scalar::Integer(v) => (min..=max).contains(&v),
        Scalar::Float(v) => v >= min as f64 && v <= max as f64,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn int_of(value: Scalar) -> i64 {
    match value {
        Scalar::Integer(v) => v,
        // Only reached for values already coerced to integers.
        Scalar::Float(v) => v as i64,
    }
}

fn clamp_int(raw: i128, min: i64, max: i64) -> i64 {
    let clamped = raw.clamp(i128::from(min), i128::from(max));
    // Inside [min, max], which are both i64.
    i64::try_from(clamped).unwrap_or(if raw < 0 { min } else { max })
}

fn coerce(path: &str, value: Scalar, kind: NumericKind) -> Result<Scalar> {
    value.coerce(kind).ok_or_else(|| {
        PsycheError::schema(
            format!("{path}.value"),
            format!("{value} is not a valid {kind} value"),
        )
    })
}

// ---------------------------------------------------------------------------
// Patches
// ---------------------------------------------------------------------------

/// Wire shape of a single trait update: exactly one of `add` / `set`.
///
/// `min` and `max` exist only so a payload that tries to move the bounds can
/// be recognised and refused.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TraitPatch {
    /// Relative change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add: Option<Scalar>,
    /// Absolute target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<Scalar>,
    /// Attempted new lower bound (always refused).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    /// Attempted new upper bound (always refused).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
}

impl TraitPatch {
    /// Relative patch.
    pub fn add(delta: impl Into<Scalar>) -> Self {
        Self {
            add: Some(delta.into()),
            ..Self::default()
        }
    }

    /// Absolute patch.
    pub fn set(target: impl Into<Scalar>) -> Self {
        Self {
            set: Some(target.into()),
            ..Self::default()
        }
    }

    /// Resolve the operation, refusing bounds and ambiguous payloads.
    ///
    /// # Errors
    /// [`PsycheError::ImmutableBoundsViolation`] when bounds are present,
    /// [`PsycheError::SchemaViolation`] unless exactly one of `add`/`set`.
    pub fn op(&self, path: &str) -> Result<PatchOp> {
        if self.min.is_some() || self.max.is_some() {
            tracing::warn!(field = %path, "Rejected attempt to change trait bounds");
            return Err(PsycheError::ImmutableBoundsViolation {
                field: path.to_string(),
            });
        }
        match (self.add, self.set) {
            (Some(d), None) => Ok(PatchOp::Add(d)),
            (None, Some(t)) => Ok(PatchOp::Set(t)),
            (None, None) => Err(PsycheError::schema(path, "patch must carry `add` or `set`")),
            (Some(_), Some(_)) => Err(PsycheError::schema(
                path,
                "patch must carry only one of `add` and `set`",
            )),
        }
    }
}

/// A resolved trait update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PatchOp {
    /// `value + delta`, then clamp.
    Add(Scalar),
    /// `target`, then clamp.
    Set(Scalar),
}

/// What happened to one trait when a delta was applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraitChange {
    /// Matrix holding the trait.
    pub matrix: MatrixKind,
    /// Trait name.
    pub name: String,
    /// Value before the delta.
    pub previous: Scalar,
    /// Value after clamping.
    pub value: Scalar,
    /// Whether the unclamped result fell outside the bounds.
    pub was_clamped: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_trait(value: i64) -> TraitValue {
        TraitValue::new("t", "test", Scalar::Integer(value), 0, 100, NumericKind::Integer)
            .expect("valid")
    }

    #[test]
    fn additive_patch_saturates_at_max() {
        let (next, clamped) = int_trait(50)
            .apply("t", &TraitPatch::add(80_i64), NumericKind::Integer)
            .expect("apply");
        assert_eq!(next.value(), Scalar::Integer(100));
        assert!(clamped);
    }

    #[test]
    fn additive_patch_inside_bounds_is_exact() {
        let (next, clamped) = int_trait(50)
            .apply("t", &TraitPatch::add(-20_i64), NumericKind::Integer)
            .expect("apply");
        assert_eq!(next.value(), Scalar::Integer(30));
        assert!(!clamped);
    }

    #[test]
    fn absolute_patch_is_clamped_too() {
        let (next, clamped) = int_trait(50)
            .apply("t", &TraitPatch::set(-5_i64), NumericKind::Integer)
            .expect("apply");
        assert_eq!(next.value(), Scalar::Integer(0));
        assert!(clamped);
    }

    #[test]
    fn extreme_integer_deltas_do_not_overflow() {
        let (next, clamped) = int_trait(99)
            .apply("t", &TraitPatch::add(i64::MAX), NumericKind::Integer)
            .expect("apply");
        assert_eq!(next.value(), Scalar::Integer(100));
        assert!(clamped);
    }

    #[test]
    fn float_trait_stays_float() {
        let t = TraitValue::new("p", "test", Scalar::Integer(50), 0, 100, NumericKind::Float)
            .expect("valid");
        assert_eq!(t.value(), Scalar::Float(50.0));
        let (next, clamped) = t
            .apply("p", &TraitPatch::add(0.5), NumericKind::Float)
            .expect("apply");
        assert_eq!(next.value(), Scalar::Float(50.5));
        assert!(!clamped);
        let (next, clamped) = t
            .apply("p", &TraitPatch::add(f64::MAX), NumericKind::Float)
            .expect("apply");
        assert_eq!(next.value(), Scalar::Float(100.0));
        assert!(clamped);
    }

    #[test]
    fn large_integer_bounds_are_compared_exactly() {
        let bound = (1_i64 << 53) + 1;
        let err = TraitValue::new("t", "", Scalar::Integer(1 << 53), bound, bound, NumericKind::Integer)
            .expect_err("one below min");
        assert!(matches!(err, PsycheError::SchemaViolation { ref field, .. } if field == "t.value"));
        let t = TraitValue::new("t", "", Scalar::Integer(bound), bound, bound, NumericKind::Integer)
            .expect("exactly at bound");
        assert_eq!(t.value(), Scalar::Integer(bound));
    }

    #[test]
    fn fractional_delta_on_integer_trait_is_schema_violation() {
        let err = int_trait(10)
            .apply("emotional_status.joy", &TraitPatch::add(0.5), NumericKind::Integer)
            .expect_err("fractional");
        assert!(
            matches!(err, PsycheError::SchemaViolation { ref field, .. } if field == "emotional_status.joy.value")
        );
    }

    #[test]
    fn bounds_in_patch_are_refused() {
        let patch = TraitPatch {
            add: Some(Scalar::Integer(1)),
            max: Some(1000),
            ..TraitPatch::default()
        };
        let err = int_trait(10)
            .apply("x", &patch, NumericKind::Integer)
            .expect_err("bounds");
        assert!(matches!(err, PsycheError::ImmutableBoundsViolation { .. }));
    }

    #[test]
    fn patch_needs_exactly_one_operation() {
        assert!(TraitPatch::default().op("x").is_err());
        let both = TraitPatch {
            add: Some(Scalar::Integer(1)),
            set: Some(Scalar::Integer(1)),
            ..TraitPatch::default()
        };
        assert!(both.op("x").is_err());
    }

    #[test]
    fn construction_checks_bounds() {
        assert!(TraitValue::new("x", "", Scalar::Integer(5), 10, 0, NumericKind::Integer).is_err());
        assert!(TraitValue::new("x", "", Scalar::Integer(500), 0, 100, NumericKind::Integer).is_err());
        assert!(TraitValue::new("x", "", Scalar::Float(1.5), 0, 100, NumericKind::Integer).is_err());
    }

    #[test]
    fn serialises_in_declared_layout() {
        let json = serde_json::to_value(int_trait(42)).expect("ser");
        assert_eq!(
            json,
            serde_json::json!({"description": "test", "value": 42, "min": 0, "max": 100})
        );
    }
}
