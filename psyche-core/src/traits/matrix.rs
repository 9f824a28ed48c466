//! Trait matrices: the closed set of traits of one kind plus a rationale.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::catalog::MatrixKind;
use super::{TraitChange, TraitPatch, TraitValue};
use crate::config::BoundsConfig;
use crate::error::{PsycheError, Result};
use crate::types::{NumericKind, Scalar};

/// A complete matrix of one kind.
///
/// Serialised as a flat JSON object: one key per trait plus `reason`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraitMatrix {
    #[serde(skip)]
    kind: MatrixKind,
    #[serde(flatten)]
    traits: BTreeMap<String, TraitValue>,
    reason: String,
}

impl TraitMatrix {
    /// Assemble a matrix, checking it against the closed catalog.
    ///
    /// # Errors
    /// Returns [`PsycheError::SchemaViolation`] if the trait names differ from
    /// the catalog or any value has the wrong numeric kind.
    pub fn new(
        kind: MatrixKind,
        traits: BTreeMap<String, TraitValue>,
        reason: impl Into<String>,
    ) -> Result<Self> {
        validate_shape(kind, &traits)?;
        Ok(Self {
            kind,
            traits,
            reason: reason.into(),
        })
    }

    /// Every trait of `kind` at the midpoint of the configured bounds.
    #[must_use]
    pub fn baseline(kind: MatrixKind, bounds: &BoundsConfig) -> Self {
        let (min, max) = (bounds.default_min, bounds.default_max.max(bounds.default_min));
        let mid = min + (max - min) / 2;
        #[allow(clippy::cast_precision_loss)]
        let value = match kind.numeric_kind() {
            NumericKind::Integer => Scalar::Integer(mid),
            NumericKind::Float => Scalar::Float(mid as f64),
        };
        let traits = kind
            .catalog()
            .iter()
            .map(|spec| {
                let tv = TraitValue {
                    description: spec.description.to_string(),
                    value,
                    min,
                    max,
                };
                (spec.name.to_string(), tv)
            })
            .collect();
        Self {
            kind,
            traits,
            reason: String::new(),
        }
    }

    /// Matrix kind.
    #[must_use]
    pub fn kind(&self) -> MatrixKind {
        self.kind
    }

    /// Look up one trait.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TraitValue> {
        self.traits.get(name)
    }

    /// Iterate traits in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TraitValue)> {
        self.traits.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of traits (always the catalog size).
    #[must_use]
    pub fn len(&self) -> usize {
        self.traits.len()
    }

    /// Whether the matrix has no traits; never true for a valid matrix.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
    }

    /// Current rationale.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Apply a delta, clamping every touched trait into its bounds.
    ///
    /// Pure: `self` is untouched and the same delta always yields the same
    /// result. Only traits named in the delta appear in the returned changes.
    ///
    /// # Errors
    /// Unknown trait names and malformed patches are
    /// [`PsycheError::SchemaViolation`]; bounds in a patch are
    /// [`PsycheError::ImmutableBoundsViolation`].
    pub fn clamp_and_apply(&self, delta: &MatrixDelta) -> Result<(Self, Vec<TraitChange>)> {
        let field = self.kind.field_name();
        let numeric = self.kind.numeric_kind();
        let mut next = self.clone();
        let mut changes = Vec::with_capacity(delta.traits.len());

        for (name, patch) in &delta.traits {
            let path = format!("{field}.{name}");
            let Some(current) = self.traits.get(name) else {
                return Err(PsycheError::schema(
                    path,
                    format!("`{name}` is not a declared {field} trait"),
                ));
            };
            let (updated, was_clamped) = current.apply(&path, patch, numeric)?;
            changes.push(TraitChange {
                matrix: self.kind,
                name: name.clone(),
                previous: current.value(),
                value: updated.value(),
                was_clamped,
            });
            next.traits.insert(name.clone(), updated);
        }

        if let Some(reason) = &delta.reason {
            next.reason.clone_from(reason);
        }
        Ok((next, changes))
    }
}

/// Check a proposed trait map against the closed catalog for `kind`.
///
/// # Errors
/// [`PsycheError::SchemaViolation`] naming the first missing, undeclared or
/// wrongly-typed trait.
pub fn validate_shape(kind: MatrixKind, proposed: &BTreeMap<String, TraitValue>) -> Result<()> {
    let field = kind.field_name();
    let declared: BTreeSet<&str> = kind.catalog().iter().map(|s| s.name).collect();

    if let Some(missing) = declared.iter().find(|name| !proposed.contains_key(**name)) {
        return Err(PsycheError::schema(
            format!("{field}.{missing}"),
            "declared trait is missing",
        ));
    }
    if let Some(extra) = proposed.keys().find(|name| !declared.contains(name.as_str())) {
        return Err(PsycheError::schema(
            format!("{field}.{extra}"),
            format!("`{extra}` is not a declared {field} trait"),
        ));
    }
    let numeric = kind.numeric_kind();
    if let Some((name, tv)) = proposed.iter().find(|(_, tv)| tv.value().kind() != numeric) {
        return Err(PsycheError::schema(
            format!("{field}.{name}.value"),
            format!("expected {numeric}, found {}", tv.value().kind()),
        ));
    }
    Ok(())
}

/// Proposed changes to one matrix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatrixDelta {
    /// Per-trait patches.
    #[serde(default)]
    pub traits: BTreeMap<String, TraitPatch>,
    /// Replacement rationale (whole-text, last write wins).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl MatrixDelta {
    /// Add a patch for one trait.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, patch: TraitPatch) -> Self {
        self.traits.insert(name.into(), patch);
        self
    }

    /// Replace the rationale.
    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Whether the delta changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.traits.is_empty() && self.reason.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn personality() -> TraitMatrix {
        TraitMatrix::baseline(MatrixKind::Personality, &BoundsConfig::default())
    }

    #[test]
    fn baseline_is_complete_and_valid() {
        for kind in MatrixKind::ALL {
            let m = TraitMatrix::baseline(kind, &BoundsConfig::default());
            assert_eq!(m.len(), kind.catalog().len());
            validate_shape(kind, &m.traits).expect("baseline shape");
        }
    }

    #[test]
    fn missing_trait_is_rejected() {
        let mut traits = personality().traits;
        traits.remove("humor");
        let err = TraitMatrix::new(MatrixKind::Personality, traits, "").expect_err("missing");
        assert!(
            matches!(err, PsycheError::SchemaViolation { ref field, .. } if field == "personality.humor")
        );
    }

    #[test]
    fn extra_trait_is_rejected() {
        let mut traits = personality().traits;
        let humor = traits["humor"].clone();
        traits.insert("telepathy".into(), humor);
        assert!(TraitMatrix::new(MatrixKind::Personality, traits, "").is_err());
    }

    #[test]
    fn wrong_numeric_kind_is_rejected() {
        // Emotion values are integers; a personality (float) matrix's values
        // must not be accepted as emotions.
        let floats = personality();
        let mut traits = BTreeMap::new();
        let template = floats.traits.values().next().expect("one trait").clone();
        for spec in MatrixKind::Emotion.catalog() {
            traits.insert(spec.name.to_string(), template.clone());
        }
        let err = TraitMatrix::new(MatrixKind::Emotion, traits, "").expect_err("kind");
        assert!(matches!(err, PsycheError::SchemaViolation { .. }));
    }

    #[test]
    fn clamp_and_apply_reports_saturation() {
        let m = personality();
        let delta = MatrixDelta::default()
            .with("friendliness", TraitPatch::add(80.0))
            .with("humor", TraitPatch::add(-10.0))
            .reason("warmed up after a long chat");
        let (next, changes) = m.clamp_and_apply(&delta).expect("apply");

        assert_eq!(next.get("friendliness").expect("t").value(), Scalar::Float(100.0));
        assert_eq!(next.get("humor").expect("t").value(), Scalar::Float(40.0));
        assert_eq!(next.reason(), "warmed up after a long chat");
        let friendly = changes.iter().find(|c| c.name == "friendliness").expect("change");
        assert!(friendly.was_clamped);
        let humor = changes.iter().find(|c| c.name == "humor").expect("change");
        assert!(!humor.was_clamped);
        // Original untouched.
        assert_eq!(m.get("friendliness").expect("t").value(), Scalar::Float(50.0));
    }

    #[test]
    fn unknown_trait_in_delta_is_rejected() {
        let delta = MatrixDelta::default().with("telepathy", TraitPatch::add(1.0));
        assert!(personality().clamp_and_apply(&delta).is_err());
    }

    #[test]
    fn reason_without_patches_only_replaces_reason() {
        let m = personality();
        let (next, changes) = m
            .clamp_and_apply(&MatrixDelta::default().reason("new"))
            .expect("apply");
        assert!(changes.is_empty());
        assert_eq!(next.reason(), "new");
        assert_eq!(next.traits, m.traits);
    }

    #[test]
    fn serialises_flat_with_reason() {
        let json = serde_json::to_value(personality()).expect("ser");
        let obj = json.as_object().expect("object");
        assert_eq!(obj.len(), 35);
        assert_eq!(obj["reason"], serde_json::json!(""));
        assert_eq!(obj["friendliness"]["value"], serde_json::json!(50.0));
    }
}
