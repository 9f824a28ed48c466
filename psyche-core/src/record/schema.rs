//! Record schema enforcement.
//!
//! Turns an untyped JSON candidate into a typed [`Record`], or names the
//! first field that breaks the declared shape. Nothing is ever partially
//! accepted: either the whole record validates or an error comes back.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::{AgentRecord, Record, UserRecord};
use crate::error::{PsycheError, Result};
use crate::memory::{MemoryEntry, MemoryLedger, Thought};
use crate::traits::{MatrixKind, TraitMatrix, TraitValue};
use crate::types::{ExtrinsicRelationship, IntrinsicRelationship, RecordKind, Scalar};

/// Validate a candidate record of `kind`.
///
/// Checks, in order: the candidate is an object; every required top-level
/// key is present; no undeclared keys; then each field's type, the closed
/// relationship enums, every trait matrix and every memory item.
///
/// # Errors
/// - [`PsycheError::MissingRequiredField`] for an absent key,
/// - [`PsycheError::EnumViolation`] for a relationship outside its set,
/// - [`PsycheError::SchemaViolation`] for anything else.
pub fn validate_record(kind: RecordKind, candidate: &Value) -> Result<Record> {
    let Value::Object(obj) = candidate else {
        return Err(PsycheError::schema("$", "record must be a JSON object"));
    };
    let required = match kind {
        RecordKind::Agent => AgentRecord::REQUIRED,
        RecordKind::User => UserRecord::REQUIRED,
    };
    check_keys(obj, required, "")?;

    match kind {
        RecordKind::Agent => Ok(Record::Agent(AgentRecord {
            name: identity_string(obj, "name")?,
            identity: string(obj, "identity", "")?,
            personality: matrix(obj, MatrixKind::Personality)?,
            memory: ledger(obj)?,
            emotional_status: matrix(obj, MatrixKind::Emotion)?,
            thoughts: thought(obj)?,
        })),
        RecordKind::User => Ok(Record::User(UserRecord {
            username: identity_string(obj, "username")?,
            summary: string(obj, "summary", "")?,
            intrinsic_relationship: enum_value::<IntrinsicRelationship>(obj, "intrinsic_relationship")?,
            extrinsic_relationship: enum_value::<ExtrinsicRelationship>(obj, "extrinsic_relationship")?,
            memory: ledger(obj)?,
            sentiment_status: matrix(obj, MatrixKind::Sentiment)?,
            last_interaction: timestamp(obj, "last_interaction", "")?,
        })),
    }
}

/// Every required key present, nothing else.
fn check_keys(obj: &Map<String, Value>, required: &[&str], prefix: &str) -> Result<()> {
    if let Some(missing) = required.iter().find(|key| !obj.contains_key(**key)) {
        return Err(PsycheError::MissingRequiredField {
            field: format!("{prefix}{missing}"),
        });
    }
    if let Some(extra) = obj.keys().find(|key| !required.contains(&key.as_str())) {
        return Err(PsycheError::schema(
            format!("{prefix}{extra}"),
            "undeclared field",
        ));
    }
    Ok(())
}

fn string(obj: &Map<String, Value>, key: &str, prefix: &str) -> Result<String> {
    match &obj[key] {
        Value::String(s) => Ok(s.clone()),
        other => Err(PsycheError::schema(
            format!("{prefix}{key}"),
            format!("expected a string, found {}", type_name(other)),
        )),
    }
}

fn identity_string(obj: &Map<String, Value>, key: &str) -> Result<String> {
    let s = string(obj, key, "")?;
    if s.trim().is_empty() {
        return Err(PsycheError::schema(key, "identity must not be empty"));
    }
    Ok(s)
}

fn timestamp(obj: &Map<String, Value>, key: &str, prefix: &str) -> Result<DateTime<Utc>> {
    let raw = string(obj, key, prefix)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            PsycheError::schema(
                format!("{prefix}{key}"),
                format!("`{raw}` is not an RFC 3339 instant: {e}"),
            )
        })
}

fn enum_value<E>(obj: &Map<String, Value>, key: &str) -> Result<E>
where
    E: std::str::FromStr<Err = PsycheError>,
{
    match &obj[key] {
        Value::String(s) => s.parse(),
        other => other.to_string().parse(),
    }
}

fn object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| {
        PsycheError::schema(path, format!("expected an object, found {}", type_name(value)))
    })
}

fn matrix(obj: &Map<String, Value>, kind: MatrixKind) -> Result<TraitMatrix> {
    let field = kind.field_name();
    let body = object(&obj[field], field)?;
    let Some(reason) = body.get("reason") else {
        return Err(PsycheError::MissingRequiredField {
            field: format!("{field}.reason"),
        });
    };
    let Value::String(reason) = reason else {
        return Err(PsycheError::schema(
            format!("{field}.reason"),
            format!("expected a string, found {}", type_name(reason)),
        ));
    };

    let mut traits = BTreeMap::new();
    for (name, raw) in body.iter().filter(|(k, _)| k.as_str() != "reason") {
        let path = format!("{field}.{name}");
        traits.insert(name.clone(), trait_value(raw, &path, kind)?);
    }
    TraitMatrix::new(kind, traits, reason.clone())
}

fn trait_value(raw: &Value, path: &str, kind: MatrixKind) -> Result<TraitValue> {
    const FIELDS: &[&str] = &["description", "value", "min", "max"];
    let obj = object(raw, path)?;
    let prefix = format!("{path}.");
    check_keys(obj, FIELDS, &prefix)?;

    let description = string(obj, "description", &prefix)?;
    let value = match &obj["value"] {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Scalar::Integer(i),
            None => Scalar::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        other => {
            return Err(PsycheError::schema(
                format!("{path}.value"),
                format!("expected a number, found {}", type_name(other)),
            ));
        }
    };
    let min = integer(obj, "min", path)?;
    let max = integer(obj, "max", path)?;
    TraitValue::new(path, description, value, min, max, kind.numeric_kind())
}

fn integer(obj: &Map<String, Value>, key: &str, path: &str) -> Result<i64> {
    obj[key].as_i64().ok_or_else(|| {
        PsycheError::schema(
            format!("{path}.{key}"),
            format!("expected an integer, found {}", obj[key]),
        )
    })
}

fn ledger(obj: &Map<String, Value>) -> Result<MemoryLedger> {
    let Value::Array(items) = &obj["memory"] else {
        return Err(PsycheError::schema(
            "memory",
            format!("expected an array, found {}", type_name(&obj["memory"])),
        ));
    };
    let entries = items
        .iter()
        .enumerate()
        .map(|(i, item)| memory_entry(item, &format!("memory[{i}]")))
        .collect::<Result<Vec<_>>>()?;
    Ok(MemoryLedger::from_entries(entries))
}

/// Shape check for one memory item.
///
/// # Errors
/// [`PsycheError::MissingRequiredField`] or [`PsycheError::SchemaViolation`]
/// naming the offending key under `path`.
pub fn memory_entry(item: &Value, path: &str) -> Result<MemoryEntry> {
    const FIELDS: &[&str] = &["event", "thought", "timestamp"];
    let obj = object(item, path)?;
    let prefix = format!("{path}.");
    check_keys(obj, FIELDS, &prefix)?;
    let event = string(obj, "event", &prefix)?;
    if event.trim().is_empty() {
        return Err(PsycheError::schema(
            format!("{prefix}event"),
            "memory event must not be empty",
        ));
    }
    Ok(MemoryEntry {
        event,
        thought: string(obj, "thought", &prefix)?,
        timestamp: timestamp(obj, "timestamp", &prefix)?,
    })
}

fn thought(obj: &Map<String, Value>) -> Result<Thought> {
    const FIELDS: &[&str] = &["thought", "timestamp"];
    let body = object(&obj["thoughts"], "thoughts")?;
    check_keys(body, FIELDS, "thoughts.")?;
    Ok(Thought {
        thought: string(body, "thought", "thoughts.")?,
        timestamp: timestamp(body, "timestamp", "thoughts.")?,
    })
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
