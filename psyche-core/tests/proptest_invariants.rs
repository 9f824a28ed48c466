//! Property-based tests for the engine's data invariants.
//!
//! Deltas are applied with `Delta::apply_to`, which is the pure core of
//! `StateEngine::apply_delta`, so no runtime is needed here.

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use serde_json::{Value, json};

use psyche_core::config::BoundsConfig;
use psyche_core::record::validate_record;
use psyche_core::{
    AgentRecord, Delta, MatrixKind, MemoryEntry, MemoryLedger, Record, RecordKind, Scalar,
    Thought, TimeWindow, TraitPatch,
};

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
        .expect("ts")
        .with_timezone(&Utc)
}

fn far_future() -> DateTime<Utc> {
    t0() + Duration::days(3650)
}

/// An agent whose `joy` and `curiosity` traits carry the given bounds.
fn agent_with_bounds(min: i64, max: i64, joy: i64, curiosity: f64) -> Record {
    let agent = AgentRecord::baseline("aria", "", &BoundsConfig::default(), Thought::new("", t0()));
    let mut candidate: Value = serde_json::to_value(&agent).expect("json");
    candidate["emotional_status"]["joy"] = json!({
        "description": "joy", "value": joy, "min": min, "max": max,
    });
    candidate["personality"]["curiosity"] = json!({
        "description": "curiosity", "value": curiosity, "min": min, "max": max,
    });
    validate_record(RecordKind::Agent, &candidate).expect("valid candidate")
}

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_bounds() -> impl Strategy<Value = (i64, i64, i64, f64)> {
    (-1000i64..1000, 0i64..2000, 0.0..=1.0f64).prop_map(|(min, span, frac)| {
        let max = min + span;
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let joy = min + (span as f64 * frac) as i64;
        #[allow(clippy::cast_precision_loss)]
        let curiosity = min as f64 + span as f64 * frac;
        (min, max, joy, curiosity.clamp(min as f64, max as f64))
    })
}

fn arb_patch() -> impl Strategy<Value = TraitPatch> {
    prop_oneof![
        (-5000i64..5000).prop_map(TraitPatch::add),
        (-5000i64..5000).prop_map(TraitPatch::set),
    ]
}

fn arb_entry() -> impl Strategy<Value = MemoryEntry> {
    ("[a-z]{1,12}", -10_000i64..10_000).prop_map(|(event, secs)| {
        MemoryEntry::new(event, "", t0() + Duration::seconds(secs))
    })
}

fn value_of(record: &Record, kind: MatrixKind, name: &str) -> (f64, i64, i64) {
    let tv = record.matrix(kind).and_then(|m| m.get(name)).expect("trait");
    (tv.value().as_f64(), tv.min(), tv.max())
}

// ---------------------------------------------------------------------------
// Property: values stay inside their bounds after any delta sequence
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn values_never_leave_bounds(
        (min, max, joy, curiosity) in arb_bounds(),
        patches in prop::collection::vec(arb_patch(), 1..20),
    ) {
        let mut record = agent_with_bounds(min, max, joy, curiosity);
        for patch in patches {
            let delta = Delta::new()
                .adjust(MatrixKind::Emotion, "joy", patch.clone())
                .adjust(MatrixKind::Personality, "curiosity", patch);
            record = delta.apply_to(&record, far_future()).expect("apply").record;

            for (kind, name) in [(MatrixKind::Emotion, "joy"), (MatrixKind::Personality, "curiosity")] {
                let (v, lo, hi) = value_of(&record, kind, name);
                prop_assert_eq!((lo, hi), (min, max), "bounds are immutable");
                prop_assert!(v >= lo as f64 && v <= hi as f64, "{} = {} outside [{}, {}]", name, v, lo, hi);
            }
            let joy = record.matrix(MatrixKind::Emotion).and_then(|m| m.get("joy")).expect("joy").value();
            prop_assert!(matches!(joy, Scalar::Integer(_)), "emotion stays integral");
        }
    }

    #[test]
    fn clamp_flag_matches_overshoot(start in 0i64..=100, add in -300i64..300) {
        let record = agent_with_bounds(0, 100, start, 50.0);
        let out = Delta::new()
            .adjust(MatrixKind::Emotion, "joy", TraitPatch::add(add))
            .apply_to(&record, far_future())
            .expect("apply");
        let overshoot = !(0..=100).contains(&(start + add));
        prop_assert_eq!(out.changes[0].was_clamped, overshoot);
        prop_assert_eq!(out.changes[0].value, Scalar::Integer((start + add).clamp(0, 100)));
    }
}

// ---------------------------------------------------------------------------
// Property: same delta + same base = same content
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn applying_is_deterministic(
        patch in arb_patch(),
        entry in arb_entry(),
        reason in "[a-z ]{0,20}",
    ) {
        let base = agent_with_bounds(0, 100, 50, 50.0);
        let delta = Delta::new()
            .adjust(MatrixKind::Emotion, "joy", patch)
            .reason(MatrixKind::Emotion, reason)
            .remember(entry);
        let a = delta.apply_to(&base, far_future()).expect("a");
        let b = delta.apply_to(&base, far_future() + Duration::days(1)).expect("b");
        prop_assert_eq!(a.record.to_json().expect("json"), b.record.to_json().expect("json"));
    }
}

// ---------------------------------------------------------------------------
// Property: the ledger is append-only
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn ledger_only_grows(entries in prop::collection::vec(arb_entry(), 1..30)) {
        let mut record = agent_with_bounds(0, 100, 50, 50.0);
        for entry in entries {
            let before = record.memory().entries().to_vec();
            record = Delta::new()
                .remember(entry.clone())
                .apply_to(&record, far_future())
                .expect("apply")
                .record;
            let after = record.memory().entries();
            prop_assert_eq!(after.len(), before.len() + 1);
            prop_assert_eq!(&after[..before.len()], &before[..]);
            prop_assert_eq!(after.last(), Some(&entry));
        }
    }

    #[test]
    fn queries_are_ordered_windowed_and_limited(
        entries in prop::collection::vec(arb_entry(), 0..40),
        from in -12_000i64..12_000,
        width in 0i64..12_000,
        limit in 0usize..50,
    ) {
        let mut ledger = MemoryLedger::new();
        for entry in &entries {
            ledger.append(entry.clone(), far_future()).expect("append");
        }
        let window = TimeWindow::between(
            t0() + Duration::seconds(from),
            t0() + Duration::seconds(from + width),
        );
        let hits: Vec<_> = ledger.query(window, limit).collect();
        let expected = entries.iter().filter(|e| window.contains(e.timestamp)).count();

        prop_assert_eq!(hits.len(), expected.min(limit));
        prop_assert!(hits.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        prop_assert!(hits.iter().all(|e| window.contains(e.timestamp)));
    }
}
