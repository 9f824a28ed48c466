//! Integration tests: end-to-end engine flows.
//!
//! Creation, delta application, memory queries, concurrent updates and
//! store failures, against both the in-memory and the SQLite store.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};

use psyche_core::clock::ManualClock;
use psyche_core::config::{BoundsConfig, EngineConfig, PersistenceConfig};
use psyche_core::retry::{RetryPolicy, apply_with_retry};
use psyche_core::store::{MemoryStore, RecordStore, SqliteStore};
use psyche_core::{
    AgentRecord, Delta, DeltaPhase, ExtrinsicRelationship, IntrinsicRelationship, MatrixKind,
    MemoryEntry, PsycheError, RecordKind, RecordRef, Scalar, StateEngine, Thought, TimeWindow,
    TraitPatch, UserRecord, Version,
};

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
        .expect("ts")
        .with_timezone(&Utc)
}

fn engine_over<S: RecordStore>(store: S) -> StateEngine<S> {
    StateEngine::with_clock(
        Arc::new(store),
        EngineConfig::default(),
        Arc::new(ManualClock::new(t0())),
    )
}

fn agent_json(name: &str) -> Value {
    let agent = AgentRecord::baseline(
        name,
        "A curious companion",
        &BoundsConfig::default(),
        Thought::new("ready to talk", t0()),
    );
    serde_json::to_value(&agent).expect("agent json")
}

fn user_json(username: &str) -> Value {
    let user = UserRecord::baseline(
        username,
        "",
        IntrinsicRelationship::None,
        ExtrinsicRelationship::Stranger,
        &BoundsConfig::default(),
        t0() - Duration::days(1),
    );
    serde_json::to_value(&user).expect("user json")
}

fn trait_value(record: &psyche_core::Record, kind: MatrixKind, name: &str) -> Scalar {
    record
        .matrix(kind)
        .and_then(|m| m.get(name))
        .expect("trait present")
        .value()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn friendliness_is_clamped_at_upper_bound() {
    let engine = engine_over(MemoryStore::new());
    let aria = engine
        .create_record(RecordKind::Agent, &agent_json("aria"))
        .await
        .expect("create");

    let applied = engine
        .apply_delta(
            &aria,
            Delta::new().adjust(MatrixKind::Personality, "friendliness", TraitPatch::add(80)),
        )
        .await
        .expect("apply");

    assert_eq!(
        trait_value(&applied.record, MatrixKind::Personality, "friendliness"),
        Scalar::Float(100.0)
    );
    let change = applied.changes.first().expect("one change");
    assert_eq!(change.name, "friendliness");
    assert!(change.was_clamped);
    assert_eq!(applied.clamped().count(), 1);
}

#[tokio::test]
async fn first_meeting_is_found_in_surrounding_window() {
    let engine = engine_over(MemoryStore::new());
    let sam = engine
        .create_record(RecordKind::User, &user_json("sam"))
        .await
        .expect("create");

    let t = t0() - Duration::minutes(5);
    engine
        .apply_delta(&sam, Delta::new().remember(MemoryEntry::new("first meeting", "", t)))
        .await
        .expect("apply");

    let hits = engine
        .query_memory(
            &sam,
            TimeWindow::between(t - Duration::seconds(1), t + Duration::seconds(1)),
            10,
        )
        .await
        .expect("query");
    assert_eq!(hits, vec![MemoryEntry::new("first meeting", "", t)]);

    let read = engine.read_record(&sam).await.expect("read");
    assert_eq!(read.record.as_user().expect("user").last_interaction(), t);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deltas_on_same_base_one_conflicts() {
    let engine = Arc::new(engine_over(MemoryStore::new()));
    let sam = engine
        .create_record(RecordKind::User, &user_json("sam"))
        .await
        .expect("create");
    let base = engine.read_record(&sam).await.expect("read").version;

    let plus = {
        let engine = Arc::clone(&engine);
        let sam = sam.clone();
        tokio::spawn(async move {
            engine
                .apply_delta(
                    &sam,
                    Delta::new()
                        .adjust(MatrixKind::Sentiment, "trust", TraitPatch::add(5))
                        .based_on(base),
                )
                .await
        })
    };
    let minus = {
        let engine = Arc::clone(&engine);
        let sam = sam.clone();
        tokio::spawn(async move {
            engine
                .apply_delta(
                    &sam,
                    Delta::new()
                        .adjust(MatrixKind::Sentiment, "trust", TraitPatch::add(-3))
                        .based_on(base),
                )
                .await
        })
    };

    let results = [plus.await.expect("join"), minus.await.expect("join")];
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one delta must win");
    let loser = results.iter().find_map(|r| r.as_ref().err()).expect("one loser");
    assert!(matches!(loser, PsycheError::Conflict { .. }));
    assert!(loser.is_retryable());

    // The loser recomputes against the fresh record and succeeds.
    let lost_delta = if results[0].is_ok() { -3 } else { 5 };
    let fresh = engine.read_record(&sam).await.expect("read");
    assert_eq!(fresh.version, base.next());
    let retried = engine
        .apply_delta(
            &sam,
            Delta::new()
                .adjust(MatrixKind::Sentiment, "trust", TraitPatch::add(lost_delta))
                .based_on(fresh.version),
        )
        .await
        .expect("recomputed delta");
    assert_eq!(
        trait_value(&retried.record, MatrixKind::Sentiment, "trust"),
        Scalar::Integer(52)
    );
    assert_eq!(engine.counters().snapshot().conflicts, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unpinned_deltas_on_one_record_are_serialized() {
    let engine = Arc::new(engine_over(MemoryStore::new()));
    let aria = engine
        .create_record(RecordKind::Agent, &agent_json("aria"))
        .await
        .expect("create");

    let mut handles = Vec::new();
    for i in 0..20 {
        let engine = Arc::clone(&engine);
        let aria = aria.clone();
        handles.push(tokio::spawn(async move {
            engine
                .apply_delta(
                    &aria,
                    Delta::new()
                        .adjust(MatrixKind::Emotion, "joy", TraitPatch::add(1))
                        .remember(MemoryEntry::new(format!("joke {i}"), "", t0())),
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("apply");
    }

    let read = engine.read_record(&aria).await.expect("read");
    assert_eq!(read.version, Version(21));
    assert_eq!(trait_value(&read.record, MatrixKind::Emotion, "joy"), Scalar::Integer(70));
    assert_eq!(read.record.memory().len(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_records_proceed_independently() {
    let engine = Arc::new(engine_over(MemoryStore::new()));
    let mut refs = Vec::new();
    for name in ["ann", "bob", "cid", "dee"] {
        refs.push(
            engine
                .create_record(RecordKind::User, &user_json(name))
                .await
                .expect("create"),
        );
    }

    let mut handles = Vec::new();
    for rref in refs.clone() {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .apply_delta(
                    &rref,
                    Delta::new()
                        .relationship(ExtrinsicRelationship::Acquaintance)
                        .based_on(Version::INITIAL),
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("independent records never conflict");
    }
    for rref in &refs {
        let read = engine.read_record(rref).await.expect("read");
        assert_eq!(
            read.record.as_user().expect("user").extrinsic_relationship(),
            ExtrinsicRelationship::Acquaintance
        );
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn nemesis_is_not_a_relationship() {
    let engine = engine_over(MemoryStore::new());

    let mut candidate = user_json("sam");
    candidate["extrinsic_relationship"] = json!("nemesis");
    let err = engine
        .create_record(RecordKind::User, &candidate)
        .await
        .expect_err("nemesis on create");
    assert!(matches!(err, PsycheError::EnumViolation { .. }));

    let sam = engine
        .create_record(RecordKind::User, &user_json("sam"))
        .await
        .expect("create");
    let delta = Delta::from_json(&json!({"extrinsic_relationship": "nemesis"})).expect("parse");
    let err = engine.apply_delta(&sam, delta).await.expect_err("nemesis on update");
    assert!(matches!(err, PsycheError::EnumViolation { .. }));
    assert_eq!(engine.read_record(&sam).await.expect("read").version, Version::INITIAL);
}

#[tokio::test]
async fn creation_is_all_or_nothing() {
    let engine = engine_over(MemoryStore::new());

    let mut candidate = agent_json("aria");
    candidate["emotional_status"]["joy"]["value"] = json!(500);
    let err = engine
        .create_record(RecordKind::Agent, &candidate)
        .await
        .expect_err("out of bounds");
    assert!(matches!(err, PsycheError::SchemaViolation { .. }));

    let mut candidate = agent_json("aria");
    candidate
        .as_object_mut()
        .expect("object")
        .remove("thoughts");
    let err = engine
        .create_record(RecordKind::Agent, &candidate)
        .await
        .expect_err("missing field");
    assert!(matches!(err, PsycheError::MissingRequiredField { ref field } if field == "thoughts"));

    let mut candidate = agent_json("aria");
    candidate["memory"] = json!([{
        "event": "from tomorrow",
        "thought": "",
        "timestamp": (t0() + Duration::days(1)).to_rfc3339(),
    }]);
    let err = engine
        .create_record(RecordKind::Agent, &candidate)
        .await
        .expect_err("future memory");
    assert!(matches!(err, PsycheError::Rejected { .. }));

    assert!(engine.store().is_empty());
    assert_eq!(engine.counters().snapshot().validation_failures, 3);
}

#[tokio::test]
async fn bounds_cannot_be_moved_by_a_delta() {
    let engine = engine_over(MemoryStore::new());
    let aria = engine
        .create_record(RecordKind::Agent, &agent_json("aria"))
        .await
        .expect("create");
    let delta = Delta::from_json(&json!({
        "personality": {"traits": {"friendliness": {"set": 10, "min": 0, "max": 100}}}
    }))
    .expect("parse");
    let err = engine.apply_delta(&aria, delta).await.expect_err("bounds");
    assert!(matches!(err, PsycheError::ImmutableBoundsViolation { .. }));
}

#[tokio::test]
async fn intrinsic_relationship_never_changes() {
    let engine = engine_over(MemoryStore::new());
    let sam = engine
        .create_record(RecordKind::User, &user_json("sam"))
        .await
        .expect("create");
    let delta = Delta::from_json(&json!({"intrinsic_relationship": "creator"})).expect("parse");
    let err = engine.apply_delta(&sam, delta).await.expect_err("immutable");
    assert!(matches!(err, PsycheError::Rejected { .. }));
}

// ---------------------------------------------------------------------------
// Availability
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn slow_store_times_out_as_unavailable() {
    let engine = engine_over(MemoryStore::new());
    let aria = engine
        .create_record(RecordKind::Agent, &agent_json("aria"))
        .await
        .expect("create");

    engine.store().set_latency(StdDuration::from_millis(200));
    let deadline = tokio::time::Instant::now() + StdDuration::from_millis(50);
    let err = engine
        .apply_delta_with_deadline(
            &aria,
            Delta::new().adjust(MatrixKind::Emotion, "fear", TraitPatch::add(10)),
            deadline,
        )
        .await
        .expect_err("deadline");
    assert!(matches!(
        err,
        PsycheError::Unavailable {
            phase: DeltaPhase::Loading,
            ..
        }
    ));
    assert!(err.is_retryable());
    assert!(!err.is_validation());

    engine.store().set_latency(StdDuration::ZERO);
    let read = engine.read_record(&aria).await.expect("read");
    assert_eq!(read.version, Version::INITIAL);
}

#[tokio::test(start_paused = true)]
async fn deadline_during_write_is_unavailable_while_applying() {
    let engine = engine_over(MemoryStore::new());
    let aria = engine
        .create_record(RecordKind::Agent, &agent_json("aria"))
        .await
        .expect("create");

    // The load fits inside the deadline, the conditional write does not.
    engine.store().set_latency(StdDuration::from_millis(200));
    let deadline = tokio::time::Instant::now() + StdDuration::from_millis(300);
    let err = engine
        .apply_delta_with_deadline(
            &aria,
            Delta::new().adjust(MatrixKind::Emotion, "fear", TraitPatch::add(10)),
            deadline,
        )
        .await
        .expect_err("deadline");
    assert!(matches!(
        err,
        PsycheError::Unavailable {
            phase: DeltaPhase::Applying,
            ..
        }
    ));
    assert!(err.is_retryable());

    engine.store().set_latency(StdDuration::ZERO);
    let read = engine.read_record(&aria).await.expect("read");
    assert_eq!(read.version, Version::INITIAL);
}

#[tokio::test(start_paused = true)]
async fn retry_helper_rides_out_a_short_outage() {
    let engine = engine_over(MemoryStore::new());
    let sam = engine
        .create_record(RecordKind::User, &user_json("sam"))
        .await
        .expect("create");
    engine.store().fail_next(2);

    let applied = apply_with_retry(&engine, &sam, RetryPolicy::default(), |current| {
        let trust = trait_value(&current.record, MatrixKind::Sentiment, "trust");
        Ok(Delta::new().adjust(
            MatrixKind::Sentiment,
            "trust",
            TraitPatch::set(Scalar::Integer(match trust {
                Scalar::Integer(v) => v + 1,
                Scalar::Float(_) => 0,
            })),
        ))
    })
    .await
    .expect("retried");
    assert_eq!(trait_value(&applied.record, MatrixKind::Sentiment, "trust"), Scalar::Integer(51));
}

// ---------------------------------------------------------------------------
// SQLite end to end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sqlite_engine_round_trip_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("psyche.db");
    let config = PersistenceConfig::default();
    let t = t0() - Duration::hours(1);

    let sam = {
        let engine = engine_over(SqliteStore::open(&path, &config).expect("open"));
        let sam = engine
            .create_record(RecordKind::User, &user_json("sam"))
            .await
            .expect("create");
        engine
            .apply_delta(
                &sam,
                Delta::new()
                    .summary("Likes chess")
                    .relationship(ExtrinsicRelationship::Friend)
                    .adjust(MatrixKind::Sentiment, "admiration", TraitPatch::add(7))
                    .remember(MemoryEntry::new("played chess", "a worthy opponent", t)),
            )
            .await
            .expect("apply");
        engine.shutdown().await;
        sam
    };

    let engine = engine_over(SqliteStore::open(&path, &config).expect("reopen"));
    let read = engine.read_record(&sam).await.expect("read");
    assert_eq!(read.version, Version(2));
    let user = read.record.as_user().expect("user");
    assert_eq!(user.summary(), "Likes chess");
    assert_eq!(user.extrinsic_relationship(), ExtrinsicRelationship::Friend);
    assert_eq!(user.intrinsic_relationship(), IntrinsicRelationship::None);
    assert_eq!(
        trait_value(&read.record, MatrixKind::Sentiment, "admiration"),
        Scalar::Integer(57)
    );
    assert_eq!(user.memory().len(), 1);

    let listed = engine.store().list(Some(RecordKind::User)).await.expect("list");
    assert_eq!(listed, vec![RecordRef::new(RecordKind::User, "sam")]);
    assert!(engine.store().integrity_check().expect("check"));
}
