//! Caller-side retry loop around [`StateEngine::apply_delta`].
//!
//! The engine reports lost races and outages and leaves the decision to the
//! caller. This helper is the usual decision: recompute the delta from the
//! freshly read record on `Conflict`, back off on `Unavailable`, give up
//! after a bounded number of attempts. Every attempt is an independent
//! engine call.

use std::time::Duration;

use tracing::debug;

use crate::config::EngineConfig;
use crate::delta::Delta;
use crate::engine::{AppliedDelta, StateEngine, VersionedRecord};
use crate::error::{PsycheError, Result};
use crate::store::RecordStore;
use crate::types::RecordRef;

/// How hard [`apply_with_retry`] tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    pub max_attempts: u32,
    /// Delay after the first `Unavailable`; doubles on each further one.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Policy from engine configuration.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_attempts: config.max_conflict_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    fn delay(&self, outage: u32) -> Duration {
        self.backoff.saturating_mul(1 << outage.min(10))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Read the record, build a delta from it, apply; repeat on retryable
/// failures.
///
/// `make_delta` sees the record and version of each attempt and returns the
/// delta to apply. The delta is pinned to that version, so a concurrent
/// writer always surfaces as `Conflict` and triggers a recompute.
///
/// # Errors
/// The first non-retryable error, or the last retryable one once attempts
/// run out.
pub async fn apply_with_retry<S, F>(
    engine: &StateEngine<S>,
    rref: &RecordRef,
    policy: RetryPolicy,
    mut make_delta: F,
) -> Result<AppliedDelta>
where
    S: RecordStore,
    F: FnMut(&VersionedRecord) -> Result<Delta>,
{
    let attempts = policy.max_attempts.max(1);
    let mut outages = 0;
    let mut attempt = 1;
    loop {
        let outcome = match engine.read_record(rref).await {
            Ok(current) => {
                let delta = make_delta(&current)?.based_on(current.version);
                engine.apply_delta(rref, delta).await
            }
            Err(e) => Err(e),
        };

        let err = match outcome {
            Ok(applied) => return Ok(applied),
            Err(e) if e.is_retryable() && attempt < attempts => e,
            Err(e) => return Err(e),
        };

        debug!(record = %rref, attempt, error = %err, "Retrying delta");
        if matches!(err, PsycheError::Unavailable { .. }) {
            tokio::time::sleep(policy.delay(outages)).await;
            outages += 1;
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::BoundsConfig;
    use crate::memory::Thought;
    use crate::record::AgentRecord;
    use crate::store::MemoryStore;
    use crate::traits::{MatrixKind, TraitPatch};
    use chrono::Utc;

    async fn engine_with_agent() -> (StateEngine<MemoryStore>, RecordRef) {
        let engine = StateEngine::new(Arc::new(MemoryStore::new()), EngineConfig::default());
        let agent = AgentRecord::baseline("aria", "", &BoundsConfig::default(), Thought::new("", Utc::now()));
        let rref = engine.create(agent.into()).await.expect("create");
        (engine, rref)
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_from_transient_outage() {
        let (engine, rref) = engine_with_agent().await;
        engine.store().fail_next(1);
        let applied = apply_with_retry(&engine, &rref, RetryPolicy::default(), |_| {
            Ok(Delta::new().adjust(MatrixKind::Emotion, "joy", TraitPatch::add(2)))
        })
        .await
        .expect("retried");
        assert_eq!(applied.version.0, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let (engine, rref) = engine_with_agent().await;
        engine.store().set_unavailable(true);
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(10),
        };
        let mut calls = 0;
        let err = apply_with_retry(&engine, &rref, policy, |_| {
            calls += 1;
            Ok(Delta::new().summary("x"))
        })
        .await
        .expect_err("down");
        assert!(matches!(err, PsycheError::Unavailable { .. }));
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn validation_errors_are_not_retried() {
        let (engine, rref) = engine_with_agent().await;
        let mut calls = 0;
        let err = apply_with_retry(&engine, &rref, RetryPolicy::default(), |_| {
            calls += 1;
            Ok(Delta::new().summary("agents have no summary"))
        })
        .await
        .expect_err("schema");
        assert!(matches!(err, PsycheError::SchemaViolation { .. }));
        assert_eq!(calls, 1);
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff: Duration::from_millis(10),
        };
        assert_eq!(policy.delay(0), Duration::from_millis(10));
        assert_eq!(policy.delay(2), Duration::from_millis(40));
    }
}
