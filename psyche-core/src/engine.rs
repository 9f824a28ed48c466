//! The state engine: validated creation and serialized, version-checked
//! application of deltas.
//!
//! ```text
//! Idle ─► Loading ─► Validating ─► Applying ─► Persisted ─► Idle
//!                        │
//!                        └─► Rejected
//! ```
//!
//! Deltas against the same record are serialized by a per-record async
//! mutex and the store's conditional write; deltas against different
//! records never wait on each other. The engine never retries: a lost race
//! is reported as [`PsycheError::Conflict`] and the caller recomputes.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant as StdInstant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::delta::Delta;
use crate::error::{PsycheError, Result};
use crate::memory::MemoryEntry;
use crate::metrics::EngineCounters;
use crate::record::{Record, validate_record};
use crate::store::{CreateOutcome, PutOutcome, RecordStore, StoreError, Versioned};
use crate::traits::TraitChange;
use crate::types::{RecordKind, RecordRef, TimeWindow, Version};

/// Where a delta was in its lifecycle. Reported with
/// [`PsycheError::Unavailable`] so callers know whether anything could have
/// been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaPhase {
    /// No delta in flight.
    Idle,
    /// Reading the current record.
    Loading,
    /// Checking the delta against current bounds and shape.
    Validating,
    /// Conditional write in flight.
    Applying,
    /// New version durable.
    Persisted,
    /// Validation failed; nothing was written.
    Rejected,
}

impl fmt::Display for DeltaPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Validating => "validating",
            Self::Applying => "applying",
            Self::Persisted => "persisted",
            Self::Rejected => "rejected",
        })
    }
}

/// A record as read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedRecord {
    /// Decoded record.
    pub record: Record,
    /// Version it was read at. Pass it back as a delta's base version.
    pub version: Version,
}

/// Outcome of a successfully persisted delta.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedDelta {
    /// The record as now stored.
    pub record: Record,
    /// Its new version.
    pub version: Version,
    /// Every trait the delta touched, with clamp flags.
    pub changes: Vec<TraitChange>,
    /// Whether a memory entry was appended.
    pub memory_appended: bool,
}

impl AppliedDelta {
    /// Changes that were clamped to a bound.
    pub fn clamped(&self) -> impl Iterator<Item = &TraitChange> {
        self.changes.iter().filter(|c| c.was_clamped)
    }
}

fn unavailable(phase: DeltaPhase, cause: impl fmt::Display) -> PsycheError {
    PsycheError::Unavailable {
        phase,
        cause: cause.to_string(),
    }
}

fn store_failure(phase: DeltaPhase, err: StoreError) -> PsycheError {
    match err {
        StoreError::Corrupt { record, reason } => PsycheError::CorruptRecord { record, reason },
        other => unavailable(phase, other),
    }
}

/// A task's claim on one record's mutex. Dropping it, including when the
/// owning future is cancelled, removes the map entry once no other task
/// holds it.
struct LockSlot<'a> {
    locks: &'a DashMap<RecordRef, Arc<Mutex<()>>>,
    rref: &'a RecordRef,
    mutex: Arc<Mutex<()>>,
}

impl<'a> LockSlot<'a> {
    fn acquire(locks: &'a DashMap<RecordRef, Arc<Mutex<()>>>, rref: &'a RecordRef) -> Self {
        let mutex = Arc::clone(locks.entry(rref.clone()).or_default().value());
        Self { locks, rref, mutex }
    }
}

impl Drop for LockSlot<'_> {
    fn drop(&mut self) {
        // Two owners left: the map and this slot.
        self.locks.remove_if(self.rref, |_, m| {
            Arc::ptr_eq(m, &self.mutex) && Arc::strong_count(m) == 2
        });
    }
}

/// Owns the store handle and serializes writes per record.
///
/// Cheap to share: wrap it in an `Arc` and call it from any number of tasks.
pub struct StateEngine<S: RecordStore> {
    store: Arc<S>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    locks: DashMap<RecordRef, Arc<Mutex<()>>>,
    counters: EngineCounters,
    closed: AtomicBool,
}

impl<S: RecordStore> fmt::Debug for StateEngine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateEngine")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("in_flight", &self.locks.len())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl<S: RecordStore> StateEngine<S> {
    /// Create an engine over `store` using the system clock.
    #[must_use]
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Create an engine with an explicit clock.
    #[must_use]
    pub fn with_clock(store: Arc<S>, config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        info!(
            deadline_ms = config.default_deadline_ms,
            skew_ms = config.clock_skew_tolerance_ms,
            "State engine started"
        );
        Self {
            store,
            config,
            clock,
            locks: DashMap::new(),
            counters: EngineCounters::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Outcome counters.
    #[must_use]
    pub fn counters(&self) -> &EngineCounters {
        &self.counters
    }

    /// Newest timestamp a memory or interaction stamp may carry right now.
    #[must_use]
    pub fn latest_allowed(&self) -> DateTime<Utc> {
        self.clock.now() + self.config.skew_tolerance()
    }

    fn default_deadline(&self) -> Instant {
        Instant::now() + self.config.default_deadline()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PsycheError::ShutDown);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Validate a candidate record and persist it as a new identity, under
    /// the configured default deadline.
    ///
    /// # Errors
    /// See [`Self::create_record_with_deadline`].
    pub async fn create_record(&self, kind: RecordKind, candidate: &Value) -> Result<RecordRef> {
        self.create_record_with_deadline(kind, candidate, self.default_deadline())
            .await
    }

    /// Validate a candidate record and persist it as a new identity.
    ///
    /// Creation is all-or-nothing: any violation rejects the whole
    /// candidate and nothing reaches the store.
    ///
    /// # Errors
    /// Validation errors, [`PsycheError::AlreadyExists`], or
    /// [`PsycheError::Unavailable`].
    #[instrument(skip(self, candidate, deadline), fields(kind = %kind))]
    pub async fn create_record_with_deadline(
        &self,
        kind: RecordKind,
        candidate: &Value,
        deadline: Instant,
    ) -> Result<RecordRef> {
        self.ensure_open()?;
        let record = validate_record(kind, candidate).inspect_err(|e| {
            self.counters.record_failure(e);
            debug!(error = %e, "Candidate record rejected");
        })?;
        self.create_with_deadline(record, deadline).await
    }

    /// Persist an already-built record under the configured default
    /// deadline.
    ///
    /// # Errors
    /// See [`Self::create_with_deadline`].
    pub async fn create(&self, record: Record) -> Result<RecordRef> {
        self.create_with_deadline(record, self.default_deadline())
            .await
    }

    /// Persist an already-built record as a new identity.
    ///
    /// # Errors
    /// [`PsycheError::Rejected`] for future-dated memories,
    /// [`PsycheError::AlreadyExists`], or [`PsycheError::Unavailable`].
    #[instrument(skip(self, record, deadline), fields(record = %record.record_ref()))]
    pub async fn create_with_deadline(&self, record: Record, deadline: Instant) -> Result<RecordRef> {
        self.ensure_open()?;
        let result = self.create_inner(record, deadline).await;
        match &result {
            Ok(rref) => {
                self.counters.records_created.fetch_add(1, Ordering::Relaxed);
                info!(record = %rref, "Record created");
            }
            Err(e) => self.counters.record_failure(e),
        }
        result
    }

    async fn create_inner(&self, record: Record, deadline: Instant) -> Result<RecordRef> {
        let latest = self.latest_allowed();
        for (i, entry) in record.memory().entries().iter().enumerate() {
            entry.check_appendable(&format!("memory[{i}]"), latest)?;
        }

        let rref = record.record_ref();
        let content = record.to_json()?;
        let outcome = timeout_at(deadline, self.store.create(&rref, content))
            .await
            .map_err(|_| unavailable(DeltaPhase::Applying, "deadline exceeded"))?
            .map_err(|e| store_failure(DeltaPhase::Applying, e))?;

        match outcome {
            CreateOutcome::Created(_) => Ok(rref),
            CreateOutcome::AlreadyExists => Err(PsycheError::AlreadyExists(rref)),
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Load and decode a record under the configured default deadline.
    ///
    /// # Errors
    /// See [`Self::read_record_with_deadline`].
    pub async fn read_record(&self, rref: &RecordRef) -> Result<VersionedRecord> {
        self.read_record_with_deadline(rref, self.default_deadline())
            .await
    }

    /// Load and decode a record.
    ///
    /// # Errors
    /// [`PsycheError::NotFound`], [`PsycheError::CorruptRecord`] if the
    /// stored content no longer validates, or [`PsycheError::Unavailable`].
    #[instrument(skip(self, deadline), fields(record = %rref))]
    pub async fn read_record_with_deadline(
        &self,
        rref: &RecordRef,
        deadline: Instant,
    ) -> Result<VersionedRecord> {
        self.ensure_open()?;
        self.load(rref, deadline).await
    }

    /// Memories of one record inside `window`, oldest first, at most
    /// `limit` of them.
    ///
    /// # Errors
    /// As [`Self::read_record`].
    pub async fn query_memory(
        &self,
        rref: &RecordRef,
        window: TimeWindow,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>> {
        self.query_memory_with_deadline(rref, window, limit, self.default_deadline())
            .await
    }

    /// [`Self::query_memory`] with an explicit deadline for the load.
    ///
    /// # Errors
    /// As [`Self::read_record_with_deadline`].
    #[instrument(skip(self, deadline), fields(record = %rref))]
    pub async fn query_memory_with_deadline(
        &self,
        rref: &RecordRef,
        window: TimeWindow,
        limit: usize,
        deadline: Instant,
    ) -> Result<Vec<MemoryEntry>> {
        let loaded = self.read_record_with_deadline(rref, deadline).await?;
        let hits: Vec<_> = loaded.record.memory().query(window, limit).cloned().collect();
        debug!(hits = hits.len(), total = loaded.record.memory().len(), "Memory query");
        Ok(hits)
    }

    async fn load(&self, rref: &RecordRef, deadline: Instant) -> Result<VersionedRecord> {
        let start = StdInstant::now();
        let fetched = timeout_at(deadline, self.store.get(rref))
            .await
            .map_err(|_| unavailable(DeltaPhase::Loading, "deadline exceeded"))?
            .map_err(|e| store_failure(DeltaPhase::Loading, e))?;
        let Some(Versioned { content, version }) = fetched else {
            return Err(PsycheError::NotFound(rref.clone()));
        };

        let record = validate_record(rref.kind, &content).map_err(|e| PsycheError::CorruptRecord {
            record: rref.clone(),
            reason: e.to_string(),
        })?;
        if record.id() != rref.id {
            return Err(PsycheError::CorruptRecord {
                record: rref.clone(),
                reason: format!("stored identity is `{}`", record.id()),
            });
        }

        debug!(
            version = %version,
            elapsed_us = start.elapsed().as_micros(),
            "Record loaded"
        );
        Ok(VersionedRecord { record, version })
    }

    // ------------------------------------------------------------------
    // Deltas
    // ------------------------------------------------------------------

    /// Apply a delta under the configured default deadline.
    ///
    /// # Errors
    /// See [`Self::apply_delta_with_deadline`].
    pub async fn apply_delta(&self, rref: &RecordRef, delta: Delta) -> Result<AppliedDelta> {
        self.apply_delta_with_deadline(rref, delta, self.default_deadline())
            .await
    }

    /// Validate a delta against the current record and persist the result
    /// with a version-conditioned write.
    ///
    /// At most one write is attempted. If the delta pins a base version that
    /// is no longer current, or another writer wins the conditional write,
    /// the call fails with [`PsycheError::Conflict`] and nothing changes.
    ///
    /// # Errors
    /// - validation errors (`SchemaViolation`, `ImmutableBoundsViolation`,
    ///   `EnumViolation`, `Rejected`): nothing was written;
    /// - [`PsycheError::Conflict`]: recompute against the fresh record;
    /// - [`PsycheError::Unavailable`]: store outage or `deadline` passed;
    /// - [`PsycheError::NotFound`], [`PsycheError::CorruptRecord`],
    ///   [`PsycheError::ShutDown`].
    #[instrument(skip(self, delta, deadline), fields(record = %rref))]
    pub async fn apply_delta_with_deadline(
        &self,
        rref: &RecordRef,
        delta: Delta,
        deadline: Instant,
    ) -> Result<AppliedDelta> {
        self.ensure_open()?;
        let start = StdInstant::now();

        let slot = LockSlot::acquire(&self.locks, rref);
        let result = match timeout_at(deadline, slot.mutex.lock()).await {
            Ok(_guard) => self.apply_locked(rref, &delta, deadline).await,
            Err(_) => Err(unavailable(DeltaPhase::Loading, "deadline exceeded waiting for record")),
        };
        drop(slot);

        match &result {
            Ok(applied) => {
                self.counters.record_applied(
                    applied.clamped().count(),
                    applied.memory_appended,
                    start.elapsed(),
                );
                info!(
                    version = %applied.version,
                    changes = applied.changes.len(),
                    clamped = applied.clamped().count(),
                    memory = applied.memory_appended,
                    elapsed_us = start.elapsed().as_micros(),
                    "Delta persisted"
                );
            }
            Err(e) => {
                self.counters.record_failure(e);
                match e {
                    PsycheError::Conflict { .. } => warn!("Delta lost version race"),
                    PsycheError::Unavailable { phase, cause } => {
                        warn!(phase = %phase, cause = %cause, "Delta abandoned");
                    }
                    other => debug!(error = %other, "Delta rejected"),
                }
            }
        }
        result
    }

    async fn apply_locked(
        &self,
        rref: &RecordRef,
        delta: &Delta,
        deadline: Instant,
    ) -> Result<AppliedDelta> {
        let loaded = self.load(rref, deadline).await?;
        if delta.base_version.is_some_and(|base| base != loaded.version) {
            return Err(PsycheError::Conflict {
                record: rref.clone(),
            });
        }

        let outcome = delta.apply_to(&loaded.record, self.latest_allowed())?;
        let content = outcome.record.to_json()?;

        let put = timeout_at(
            deadline,
            self.store.put_if_version(rref, loaded.version, content),
        )
        .await
        .map_err(|_| unavailable(DeltaPhase::Applying, "deadline exceeded"))?
        .map_err(|e| store_failure(DeltaPhase::Applying, e))?;

        match put {
            PutOutcome::Stored(version) => Ok(AppliedDelta {
                record: outcome.record,
                version,
                changes: outcome.changes,
                memory_appended: outcome.memory_appended,
            }),
            PutOutcome::VersionMismatch { current } => {
                debug!(
                    expected = %loaded.version,
                    current = ?current,
                    "Conditional write refused"
                );
                Err(PsycheError::Conflict {
                    record: rref.clone(),
                })
            }
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Refuse new calls and wait for in-flight deltas to finish.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let in_flight: Vec<_> = self.locks.iter().map(|e| Arc::clone(e.value())).collect();
        for lock in in_flight {
            drop(lock.lock().await);
        }
        let s = self.counters.snapshot();
        info!(
            created = s.records_created,
            applied = s.deltas_applied,
            conflicts = s.conflicts,
            "State engine shut down"
        );
    }

    /// Whether [`Self::shutdown`] has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
