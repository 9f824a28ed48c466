//! In-process record store with fault injection.
//!
//! Backs tests and embedded use. Latency and outages can be switched on at
//! runtime to exercise deadline and availability handling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use super::{CreateOutcome, PutOutcome, RecordStore, StoreError, StoreResult, Versioned};
use crate::types::{RecordKind, RecordRef, Version};

/// Fails every call until cleared.
const PERSISTENT: usize = usize::MAX;

/// Thread-safe in-memory [`RecordStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<RecordRef, Versioned>>,
    /// Artificial delay before every operation, in microseconds.
    latency_us: AtomicU64,
    /// Number of upcoming operations that fail as unavailable.
    failures: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every subsequent operation by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.latency_us.store(us, Ordering::SeqCst);
    }

    /// Make the next `n` operations fail as unavailable.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Switch a persistent outage on or off.
    pub fn set_unavailable(&self, down: bool) {
        self.failures
            .store(if down { PERSISTENT } else { 0 }, Ordering::SeqCst);
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    async fn enter(&self, op: &'static str) -> StoreResult<()> {
        let us = self.latency_us.load(Ordering::SeqCst);
        if us > 0 {
            tokio::time::sleep(Duration::from_micros(us)).await;
        }
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                PERSISTENT => Some(PERSISTENT),
                n => Some(n - 1),
            })
            .is_ok();
        if injected {
            debug!(op, "Injected store outage");
            return Err(StoreError::Unavailable(format!("injected outage during {op}")));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, record: &RecordRef) -> StoreResult<Option<Versioned>> {
        self.enter("get").await?;
        Ok(self.records.read().get(record).cloned())
    }

    async fn put_if_version(
        &self,
        record: &RecordRef,
        expected: Version,
        content: Value,
    ) -> StoreResult<PutOutcome> {
        self.enter("put_if_version").await?;
        let mut records = self.records.write();
        match records.get_mut(record) {
            Some(slot) if slot.version == expected => {
                let version = expected.next();
                *slot = Versioned { content, version };
                Ok(PutOutcome::Stored(version))
            }
            Some(slot) => Ok(PutOutcome::VersionMismatch {
                current: Some(slot.version),
            }),
            None => Ok(PutOutcome::VersionMismatch { current: None }),
        }
    }

    async fn create(&self, record: &RecordRef, content: Value) -> StoreResult<CreateOutcome> {
        self.enter("create").await?;
        let mut records = self.records.write();
        if records.contains_key(record) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        records.insert(
            record.clone(),
            Versioned {
                content,
                version: Version::INITIAL,
            },
        );
        Ok(CreateOutcome::Created(Version::INITIAL))
    }

    async fn list(&self, kind: Option<RecordKind>) -> StoreResult<Vec<RecordRef>> {
        self.enter("list").await?;
        let mut refs: Vec<_> = self
            .records
            .read()
            .keys()
            .filter(|r| kind.is_none_or(|k| r.kind == k))
            .cloned()
            .collect();
        refs.sort();
        Ok(refs)
    }
}
