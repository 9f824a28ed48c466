//! Engine counters.
//!
//! Lock-free `AtomicU64` counters bumped on the hot path and read on export.
//! A snapshot renders as Prometheus text for whatever scrapes the host
//! process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::PsycheError;

/// Atomic counters for engine outcomes.
#[derive(Debug, Default)]
pub struct EngineCounters {
    /// Records created.
    pub records_created: AtomicU64,
    /// Deltas persisted.
    pub deltas_applied: AtomicU64,
    /// Deltas or creations refused by validation.
    pub validation_failures: AtomicU64,
    /// Deltas that lost the version race.
    pub conflicts: AtomicU64,
    /// Calls that gave up on the store (outage or deadline).
    pub unavailable: AtomicU64,
    /// Trait values that hit a bound.
    pub traits_clamped: AtomicU64,
    /// Memory entries appended.
    pub memories_appended: AtomicU64,
    /// Cumulative wall time of successful applies, in microseconds.
    pub apply_micros: AtomicU64,
}

impl EngineCounters {
    /// Zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records_created: AtomicU64::new(0),
            deltas_applied: AtomicU64::new(0),
            validation_failures: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            unavailable: AtomicU64::new(0),
            traits_clamped: AtomicU64::new(0),
            memories_appended: AtomicU64::new(0),
            apply_micros: AtomicU64::new(0),
        }
    }

    /// Count a failed call under the matching counter.
    pub fn record_failure(&self, err: &PsycheError) {
        let counter = match err {
            PsycheError::Conflict { .. } => &self.conflicts,
            PsycheError::Unavailable { .. } => &self.unavailable,
            e if e.is_validation() => &self.validation_failures,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a persisted delta.
    pub fn record_applied(&self, clamped: usize, memory_appended: bool, elapsed: Duration) {
        self.deltas_applied.fetch_add(1, Ordering::Relaxed);
        self.traits_clamped
            .fetch_add(u64::try_from(clamped).unwrap_or(u64::MAX), Ordering::Relaxed);
        if memory_appended {
            self.memories_appended.fetch_add(1, Ordering::Relaxed);
        }
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.apply_micros.fetch_add(us, Ordering::Relaxed);
    }

    /// Snapshot all counters for export.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            records_created: self.records_created.load(Ordering::Relaxed),
            deltas_applied: self.deltas_applied.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            traits_clamped: self.traits_clamped.load(Ordering::Relaxed),
            memories_appended: self.memories_appended.load(Ordering::Relaxed),
            apply_micros: self.apply_micros.load(Ordering::Relaxed),
        }
    }
}

/// Counter values at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterSnapshot {
    /// Records created.
    pub records_created: u64,
    /// Deltas persisted.
    pub deltas_applied: u64,
    /// Validation failures.
    pub validation_failures: u64,
    /// Version conflicts.
    pub conflicts: u64,
    /// Store outages and deadline misses.
    pub unavailable: u64,
    /// Clamped trait values.
    pub traits_clamped: u64,
    /// Appended memories.
    pub memories_appended: u64,
    /// Cumulative apply time in microseconds.
    pub apply_micros: u64,
}

impl CounterSnapshot {
    /// Mean wall time of a successful apply.
    #[must_use]
    pub fn mean_apply_time(&self) -> Duration {
        if self.deltas_applied == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.apply_micros / self.deltas_applied)
    }

    /// Format as Prometheus text exposition.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let rows: [(&str, &str, u64); 8] = [
            ("records_created_total", "Records created", self.records_created),
            ("deltas_applied_total", "Deltas persisted", self.deltas_applied),
            (
                "validation_failures_total",
                "Payloads refused by validation",
                self.validation_failures,
            ),
            ("conflicts_total", "Deltas that lost a version race", self.conflicts),
            ("unavailable_total", "Calls abandoned on store outage or deadline", self.unavailable),
            ("traits_clamped_total", "Trait values clamped to a bound", self.traits_clamped),
            ("memories_appended_total", "Memory entries appended", self.memories_appended),
            ("apply_micros_total", "Cumulative apply time in microseconds", self.apply_micros),
        ];
        let mut out = String::new();
        for (name, help, value) in rows {
            out.push_str(&format!(
                "# HELP psyche_{name} {help}\n# TYPE psyche_{name} counter\npsyche_{name} {value}\n"
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DeltaPhase;
    use crate::types::{RecordKind, RecordRef};

    #[test]
    fn failures_land_in_the_right_bucket() {
        let c = EngineCounters::new();
        c.record_failure(&PsycheError::Conflict {
            record: RecordRef::new(RecordKind::User, "sam"),
        });
        c.record_failure(&PsycheError::Unavailable {
            phase: DeltaPhase::Loading,
            cause: "down".into(),
        });
        c.record_failure(&PsycheError::schema("x", "y"));
        c.record_failure(&PsycheError::ShutDown);
        let s = c.snapshot();
        assert_eq!((s.conflicts, s.unavailable, s.validation_failures), (1, 1, 1));
    }

    #[test]
    fn applied_deltas_accumulate() {
        let c = EngineCounters::new();
        c.record_applied(2, true, Duration::from_micros(300));
        c.record_applied(0, false, Duration::from_micros(100));
        let s = c.snapshot();
        assert_eq!(s.deltas_applied, 2);
        assert_eq!(s.traits_clamped, 2);
        assert_eq!(s.memories_appended, 1);
        assert_eq!(s.mean_apply_time(), Duration::from_micros(200));
    }

    #[test]
    fn prometheus_format() {
        let c = EngineCounters::new();
        c.records_created.fetch_add(3, Ordering::Relaxed);
        let text = c.snapshot().to_prometheus();
        assert!(text.contains("# TYPE psyche_records_created_total counter"));
        assert!(text.contains("psyche_records_created_total 3\n"));
        assert!(text.contains("psyche_conflicts_total 0\n"));
    }
}
