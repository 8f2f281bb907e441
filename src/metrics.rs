//! Metrics sink for the slot machinery.
//!
//! The library never registers anything globally; callers pass a sink and
//! decide where the numbers go. [`FacadeMetrics`] forwards to whatever
//! recorder the embedding process installed via the `metrics` crate.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;

/// Receives counters from the consistency checker and slot migrator.
pub trait MetricsSink: Send + Sync {
    /// A slot finished migrating.
    fn slot_migrated(&self);

    /// A batch of keys was transferred.
    fn keys_moved(&self, count: u64);

    /// A consistency check completed.
    fn check_completed(&self, consistent: bool);
}

/// Sink that discards everything. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn slot_migrated(&self) {}
    fn keys_moved(&self, _count: u64) {}
    fn check_completed(&self, _consistent: bool) {}
}

/// Sink that forwards to the `metrics` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct FacadeMetrics;

impl MetricsSink for FacadeMetrics {
    fn slot_migrated(&self) {
        counter!("valkey_slot_admin_slots_migrated_total").increment(1);
    }

    fn keys_moved(&self, count: u64) {
        counter!("valkey_slot_admin_keys_moved_total").increment(count);
    }

    fn check_completed(&self, consistent: bool) {
        let outcome = if consistent { "consistent" } else { "inconsistent" };
        counter!("valkey_slot_admin_checks_total", "outcome" => outcome).increment(1);
    }
}

/// In-memory sink used by tests.
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    pub slots_migrated: AtomicU64,
    pub keys_moved: AtomicU64,
    pub checks: AtomicU64,
    pub inconsistent_checks: AtomicU64,
}

impl MetricsSink for RecordingMetrics {
    fn slot_migrated(&self) {
        self.slots_migrated.fetch_add(1, Ordering::Relaxed);
    }

    fn keys_moved(&self, count: u64) {
        self.keys_moved.fetch_add(count, Ordering::Relaxed);
    }

    fn check_completed(&self, consistent: bool) {
        self.checks.fetch_add(1, Ordering::Relaxed);
        if !consistent {
            self.inconsistent_checks.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Shared handle type the machinery stores.
pub type SharedMetrics = Arc<dyn MetricsSink>;

/// The default no-op handle.
pub fn noop() -> SharedMetrics {
    Arc::new(NoopMetrics)
}
