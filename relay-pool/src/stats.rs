//! Pool counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifetime counters, updated without taking the pool lock.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) created: AtomicU64,
    pub(crate) reused: AtomicU64,
    pub(crate) evicted: AtomicU64,
    pub(crate) discarded: AtomicU64,
}

impl Counters {
    pub(crate) fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reused(&self) {
        self.reused.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evicted(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of pool state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Connections waiting in the idle list.
    pub idle: usize,
    /// Connections currently checked out.
    pub outstanding: usize,
    /// Connections established by the factory.
    pub created: u64,
    /// Checkouts served from the idle list.
    pub reused: u64,
    /// Idle connections dropped because the probe found them dead.
    pub evicted: u64,
    /// Checked-out connections shut down instead of returned.
    pub discarded: u64,
}

impl PoolStats {
    pub(crate) fn new(idle: usize, outstanding: usize, counters: &Counters) -> Self {
        Self {
            idle,
            outstanding,
            created: counters.created.load(Ordering::Relaxed),
            reused: counters.reused.load(Ordering::Relaxed),
            evicted: counters.evicted.load(Ordering::Relaxed),
            discarded: counters.discarded.load(Ordering::Relaxed),
        }
    }

    /// Total connections the pool currently knows about.
    pub fn total(&self) -> usize {
        self.idle + self.outstanding
    }
}
