use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Counters kept by an admission gate over its lifetime.
#[derive(Debug, Default)]
pub struct GateStats {
    pub permits_issued: AtomicU64,
    pub permits_dropped: AtomicU64,
    pub permits_acquired: AtomicU64,
    pub acquire_timeouts: AtomicU64,
    pub acquire_cancellations: AtomicU64,

    // Gauge of the most recent acquire wait, in the same spirit as a last-latency field
    pub last_wait_ms: AtomicU64,
}

/// Plain copy of [`GateStats`] at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateStatsSnapshot {
    pub permits_issued: u64,
    pub permits_dropped: u64,
    pub permits_acquired: u64,
    pub acquire_timeouts: u64,
    pub acquire_cancellations: u64,
    pub last_wait_ms: u64,
}

impl GateStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_issued(&self) {
        self.permits_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dropped(&self) {
        self.permits_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_acquired(&self) {
        self.permits_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_timeouts(&self) {
        self.acquire_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cancellations(&self) {
        self.acquire_cancellations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_wait(&self, ms: u64) {
        self.last_wait_ms.store(ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> GateStatsSnapshot {
        GateStatsSnapshot {
            permits_issued: self.permits_issued.load(Ordering::Relaxed),
            permits_dropped: self.permits_dropped.load(Ordering::Relaxed),
            permits_acquired: self.permits_acquired.load(Ordering::Relaxed),
            acquire_timeouts: self.acquire_timeouts.load(Ordering::Relaxed),
            acquire_cancellations: self.acquire_cancellations.load(Ordering::Relaxed),
            last_wait_ms: self.last_wait_ms.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let s = self.snapshot();

        info!(
            "GATE STATS: Permits: {} issued, {} dropped, {} acquired | Waits: {} timed out, {} cancelled | Last wait {}ms",
            s.permits_issued,
            s.permits_dropped,
            s.permits_acquired,
            s.acquire_timeouts,
            s.acquire_cancellations,
            s.last_wait_ms
        );
    }
}
