use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

/// Counters of one executor, safe for concurrent access.
#[derive(Debug, Default)]
pub struct ExecutorStats {
    submitted_total: AtomicU64,
    succeeded_total: AtomicU64,
    failed_total: AtomicU64,
    timed_out_total: AtomicU64,
    in_flight: AtomicU64,
    /// host → requests sent there
    per_host: DashMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub submitted_total: u64,
    pub succeeded_total: u64,
    pub failed_total: u64,
    pub timed_out_total: u64,
    pub in_flight: u64,
}

impl ExecutorStats {
    pub(crate) fn on_submit(&self, host: &str) {
        self.submitted_total.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        *self.per_host.entry(host.to_string()).or_insert(0) += 1;
    }

    pub(crate) fn on_success(&self) {
        self.succeeded_total.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn on_failure(&self, timed_out: bool) {
        self.failed_total.fetch_add(1, Ordering::Relaxed);
        if timed_out {
            self.timed_out_total.fetch_add(1, Ordering::Relaxed);
        }
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn requests_to(&self, host: &str) -> u64 {
        self.per_host.get(host).map(|v| *v.value()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted_total: self.submitted_total.load(Ordering::Relaxed),
            succeeded_total: self.succeeded_total.load(Ordering::Relaxed),
            failed_total: self.failed_total.load(Ordering::Relaxed),
            timed_out_total: self.timed_out_total.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}
