//! Bridge metrics for operational visibility.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for bridge operations.
pub struct BridgeMetrics {
    // Façade
    invocations: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    dedup_joins: AtomicU64,

    // Worker
    remote_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    timed_out_calls: AtomicU64,
    total_call_ms: AtomicU64,

    // Connector
    respawns: AtomicU64,
    communication_errors: AtomicU64,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self {
            invocations: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            dedup_joins: AtomicU64::new(0),
            remote_calls: AtomicU64::new(0),
            successful_calls: AtomicU64::new(0),
            failed_calls: AtomicU64::new(0),
            timed_out_calls: AtomicU64::new(0),
            total_call_ms: AtomicU64::new(0),
            respawns: AtomicU64::new(0),
            communication_errors: AtomicU64::new(0),
        }
    }

    pub fn record_invocation(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// A caller attached to a job that was already queued or in flight.
    pub fn record_dedup_join(&self) {
        self.dedup_joins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_call_start(&self) {
        self.remote_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_call_end(&self, success: bool, timed_out: bool, duration_ms: u64) {
        if success {
            self.successful_calls.fetch_add(1, Ordering::Relaxed);
        } else if timed_out {
            self.timed_out_calls.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_calls.fetch_add(1, Ordering::Relaxed);
        }
        self.total_call_ms.fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn record_respawn(&self) {
        self.respawns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_communication_error(&self) {
        self.communication_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let remote_calls = self.remote_calls.load(Ordering::Relaxed);
        let total_call_ms = self.total_call_ms.load(Ordering::Relaxed);
        MetricsSnapshot {
            invocations: self.invocations.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            dedup_joins: self.dedup_joins.load(Ordering::Relaxed),
            remote_calls,
            successful_calls: self.successful_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            timed_out_calls: self.timed_out_calls.load(Ordering::Relaxed),
            avg_call_ms: if remote_calls > 0 {
                total_call_ms / remote_calls
            } else {
                0
            },
            respawns: self.respawns.load(Ordering::Relaxed),
            communication_errors: self.communication_errors.load(Ordering::Relaxed),
        }
    }
}

impl Default for BridgeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`BridgeMetrics`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub invocations: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub dedup_joins: u64,
    pub remote_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub timed_out_calls: u64,
    pub avg_call_ms: u64,
    pub respawns: u64,
    pub communication_errors: u64,
}

impl MetricsSnapshot {
    /// Cache hit rate as a percentage of looked-up invocations.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            (self.cache_hits as f64 / lookups as f64) * 100.0
        }
    }

    /// Success rate as a percentage of completed remote calls.
    pub fn success_rate(&self) -> f64 {
        let completed = self.successful_calls + self.failed_calls + self.timed_out_calls;
        if completed == 0 {
            100.0
        } else {
            (self.successful_calls as f64 / completed as f64) * 100.0
        }
    }
}
