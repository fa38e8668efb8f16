// src/metrics.rs
use std::sync::atomic::{AtomicU64, Ordering};

/// Cheap run counters, summarized once at end of run.
#[derive(Default)]
pub struct Metrics {
    pub connections_total: AtomicU64,
    pub batches_total: AtomicU64,
    pub bets_stored_total: AtomicU64,
    pub protocol_errors_total: AtomicU64,
    pub responses_sent_total: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inc_connections(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_batches(&self) {
        self.batches_total.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn add_bets(&self, n: u64) {
        self.bets_stored_total.fetch_add(n, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_protocol_errors(&self) {
        self.protocol_errors_total.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_responses(&self) {
        self.responses_sent_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> String {
        format!(
            "connections={} batches={} bets={} protocol_errors={} responses={}",
            self.connections_total.load(Ordering::Relaxed),
            self.batches_total.load(Ordering::Relaxed),
            self.bets_stored_total.load(Ordering::Relaxed),
            self.protocol_errors_total.load(Ordering::Relaxed),
            self.responses_sent_total.load(Ordering::Relaxed),
        )
    }
}
