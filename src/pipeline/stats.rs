//! Per-run counters shared by all stages.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct RunStats {
    enqueued: AtomicUsize,
    skipped_known: AtomicUsize,
    fetched: AtomicUsize,
    fetch_failed: AtomicUsize,
    rate_limited: AtomicUsize,
    persisted: AtomicUsize,
}

impl RunStats {
    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_known(&self) {
        self.skipped_known.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetched(&self) {
        self.fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failed(&self) {
        self.fetch_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persisted(&self) {
        self.persisted.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the counters.
    pub fn summary(&self) -> RunSummary {
        let enqueued = self.enqueued.load(Ordering::Relaxed);
        let fetched = self.fetched.load(Ordering::Relaxed);
        let fetch_failed = self.fetch_failed.load(Ordering::Relaxed);
        let rate_limited = self.rate_limited.load(Ordering::Relaxed);
        RunSummary {
            enqueued,
            skipped_known: self.skipped_known.load(Ordering::Relaxed),
            fetched,
            fetch_failed,
            rate_limited,
            persisted: self.persisted.load(Ordering::Relaxed),
            abandoned: enqueued.saturating_sub(fetched + fetch_failed + rate_limited),
            rate_budget_remaining: 0,
        }
    }
}

/// What a finished run did.
///
/// `abandoned` counts items that were queued but never fetched, either
/// because the run was cancelled or because the rate-limit budget ran out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub enqueued: usize,
    pub skipped_known: usize,
    pub fetched: usize,
    pub fetch_failed: usize,
    pub rate_limited: usize,
    pub persisted: usize,
    pub abandoned: usize,
    /// Rate-limit budget left when the workers stopped.
    pub rate_budget_remaining: u32,
}
