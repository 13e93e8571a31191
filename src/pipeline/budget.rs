//! Run-wide circuit breaker for "too many requests" answers.
//!
//! Every HTTP 429 seen by any fetch worker costs one unit of the budget.
//! Once the budget is spent, workers stop taking new items. This trades
//! completeness for not hammering a site that is actively throttling us;
//! there is no per-item retry or backoff.

use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug)]
pub struct RateBudget {
    ceiling: u32,
    remaining: AtomicU32,
}

impl RateBudget {
    pub fn new(ceiling: u32) -> Self {
        Self {
            ceiling,
            remaining: AtomicU32::new(ceiling),
        }
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Charge one rate-limited response and return what is left.
    ///
    /// The decrement is a single compare-and-swap loop, so concurrent
    /// callers can never push the counter below zero; charging an exhausted
    /// budget is a no-op that returns 0.
    pub fn record_rate_limit(&self) -> u32 {
        match self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => 0,
        }
    }
}
