//! # Circuit Breaker Module
//!
//! Stops hammering the recognition service after repeated failures and lets a
//! single trial request through once the reset window has passed.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::RecoveryConfig;

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Circuit breaker for recognition calls
///
/// - **Closed**: failures below threshold, requests pass through
/// - **Open**: threshold reached and reset window not elapsed, requests fail fast
/// - **Half-Open**: reset window elapsed, the next request is allowed as a trial
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    threshold: u32,
    reset_after: Duration,
}

impl CircuitBreaker {
    pub fn new(config: &RecoveryConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            threshold: config.circuit_breaker_threshold.max(1),
            reset_after: Duration::from_secs(config.circuit_breaker_reset_secs),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        // The state is two plain counters; a poisoned lock still holds usable data
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_open(&self) -> bool {
        self.is_open_at(Instant::now())
    }

    /// Whether requests should be rejected at `now`
    pub fn is_open_at(&self, now: Instant) -> bool {
        let mut state = self.lock();
        if state.failure_count < self.threshold {
            return false;
        }
        match state.last_failure {
            Some(last) if now.saturating_duration_since(last) < self.reset_after => true,
            _ => {
                // Half-open: allow one trial request; a failure re-opens immediately
                state.failure_count = self.threshold - 1;
                false
            }
        }
    }

    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    pub fn record_failure_at(&self, now: Instant) {
        let mut state = self.lock();
        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure = Some(now);
    }

    pub fn record_success(&self) {
        let mut state = self.lock();
        state.failure_count = 0;
        state.last_failure = None;
    }
}
