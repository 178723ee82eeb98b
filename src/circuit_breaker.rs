//! # Circuit Breaker Module
//!
//! Fast-fail protection for the cloud OCR service. After repeated failures the
//! breaker opens and calls are refused until the reset timeout elapses, so a
//! batch falls through to the local engine instead of waiting on a dead service.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

use crate::ocr_config::RecoveryConfig;

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Circuit breaker for OCR service calls
///
/// ```text
/// CLOSED ────failures ≥ threshold────► OPEN
///    ▲                                   │
///    └──────────reset timeout────────────┘
/// ```
///
/// A success at any time closes the breaker and clears the failure count.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    threshold: u32,
    reset_after: Duration,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    ///
    /// # Examples
    ///
    /// ```rust
    /// use nutrition_ocr::ocr_config::RecoveryConfig;
    /// use nutrition_ocr::circuit_breaker::CircuitBreaker;
    ///
    /// let breaker = CircuitBreaker::new(&RecoveryConfig::default());
    /// assert!(!breaker.is_open());
    /// ```
    pub fn new(config: &RecoveryConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            threshold: config.circuit_breaker_threshold,
            reset_after: Duration::from_secs(config.circuit_breaker_reset_secs),
        }
    }

    /// Check if circuit breaker is open (blocking requests)
    ///
    /// Resets the breaker to closed once the reset timeout has elapsed since the
    /// last recorded failure.
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock();

        if state.failure_count >= self.threshold {
            if let Some(last_time) = state.last_failure_time {
                if last_time.elapsed() < self.reset_after {
                    return true;
                }
                *state = BreakerState::default();
            }
        }
        false
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());
    }

    /// Record a successful call, closing the breaker
    pub fn record_success(&self) {
        *self.state.lock() = BreakerState::default();
    }

    /// Current consecutive failure count
    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }
}
