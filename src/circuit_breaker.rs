//! # Circuit Breaker Module
//!
//! This module implements the circuit breaker pattern for calls to the
//! text-generation provider. When the provider fails repeatedly the breaker
//! opens and classification goes straight to the rule-based fallback until
//! the cool-down has elapsed.

use log::{info, warn};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::generation_config::RecoveryConfig;

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Circuit breaker guarding the text-generation provider
///
/// # State Machine
///
/// - **Closed**: Normal operation, calls pass through
/// - **Open**: Failure threshold reached, calls are skipped
/// - **Reset**: After `circuit_breaker_reset_secs` the breaker closes again
///   and the next call is allowed to probe the provider
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    config: RecoveryConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    ///
    /// # Examples
    ///
    /// ```rust
    /// use shopping_list::generation_config::RecoveryConfig;
    /// use shopping_list::circuit_breaker::CircuitBreaker;
    ///
    /// let breaker = CircuitBreaker::new(RecoveryConfig::default());
    /// assert!(!breaker.is_open());
    /// ```
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            config,
        }
    }

    fn state(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Check if the breaker is open (provider calls should be skipped)
    ///
    /// Resets to closed once the reset timeout has elapsed since the last failure.
    pub fn is_open(&self) -> bool {
        let mut state = self.state();

        if state.failure_count < self.config.circuit_breaker_threshold {
            return false;
        }

        match state.last_failure_time {
            Some(last_time)
                if last_time.elapsed()
                    < Duration::from_secs(self.config.circuit_breaker_reset_secs) =>
            {
                true
            }
            _ => {
                info!("Provider circuit breaker reset after cool-down");
                *state = BreakerState::default();
                false
            }
        }
    }

    /// Record a failed provider call
    pub fn record_failure(&self) {
        let mut state = self.state();
        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());
        if state.failure_count == self.config.circuit_breaker_threshold {
            warn!(
                "Provider circuit breaker opened after {} consecutive failures",
                state.failure_count
            );
        }
    }

    /// Record a successful provider call, closing the breaker
    pub fn record_success(&self) {
        *self.state() = BreakerState::default();
    }

    /// Current consecutive failure count
    pub fn failure_count(&self) -> u32 {
        self.state().failure_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_breaker_state_transitions() {
        let config = RecoveryConfig {
            circuit_breaker_threshold: 2,
            ..Default::default()
        };
        let breaker = CircuitBreaker::new(config);

        assert!(!breaker.is_open());

        breaker.record_failure();
        assert!(!breaker.is_open()); // 1 failure

        breaker.record_failure();
        assert!(breaker.is_open()); // threshold reached

        breaker.record_success();
        assert!(!breaker.is_open());
        assert_eq!(breaker.failure_count(), 0);
    }

    #[test]
    fn test_circuit_breaker_resets_after_cooldown() {
        let config = RecoveryConfig {
            circuit_breaker_threshold: 1,
            circuit_breaker_reset_secs: 0,
            ..Default::default()
        };
        let breaker = CircuitBreaker::new(config);

        breaker.record_failure();
        // Zero-second cool-down has already elapsed
        assert!(!breaker.is_open());
        assert_eq!(breaker.failure_count(), 0);
    }
}
