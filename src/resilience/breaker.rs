//! Consecutive-failure circuit breaker.
//!
//! Two states only: closed and open. The breaker heals by elapsed time;
//! there is no half-open probe.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::GatewayError;

/// Consecutive failures that open the circuit.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Quiet period after which the failure count is forgotten.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Snapshot of the breaker counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BreakerState {
    pub consecutive_failures: u32,
    pub last_failure: Option<Instant>,
}

impl BreakerState {
    /// A breaker that has never failed counts as cooled down.
    fn cooled_down(&self, now: Instant, cooldown: Duration) -> bool {
        self.last_failure
            .map_or(true, |at| now.saturating_duration_since(at) > cooldown)
    }
}

/// Guards an operation behind a consecutive-failure counter.
///
/// The lock is held across the whole check-invoke-update sequence, so
/// concurrent callers on one breaker run strictly one at a time.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN)
    }
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            state: Mutex::new(BreakerState::default()),
        }
    }

    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    #[must_use]
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub async fn state(&self) -> BreakerState {
        *self.state.lock().await
    }

    /// Whether the next call would be rejected.
    pub async fn is_open(&self) -> bool {
        let state = self.state.lock().await;
        !state.cooled_down(Instant::now(), self.cooldown)
            && state.consecutive_failures >= self.threshold
    }

    /// Run `op` unless the circuit is open.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::CircuitOpen` without calling `op` while open,
    /// otherwise whatever `op` returns.
    pub async fn call<F, Fut, T>(&self, op: F) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut state = self.state.lock().await;

        if state.cooled_down(Instant::now(), self.cooldown) {
            state.consecutive_failures = 0;
        }

        if state.consecutive_failures >= self.threshold {
            tracing::warn!(
                failures = state.consecutive_failures,
                threshold = self.threshold,
                "Circuit open, rejecting call"
            );
            return Err(GatewayError::CircuitOpen);
        }

        match op().await {
            Ok(value) => {
                state.consecutive_failures = 0;
                Ok(value)
            }
            Err(err) => {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                state.last_failure = Some(Instant::now());
                if state.consecutive_failures == self.threshold {
                    tracing::warn!(
                        failures = state.consecutive_failures,
                        cooldown_secs = self.cooldown.as_secs(),
                        "Circuit breaker tripped"
                    );
                }
                Err(err)
            }
        }
    }
}
