//! Bounded retries with linear backoff under one deadline.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::CircuitBreaker;
use crate::error::GatewayError;

/// Default number of attempts.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Backoff unit; the wait after attempt `n` is `n` units.
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(1);

/// How many attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS)
    }
}

impl RetryPolicy {
    /// At least one attempt is always made.
    #[must_use]
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff_step: DEFAULT_BACKOFF_STEP,
        }
    }

    #[must_use]
    pub fn with_backoff_step(mut self, step: Duration) -> Self {
        self.backoff_step = step;
        self
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay after the failed attempt numbered `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }
}

/// Runs an operation through a [`CircuitBreaker`] until it succeeds, a
/// fatal error occurs, the attempts run out, or the deadline passes.
#[derive(Debug)]
pub struct RetryController<'a> {
    policy: RetryPolicy,
    breaker: &'a CircuitBreaker,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl<'a> RetryController<'a> {
    #[must_use]
    pub fn new(policy: RetryPolicy, breaker: &'a CircuitBreaker) -> Self {
        Self {
            policy,
            breaker,
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Bound every attempt and every backoff wait by `deadline`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Execute `op` up to the policy's attempt count.
    ///
    /// Earlier failures are dropped; the error returned is the last one.
    ///
    /// # Errors
    ///
    /// The last attempt's error, a non-retryable error as soon as it occurs,
    /// `GatewayError::Timeout` once the deadline passes, or
    /// `GatewayError::Cancelled` if cancelled during a backoff wait.
    pub async fn run<F, Fut, T>(&self, mut op: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let attempts = self.policy.attempts();
        let mut attempt = 1;

        loop {
            tracing::debug!(attempt, attempts, "Starting attempt");
            let deadline = self.deadline;
            let result = self
                .breaker
                .call(|| {
                    let fut = op();
                    async move {
                        match deadline {
                            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                                .await
                                .unwrap_or(Err(GatewayError::Timeout)),
                            None => fut.await,
                        }
                    }
                })
                .await;

            let err = match result {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            tracing::warn!(attempt, attempts, kind = %err.kind(), error = %err, "Attempt failed");

            if !err.is_retryable() || attempt >= attempts {
                return Err(err);
            }

            self.backoff(attempt).await?;
            attempt += 1;
        }
    }

    /// Sleep before the next attempt. A wait that would reach the deadline
    /// is cut there and ends in `GatewayError::Timeout`.
    async fn backoff(&self, attempt: u32) -> Result<(), GatewayError> {
        let delay = self.policy.backoff(attempt);
        let wake = Instant::now().checked_add(delay);

        if let Some(deadline) = self.deadline {
            if !matches!(wake, Some(wake) if wake < deadline) {
                tracing::warn!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Backoff cut at deadline"
                );
                return tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => Err(GatewayError::Cancelled),
                    () = tokio::time::sleep_until(deadline) => Err(GatewayError::Timeout),
                };
            }
        }

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(GatewayError::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
