//! Composition root for one invocation.
//!
//! Flatten the session into a prompt, run the provider call through the
//! retry controller and circuit breaker under a single deadline, then
//! record the exchange in the session only if the call succeeded.

use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ProviderConfig;
use crate::error::GatewayError;
use crate::provider::{CallRequest, HttpTransport, ProviderClient, Transport};
use crate::resilience::{CircuitBreaker, RetryController, RetryPolicy, DEFAULT_ATTEMPTS};
use crate::session::{Session, SessionHandle};

use super::InvocationOutcome;

/// Default token budget per reply.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Default overall deadline per invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Caller-supplied parameters for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    /// Model alias, echoed in the outcome.
    pub model: String,
    /// Raw user prompt, before session context is added.
    pub prompt: String,
    pub max_tokens: u32,
    /// Deadline for all attempts and backoff waits combined.
    pub timeout: Duration,
    pub attempts: u32,
}

impl InvocationRequest {
    #[must_use]
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: DEFAULT_TIMEOUT,
            attempts: DEFAULT_ATTEMPTS,
        }
    }
}

/// Owns the provider client and the breaker for its lifetime.
#[derive(Debug)]
pub struct Orchestrator<T = HttpTransport> {
    client: ProviderClient<T>,
    breaker: CircuitBreaker,
    backoff_step: Option<Duration>,
    cancel: CancellationToken,
}

impl Orchestrator<HttpTransport> {
    /// # Errors
    ///
    /// See [`HttpTransport::new`].
    pub fn from_config(config: ProviderConfig) -> Result<Self, GatewayError> {
        Ok(Self::new(ProviderClient::from_config(config)?))
    }
}

impl<T: Transport> Orchestrator<T> {
    #[must_use]
    pub fn new(client: ProviderClient<T>) -> Self {
        Self {
            client,
            breaker: CircuitBreaker::default(),
            backoff_step: None,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    /// Override the linear backoff unit.
    #[must_use]
    pub fn with_backoff_step(mut self, step: Duration) -> Self {
        self.backoff_step = Some(step);
        self
    }

    /// Set a cancellation token for graceful shutdown.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn client(&self) -> &ProviderClient<T> {
        &self.client
    }

    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the request against `session` without touching it.
    ///
    /// # Errors
    ///
    /// Invalid input fails before any attempt; otherwise the error the
    /// retry controller settles on.
    pub async fn execute(
        &self,
        request: &InvocationRequest,
        session: &Session,
    ) -> Result<String, GatewayError> {
        if request.prompt.is_empty() {
            return Err(GatewayError::EmptyInput);
        }
        let call = CallRequest::new(session.build_prompt(&request.prompt), request.max_tokens)?;

        let mut policy = RetryPolicy::new(request.attempts);
        if let Some(step) = self.backoff_step {
            policy = policy.with_backoff_step(step);
        }

        let mut controller =
            RetryController::new(policy, &self.breaker).with_cancellation(self.cancel.clone());
        // A timeout too large to represent leaves the call unbounded.
        if let Some(deadline) = Instant::now().checked_add(request.timeout) {
            controller = controller.with_deadline(deadline);
        }

        controller
            .run(|| self.client.complete(&call, &self.cancel))
            .await
    }

    /// Run one invocation end to end and persist the session on success.
    ///
    /// A failed call leaves the session untouched. A failed save is logged
    /// but does not turn a successful reply into a failure.
    pub async fn invoke(
        &self,
        request: &InvocationRequest,
        session: &mut SessionHandle,
    ) -> InvocationOutcome {
        let started_at = Utc::now();
        let start = Instant::now();

        tracing::info!(
            model = %request.model,
            history = session.session().len(),
            attempts = request.attempts,
            timeout_secs = request.timeout.as_secs(),
            "Starting invocation"
        );

        let result = self.execute(request, session.session()).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                session
                    .session_mut()
                    .record_exchange(request.prompt.as_str(), response.as_str());
                if let Err(e) = session.save() {
                    tracing::warn!(error = %e, "Failed to save session");
                }
                tracing::info!(
                    duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                    "Invocation succeeded"
                );
            }
            Err(e) => {
                tracing::error!(kind = %e.kind(), error = %e, "Invocation failed");
            }
        }

        InvocationOutcome::new(
            &request.model,
            started_at,
            &request.prompt,
            result.map_err(|e| e.to_string()),
            duration,
        )
    }
}
