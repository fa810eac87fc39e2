//! Failure taxonomy for a single gateway invocation.

use std::fmt;

/// Errors raised while building, sending or interpreting a provider call.
///
/// The variant survives the retry loop so callers can tell kinds apart;
/// only the binary flattens it to a message and an exit status.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// No prompt text was supplied.
    #[error("no input")]
    EmptyInput,

    /// `max_tokens` must be positive.
    #[error("max tokens must be greater than zero")]
    InvalidMaxTokens,

    /// Provider kind has no adapter.
    #[error("unknown provider type: {0}")]
    UnsupportedProvider(String),

    /// Transport-level failure (DNS, connect, reset, body read).
    #[error("network failure: {0}")]
    Network(String),

    /// The invocation deadline passed.
    #[error("request timed out")]
    Timeout,

    /// The request-scoped cancellation token fired.
    #[error("request cancelled")]
    Cancelled,

    /// Body was not JSON or matched neither the error nor the success shape.
    #[error("{0}")]
    ResponseFormat(String),

    /// Provider returned a structured error payload.
    #[error("{0}")]
    Upstream(String),

    /// The circuit breaker refused the attempt.
    #[error("circuit open")]
    CircuitOpen,
}

/// Coarse classification of a [`GatewayError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    EmptyInput,
    UnsupportedProvider,
    NetworkFailure,
    Timeout,
    Cancelled,
    ResponseFormatError,
    UpstreamError,
    CircuitOpen,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::EmptyInput => "empty_input",
            Self::UnsupportedProvider => "unsupported_provider",
            Self::NetworkFailure => "network_failure",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::ResponseFormatError => "response_format_error",
            Self::UpstreamError => "upstream_error",
            Self::CircuitOpen => "circuit_open",
        };
        f.write_str(name)
    }
}

impl GatewayError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyInput | Self::InvalidMaxTokens => ErrorKind::EmptyInput,
            Self::UnsupportedProvider(_) => ErrorKind::UnsupportedProvider,
            Self::Network(_) => ErrorKind::NetworkFailure,
            Self::Timeout => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::ResponseFormat(_) => ErrorKind::ResponseFormatError,
            Self::Upstream(_) => ErrorKind::UpstreamError,
            Self::CircuitOpen => ErrorKind::CircuitOpen,
        }
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Transient kinds are retried uniformly. An unsupported provider or
    /// invalid input fails the same way every time, and a cancelled
    /// request must not be restarted.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NetworkFailure
                | ErrorKind::Timeout
                | ErrorKind::ResponseFormatError
                | ErrorKind::UpstreamError
                | ErrorKind::CircuitOpen
        )
    }
}
