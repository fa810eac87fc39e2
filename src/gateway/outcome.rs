//! The record produced once per invocation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

const UNKNOWN_ERROR: &str = "unknown error";

/// Final result of one gateway invocation.
///
/// A failure always carries a non-empty `error`; a success has none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationOutcome {
    model: String,
    pid: u32,
    timestamp: i64,
    #[serde(skip_serializing_if = "String::is_empty")]
    prompt: String,
    response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    duration_ms: u64,
}

impl InvocationOutcome {
    pub(crate) fn new(
        model: &str,
        started_at: DateTime<Utc>,
        prompt: &str,
        result: Result<String, String>,
        duration: Duration,
    ) -> Self {
        let (response, error) = match result {
            Ok(response) => (response, None),
            Err(error) if error.is_empty() => (String::new(), Some(UNKNOWN_ERROR.to_string())),
            Err(error) => (String::new(), Some(error)),
        };

        Self {
            model: model.to_string(),
            pid: std::process::id(),
            timestamp: started_at.timestamp(),
            prompt: prompt.to_string(),
            response,
            error,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Unix seconds at invocation start.
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn response(&self) -> &str {
        &self.response
    }

    /// Message of the last failure, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Process exit status: 0 on success, 1 on any failure.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        u8::from(!self.is_success())
    }
}
