//! HTTP transport and the single-call provider client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::config::ProviderConfig;
use crate::error::GatewayError;

use super::{Adapter, CallRequest, PreparedRequest};

/// Connection timeout for HTTP requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest slice of a non-JSON error body quoted back to the caller.
const BODY_EXCERPT_LEN: usize = 200;

/// Raw status and body of an HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one prepared request; never retries.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &PreparedRequest) -> Result<TransportResponse, GatewayError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build an HTTP client with the connection timeout configured.
    ///
    /// The overall bound comes from the invocation deadline, not the client.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Network` if the TLS backend cannot initialize.
    pub fn new() -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

fn map_reqwest_error(e: &reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Network(e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &PreparedRequest) -> Result<TransportResponse, GatewayError> {
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| map_reqwest_error(&e))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(&e))?
            .to_vec();

        Ok(TransportResponse { status, body })
    }
}

/// Performs exactly one provider call per [`complete`](ProviderClient::complete).
#[derive(Debug, Clone)]
pub struct ProviderClient<T = HttpTransport> {
    config: ProviderConfig,
    transport: T,
}

impl ProviderClient<HttpTransport> {
    /// # Errors
    ///
    /// See [`HttpTransport::new`].
    pub fn from_config(config: ProviderConfig) -> Result<Self, GatewayError> {
        Ok(Self::new(config, HttpTransport::new()?))
    }
}

impl<T: Transport> ProviderClient<T> {
    #[must_use]
    pub fn new(config: ProviderConfig, transport: T) -> Self {
        Self { config, transport }
    }

    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send `request` and return the reply text.
    ///
    /// An unsupported provider kind fails before the transport is touched.
    /// Firing `cancel` mid-flight drops the outbound call.
    ///
    /// # Errors
    ///
    /// Any [`GatewayError`] except `CircuitOpen`.
    pub async fn complete(
        &self,
        request: &CallRequest,
        cancel: &CancellationToken,
    ) -> Result<String, GatewayError> {
        let adapter = Adapter::for_kind(&self.config.kind)?;
        let prepared = adapter.prepare(&self.config, request);

        tracing::debug!(
            url = %prepared.url,
            kind = %self.config.kind,
            prompt_len = request.prompt().len(),
            "Sending provider request"
        );

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(GatewayError::Cancelled),
            response = self.transport.send(&prepared) => response?,
        };

        if response.is_success() {
            return adapter.parse_response(&response.body);
        }

        match adapter.parse_response(&response.body) {
            Err(err @ GatewayError::Upstream(_)) => Err(err),
            _ => Err(GatewayError::Upstream(format!(
                "HTTP {}: {}",
                response.status,
                excerpt(&response.body)
            ))),
        }
    }
}

fn excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    match text.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
