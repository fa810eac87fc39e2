//! Per-provider wire formats.
//!
//! Each [`Adapter`] variant owns the request body, the authentication
//! headers and the response schemas of one provider dialect. Responses are
//! decoded into explicit schemas; the error envelope is always tried before
//! the success shape.

use serde::{Deserialize, Serialize};

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::GatewayError;

/// Protocol version sent with every Anthropic request.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Fallback when an upstream error envelope has no usable message.
const UNKNOWN_UPSTREAM_ERROR: &str = "unknown upstream error";

/// Provider-agnostic call parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    prompt: String,
    max_tokens: u32,
}

impl CallRequest {
    /// # Errors
    ///
    /// Returns `GatewayError::EmptyInput` for an empty prompt and
    /// `GatewayError::InvalidMaxTokens` for a zero token budget.
    pub fn new(prompt: impl Into<String>, max_tokens: u32) -> Result<Self, GatewayError> {
        let prompt = prompt.into();
        if prompt.is_empty() {
            return Err(GatewayError::EmptyInput);
        }
        if max_tokens == 0 {
            return Err(GatewayError::InvalidMaxTokens);
        }
        Ok(Self { prompt, max_tokens })
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

/// JSON body shared by both dialects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

/// A fully assembled outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: WireRequest,
}

/// Upstream `{"error": {...}}` envelope.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> String {
        self.message
            .filter(|m| !m.is_empty())
            .or(self.kind.filter(|k| !k.is_empty()))
            .unwrap_or_else(|| UNKNOWN_UPSTREAM_ERROR.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AnthropicReply {
    Error(ErrorEnvelope),
    Message { content: Vec<AnthropicBlock> },
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OpenAiReply {
    Error(ErrorEnvelope),
    Completion { choices: Vec<OpenAiChoice> },
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Wire dialect selected from a [`ProviderKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adapter {
    Anthropic,
    OpenAi,
}

impl Adapter {
    /// # Errors
    ///
    /// Returns `GatewayError::UnsupportedProvider` for a kind with no adapter.
    pub fn for_kind(kind: &ProviderKind) -> Result<Self, GatewayError> {
        match kind {
            ProviderKind::Anthropic => Ok(Self::Anthropic),
            ProviderKind::OpenAi => Ok(Self::OpenAi),
            ProviderKind::Unsupported(name) => Err(GatewayError::UnsupportedProvider(name.clone())),
        }
    }

    /// Both dialects take a single user message carrying the whole prompt.
    #[must_use]
    pub fn build_body(self, config: &ProviderConfig, request: &CallRequest) -> WireRequest {
        WireRequest {
            model: config.model.clone(),
            messages: vec![WireMessage {
                role: "user".to_string(),
                content: request.prompt().to_string(),
            }],
            max_tokens: request.max_tokens(),
        }
    }

    /// Built-in headers followed by the configured ones.
    ///
    /// A configured header replaces a built-in of the same name
    /// (case-insensitive); nothing can remove a built-in.
    #[must_use]
    pub fn headers(self, config: &ProviderConfig) -> Vec<(String, String)> {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];

        match self {
            Self::Anthropic => {
                headers.push(("x-api-key".to_string(), config.api_key.clone()));
                headers.push((
                    "anthropic-version".to_string(),
                    ANTHROPIC_VERSION.to_string(),
                ));
            }
            Self::OpenAi => {
                headers.push((
                    "Authorization".to_string(),
                    format!("Bearer {}", config.api_key),
                ));
            }
        }

        for (name, value) in &config.headers {
            match headers
                .iter()
                .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
            {
                Some(idx) => headers[idx].1.clone_from(value),
                None => headers.push((name.clone(), value.clone())),
            }
        }

        headers
    }

    #[must_use]
    pub fn prepare(self, config: &ProviderConfig, request: &CallRequest) -> PreparedRequest {
        PreparedRequest {
            url: config.endpoint.clone(),
            headers: self.headers(config),
            body: self.build_body(config, request),
        }
    }

    /// Extract the reply text from a raw response body.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Upstream` with the provider's message when the
    /// body is an error envelope, and `GatewayError::ResponseFormat` when it
    /// is not JSON or has neither shape.
    pub fn parse_response(self, raw: &[u8]) -> Result<String, GatewayError> {
        let value: serde_json::Value = serde_json::from_slice(raw)
            .map_err(|e| GatewayError::ResponseFormat(format!("parse error: {e}")))?;

        let text = match self {
            Self::Anthropic => match serde_json::from_value(value) {
                Ok(AnthropicReply::Error(envelope)) => {
                    return Err(GatewayError::Upstream(envelope.error.into_message()))
                }
                Ok(AnthropicReply::Message { content }) => {
                    content.into_iter().next().and_then(|block| block.text)
                }
                Err(_) => None,
            },
            Self::OpenAi => match serde_json::from_value(value) {
                Ok(OpenAiReply::Error(envelope)) => {
                    return Err(GatewayError::Upstream(envelope.error.into_message()))
                }
                Ok(OpenAiReply::Completion { choices }) => choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content),
                Err(_) => None,
            },
        };

        text.ok_or_else(|| GatewayError::ResponseFormat("unexpected response format".to_string()))
    }
}

/// Build the request body for `config`'s provider.
///
/// # Errors
///
/// Fails with `GatewayError::UnsupportedProvider` for an unknown kind and
/// with the [`CallRequest::new`] errors for invalid input.
pub fn build_wire_request(
    config: &ProviderConfig,
    prompt: &str,
    max_tokens: u32,
) -> Result<WireRequest, GatewayError> {
    let adapter = Adapter::for_kind(&config.kind)?;
    let request = CallRequest::new(prompt, max_tokens)?;
    Ok(adapter.build_body(config, &request))
}

/// Interpret a raw response body from `config`'s provider.
///
/// # Errors
///
/// See [`Adapter::parse_response`]; unknown kinds fail with
/// `GatewayError::UnsupportedProvider`.
pub fn parse_wire_response(config: &ProviderConfig, raw: &[u8]) -> Result<String, GatewayError> {
    Adapter::for_kind(&config.kind)?.parse_response(raw)
}
