//! Provider configuration types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Wire dialect spoken by a provider endpoint.
///
/// An empty or missing `type` means OpenAI-compatible. Unrecognized names
/// are kept as [`ProviderKind::Unsupported`] so the failure surfaces from
/// the adapter instead of the loader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProviderKind {
    Anthropic,
    #[default]
    OpenAi,
    Unsupported(String),
}

impl From<String> for ProviderKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "anthropic" => Self::Anthropic,
            "openai" | "" => Self::OpenAi,
            _ => Self::Unsupported(value),
        }
    }
}

impl From<ProviderKind> for String {
    fn from(kind: ProviderKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anthropic => f.write_str("anthropic"),
            Self::OpenAi => f.write_str("openai"),
            Self::Unsupported(name) => f.write_str(name),
        }
    }
}

/// Connection settings for one model alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Full URL requests are POSTed to.
    pub endpoint: String,
    /// Model name sent upstream.
    #[serde(default)]
    pub model: String,
    /// API key, or a `${VAR}` reference resolved at load time.
    #[serde(default)]
    pub api_key: String,
    /// Static headers applied after the built-in ones.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, rename = "type")]
    pub kind: ProviderKind,
}

impl ProviderConfig {
    /// Replace a `${VAR}` API key reference with the variable's value.
    ///
    /// An unset variable resolves to the empty string, which [`validate`]
    /// then rejects.
    ///
    /// [`validate`]: ProviderConfig::validate
    pub fn resolve_api_key(&mut self) {
        if let Some(var) = env_reference(&self.api_key) {
            let resolved = std::env::var(var).unwrap_or_default();
            tracing::debug!(var, resolved = !resolved.is_empty(), "Resolved API key reference");
            self.api_key = resolved;
        }
    }

    /// Check the invariants the gateway relies on.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingApiKey` when the key is empty and
    /// `ConfigError::InvalidEndpoint` when the endpoint is not an http(s) URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        let url = url::Url::parse(&self.endpoint).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: self.endpoint.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }

        Ok(())
    }
}

/// Extract `VAR` from `${VAR}`.
fn env_reference(value: &str) -> Option<&str> {
    value.strip_prefix("${")?.strip_suffix('}')
}
