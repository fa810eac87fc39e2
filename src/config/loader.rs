//! Provider configuration loader.

use std::path::{Path, PathBuf};

use super::ProviderConfig;

/// Suffix of per-model config files in the working directory.
const LOCAL_SUFFIX: &str = ".config";

/// Directory name under the user config dir.
const APP_DIR: &str = "promptgate";

/// Loads the [`ProviderConfig`] for a model alias from the first file found.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Search paths in order of priority.
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a loader with the default search paths for `model`.
    #[must_use]
    pub fn for_model(model: &str) -> Self {
        let mut search_paths = Vec::new();

        // 1. Current directory: .<model>.config
        search_paths.push(PathBuf::from(format!(".{model}{LOCAL_SUFFIX}")));

        // 2. User config directory: ~/.config/promptgate/<model>.toml
        if let Some(config_dir) = user_config_dir() {
            search_paths.push(config_dir.join(format!("{model}.toml")));
        }

        Self { search_paths }
    }

    /// Create a loader with a specific config file path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
        }
    }

    /// Load, resolve and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` when no search path exists, a read or
    /// parse error for a broken file, and the validation errors of
    /// [`ProviderConfig::validate`].
    pub fn load(&self) -> Result<ProviderConfig, ConfigError> {
        let path = self.find_config_file().ok_or_else(|| ConfigError::NotFound {
            searched: self.search_paths.clone(),
        })?;

        tracing::debug!(path = %path.display(), "Loading provider config");
        let mut config = Self::load_from_path(&path)?;
        config.resolve_api_key();
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file, TOML by extension and JSON otherwise.
    fn load_from_path(path: &Path) -> Result<ProviderConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content).map_err(|e| ConfigError::TomlError {
                path: path.to_path_buf(),
                source: e,
            })
        } else {
            serde_json::from_str(&content).map_err(|e| ConfigError::JsonError {
                path: path.to_path_buf(),
                source: e,
            })
        }
    }

    /// Get the search paths for debugging.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Find the first config file that exists.
    #[must_use]
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths.iter().find(|p| p.exists()).cloned()
    }
}

fn user_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

/// Model aliases with a config file in `dir` or the user config directory.
#[must_use]
pub fn available_models(dir: &Path) -> Vec<String> {
    let mut models = scan_dir(dir, |name| {
        name.strip_prefix('.')?
            .strip_suffix(LOCAL_SUFFIX)
            .filter(|m| !m.is_empty())
    });

    if let Some(config_dir) = user_config_dir() {
        models.extend(scan_dir(&config_dir, |name| {
            name.strip_suffix(".toml").filter(|m| !m.is_empty())
        }));
    }

    models.sort();
    models.dedup();
    models
}

fn scan_dir(dir: &Path, extract: impl Fn(&str) -> Option<&str>) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name();
            extract(name.to_str()?).map(String::from)
        })
        .collect()
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config not found (searched: {})", display_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },

    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    JsonError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid config {path}: {source}")]
    TomlError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("no API key")]
    MissingApiKey,

    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
