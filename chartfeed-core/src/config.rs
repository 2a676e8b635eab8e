//! Feed configuration, loaded from TOML.
//!
//! ```toml
//! [api]
//! base_url = "http://localhost:8000/api"
//! account_id = "paper-1"
//! token_env = "CHARTFEED_TOKEN"
//! timeout_secs = 30
//!
//! [loader]
//! page_limit = 500
//! max_retries = 5
//! debounce_ms = 250
//! ```

use crate::data::gap_skip::{GapSkipPolicy, DEFAULT_PAGE_LIMIT, MAX_EMPTY_RETRIES};
use crate::data::http::RestClient;
use crate::data::provider::DataError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub account_id: String,
    /// Environment variable holding the bearer token (never stored in the file).
    pub token_env: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".into(),
            account_id: "default".into(),
            token_env: Some("CHARTFEED_TOKEN".into()),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub page_limit: u32,
    pub max_retries: u32,
    pub debounce_ms: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            page_limit: DEFAULT_PAGE_LIMIT,
            max_retries: MAX_EMPTY_RETRIES,
            debounce_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub api: ApiConfig,
    pub loader: LoaderConfig,
}

impl FeedConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FeedConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api.base_url is empty".into()));
        }
        if self.loader.page_limit == 0 {
            return Err(ConfigError::Invalid("loader.page_limit must be > 0".into()));
        }
        Ok(())
    }

    pub fn gap_skip_policy(&self) -> GapSkipPolicy {
        GapSkipPolicy {
            max_retries: self.loader.max_retries,
            page_limit: self.loader.page_limit,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.loader.debounce_ms)
    }

    /// Bearer token from the configured environment variable, if set and non-empty.
    pub fn token(&self) -> Option<String> {
        let var = self.api.token_env.as_deref()?;
        std::env::var(var).ok().filter(|t| !t.trim().is_empty())
    }

    pub fn rest_client(&self) -> Result<RestClient, DataError> {
        RestClient::new(
            self.api.base_url.clone(),
            self.api.account_id.clone(),
            self.token(),
            Duration::from_secs(self.api.timeout_secs),
        )
    }
}
