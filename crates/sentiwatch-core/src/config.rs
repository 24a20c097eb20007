//! Configuration management for the client.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default API base URL (can be overridden at compile time via SENTIWATCH_API_URL env var).
pub const DEFAULT_API_URL: &str = match option_env!("SENTIWATCH_API_URL") {
    Some(url) => url,
    None => "http://localhost:8000/api",
};

/// Default provider authorization endpoint for the consent-link flow.
pub const DEFAULT_AUTHORIZE_URL: &str = "https://api.instagram.com/oauth/authorize";

/// Default provider app client id (can be overridden at compile time via
/// SENTIWATCH_CLIENT_ID env var).
pub const DEFAULT_CLIENT_ID: &str = match option_env!("SENTIWATCH_CLIENT_ID") {
    Some(id) => id,
    None => "sentiwatch-dev",
};

/// Default redirect URI registered with the provider.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/auth/instagram/callback";

/// Default permission scopes requested during linking.
pub const DEFAULT_SCOPES: &str = "user_profile,user_media";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default polling interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// Default debounce window for duplicate-identifier lookups, in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Main client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Backend API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Provider authorization endpoint.
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    /// Provider app client id.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Redirect URI registered with the provider.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// Comma-separated permission scopes requested during linking.
    #[serde(default = "default_scopes")]
    pub permission_scopes: String,
    /// Polling interval for monitored sources, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Debounce window for duplicate-identifier lookups, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_authorize_url() -> String {
    DEFAULT_AUTHORIZE_URL.to_string()
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_redirect_uri() -> String {
    DEFAULT_REDIRECT_URI.to_string()
}

fn default_scopes() -> String {
    DEFAULT_SCOPES.to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            permission_scopes: DEFAULT_SCOPES.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        // Environment variables can only override log_level
        config.load_from_env();

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let config_path = paths.config_file();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Override configuration from environment variables.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("SENTIWATCH_LOG_LEVEL") {
            self.log_level = log_level;
        }
    }

    /// Get the API base URL as a parsed URL.
    pub fn api_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_url).map_err(CoreError::from)
    }

    /// Get the provider authorization endpoint as a parsed URL.
    pub fn authorize_url(&self) -> CoreResult<Url> {
        Url::parse(&self.authorize_url).map_err(CoreError::from)
    }
}
