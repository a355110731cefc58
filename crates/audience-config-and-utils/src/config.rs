//! Service configuration.
//!
//! This is the local, static configuration of the process. The remote
//! endpoint configuration (server, org, consent) arrives separately at
//! runtime as configuration snapshots.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Platform reported in `d_ptfm` when none is configured.
pub const DEFAULT_PLATFORM_NAME: &str = "java";

/// Fixed interval between attempts of a retryable hit.
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 30;

/// How long a caller waits on the direct-reply path.
pub const DEFAULT_CALLBACK_TIMEOUT_MS: u64 = 5000;

/// Per-request network timeout when the remote configuration has none.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 2;

/// Environment variable overriding `log_level`.
const LOG_LEVEL_ENV: &str = "AUDIENCE_LOG_LEVEL";

/// Main service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Platform name sent as `d_ptfm`.
    #[serde(default)]
    pub platform_name: Option<String>,
    /// Seconds between retries of a recoverable hit.
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
    /// Milliseconds a caller waits for a paired reply.
    #[serde(default = "default_callback_timeout_ms")]
    pub callback_timeout_ms: u64,
    /// Fallback per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub default_request_timeout_secs: u64,
    /// Audience server host used by the CLI when none is given.
    #[serde(default)]
    pub default_server: Option<String>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_retry_interval_secs() -> u64 {
    DEFAULT_RETRY_INTERVAL_SECS
}

fn default_callback_timeout_ms() -> u64 {
    DEFAULT_CALLBACK_TIMEOUT_MS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            platform_name: None,
            retry_interval_secs: DEFAULT_RETRY_INTERVAL_SECS,
            callback_timeout_ms: DEFAULT_CALLBACK_TIMEOUT_MS,
            default_request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            default_server: None,
        }
    }
}

impl Config {
    /// Load configuration from the config file, falling back to defaults.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var(LOG_LEVEL_ENV) {
            self.log_level = log_level;
        }
    }

    fn validate(&self) -> CoreResult<()> {
        if self.retry_interval_secs == 0 {
            return Err(CoreError::Config(
                "retry_interval_secs must be positive".to_string(),
            ));
        }
        if self.callback_timeout_ms == 0 {
            return Err(CoreError::Config(
                "callback_timeout_ms must be positive".to_string(),
            ));
        }
        if let Some(server) = &self.default_server {
            Self::server_url(server)?;
        }
        Ok(())
    }

    /// Parse a bare audience host into its `https` base URL.
    pub fn server_url(server: &str) -> CoreResult<Url> {
        let url = Url::parse(&format!("https://{}", server))?;
        if url.path() != "/" || url.query().is_some() {
            return Err(CoreError::Config(format!(
                "server must be a bare host, got {}",
                server
            )));
        }
        Ok(url)
    }

    /// Platform name with the default applied.
    pub fn platform_name(&self) -> &str {
        self.platform_name
            .as_deref()
            .unwrap_or(DEFAULT_PLATFORM_NAME)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_millis(self.callback_timeout_ms)
    }
}
