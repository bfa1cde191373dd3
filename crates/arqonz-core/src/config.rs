//! Configuration and data directory management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_PORT: u16 = 3004;
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 4_000;
pub const DEFAULT_JOB_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_POLL_RETRIES: u32 = 3;

/// Paths to all Arqonz data files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Generated image history (`data/image-history.json`).
    pub image_history: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates the root if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            image_history: root.join("image-history.json"),
            root,
        })
    }
}

/// Timing policy for one remote job.
///
/// The timeout budget is measured from submission, never from the latest
/// poll. `max_transport_retries` bounds consecutive failed poll attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(rename = "pollIntervalMs", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(rename = "timeoutMs", default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(rename = "maxTransportRetries", default = "default_poll_retries")]
    pub max_transport_retries: u32,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
fn default_timeout_ms() -> u64 {
    DEFAULT_JOB_TIMEOUT_MS
}
fn default_poll_retries() -> u32 {
    DEFAULT_POLL_RETRIES
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            timeout_ms: DEFAULT_JOB_TIMEOUT_MS,
            max_transport_retries: DEFAULT_POLL_RETRIES,
        }
    }
}

impl PollingConfig {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval_ms: poll_interval.as_millis() as u64,
            timeout_ms: timeout.as_millis() as u64,
            ..Self::default()
        }
    }

    pub fn with_transport_retries(mut self, retries: u32) -> Self {
        self.max_transport_retries = retries;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reject settings that would spin or never poll.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll interval must be greater than zero".into()));
        }
        if self.timeout_ms == 0 {
            return Err(Error::Config("job timeout must be greater than zero".into()));
        }
        if self.poll_interval_ms > self.timeout_ms {
            return Err(Error::Config(format!(
                "poll interval ({}ms) exceeds job timeout ({}ms)",
                self.poll_interval_ms, self.timeout_ms
            )));
        }
        Ok(())
    }

    fn from_env() -> Result<Self> {
        let config = Self {
            poll_interval_ms: env_parse("ARQONZ_POLL_INTERVAL_MS")?
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            timeout_ms: env_parse("ARQONZ_JOB_TIMEOUT_MS")?.unwrap_or(DEFAULT_JOB_TIMEOUT_MS),
            max_transport_retries: env_parse("ARQONZ_POLL_RETRIES")?
                .unwrap_or(DEFAULT_POLL_RETRIES),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Marketplace backend endpoints used by the AI tool panels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Tool submission, status and history routes.
    pub api_base_url: String,
    /// Credit bookkeeping routes (`/update-credits`).
    pub credits_base_url: String,
    /// Hosted functions for the mask tools, one path segment per tool slug.
    pub functions_base_url: String,
    /// Bearer token for the hosted functions.
    #[serde(skip_serializing)]
    pub functions_key: Option<String>,
    /// Account API key used for credit debits.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Account email attached to history records.
    pub user_email: Option<String>,
}

impl GatewayConfig {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        let api_base_url = api_base_url.into().trim_end_matches('/').to_string();
        Self {
            credits_base_url: format!("{}/api", api_base_url),
            functions_base_url: format!("{}/functions/v1", api_base_url),
            api_base_url,
            functions_key: None,
            api_key: None,
            user_email: None,
        }
    }

    fn from_env() -> Self {
        let base = std::env::var("ARQONZ_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());
        let mut config = Self::new(base);
        if let Ok(credits) = std::env::var("ARQONZ_CREDITS_BASE_URL") {
            config.credits_base_url = credits.trim_end_matches('/').to_string();
        }
        if let Ok(functions) = std::env::var("ARQONZ_FUNCTIONS_BASE_URL") {
            config.functions_base_url = functions.trim_end_matches('/').to_string();
        }
        config.functions_key = std::env::var("ARQONZ_FUNCTIONS_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        config.api_key = std::env::var("ARQONZ_API_KEY").ok().filter(|k| !k.is_empty());
        config.user_email = std::env::var("ARQONZ_USER_EMAIL").ok().filter(|e| !e.is_empty());
        config
    }
}

/// Top-level Arqonz configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArqonzConfig {
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    /// Backend gateway endpoints.
    pub gateway: GatewayConfig,
    /// Default polling policy for tool jobs.
    pub polling: PollingConfig,
}

impl ArqonzConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> Result<Self> {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let data_paths = DataPaths::new(data_dir)?;

        Ok(Self {
            port,
            data_paths,
            gateway: GatewayConfig::from_env(),
            polling: PollingConfig::from_env()?,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has an invalid value: {:?}", key, raw))),
        Err(_) => Ok(None),
    }
}
