//! Configuration types for usenet-fetch
//!
//! The configuration file holds the server credentials plus the knobs of the
//! fetch engine. Every field except `server.host` has a default, so the
//! smallest usable file is:
//!
//! ```json
//! { "server": { "host": "news.example.com", "username": "u", "password": "p" } }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the fetch engine
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// NNTP server and credentials
    pub server: ServerConfig,

    /// Pool size and per-segment retry cap
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Reconnect-and-retry policy for a single fetch
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("cannot parse {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(Error::Config {
                message: "server.host must not be empty".to_string(),
                key: Some("server.host".to_string()),
            });
        }
        if self.fetch.connections == 0 {
            return Err(Error::Config {
                message: "fetch.connections must be at least 1".to_string(),
                key: Some("fetch.connections".to_string()),
            });
        }
        if self.fetch.max_tries == 0 {
            return Err(Error::Config {
                message: "fetch.max_tries must be at least 1".to_string(),
                key: Some("fetch.max_tries".to_string()),
            });
        }
        if self.fetch.claim_lease.is_zero() {
            return Err(Error::Config {
                message: "fetch.claim_lease must be at least 1 second".to_string(),
                key: Some("fetch.claim_lease".to_string()),
            });
        }
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(Error::Config {
                message: format!(
                    "retry.backoff_multiplier must be a finite number of at least 1.0, got {}",
                    multiplier
                ),
                key: Some("retry.backoff_multiplier".to_string()),
            });
        }
        Ok(())
    }

    /// Default location of the configuration file (`$HOME/.usenet-fetch.json`)
    pub fn default_path() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".usenet-fetch.json")
    }
}

/// NNTP server configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server hostname
    pub host: String,

    /// Server port (typically 119 for unencrypted, 563 for TLS)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Use TLS (implicit TLS, not STARTTLS)
    #[serde(default)]
    pub tls: bool,

    /// Username for authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Password for authentication
    #[serde(default)]
    pub password: Option<String>,
}

/// Fetch engine configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Number of concurrent connections / workers (default: 2)
    #[serde(default = "default_connections")]
    pub connections: usize,

    /// Attempts per segment before it is left alone for good (default: 3)
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,

    /// How long a claim protects a segment before another run may take it (default: 300 seconds)
    #[serde(default = "default_claim_lease", with = "duration_serde")]
    pub claim_lease: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connections: default_connections(),
            max_tries: default_max_tries(),
            claim_lease: default_claim_lease(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first request (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

fn default_port() -> u16 {
    119
}

fn default_connections() -> usize {
    2
}

fn default_max_tries() -> u32 {
    3
}

fn default_claim_lease() -> Duration {
    Duration::from_secs(300)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Conversion from our ServerConfig to nntp-rs's ServerConfig
impl From<ServerConfig> for nntp_rs::ServerConfig {
    fn from(config: ServerConfig) -> Self {
        nntp_rs::ServerConfig {
            host: config.host,
            port: config.port,
            tls: config.tls,
            allow_insecure_tls: false,
            username: config.username.unwrap_or_default(),
            password: config.password.unwrap_or_default(),
        }
    }
}
