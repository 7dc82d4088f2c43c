//! Configuration types for czds-dl
//!
//! A [`Config`] is built once, validated, and then shared read-only (as
//! `Arc<Config>`) by every component of the pipeline. Nothing mutates it
//! after construction.

use crate::error::{Error, Result};
use crate::types::Credential;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Main configuration for [`CzdsClient`](crate::CzdsClient)
///
/// Fields are organized into logical sub-configs:
/// - [`credential`](Credential) - account used to obtain bearer tokens
/// - [`api`](ApiConfig) - endpoint hosts and network timeouts
/// - [`download`](DownloadConfig) - output directory, format, concurrency
/// - [`retry`](RetryConfig) - optional per-link retry of transient failures
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Account credential exchanged for bearer tokens
    pub credential: Credential,

    /// API endpoints and timeouts
    #[serde(default)]
    pub api: ApiConfig,

    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Retry policy for transient per-link failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Build a configuration with default settings for the given account
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credential: Credential::new(username, password),
            ..Default::default()
        }
    }

    /// Output directory for zone files
    pub fn output_dir(&self) -> &PathBuf {
        &self.download.output_dir
    }

    /// Number of download workers, resolving the default from available parallelism
    pub fn worker_count(&self) -> usize {
        self.download
            .worker_count
            .unwrap_or_else(default_worker_count)
            .max(1)
    }

    /// Check the configuration for values that can never work.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending key if:
    /// - the username or password is empty
    /// - `api.base_url` or `api.auth_url` is not an absolute URL
    /// - `download.worker_count` is explicitly set to zero
    pub fn validate(&self) -> Result<()> {
        if self.credential.username.trim().is_empty() {
            return Err(config_error("username must not be empty", "credential.username"));
        }
        if self.credential.password.is_empty() {
            return Err(config_error("password must not be empty", "credential.password"));
        }
        for (key, value) in [
            ("api.base_url", &self.api.base_url),
            ("api.auth_url", &self.api.auth_url),
        ] {
            if let Err(e) = url::Url::parse(value) {
                return Err(config_error(&format!("invalid URL '{value}': {e}"), key));
            }
        }
        if self.download.worker_count == Some(0) {
            return Err(config_error(
                "worker_count must be at least 1",
                "download.worker_count",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

/// API endpoint and network settings
///
/// Only the hosts are configurable. The paths below each host are fixed by
/// the CZDS API (`/czds/downloads/links` under `base_url`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// CZDS API base URL (default: "https://czds-api.icann.org")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Account authentication URL (default: "https://account-api.icann.org/api/authenticate")
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Maximum wait for response headers and for each body chunk (default: 60 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// TCP/TLS connect timeout (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_url: default_auth_url(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl ApiConfig {
    /// Full URL of the zone link listing endpoint
    pub fn links_url(&self) -> String {
        format!("{}/czds/downloads/links", self.base_url.trim_end_matches('/'))
    }
}

/// Download behavior configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory zone files are written to (default: "./zonefiles")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// What is produced from each downloaded body (default: none)
    #[serde(default)]
    pub output_format: OutputFormat,

    /// Number of concurrent download workers (default: available parallelism x 5)
    #[serde(default)]
    pub worker_count: Option<usize>,

    /// How to handle a zone file that already exists on disk (default: overwrite)
    #[serde(default)]
    pub file_collision: FileCollisionAction,

    /// Write to `<name>.part` and rename once the body is complete (default: false)
    ///
    /// Without this, a cancelled or failed download leaves a truncated file at
    /// the final path.
    #[serde(default)]
    pub atomic_writes: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            output_format: OutputFormat::default(),
            worker_count: None,
            file_collision: FileCollisionAction::default(),
            atomic_writes: false,
        }
    }
}

/// Output mode for downloaded zone files (mutually exclusive)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Write the raw response bytes to disk, no decoding (default)
    #[default]
    None,
    /// Decompress into lines, write them to disk and emit each line
    Text,
    /// Decompress into lines, write them to disk and emit a parsed record per line
    Json,
}

impl OutputFormat {
    /// Whether the body is decompressed and split into lines
    pub fn decodes(&self) -> bool {
        !matches!(self, OutputFormat::None)
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "raw" => Ok(OutputFormat::None),
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(config_error(
                &format!("unknown output format '{other}' (expected none, text or json)"),
                "download.output_format",
            )),
        }
    }
}

/// File collision handling strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Append (1), (2), etc. to filename
    Rename,
    /// Overwrite existing file (default)
    #[default]
    Overwrite,
    /// Fail the link, keep existing file
    Skip,
}

/// Retry configuration for transient per-link failures
///
/// The default performs no retries: a transient failure is reported in the
/// link's result. Set `max_attempts` to opt in to exponential backoff.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 0)
    #[serde(default)]
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
            max_attempts: 0,
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Default worker count: five workers per available processing unit
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        * 5
}

// Default value functions
fn default_base_url() -> String {
    "https://czds-api.icann.org".to_string()
}

fn default_auth_url() -> String {
    "https://account-api.icann.org/api/authenticate".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("czds-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("zonefiles")
}

fn default_true() -> bool {
    true
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
