//! Test configuration helpers for loading .env credentials and creating test clients

use czds_dl::{Config, CzdsClient, OutputFormat};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::MockServer;

/// Error type for test configuration
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Load the CZDS account from environment variables
///
/// Required environment variables:
/// - `CZDS_USERNAME` - Account e-mail address
/// - `CZDS_PASSWORD` - Account password
///
/// Optional environment variables:
/// - `CZDS_BASE_URL` - API host (default: https://czds-api.icann.org)
/// - `CZDS_AUTH_URL` - Authentication URL (default: https://account-api.icann.org/api/authenticate)
pub fn load_live_config() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();

    let username = std::env::var("CZDS_USERNAME")
        .map_err(|_| ConfigError("CZDS_USERNAME not set in environment".to_string()))?;
    let password = std::env::var("CZDS_PASSWORD")
        .map_err(|_| ConfigError("CZDS_PASSWORD not set in environment".to_string()))?;

    let mut config = Config::new(username, password);
    if let Ok(base_url) = std::env::var("CZDS_BASE_URL") {
        config.api.base_url = base_url;
    }
    if let Ok(auth_url) = std::env::var("CZDS_AUTH_URL") {
        config.api.auth_url = auth_url;
    }
    Ok(config)
}

/// Whether live CZDS credentials are available
pub fn has_live_credentials() -> bool {
    load_live_config().is_ok()
}

/// Create a client for the live CZDS API writing into a temp directory
///
/// Returns the client and temp directory (keep temp_dir alive for test duration)
pub fn create_live_client(format: OutputFormat) -> Result<(CzdsClient, TempDir), ConfigError> {
    let mut config = load_live_config()?;
    let temp_dir = tempfile::tempdir()
        .map_err(|e| ConfigError(format!("Failed to create temp dir: {}", e)))?;
    config.download.output_dir = temp_dir.path().join("zonefiles");
    config.download.output_format = format;
    config.download.worker_count = Some(2);

    let client =
        CzdsClient::new(config).map_err(|e| ConfigError(format!("Failed to create client: {}", e)))?;
    Ok((client, temp_dir))
}

/// Config pointing both CZDS endpoints at a mock server
pub fn mock_config(server: &MockServer, temp_dir: &TempDir) -> Config {
    let mut config = Config::new("zones@example.com", "correct horse");
    config.api.base_url = server.uri();
    config.api.auth_url = format!("{}{}", server.uri(), super::fixtures::AUTH_PATH);
    config.api.request_timeout = Duration::from_secs(5);
    config.download.output_dir = temp_dir.path().join("zonefiles");
    config.download.worker_count = Some(3);
    config
}
