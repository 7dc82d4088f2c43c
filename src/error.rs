//! Error types for czds-dl
//!
//! The taxonomy mirrors how failures are handled by the pipeline:
//! - [`Error::Authentication`] - bad credentials, or a token rejected twice (fatal)
//! - [`Error::Endpoint`] - a fixed system endpoint returned 404 (fatal, misconfiguration)
//! - [`Error::TransientServer`] - 5xx, unrecognized non-2xx, or a timeout (caller may retry)
//! - [`Error::MalformedInput`] - a response was missing expected fields (fatal decode error)
//!
//! A 404 on an individual zone link is *not* an error; it is reported as
//! [`DownloadOutcome::NotFound`](crate::types::DownloadOutcome::NotFound).

use thiserror::Error;

/// Result type alias for czds-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for czds-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Credentials were rejected, or a refreshed token was rejected again
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A fixed system endpoint (authentication, link listing) does not exist
    #[error("endpoint not found: {url}")]
    Endpoint {
        /// The endpoint URL that returned 404
        url: String,
    },

    /// Server-side or transport failure that may succeed if retried later
    #[error("transient server error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    TransientServer {
        /// HTTP status code, if a response was received at all
        status: Option<u16>,
        /// Human-readable description of the failure
        message: String,
    },

    /// A response body did not contain the expected data
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download.worker_count")
        key: Option<String>,
    },

    /// I/O error while writing zone files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The run was cancelled before this operation completed
    #[error("operation cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map a non-success HTTP status from a fixed system endpoint to an error.
    ///
    /// 401 is an authentication failure, 404 means the endpoint itself is wrong,
    /// and anything else is treated as transient.
    pub fn from_status(status: reqwest::StatusCode, url: &str) -> Self {
        match status.as_u16() {
            401 => Error::Authentication(format!("{url} rejected the request (HTTP 401)")),
            404 => Error::Endpoint {
                url: url.to_string(),
            },
            code => Error::TransientServer {
                status: Some(code),
                message: format!(
                    "{url} returned {}",
                    status.canonical_reason().unwrap_or("an unexpected status")
                ),
            },
        }
    }

    /// Convert a timed-out wait into a transient error
    pub(crate) fn timeout(what: &str, url: &str) -> Self {
        Error::TransientServer {
            status: None,
            message: format!("timed out waiting for {what} from {url}"),
        }
    }

    /// Whether the operation that produced this error cannot succeed by trying again.
    ///
    /// Bad credentials, a wrong endpoint, an undecodable response or an
    /// invalid configuration stay wrong until the caller changes something.
    /// A dispatch only aborts on [`Error::Authentication`]; other fatal
    /// errors are recorded against the affected link.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Authentication(_)
                | Error::Endpoint { .. }
                | Error::MalformedInput(_)
                | Error::Config { .. }
        )
    }

    /// Machine-readable error code, stable across releases
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Authentication(_) => "authentication_error",
            Error::Endpoint { .. } => "endpoint_error",
            Error::TransientServer { .. } => "transient_server_error",
            Error::MalformedInput(_) => "malformed_input",
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Cancelled => "cancelled",
            Error::Other(_) => "internal_error",
        }
    }
}
