//! Core types for czds-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Account credential exchanged for a bearer token
///
/// Immutable for the lifetime of a pipeline run. The password is never
/// printed: `Debug` redacts it.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Account identifier (the CZDS account e-mail address)
    pub username: String,
    /// Account secret
    pub password: String,
}

impl Credential {
    /// Create a new credential
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Opaque bearer token issued by the authentication endpoint
///
/// Tokens are never mutated; a refresh replaces the whole value and bumps
/// `generation`, so holders can tell whether the token they used is still
/// the current one.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    obtained_at: DateTime<Utc>,
    generation: u64,
}

impl AccessToken {
    pub(crate) fn new(value: String, generation: u64) -> Self {
        Self {
            value,
            obtained_at: Utc::now(),
            generation,
        }
    }

    /// The raw bearer value
    pub fn value(&self) -> &str {
        &self.value
    }

    /// When the token was issued
    pub fn obtained_at(&self) -> DateTime<Utc> {
        self.obtained_at
    }

    /// Monotonic counter, incremented on every successful exchange
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `Authorization` header value for this token
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("obtained_at", &self.obtained_at)
            .field("generation", &self.generation)
            .finish()
    }
}

/// URL identifying one downloadable zone file
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneLink(pub String);

impl ZoneLink {
    /// Create a new ZoneLink
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// The link as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Zone name derived from the link's trailing path segment.
    ///
    /// `https://czds-api.icann.org/czds/downloads/com.zone` yields `com`;
    /// a segment without an extension is returned whole.
    pub fn zone_name(&self) -> String {
        let path = self.0.split(['?', '#']).next().unwrap_or_default();
        let segment = path.rsplit('/').next().unwrap_or_default();
        match segment.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => segment.to_string(),
        }
    }
}

impl From<&str> for ZoneLink {
    fn from(url: &str) -> Self {
        Self(url.to_string())
    }
}

impl From<String> for ZoneLink {
    fn from(url: String) -> Self {
        Self(url)
    }
}

impl std::fmt::Display for ZoneLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One decoded zone-file resource record
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneRecord {
    /// Zone the record was downloaded from (e.g. "com")
    pub zone_name: String,
    /// Owner name with the trailing root dot removed
    pub dns_record: String,
    /// TTL, when present on the line
    pub ttl: Option<String>,
    /// Record class (usually "IN"), when present on the line
    pub record_class: Option<String>,
    /// Record type (A, NS, MX, ...); empty for malformed or blank lines
    pub record_type: String,
    /// Remaining fields joined with single spaces
    pub record_data: String,
}

impl ZoneRecord {
    /// Whether the line decoded into something usable
    pub fn is_complete(&self) -> bool {
        !self.record_type.is_empty()
    }
}

/// Terminal outcome for one zone link
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// The zone file was written completely
    Success,
    /// The link returned 404; siblings are unaffected
    NotFound,
    /// The link failed for the given reason; siblings are unaffected
    Failed(String),
}

/// Result of fetching one zone link
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResult {
    /// The link that was fetched
    pub link: ZoneLink,
    /// Where the zone file was (or would have been) written
    pub destination_path: PathBuf,
    /// What happened
    pub outcome: DownloadOutcome,
    /// Bytes written to `destination_path`
    pub bytes_written: u64,
}

impl DownloadResult {
    /// Whether the zone file was written completely
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, DownloadOutcome::Success)
    }
}

/// Aggregate counts over a dispatch run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Links written successfully
    pub succeeded: usize,
    /// Links that returned 404
    pub not_found: usize,
    /// Links that failed for any other reason
    pub failed: usize,
}

impl RunSummary {
    /// Count outcomes over a set of results
    pub fn from_results(results: &[DownloadResult]) -> Self {
        results.iter().fold(Self::default(), |mut acc, r| {
            match r.outcome {
                DownloadOutcome::Success => acc.succeeded += 1,
                DownloadOutcome::NotFound => acc.not_found += 1,
                DownloadOutcome::Failed(_) => acc.failed += 1,
            }
            acc
        })
    }

    /// Total number of links accounted for
    pub fn total(&self) -> usize {
        self.succeeded + self.not_found + self.failed
    }
}

/// Lifecycle events emitted by [`CzdsClient`](crate::CzdsClient)
///
/// Consumers subscribe via [`CzdsClient::subscribe`](crate::CzdsClient::subscribe).
/// Line and record data is not sent here; see
/// [`RecordSink`](crate::downloader::RecordSink).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A bearer token was obtained with the configured credential
    Authenticated,
    /// A rejected token was replaced
    TokenRefreshed {
        /// Generation of the new token
        generation: u64,
    },
    /// The account's zone links were listed
    LinksListed {
        /// Number of links available
        count: usize,
    },
    /// A zone link download started
    DownloadStarted {
        /// The link being fetched
        link: ZoneLink,
    },
    /// A zone file was written completely
    DownloadComplete {
        /// The link that was fetched
        link: ZoneLink,
        /// Where the file was written
        path: PathBuf,
        /// Bytes written
        bytes: u64,
    },
    /// A zone link returned 404
    DownloadNotFound {
        /// The link that was not found
        link: ZoneLink,
    },
    /// A zone link failed
    DownloadFailed {
        /// The link that failed
        link: ZoneLink,
        /// Why it failed
        error: String,
    },
    /// A dispatch run finished
    RunComplete(RunSummary),
}
