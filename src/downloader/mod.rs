//! Zone file downloading split into focused submodules.
//!
//! The [`CzdsClient`] facade wires the pipeline together:
//! - [`fetch`] - one link: request, 401 refresh, streaming to disk
//! - [`dispatch`] - many links across a bounded worker pool
//! - [`output`] - record sinks and the zone file writer

pub mod dispatch;
pub mod fetch;
pub mod output;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use dispatch::{DownloadDispatcher, chunk_links};
pub use fetch::ZoneFetcher;
pub use output::{ChannelSink, NullSink, RecordSink, SinkItem};

use crate::auth::TokenManager;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::links::LinkLister;
use crate::types::{AccessToken, DownloadResult, Event, ZoneLink};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Capacity of the lifecycle event channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Main client instance (cloneable - all fields are Arc-wrapped)
///
/// Clones share the token, the cached link listing, and the cancellation
/// state.
#[derive(Clone)]
pub struct CzdsClient {
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    pub(crate) tokens: Arc<TokenManager>,
    pub(crate) links: Arc<LinkLister>,
    pub(crate) fetcher: Arc<ZoneFetcher>,
    /// Cancels every run started by this client
    pub(crate) cancel: CancellationToken,
}

impl CzdsClient {
    /// Create a new client
    ///
    /// Validates the configuration and builds the shared HTTP client. No
    /// network request is made until a token is needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.api.connect_timeout)
            .user_agent(config.api.user_agent.as_str())
            .build()
            .map_err(|e| Error::Config {
                message: format!("Failed to build HTTP client: {e}"),
                key: Some("api".to_string()),
            })?;

        // Multiple subscribers each receive every event independently
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let config = Arc::new(config);

        let tokens = Arc::new(TokenManager::new(
            client.clone(),
            config.clone(),
            event_tx.clone(),
        ));
        let links = Arc::new(LinkLister::new(
            client.clone(),
            config.clone(),
            tokens.clone(),
            event_tx.clone(),
        ));
        let fetcher = Arc::new(ZoneFetcher::new(
            client,
            config.clone(),
            tokens.clone(),
            event_tx.clone(),
        ));

        tracing::debug!(
            base_url = %config.api.base_url,
            output_dir = %config.output_dir().display(),
            output_format = ?config.download.output_format,
            workers = config.worker_count(),
            "CZDS client created"
        );

        Ok(Self {
            event_tx,
            config,
            tokens,
            links,
            fetcher,
            cancel: CancellationToken::new(),
        })
    }

    /// Subscribe to lifecycle events
    ///
    /// Multiple subscribers are supported. A subscriber that falls behind by
    /// more than 1000 events receives `RecvError::Lagged`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use czds_dl::{Config, CzdsClient};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = CzdsClient::new(Config::new("me@example.com", "secret"))?;
    ///
    ///     let mut events = client.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             tracing::info!(?event, "czds event");
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Exchange the configured credential for a fresh token
    pub async fn authenticate(&self) -> Result<AccessToken> {
        self.tokens.obtain().await
    }

    /// List the zone links the account may download (cached after the first call)
    pub async fn list_links(&self) -> Result<Vec<ZoneLink>> {
        self.links.list().await
    }

    /// Forget the cached link listing
    pub async fn invalidate_links(&self) {
        self.links.invalidate().await;
    }

    /// Download a single zone link
    ///
    /// # Errors
    ///
    /// Only [`Error::Authentication`]; other failures are in the result.
    pub async fn download_zone(
        &self,
        link: &ZoneLink,
        sink: &dyn RecordSink,
    ) -> Result<DownloadResult> {
        self.fetcher.fetch(link, sink, &self.cancel).await
    }

    /// Download `links` with the configured number of workers
    ///
    /// See [`DownloadDispatcher::run`].
    pub async fn download(
        &self,
        links: Vec<ZoneLink>,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Vec<DownloadResult>> {
        DownloadDispatcher::new(self.fetcher.clone(), self.event_tx.clone())
            .run(
                links,
                self.config.worker_count(),
                sink,
                self.cancel.clone(),
            )
            .await
    }

    /// List every zone link, then download them all
    pub async fn download_all(&self, sink: Arc<dyn RecordSink>) -> Result<Vec<DownloadResult>> {
        let links = self.list_links().await?;
        self.download(links, sink).await
    }

    /// Cancel running and future downloads of this client
    ///
    /// Workers stop at the next chunk boundary. Without atomic writes the
    /// file of an interrupted link is left truncated on disk.
    pub fn cancel(&self) {
        tracing::info!("Cancelling zone downloads");
        self.cancel.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been called
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
