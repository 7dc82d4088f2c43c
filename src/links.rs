//! Listing of the zone files the account may download

use crate::auth::TokenManager;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{Event, ZoneLink};
use crate::utils::{read_body_with_timeout, send_with_timeout};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};

/// Fetches and caches the account's zone links
///
/// The link set does not change within a session, so the first successful
/// listing is reused until [`invalidate`](Self::invalidate) is called.
pub struct LinkLister {
    client: reqwest::Client,
    config: Arc<Config>,
    tokens: Arc<TokenManager>,
    event_tx: broadcast::Sender<Event>,
    cache: Mutex<Option<Vec<ZoneLink>>>,
}

impl LinkLister {
    /// Create a lister sharing the client's token manager
    pub fn new(
        client: reqwest::Client,
        config: Arc<Config>,
        tokens: Arc<TokenManager>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            client,
            config,
            tokens,
            event_tx,
            cache: Mutex::new(None),
        }
    }

    /// List the downloadable zone links.
    ///
    /// A 401 triggers one token refresh and one retry; a second 401 is an
    /// [`Error::Authentication`]. Other failures are returned unretried.
    pub async fn list(&self) -> Result<Vec<ZoneLink>> {
        // held across the request so concurrent callers share one listing
        let mut cache = self.cache.lock().await;
        if let Some(links) = cache.as_ref() {
            tracing::debug!(count = links.len(), "Using cached zone links");
            return Ok(links.clone());
        }

        let links = self.fetch().await?;
        tracing::info!(count = links.len(), "Listed zone links");
        self.event_tx
            .send(Event::LinksListed { count: links.len() })
            .ok();
        *cache = Some(links.clone());
        Ok(links)
    }

    /// Drop the cached listing so the next [`list`](Self::list) asks the server again
    pub async fn invalidate(&self) {
        self.cache.lock().await.take();
    }

    async fn fetch(&self) -> Result<Vec<ZoneLink>> {
        let url = self.config.api.links_url();
        let timeout = self.config.api.request_timeout;
        let mut token = self.tokens.current().await?;
        let mut refreshed = false;

        let response = loop {
            tracing::debug!(url = %url, "Requesting zone links");
            let request = self
                .client
                .get(&url)
                .header(AUTHORIZATION, token.bearer())
                .header(ACCEPT, "application/json");
            let response = send_with_timeout(request, timeout, &url).await?;

            match response.status() {
                StatusCode::UNAUTHORIZED if !refreshed => {
                    token = self.tokens.refresh(&token).await?;
                    refreshed = true;
                }
                StatusCode::UNAUTHORIZED => {
                    tracing::error!(url = %url, "Refreshed token rejected by links endpoint");
                    return Err(Error::Authentication(format!(
                        "{url} rejected a freshly issued access token"
                    )));
                }
                status if status.is_success() => break response,
                status => return Err(Error::from_status(status, &url)),
            }
        };

        let body = read_body_with_timeout(response, timeout, &url).await?;
        let links: Vec<String> = serde_json::from_slice(&body).map_err(|e| {
            Error::MalformedInput(format!("links response is not a JSON array of URLs: {e}"))
        })?;
        Ok(links.into_iter().map(ZoneLink::from).collect())
    }
}
