//! Bearer token issuance and refresh coordination.
//!
//! The authentication endpoint gives no expiry for the tokens it issues, so
//! a token is assumed valid until some request comes back 401. When many
//! workers see that 401 at once they all call [`TokenManager::refresh`] with
//! the token they used; the first one through the refresh gate performs the
//! exchange and the rest find a newer generation already installed.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{AccessToken, Event};
use crate::utils::{read_body_with_timeout, send_with_timeout};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, broadcast};

#[derive(Deserialize)]
struct AuthResponse {
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
}

/// Owns the current [`AccessToken`] and the single-flight refresh
pub struct TokenManager {
    client: reqwest::Client,
    config: Arc<Config>,
    event_tx: broadcast::Sender<Event>,
    current: RwLock<Option<AccessToken>>,
    /// Serializes every exchange with the authentication endpoint
    refresh_gate: Mutex<()>,
}

impl TokenManager {
    /// Create a manager; no request is made until a token is needed
    pub fn new(
        client: reqwest::Client,
        config: Arc<Config>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            client,
            config,
            event_tx,
            current: RwLock::new(None),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Exchange the configured credential for a new token and make it current.
    ///
    /// # Errors
    ///
    /// - [`Error::Authentication`] on 401 (bad credentials)
    /// - [`Error::Endpoint`] on 404 (wrong authentication URL)
    /// - [`Error::TransientServer`] on any other non-2xx or a timeout
    /// - [`Error::MalformedInput`] if a 200 body has no `accessToken`
    pub async fn obtain(&self) -> Result<AccessToken> {
        let _gate = self.refresh_gate.lock().await;
        let token = self.install().await?;
        self.event_tx.send(Event::Authenticated).ok();
        Ok(token)
    }

    /// The current token, obtaining one first if none has been issued yet
    pub async fn current(&self) -> Result<AccessToken> {
        if let Some(token) = self.current.read().await.clone() {
            return Ok(token);
        }

        let _gate = self.refresh_gate.lock().await;
        // another caller may have obtained one while we waited for the gate
        if let Some(token) = self.current.read().await.clone() {
            return Ok(token);
        }
        let token = self.install().await?;
        self.event_tx.send(Event::Authenticated).ok();
        Ok(token)
    }

    /// Replace a token that the server rejected.
    ///
    /// `observed` is the token the caller sent. If it has already been
    /// replaced, the newer token is returned without contacting the
    /// authentication endpoint, so concurrent callers share one exchange and
    /// nobody ever moves back to an older token.
    pub async fn refresh(&self, observed: &AccessToken) -> Result<AccessToken> {
        let _gate = self.refresh_gate.lock().await;

        if let Some(token) = self.current.read().await.as_ref()
            && token.generation() > observed.generation()
        {
            tracing::debug!(
                generation = token.generation(),
                "Token already refreshed by another worker"
            );
            return Ok(token.clone());
        }

        tracing::warn!(
            generation = observed.generation(),
            "Access token rejected, re-authenticating"
        );
        let token = self.install().await?;
        self.event_tx
            .send(Event::TokenRefreshed {
                generation: token.generation(),
            })
            .ok();
        Ok(token)
    }

    /// Exchange and store; callers must hold the refresh gate
    async fn install(&self) -> Result<AccessToken> {
        let value = self.exchange().await?;
        let mut current = self.current.write().await;
        let generation = current.as_ref().map_or(0, AccessToken::generation) + 1;
        let token = AccessToken::new(value, generation);
        *current = Some(token.clone());
        Ok(token)
    }

    async fn exchange(&self) -> Result<String> {
        let url = self.config.api.auth_url.as_str();
        let timeout = self.config.api.request_timeout;
        tracing::debug!(url, "Requesting access token");

        let request = self
            .client
            .post(url)
            .header(ACCEPT, "application/json")
            .json(&self.config.credential);
        let response = send_with_timeout(request, timeout, url).await?;

        let status = response.status();
        if !status.is_success() {
            let error = Error::from_status(status, url);
            tracing::error!(url, status = status.as_u16(), error = %error, "Authentication failed");
            return Err(error);
        }

        let body = read_body_with_timeout(response, timeout, url).await?;
        let parsed: AuthResponse = serde_json::from_slice(&body).map_err(|e| {
            Error::MalformedInput(format!("authentication response is not JSON: {e}"))
        })?;
        match parsed.access_token {
            Some(token) if !token.is_empty() => {
                tracing::info!("Obtained access token");
                Ok(token)
            }
            _ => Err(Error::MalformedInput(
                "authentication response has no accessToken".to_string(),
            )),
        }
    }
}
