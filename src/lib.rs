//! # czds-dl
//!
//! Concurrent downloader for zone files published through ICANN's
//! Centralized Zone Data Service (CZDS), with streaming gzip decoding and
//! zone-file record parsing.
//!
//! ## Design Philosophy
//!
//! czds-dl is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Streaming** - Zone files are never buffered whole; lines are decoded as chunks arrive
//! - **Event-driven** - Consumers subscribe to lifecycle events, no polling required
//! - **Sensible defaults** - Works out of the box with just an account credential
//!
//! ## Pipeline
//!
//! [`TokenManager`] exchanges the credential for a bearer token,
//! [`LinkLister`] lists the zone links, and [`DownloadDispatcher`] fans them
//! out across a worker pool. Each worker runs [`ZoneFetcher`], which streams
//! the body through [`zone::LineDecoder`] and, in json mode,
//! [`zone::ZoneLineParser`] into a [`RecordSink`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use czds_dl::{Config, CzdsClient, NullSink};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::new("me@example.com", "secret");
//!     config.download.output_dir = "zonefiles".into();
//!
//!     let client = CzdsClient::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = client.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let results = client.download_all(Arc::new(NullSink)).await?;
//!     println!("{} zone files processed", results.len());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Bearer token issuance and refresh
pub mod auth;
/// Configuration types
pub mod config;
/// Zone file downloading (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Zone link listing
pub mod links;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;
/// Zone file line decoding and parsing
pub mod zone;

// Re-export commonly used types
pub use auth::TokenManager;
pub use config::{Config, FileCollisionAction, OutputFormat};
pub use downloader::{
    ChannelSink, CzdsClient, DownloadDispatcher, NullSink, RecordSink, SinkItem, ZoneFetcher,
};
pub use error::{Error, Result};
pub use links::LinkLister;
pub use types::{
    AccessToken, Credential, DownloadOutcome, DownloadResult, Event, RunSummary, ZoneLink,
    ZoneRecord,
};

/// Helper function to download zone links with graceful signal handling.
///
/// Runs [`CzdsClient::download`] and cancels it when a termination signal
/// arrives. Workers stop at the next chunk boundary; the links they did not
/// finish are reported as `Failed("cancelled")`.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use czds_dl::{Config, CzdsClient, NullSink, run_with_shutdown};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = CzdsClient::new(Config::new("me@example.com", "secret"))?;
///     let links = client.list_links().await?;
///
///     // Run with automatic signal handling
///     let results = run_with_shutdown(&client, links, Arc::new(NullSink)).await?;
///     println!("{} zone files processed", results.len());
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(
    client: &CzdsClient,
    links: Vec<ZoneLink>,
    sink: std::sync::Arc<dyn RecordSink>,
) -> Result<Vec<DownloadResult>> {
    let run = client.download(links, sink);
    tokio::pin!(run);

    tokio::select! {
        results = &mut run => results,
        _ = wait_for_signal() => {
            client.cancel();
            run.await
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let mut listeners = Vec::with_capacity(2);
    for (kind, name) in [
        (SignalKind::terminate(), "SIGTERM"),
        (SignalKind::interrupt(), "SIGINT"),
    ] {
        match signal(kind) {
            Ok(listener) => listeners.push((listener, name)),
            Err(e) => tracing::warn!(signal = name, error = %e, "Could not register signal handler"),
        }
    }

    match listeners.as_mut_slice() {
        [(first, first_name), (second, second_name)] => {
            tokio::select! {
                _ = first.recv() => tracing::info!(signal = *first_name, "Received shutdown signal"),
                _ = second.recv() => tracing::info!(signal = *second_name, "Received shutdown signal"),
            }
        }
        [(only, name)] => {
            only.recv().await;
            tracing::info!(signal = *name, "Received shutdown signal");
        }
        _ => {
            tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            // never resolve, so a broken signal listener does not cancel the run
            std::future::pending::<()>().await;
        }
    }
}
