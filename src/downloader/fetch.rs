//! Streaming download of a single zone file.

use crate::auth::TokenManager;
use crate::config::{Config, FileCollisionAction, OutputFormat};
use crate::downloader::output::{RecordSink, ZoneFileWriter};
use crate::error::{Error, Result};
use crate::retry::retry_transient;
use crate::types::{DownloadOutcome, DownloadResult, Event, ZoneLink};
use crate::utils::{get_unique_path, output_filename, send_with_timeout};
use crate::zone::{Compression, ZoneLineParser, decode_lines};
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_DISPOSITION};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Reason recorded for links stopped or never started because the run was cancelled
pub(crate) const CANCELLED_REASON: &str = "cancelled";

/// What one attempt at a link produced
enum Fetched {
    Written { path: PathBuf, bytes: u64 },
    NotFound,
}

/// Fetches one zone link to disk
pub struct ZoneFetcher {
    client: reqwest::Client,
    config: Arc<Config>,
    tokens: Arc<TokenManager>,
    event_tx: broadcast::Sender<Event>,
}

impl ZoneFetcher {
    /// Create a fetcher sharing the client's token manager
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
        }
    }

    /// Download `link` into the output directory.
    ///
    /// Response handling:
    /// - 2xx: the body is streamed to disk (raw, or decoded into lines fed to
    ///   `sink` depending on the output format) and the outcome is `Success`
    /// - 401: the token is refreshed and the request repeated once
    /// - 404: the outcome is `NotFound`
    /// - anything else: the outcome is `Failed`, after any retries allowed by
    ///   the retry configuration
    ///
    /// # Errors
    ///
    /// Only [`Error::Authentication`] is returned as an error, when the
    /// token is rejected again after a refresh or cannot be obtained at all.
    /// Every other failure is recorded in the returned result.
    pub async fn fetch(
        &self,
        link: &ZoneLink,
        sink: &dyn RecordSink,
        cancel: &CancellationToken,
    ) -> Result<DownloadResult> {
        tracing::info!(link = %link, "Downloading zone file");
        self.event_tx
            .send(Event::DownloadStarted { link: link.clone() })
            .ok();

        let attempt = retry_transient(&self.config.retry, || {
            self.fetch_once(link, sink, cancel)
        })
        .await;
        self.settle(link, attempt)
    }

    /// Result for a link the run never got to
    pub(crate) fn cancelled(&self, link: &ZoneLink) -> DownloadResult {
        DownloadResult {
            link: link.clone(),
            destination_path: self.default_path(link),
            outcome: DownloadOutcome::Failed(CANCELLED_REASON.to_string()),
            bytes_written: 0,
        }
    }

    fn default_path(&self, link: &ZoneLink) -> PathBuf {
        let decoded = self.config.download.output_format.decodes();
        self.config
            .output_dir()
            .join(output_filename(link, None, decoded))
    }

    fn settle(&self, link: &ZoneLink, attempt: Result<Fetched>) -> Result<DownloadResult> {
        let (destination_path, outcome, bytes_written) = match attempt {
            Ok(Fetched::Written { path, bytes }) => {
                tracing::info!(link = %link, path = %path.display(), bytes, "Zone file written");
                self.event_tx
                    .send(Event::DownloadComplete {
                        link: link.clone(),
                        path: path.clone(),
                        bytes,
                    })
                    .ok();
                (path, DownloadOutcome::Success, bytes)
            }
            Ok(Fetched::NotFound) => {
                tracing::warn!(link = %link, "Zone file not found");
                self.event_tx
                    .send(Event::DownloadNotFound { link: link.clone() })
                    .ok();
                (self.default_path(link), DownloadOutcome::NotFound, 0)
            }
            Err(e @ Error::Authentication(_)) => {
                tracing::error!(link = %link, error = %e, "Zone download rejected after token refresh");
                self.event_tx
                    .send(Event::DownloadFailed {
                        link: link.clone(),
                        error: e.to_string(),
                    })
                    .ok();
                return Err(e);
            }
            Err(e) => {
                let reason = match e {
                    Error::Cancelled => CANCELLED_REASON.to_string(),
                    other => other.to_string(),
                };
                tracing::warn!(link = %link, error = %reason, "Zone download failed");
                self.event_tx
                    .send(Event::DownloadFailed {
                        link: link.clone(),
                        error: reason.clone(),
                    })
                    .ok();
                (self.default_path(link), DownloadOutcome::Failed(reason), 0)
            }
        };

        Ok(DownloadResult {
            link: link.clone(),
            destination_path,
            outcome,
            bytes_written,
        })
    }

    async fn fetch_once(
        &self,
        link: &ZoneLink,
        sink: &dyn RecordSink,
        cancel: &CancellationToken,
    ) -> Result<Fetched> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let url = link.as_str();
        let timeout = self.config.api.request_timeout;
        let mut token = self.tokens.current().await?;
        let mut refreshed = false;

        let response = loop {
            tracing::debug!(link = %link, generation = token.generation(), "Requesting zone file");
            let request = self.client.get(url).header(AUTHORIZATION, token.bearer());
            let response = send_with_timeout(request, timeout, url).await?;

            match response.status() {
                StatusCode::UNAUTHORIZED if !refreshed => {
                    token = self.tokens.refresh(&token).await?;
                    refreshed = true;
                }
                StatusCode::UNAUTHORIZED => {
                    return Err(Error::Authentication(format!(
                        "{url} rejected a freshly issued access token"
                    )));
                }
                StatusCode::NOT_FOUND => return Ok(Fetched::NotFound),
                status if status.is_success() => break response,
                status => {
                    return Err(Error::TransientServer {
                        status: Some(status.as_u16()),
                        message: format!("{url} returned {status}"),
                    });
                }
            }
        };

        let format = self.config.download.output_format;
        let content_disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok());
        let file_name = output_filename(link, content_disposition, format.decodes());

        let output_dir = self.config.output_dir();
        tokio::fs::create_dir_all(output_dir).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create output directory '{}': {}",
                    output_dir.display(),
                    e
                ),
            ))
        })?;
        let (path, mut writer) = self.claim_output(&output_dir.join(file_name)).await?;
        match self
            .stream_body(link, response, format, &mut writer, sink, cancel)
            .await
        {
            Ok(()) => {
                let bytes = writer.commit().await?;
                Ok(Fetched::Written { path, bytes })
            }
            Err(e) => {
                writer.abandon().await;
                Err(e)
            }
        }
    }

    /// Resolve collisions for `candidate` and create its writer.
    ///
    /// Unless overwriting, the file is created exclusively. Under `Rename` a
    /// name taken by a concurrent worker between the check and the create is
    /// resolved again.
    async fn claim_output(&self, candidate: &Path) -> Result<(PathBuf, ZoneFileWriter)> {
        let collision = self.config.download.file_collision;
        let atomic = self.config.download.atomic_writes;
        let exclusive = collision != FileCollisionAction::Overwrite;

        loop {
            let path = get_unique_path(candidate, collision)?;
            match ZoneFileWriter::create(&path, atomic, exclusive).await {
                Ok(writer) => return Ok((path, writer)),
                Err(Error::Io(e))
                    if e.kind() == std::io::ErrorKind::AlreadyExists
                        && collision == FileCollisionAction::Rename =>
                {
                    tracing::debug!(path = %path.display(), "Output name claimed concurrently, resolving again");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn stream_body(
        &self,
        link: &ZoneLink,
        response: reqwest::Response,
        format: OutputFormat,
        writer: &mut ZoneFileWriter,
        sink: &dyn RecordSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let timeout = self.config.api.request_timeout;
        let url = link.as_str();
        // each chunk must arrive within the request timeout
        let chunks = futures::stream::unfold(
            Box::pin(response.bytes_stream()),
            move |mut body| async move {
                let next = match tokio::time::timeout(timeout, body.next()).await {
                    Ok(next) => next?.map_err(Error::from),
                    Err(_) => Err(Error::timeout("response body", url)),
                };
                Some((next, body))
            },
        );

        if !format.decodes() {
            let mut chunks = std::pin::pin!(chunks);
            while let Some(chunk) = next_or_cancelled(&mut chunks, cancel).await? {
                writer.write_bytes(&chunk).await?;
            }
            return Ok(());
        }

        let parser = ZoneLineParser::new(link.zone_name());
        let mut lines = std::pin::pin!(decode_lines(chunks, Compression::Auto));
        while let Some(line) = next_or_cancelled(&mut lines, cancel).await? {
            emit_line(link, format, &parser, line, writer, sink).await?;
        }
        Ok(())
    }
}

/// Next item of `stream`, or [`Error::Cancelled`] once `cancel` fires
async fn next_or_cancelled<T>(
    stream: &mut (impl Stream<Item = Result<T>> + Unpin),
    cancel: &CancellationToken,
) -> Result<Option<T>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        next = stream.next() => next.transpose(),
    }
}

/// Write one decoded line to disk and hand it (or its record) to the sink
async fn emit_line(
    link: &ZoneLink,
    format: OutputFormat,
    parser: &ZoneLineParser,
    line: String,
    writer: &mut ZoneFileWriter,
    sink: &dyn RecordSink,
) -> Result<()> {
    writer.write_line(&line).await?;
    match format {
        OutputFormat::Text => sink.line(link, &line).await,
        OutputFormat::Json => {
            let record = parser.parse(&line);
            if record.is_complete() {
                sink.record(link, record).await?;
            }
            Ok(())
        }
        OutputFormat::None => Ok(()),
    }
}
