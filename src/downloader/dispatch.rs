//! Fan-out of zone links across a fixed pool of download workers.
//!
//! Links are cut into contiguous chunks and queued on a work channel before
//! any worker starts. Each worker pulls a chunk, downloads its links one
//! after another, and pulls again until the channel is empty. Results flow
//! back over a second channel in the order they complete.

use crate::downloader::fetch::ZoneFetcher;
use crate::downloader::output::RecordSink;
use crate::error::{Error, Result};
use crate::types::{DownloadOutcome, DownloadResult, Event, RunSummary, ZoneLink};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Split `items` into contiguous chunks for `worker_count` workers.
///
/// The chunk size is `max(1, len / worker_count)`, so there may be more
/// chunks than workers (the remainder forms extra chunks picked up by
/// whichever worker is free first) and, when there are fewer items than
/// workers, one chunk per item.
///
/// ```
/// use czds_dl::downloader::chunk_links;
///
/// let chunks = chunk_links(&[1, 2, 3, 4, 5], 2);
/// assert_eq!(chunks, vec![vec![1, 2], vec![3, 4], vec![5]]);
/// assert_eq!(chunk_links(&[1, 2], 8).len(), 2);
/// ```
pub fn chunk_links<T: Clone>(items: &[T], worker_count: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let size = (items.len() / worker_count.max(1)).max(1);
    items.chunks(size).map(<[T]>::to_vec).collect()
}

/// What a worker reports for one link
enum WorkerReport {
    Done(usize, DownloadResult),
    /// A link's download hit an unrecoverable authentication failure
    Fatal(usize, Error),
}

/// Runs [`ZoneFetcher`] over many links with bounded concurrency
pub struct DownloadDispatcher {
    fetcher: Arc<ZoneFetcher>,
    event_tx: broadcast::Sender<Event>,
}

impl DownloadDispatcher {
    /// Create a dispatcher around a shared fetcher
    pub fn new(fetcher: Arc<ZoneFetcher>, event_tx: broadcast::Sender<Event>) -> Self {
        Self { fetcher, event_tx }
    }

    /// Download every link using at most `worker_count` concurrent workers.
    ///
    /// Returns exactly one result per input link, in completion order. Per-link
    /// failures (404, server errors, timeouts) are recorded in the results. An
    /// empty `links` returns immediately without starting any worker.
    ///
    /// Cancelling `cancel` stops workers at the next chunk boundary; links not
    /// yet finished are reported as `Failed("cancelled")`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] if a link is rejected again after a
    /// token refresh. The remaining links are cancelled, since no further
    /// progress is possible without a valid token. `RunComplete` is still
    /// emitted, counting the rejected and cancelled links as failed.
    pub async fn run(
        &self,
        links: Vec<ZoneLink>,
        worker_count: usize,
        sink: Arc<dyn RecordSink>,
        cancel: CancellationToken,
    ) -> Result<Vec<DownloadResult>> {
        if links.is_empty() {
            tracing::info!("No zone links to download");
            self.event_tx
                .send(Event::RunComplete(RunSummary::default()))
                .ok();
            return Ok(Vec::new());
        }

        let total = links.len();
        let indexed: Vec<(usize, ZoneLink)> = links.into_iter().enumerate().collect();
        let chunks = chunk_links(&indexed, worker_count);
        let workers = worker_count.max(1).min(chunks.len());
        tracing::info!(
            links = total,
            chunks = chunks.len(),
            workers,
            "Dispatching zone downloads"
        );

        let (work_tx, work_rx) = mpsc::unbounded_channel();
        for chunk in chunks {
            // the receiver is alive until the workers below drop it
            work_tx.send(chunk).ok();
        }
        drop(work_tx);
        let work_rx = Arc::new(Mutex::new(work_rx));

        // child token: a fatal error stops this run without cancelling the caller's token
        let run_cancel = cancel.child_token();
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let mut handles = JoinSet::new();

        for worker_id in 0..workers {
            let fetcher = self.fetcher.clone();
            let sink = sink.clone();
            let work_rx = work_rx.clone();
            let report_tx = report_tx.clone();
            let run_cancel = run_cancel.clone();

            handles.spawn(async move {
                loop {
                    let chunk = work_rx.lock().await.recv().await;
                    let Some(chunk) = chunk else { break };

                    for (index, link) in chunk {
                        let report = if run_cancel.is_cancelled() {
                            WorkerReport::Done(index, fetcher.cancelled(&link))
                        } else {
                            match fetcher.fetch(&link, sink.as_ref(), &run_cancel).await {
                                Ok(result) => WorkerReport::Done(index, result),
                                Err(e) => {
                                    run_cancel.cancel();
                                    WorkerReport::Fatal(index, e)
                                }
                            }
                        };
                        report_tx.send(report).ok();
                    }
                }
                tracing::debug!(worker_id, "Download worker finished");
            });
        }
        drop(report_tx);

        let mut results = Vec::with_capacity(total);
        let mut reported = vec![false; total];
        let mut fatal = None;
        let mut rejected = 0;
        while let Some(report) = report_rx.recv().await {
            match report {
                WorkerReport::Done(index, result) => {
                    reported[index] = true;
                    results.push(result);
                }
                WorkerReport::Fatal(index, e) => {
                    reported[index] = true;
                    rejected += 1;
                    fatal.get_or_insert(e);
                }
            }
        }

        while let Some(joined) = handles.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Download worker panicked");
            }
        }

        if let Some(e) = fatal {
            // links rejected with the fatal error have no result but still count as failed
            let mut summary = RunSummary::from_results(&results);
            summary.failed += rejected;
            tracing::error!(
                error = %e,
                succeeded = summary.succeeded,
                not_found = summary.not_found,
                failed = summary.failed,
                "Dispatch aborted"
            );
            self.event_tx.send(Event::RunComplete(summary)).ok();
            return Err(e);
        }

        // a worker that panicked never reported the rest of its chunk
        for (index, link) in indexed_missing(&reported, &indexed) {
            tracing::error!(index, link = %link, "No result reported for link");
            results.push(DownloadResult {
                outcome: DownloadOutcome::Failed("download worker terminated".to_string()),
                ..self.fetcher.cancelled(link)
            });
        }

        let summary = RunSummary::from_results(&results);
        tracing::info!(
            succeeded = summary.succeeded,
            not_found = summary.not_found,
            failed = summary.failed,
            "Dispatch complete"
        );
        self.event_tx.send(Event::RunComplete(summary)).ok();
        Ok(results)
    }
}

fn indexed_missing<'a>(
    reported: &'a [bool],
    indexed: &'a [(usize, ZoneLink)],
) -> impl Iterator<Item = (usize, &'a ZoneLink)> + 'a {
    indexed
        .iter()
        .filter(|(index, _)| !reported[*index])
        .map(|(index, link)| (*index, link))
}
