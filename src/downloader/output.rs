//! Where downloaded zone data goes: the caller's sink and the file on disk.

use crate::error::{Error, Result};
use crate::types::{ZoneLink, ZoneRecord};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;

/// Receives decoded lines (text mode) or records (json mode) as they are produced
///
/// Called from download workers concurrently, once per line, so
/// implementations should be cheap or apply their own back-pressure.
/// Returning an error fails the link being downloaded.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// One decoded zone-file line
    async fn line(&self, link: &ZoneLink, line: &str) -> Result<()>;

    /// One parsed record; blank and incomplete lines are never passed here
    async fn record(&self, link: &ZoneLink, record: ZoneRecord) -> Result<()>;
}

/// Discards everything; use when only the files on disk matter
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

#[async_trait]
impl RecordSink for NullSink {
    async fn line(&self, _link: &ZoneLink, _line: &str) -> Result<()> {
        Ok(())
    }

    async fn record(&self, _link: &ZoneLink, _record: ZoneRecord) -> Result<()> {
        Ok(())
    }
}

/// Item delivered by a [`ChannelSink`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkItem {
    /// A decoded line (text mode)
    Line {
        /// Link the line was downloaded from
        link: ZoneLink,
        /// The line, without its terminator
        line: String,
    },
    /// A parsed record (json mode)
    Record {
        /// Link the record was downloaded from
        link: ZoneLink,
        /// The record
        record: ZoneRecord,
    },
}

/// Forwards lines and records into a bounded channel
///
/// A full channel suspends the sending worker until the receiver catches
/// up. Dropping the receiver fails any link still producing data.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<SinkItem>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SinkItem>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    async fn send(&self, item: SinkItem) -> Result<()> {
        self.tx
            .send(item)
            .await
            .map_err(|_| Error::Other("record sink receiver was dropped".to_string()))
    }
}

impl From<mpsc::Sender<SinkItem>> for ChannelSink {
    fn from(tx: mpsc::Sender<SinkItem>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl RecordSink for ChannelSink {
    async fn line(&self, link: &ZoneLink, line: &str) -> Result<()> {
        self.send(SinkItem::Line {
            link: link.clone(),
            line: line.to_string(),
        })
        .await
    }

    async fn record(&self, link: &ZoneLink, record: ZoneRecord) -> Result<()> {
        self.send(SinkItem::Record {
            link: link.clone(),
            record,
        })
        .await
    }
}

/// Buffered writer for one zone file
///
/// With `atomic` set the data goes to `<name>.part` and is renamed into
/// place by [`commit`](Self::commit); otherwise it is written to the final
/// path directly and an interrupted download leaves a truncated file.
///
/// With `exclusive` set the final path is created with `create_new`, so
/// creation fails with `AlreadyExists` if another writer got there first.
/// In atomic mode the final path then holds an empty placeholder until the
/// rename replaces it.
pub(crate) struct ZoneFileWriter {
    file: BufWriter<File>,
    final_path: PathBuf,
    write_path: PathBuf,
    /// Empty file claiming `final_path` while the data goes to `.part`
    placeholder: bool,
    bytes_written: u64,
}

impl ZoneFileWriter {
    pub(crate) async fn create(path: &Path, atomic: bool, exclusive: bool) -> Result<Self> {
        let claimed = if exclusive {
            Some(open_file(path, true).await?)
        } else {
            None
        };
        let placeholder = atomic && claimed.is_some();

        let (file, write_path) = match (atomic, claimed) {
            (false, Some(file)) => (file, path.to_path_buf()),
            (false, None) => (open_file(path, false).await?, path.to_path_buf()),
            (true, _) => {
                let part = part_path(path);
                match open_file(&part, false).await {
                    Ok(file) => (file, part),
                    Err(e) => {
                        if placeholder {
                            tokio::fs::remove_file(path).await.ok();
                        }
                        return Err(e);
                    }
                }
            }
        };

        Ok(Self {
            file: BufWriter::new(file),
            final_path: path.to_path_buf(),
            write_path,
            placeholder,
            bytes_written: 0,
        })
    }

    pub(crate) async fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.file.write_all(bytes).await?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    pub(crate) async fn write_line(&mut self, line: &str) -> Result<()> {
        self.write_bytes(line.as_bytes()).await?;
        self.write_bytes(b"\n").await
    }

    /// Flush, move into place, and return the number of bytes written
    pub(crate) async fn commit(mut self) -> Result<u64> {
        self.file.flush().await?;
        self.file.get_ref().sync_all().await?;
        drop(self.file);
        if self.write_path != self.final_path {
            tokio::fs::rename(&self.write_path, &self.final_path).await?;
        }
        Ok(self.bytes_written)
    }

    /// Give up on the file; a `.part` file (and its placeholder) is removed, a direct write is left truncated
    pub(crate) async fn abandon(mut self) {
        self.file.flush().await.ok();
        drop(self.file);
        if self.write_path == self.final_path {
            return;
        }
        let mut leftovers = vec![&self.write_path];
        if self.placeholder {
            leftovers.push(&self.final_path);
        }
        for path in leftovers {
            if let Err(e) = tokio::fs::remove_file(path).await {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to remove partial zone file"
                );
            }
        }
    }
}

/// Open `path` for writing, either truncating or requiring that it not exist yet
async fn open_file(path: &Path, create_new: bool) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true);
    if create_new {
        options.create_new(true);
    } else {
        options.create(true).truncate(true);
    }
    options.open(path).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to create '{}': {}", path.display(), e),
        ))
    })
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}
