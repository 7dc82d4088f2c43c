//! Chunk-to-line decoding of zone file bodies.
//!
//! Network chunks bear no relation to line boundaries, so a chunk usually
//! ends in the middle of a record. [`LineDecoder`] keeps that trailing
//! fragment and prepends it to the next chunk; only complete lines are
//! ever returned, and the last fragment is flushed by [`LineDecoder::finish`].
//! Gzip framing is undone transparently before splitting, including bodies
//! made of several concatenated gzip members.

use crate::error::{Error, Result};
use flate2::write::MultiGzDecoder;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::io::Write;
use std::pin::Pin;

/// Gzip member header magic
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// How the body is framed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    /// Detect gzip from the first two bytes (default)
    #[default]
    Auto,
    /// The body is gzip-compressed
    Gzip,
    /// The body is plain text
    Identity,
}

enum Framing {
    /// Auto mode before two bytes have been seen
    Sniffing(Vec<u8>),
    /// Every concatenated member is inflated, not only the first
    Gzip(Box<MultiGzDecoder<Vec<u8>>>),
    Plain,
}

/// Incremental gzip-aware line splitter
///
/// ```
/// use czds_dl::zone::{Compression, LineDecoder};
///
/// let mut decoder = LineDecoder::new(Compression::Identity);
/// assert!(decoder.push(b"example.com. 3600 IN A 19").unwrap().is_empty());
/// let lines = decoder.push(b"2.0.2.1\nexample.com. 3600").unwrap();
/// assert_eq!(lines, vec!["example.com. 3600 IN A 192.0.2.1"]);
/// assert_eq!(decoder.finish().unwrap(), vec!["example.com. 3600"]);
/// ```
pub struct LineDecoder {
    framing: Framing,
    /// Bytes after the last newline seen so far
    pending: Vec<u8>,
}

impl LineDecoder {
    /// Create a decoder for one body
    pub fn new(compression: Compression) -> Self {
        let framing = match compression {
            Compression::Auto => Framing::Sniffing(Vec::with_capacity(2)),
            Compression::Gzip => Framing::Gzip(Box::new(MultiGzDecoder::new(Vec::new()))),
            Compression::Identity => Framing::Plain,
        };
        Self {
            framing,
            pending: Vec::new(),
        }
    }

    /// Whether the body was detected (or declared) as gzip
    pub fn is_gzip(&self) -> bool {
        matches!(self.framing, Framing::Gzip(_))
    }

    /// Feed one network chunk, returning every line it completes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] if the gzip stream is corrupt.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        match &mut self.framing {
            Framing::Sniffing(head) => {
                head.extend_from_slice(chunk);
                if head.len() < GZIP_MAGIC.len() {
                    return Ok(Vec::new());
                }
                let head = std::mem::take(head);
                self.framing = if head.starts_with(&GZIP_MAGIC) {
                    Framing::Gzip(Box::new(MultiGzDecoder::new(Vec::new())))
                } else {
                    Framing::Plain
                };
                self.push(&head)
            }
            Framing::Gzip(decoder) => {
                decoder
                    .write_all(chunk)
                    .map_err(|e| Error::MalformedInput(format!("invalid gzip stream: {e}")))?;
                let inflated = std::mem::take(decoder.get_mut());
                Ok(self.split_complete(&inflated))
            }
            Framing::Plain => Ok(self.split_complete(chunk)),
        }
    }

    /// End of body: flush the decompressor and any residual partial line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedInput`] if the gzip stream cannot be finished.
    pub fn finish(mut self) -> Result<Vec<String>> {
        let mut lines = match std::mem::replace(&mut self.framing, Framing::Plain) {
            Framing::Sniffing(head) => self.split_complete(&head),
            Framing::Gzip(decoder) => {
                let inflated = decoder
                    .finish()
                    .map_err(|e| Error::MalformedInput(format!("truncated gzip stream: {e}")))?;
                self.split_complete(&inflated)
            }
            Framing::Plain => Vec::new(),
        };
        if !self.pending.is_empty() {
            lines.push(to_line(&self.pending));
        }
        Ok(lines)
    }

    fn split_complete(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        complete[..last_newline]
            .split(|&b| b == b'\n')
            .map(to_line)
            .collect()
    }
}

/// Lossy UTF-8 conversion of one line, without its `\r\n` terminator
fn to_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

struct LineStreamState<S> {
    inner: Pin<Box<S>>,
    decoder: Option<LineDecoder>,
    ready: VecDeque<String>,
}

/// Adapt a stream of byte chunks (e.g. `reqwest::Response::bytes_stream`) into
/// a stream of complete lines.
///
/// The returned stream is not `Unpin`; pin it before polling. It ends after
/// the first error.
pub fn decode_lines<S, B, E>(stream: S, compression: Compression) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    Error: From<E>,
{
    let state = LineStreamState {
        inner: Box::pin(stream),
        decoder: Some(LineDecoder::new(compression)),
        ready: VecDeque::new(),
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.ready.pop_front() {
                return Some((Ok(line), state));
            }
            if state.decoder.is_none() {
                return None;
            }
            let batch = match state.inner.next().await {
                Some(Ok(chunk)) => match state.decoder.as_mut() {
                    Some(decoder) => decoder.push(chunk.as_ref()),
                    None => return None,
                },
                Some(Err(e)) => Err(Error::from(e)),
                None => match state.decoder.take() {
                    Some(decoder) => decoder.finish(),
                    None => return None,
                },
            };
            match batch {
                Ok(lines) => state.ready.extend(lines),
                Err(e) => {
                    state.decoder = None;
                    state.ready.clear();
                    return Some((Err(e), state));
                }
            }
        }
    })
}
