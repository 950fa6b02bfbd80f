//! Content-Length message framing for JSON-RPC over byte streams.
//!
//! This module implements HTTP-style Content-Length framing, the same protocol
//! used by the Language Server Protocol (LSP). This enables reliable message
//! boundaries over stream-oriented pipes and sockets.
//!
//! # Wire Format
//!
//! ```text
//! Content-Length: <length>\r\n
//! \r\n
//! <message-body>
//! ```
//!
//! Decoding is incremental: [`FrameDecoder`] owns an accumulation buffer that
//! bytes are pushed into as they arrive, and complete bodies are extracted
//! from its front. A header block without a valid `Content-Length` (or one
//! announcing more than the configured maximum) is a framing violation: the
//! whole buffer is discarded and decoding restarts from the next bytes.

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// Maximum message size (100MB) to prevent OOM from malicious/buggy peers.
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Separator between the header block and the body.
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Read chunk size for [`FrameReader`].
const READ_CHUNK: usize = 8 * 1024;

/// Encode a body as a Content-Length framed message.
pub fn encode_message(body: &str) -> Vec<u8> {
    let body_bytes = body.as_bytes();
    let header = format!("Content-Length: {}\r\n\r\n", body_bytes.len());

    let mut frame = Vec::with_capacity(header.len() + body_bytes.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(body_bytes);
    frame
}

/// Find the `Content-Length` value in a header block.
///
/// Header lines are split on the first ':'; the key is matched
/// case-insensitively and other headers (e.g. Content-Type) are ignored.
fn parse_content_length(header: &str) -> Option<usize> {
    header.split("\r\n").find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if !key.trim().eq_ignore_ascii_case("Content-Length") {
            return None;
        }
        let value = value.trim();
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        value.parse().ok()
    })
}

/// Incremental decoder owning the accumulation buffer for one stream.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_message_size: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_size(MAX_MESSAGE_SIZE)
    }

    pub fn with_max_size(max_message_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_message_size,
        }
    }

    /// Append bytes to the accumulator without extracting anything.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Append bytes, then drain every complete message now available.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.push(bytes);
        std::iter::from_fn(|| self.try_extract()).collect()
    }

    /// Number of bytes currently buffered.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Extract one complete message body from the front of the buffer.
    ///
    /// Returns `None` when more bytes are needed, and also after a framing
    /// violation (which empties the buffer).
    pub fn try_extract(&mut self) -> Option<String> {
        let header_end = self
            .buffer
            .windows(HEADER_TERMINATOR.len())
            .position(|w| w == HEADER_TERMINATOR)?;

        let header = String::from_utf8_lossy(&self.buffer[..header_end]);
        let size = match parse_content_length(&header) {
            Some(size) if size <= self.max_message_size => size,
            Some(size) => {
                warn!(
                    "Message size {} exceeds maximum {} bytes; dropping {} buffered bytes",
                    size,
                    self.max_message_size,
                    self.buffer.len()
                );
                self.buffer.clear();
                return None;
            }
            None => {
                warn!(
                    "Missing or invalid Content-Length header; dropping {} buffered bytes",
                    self.buffer.len()
                );
                self.buffer.clear();
                return None;
            }
        };

        let body_start = header_end + HEADER_TERMINATOR.len();
        let body_end = body_start + size;
        if self.buffer.len() < body_end {
            return None;
        }

        let body = String::from_utf8_lossy(&self.buffer[body_start..body_end]).into_owned();
        self.buffer.drain(..body_end);
        debug!("Decoded message ({} bytes)", size);
        Some(body)
    }
}

/// Reads framed messages from an async byte stream.
///
/// Buffered messages are always returned before more bytes are read, so a
/// chunk carrying several frames is fully drained first.
pub struct FrameReader<R> {
    reader: R,
    decoder: FrameDecoder,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_decoder(reader, FrameDecoder::new())
    }

    pub fn with_decoder(reader: R, decoder: FrameDecoder) -> Self {
        Self { reader, decoder }
    }

    /// Read the next message body.
    ///
    /// Returns `Ok(None)` once the stream reaches EOF. Bytes of an incomplete
    /// trailing frame are discarded at EOF.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the underlying stream fails.
    pub async fn next_message(&mut self) -> Result<Option<String>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(body) = self.decoder.try_extract() {
                return Ok(Some(body));
            }

            let n = self
                .reader
                .read(&mut chunk)
                .await
                .context("Failed to read from stream")?;

            if n == 0 {
                if self.decoder.buffered_len() > 0 {
                    debug!(
                        "Stream closed with {} unframed bytes buffered",
                        self.decoder.buffered_len()
                    );
                }
                return Ok(None);
            }

            self.decoder.push(&chunk[..n]);
        }
    }
}

/// Write a Content-Length framed message to the stream.
///
/// The header and body go out in a single write, followed by a flush.
///
/// # Errors
///
/// Returns an error if the write or flush fails.
pub async fn write_message<W: AsyncWrite + Unpin + ?Sized>(writer: &mut W, body: &str) -> Result<()> {
    writer
        .write_all(&encode_message(body))
        .await
        .context("Failed to write message")?;

    writer.flush().await.context("Failed to flush message")?;

    Ok(())
}
