//! Message framing over raw byte streams.
//!
//! # Responsibilities
//! - Extract exactly one JSON message from a possibly fragmented stream
//! - Accept newline-delimited senders and senders that never delimit
//! - Keep leftover bytes for pipelined callers on the same connection
//! - Enforce a buffer limit and a deadline over the whole accumulation
//!
//! # Design Decisions
//! - Blank lines between messages are skipped
//! - An incomplete message waits for more bytes; bytes that can never become
//!   a valid message fail immediately instead of waiting for the deadline
//! - The size limit is checked after every read, before parsing

use std::time::Duration;

use bytes::{Buf, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::config::FramingConfig;

/// Message terminator used on every hop.
pub const DELIMITER: u8 = b'\n';

/// Failure to obtain one message from a stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("timed out waiting for a complete message")]
    Timeout,
    #[error("connection closed before a complete message")]
    ConnectionClosed,
    #[error("message exceeds {limit} bytes")]
    Oversized { limit: usize },
    #[error("malformed message: {0}")]
    MalformedMessage(#[source] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FrameError::Timeout => "timeout",
            FrameError::ConnectionClosed => "closed",
            FrameError::Oversized { .. } => "oversized",
            FrameError::MalformedMessage(_) => "malformed",
            FrameError::Io(_) => "io",
        }
    }
}

/// Accumulates bytes from one connection and splits messages out of them.
#[derive(Debug)]
pub struct Framer {
    buf: BytesMut,
    max_bytes: usize,
    chunk_bytes: usize,
}

impl Framer {
    /// Create a framer that refuses to buffer more than `max_bytes`.
    pub fn new(max_bytes: usize) -> Self {
        Self::with_chunk(max_bytes, 8192)
    }

    pub fn with_chunk(max_bytes: usize, chunk_bytes: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(chunk_bytes),
            max_bytes,
            chunk_bytes: chunk_bytes.max(1),
        }
    }

    pub fn from_config(config: &FramingConfig) -> Self {
        Self::with_chunk(config.max_message_bytes, config.read_chunk_bytes)
    }

    /// Bytes received but not yet consumed by a message.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Read until one complete message of type `T` is available.
    ///
    /// `timeout` bounds the whole call, however many reads it takes.
    pub async fn read_message<T, R>(&mut self, reader: &mut R, timeout: Duration) -> Result<T, FrameError>
    where
        T: DeserializeOwned,
        R: AsyncRead + Unpin,
    {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(message) = self.try_parse()? {
                return Ok(message);
            }

            self.buf.reserve(self.chunk_bytes);
            let n = match tokio::time::timeout_at(deadline, reader.read_buf(&mut self.buf)).await {
                Ok(read) => read?,
                Err(_) => return Err(FrameError::Timeout),
            };

            if self.buf.len() > self.max_bytes {
                self.buf.clear();
                return Err(FrameError::Oversized {
                    limit: self.max_bytes,
                });
            }

            if n == 0 {
                return self.finish();
            }
        }
    }

    fn try_parse<T: DeserializeOwned>(&mut self) -> Result<Option<T>, FrameError> {
        self.skip_blank();
        if self.buf.is_empty() {
            return Ok(None);
        }

        if let Some(pos) = self.buf.iter().position(|b| *b == DELIMITER) {
            if let Ok(message) = serde_json::from_slice::<T>(&self.buf[..pos]) {
                self.buf.advance(pos + 1);
                return Ok(Some(message));
            }
        }

        // Undelimited sender, or a message spanning several lines.
        let (next, consumed) = {
            let mut stream = serde_json::Deserializer::from_slice(&self.buf).into_iter::<T>();
            let next = stream.next();
            (next, stream.byte_offset())
        };

        match next {
            Some(Ok(message)) => {
                self.buf.advance(consumed);
                Ok(Some(message))
            }
            Some(Err(e)) if e.is_eof() => Ok(None),
            Some(Err(e)) => {
                self.buf.clear();
                Err(FrameError::MalformedMessage(e))
            }
            None => Ok(None),
        }
    }

    /// Last attempt after the peer closed its side.
    fn finish<T: DeserializeOwned>(&mut self) -> Result<T, FrameError> {
        self.skip_blank();
        if self.buf.is_empty() {
            return Err(FrameError::ConnectionClosed);
        }
        let parsed = serde_json::from_slice::<T>(&self.buf);
        self.buf.clear();
        parsed.map_err(FrameError::MalformedMessage)
    }

    fn skip_blank(&mut self) {
        let blank = self
            .buf
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        self.buf.advance(blank);
    }
}

/// Serialize one message followed by the delimiter.
pub fn encode_message<T: Serialize>(message: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(DELIMITER);
    Ok(bytes)
}

/// Write one delimited message and flush it.
pub async fn write_message<T, W>(writer: &mut W, message: &T) -> std::io::Result<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let bytes = encode_message(message)?;
    writer.write_all(&bytes).await?;
    writer.flush().await
}
