//! Newline-delimited text framing over a byte stream.
//!
//! TCP is a *stream* protocol: one `read()` may return half a line, or three
//! lines at once.  [`LineCodec`] keeps the bytes that have not yet formed a
//! complete line in an internal buffer and hands out whole lines only.
//!
//! # Timeouts
//!
//! [`LineCodec::read_line`] waits at most the given duration.  When the time
//! runs out it reports [`ReadOutcome::TimedOut`] and keeps any partial line
//! buffered, so nothing is lost when the next call completes the line.
//!
//! The only `.await` inside `read_line` is a single `read()` into a scratch
//! buffer, which makes the future safe to cancel from a `tokio::select!`.

use std::io;
use std::time::Duration;

use aprs_core::protocol::LINE_TERMINATOR;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{self, Instant};

/// Bytes requested from the socket per `read()`.
const READ_CHUNK: usize = 1024;

/// Longest line accepted before the stream is treated as corrupt.
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Result of a single [`LineCodec::read_line`] call.
#[derive(Debug)]
pub enum ReadOutcome {
    /// One complete line, including its LF (and CR, if the peer sent one).
    Line(String),
    /// No complete line arrived within the timeout.
    TimedOut,
    /// The socket failed or the peer closed the connection.
    Failed(io::Error),
}

/// Line reader/writer wrapping any async byte stream.
#[derive(Debug)]
pub struct LineCodec<S> {
    stream: S,
    buffer: Vec<u8>,
}

impl<S> LineCodec<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps `stream` with an empty receive buffer.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: Vec::with_capacity(READ_CHUNK),
        }
    }

    /// Reads one LF-terminated line, waiting at most `timeout`.
    ///
    /// A zero timeout still returns a line that is already buffered or
    /// immediately readable.
    pub async fn read_line(&mut self, timeout: Duration) -> ReadOutcome {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(line) = self.take_line() {
                return ReadOutcome::Line(line);
            }
            if self.buffer.len() > MAX_LINE_LENGTH {
                return ReadOutcome::Failed(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line exceeds {MAX_LINE_LENGTH} bytes"),
                ));
            }

            match time::timeout_at(deadline, self.stream.read(&mut chunk)).await {
                Err(_) => return ReadOutcome::TimedOut,
                Ok(Ok(0)) => {
                    return ReadOutcome::Failed(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed by peer",
                    ))
                }
                Ok(Ok(n)) => self.buffer.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => return ReadOutcome::Failed(e),
            }
        }
    }

    /// Writes `text` followed by CR LF and flushes.
    ///
    /// # Errors
    ///
    /// Any I/O error means the connection is no longer usable.
    pub async fn write_line(&mut self, text: &str) -> io::Result<()> {
        let mut wire = String::with_capacity(text.len() + LINE_TERMINATOR.len());
        wire.push_str(text);
        wire.push_str(LINE_TERMINATOR);
        self.write_frame(wire.as_bytes()).await
    }

    /// Writes `data` verbatim and flushes.
    ///
    /// # Errors
    ///
    /// Any I/O error means the connection is no longer usable.
    pub async fn write_frame(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await
    }

    /// Shuts down the write side and drops any buffered input.
    pub async fn close(&mut self) {
        self.buffer.clear();
        // The peer may already be gone; there is nothing useful to do with
        // a shutdown error.
        let _ = self.stream.shutdown().await;
    }

    /// Bytes received but not yet returned as a line.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.buffer.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.buffer.drain(..=end).collect();
        Some(String::from_utf8_lossy(&raw).into_owned())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
