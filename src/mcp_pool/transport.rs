// ABOUTME: Newline-delimited JSON framing over a managed process's stdin/stdout
// FrameWriter serializes one frame per line; FrameReader yields parsed JSON objects

//! Stdio transport framing.
//!
//! One JSON object per line, terminated by `\n`. The writer holds its own
//! lock for the whole write-and-flush so frames from concurrent callers
//! never interleave. The reader tolerates arbitrary noise on stdout: blank
//! lines, log lines and anything else that is not a JSON object is skipped.

use std::io;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// Errors raised while writing a frame.
#[derive(Error, Debug)]
pub enum FrameError {
    /// Frame could not be serialized
    #[error("Failed to serialize frame: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Underlying stream failed (typically a broken pipe after the process died)
    #[error("Failed to write frame: {0}")]
    Io(#[from] io::Error),
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

// === Writer ===

/// Serializing, flushing frame writer.
pub struct FrameWriter {
    server_id: String,
    inner: Mutex<WriterState>,
}

struct WriterState {
    writer: BufWriter<BoxedWriter>,
    /// A previous write was cancelled part way through its frame.
    torn: bool,
}

impl FrameWriter {
    pub fn new<W>(server_id: impl Into<String>, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            server_id: server_id.into(),
            inner: Mutex::new(WriterState {
                writer: BufWriter::new(Box::new(writer)),
                torn: false,
            }),
        }
    }

    /// Write one frame as a single line and flush it.
    ///
    /// Cancel safe at frame granularity: if an earlier call was dropped
    /// mid-frame, its partial line is terminated first so the next frame
    /// still starts on a line of its own.
    pub async fn write_frame<T: Serialize>(&self, frame: &T) -> Result<(), FrameError> {
        let mut line = serde_json::to_vec(frame)?;
        line.push(b'\n');

        let mut state = self.inner.lock().await;
        if state.torn {
            debug!(server = %self.server_id, "Terminating partially written frame");
            state.writer.write_all(b"\n").await?;
        }
        state.torn = true;
        state.writer.write_all(&line).await?;
        state.writer.flush().await?;
        state.torn = false;

        trace!(server = %self.server_id, bytes = line.len(), "Frame written");
        Ok(())
    }
}

impl std::fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter")
            .field("server_id", &self.server_id)
            .finish_non_exhaustive()
    }
}

// === Reader ===

/// Lazy line reader yielding JSON objects.
pub struct FrameReader<R> {
    server_id: String,
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(server_id: impl Into<String>, reader: R) -> Self {
        Self {
            server_id: server_id.into(),
            reader: BufReader::new(reader),
            buf: Vec::new(),
        }
    }

    /// Next raw line with the terminator stripped, or `None` at end of stream.
    ///
    /// Invalid UTF-8 is replaced rather than treated as an error.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 {
            return Ok(None);
        }

        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }

    /// Next line that parses as a JSON object, or `None` at end of stream.
    pub async fn next_frame(&mut self) -> io::Result<Option<Value>> {
        while let Some(line) = self.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<Value>(trimmed) {
                Ok(value @ Value::Object(_)) => return Ok(Some(value)),
                Ok(_) => {
                    debug!(server = %self.server_id, line = %trimmed, "Skipping non-object JSON line");
                }
                Err(_) => {
                    debug!(server = %self.server_id, line = %trimmed, "Skipping non-JSON output");
                }
            }
        }

        Ok(None)
    }
}
