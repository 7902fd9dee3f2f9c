// ABOUTME: Request/response correlation for one managed process (id allocation, pending map)
// Routes inbound responses to suspended callers and evicts entries on timeout or teardown

//! Request correlation over a multiplexed stdio link.
//!
//! Many callers share one stdin/stdout pair. Each outbound request gets an id
//! from a per-process counter that never resets, including across restarts,
//! and a pending entry holding a oneshot sender plus an absolute deadline.
//! The output demultiplexer feeds every inbound frame to
//! [`RequestCorrelator::on_frame`], which resolves the matching entry.
//!
//! # Flow
//!
//! 1. `send("tools/list", None)` allocates id `"7"`, records the entry, writes the frame
//! 2. The caller awaits [`PendingResponse::wait`] in its own task
//! 3. The process answers `{"id": "7", ...}`; the demultiplexer calls `on_frame`
//! 4. The entry is removed and the full response is handed to the caller
//!
//! # Removal
//!
//! An entry leaves the map exactly once: when its response arrives, when its
//! handle times out or is dropped, or when the process generation it was sent
//! to is torn down. A response arriving after any of these is unsolicited and
//! is discarded.
//!
//! # Thread Safety
//!
//! Counter, current writer and pending map share one `std::sync::Mutex`.
//! No lock is held across an await point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::jsonrpc::{JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, RequestId};
use super::transport::{FrameError, FrameWriter};

/// Errors surfaced to a caller awaiting a response.
#[derive(Error, Debug)]
pub enum RequestError {
    /// No live process is attached
    #[error("Server '{server}' is not running")]
    NotRunning { server: String },

    /// Deadline passed before a response arrived
    #[error("Request {id} to '{server}' timed out after {timeout:?}")]
    Timeout {
        server: String,
        id: RequestId,
        timeout: Duration,
    },

    /// The process went away while the request was outstanding
    #[error("Server '{server}' exited before answering request {id}")]
    Closed { server: String, id: RequestId },

    /// Writing the request frame failed
    #[error("Failed to send request to '{server}': {source}")]
    Transport {
        server: String,
        #[source]
        source: FrameError,
    },
}

/// What happened to an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Matched and resolved a pending request.
    Resolved,
    /// Response with no matching pending entry (late, duplicate or foreign id).
    Unmatched,
    /// Notification or server-initiated request.
    Unsolicited,
    /// Not a JSON-RPC frame.
    Invalid,
}

struct PendingEntry {
    generation: u64,
    method: String,
    tx: oneshot::Sender<JsonRpcResponse>,
}

#[derive(Default)]
struct CorrelatorState {
    next_id: u64,
    generation: u64,
    writer: Option<Arc<FrameWriter>>,
    pending: HashMap<RequestId, PendingEntry>,
}

type SharedState = Arc<Mutex<CorrelatorState>>;

fn lock(state: &Mutex<CorrelatorState>) -> MutexGuard<'_, CorrelatorState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// === Correlator ===

/// Per-process request correlator.
pub struct RequestCorrelator {
    server_id: String,
    timeout: Duration,
    state: SharedState,
}

impl RequestCorrelator {
    pub fn new(server_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            server_id: server_id.into(),
            timeout,
            state: Arc::new(Mutex::new(CorrelatorState::default())),
        }
    }

    /// Bind the stdin framer of a freshly spawned process.
    ///
    /// Returns the generation number that must be passed to [`Self::detach`].
    pub fn attach(&self, writer: FrameWriter) -> u64 {
        let mut state = lock(&self.state);
        state.generation += 1;
        state.writer = Some(Arc::new(writer));
        debug!(server = %self.server_id, generation = state.generation, "Correlator attached");
        state.generation
    }

    /// Tear down one process generation.
    ///
    /// Drops the writer if it still belongs to `generation` and fails every
    /// pending request sent to that generation. Returns how many were failed.
    pub fn detach(&self, generation: u64) -> usize {
        let mut state = lock(&self.state);
        if state.generation == generation {
            state.writer = None;
        }

        let before = state.pending.len();
        state.pending.retain(|_, entry| entry.generation != generation);
        let failed = before - state.pending.len();

        if failed > 0 {
            warn!(
                server = %self.server_id,
                generation,
                failed,
                "Failing requests pending on exited process"
            );
        }
        failed
    }

    /// Number of outstanding requests.
    pub fn pending_count(&self) -> usize {
        lock(&self.state).pending.len()
    }

    /// Allocate an id, record the pending entry and write the request.
    ///
    /// The returned handle must be awaited with [`PendingResponse::wait`].
    pub async fn send(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<PendingResponse, RequestError> {
        let (tx, rx) = oneshot::channel();

        let (request, writer) = {
            let mut state = lock(&self.state);
            let writer = state.writer.clone().ok_or_else(|| RequestError::NotRunning {
                server: self.server_id.clone(),
            })?;

            state.next_id += 1;
            let id = RequestId::from(state.next_id);
            let generation = state.generation;
            state.pending.insert(
                id.clone(),
                PendingEntry {
                    generation,
                    method: method.to_string(),
                    tx,
                },
            );
            (JsonRpcRequest::new(id, method, params), writer)
        };

        // Dropping the handle on a failed write removes the entry again.
        let handle = PendingResponse {
            server_id: self.server_id.clone(),
            id: request.id.clone(),
            deadline: Instant::now() + self.timeout,
            timeout: self.timeout,
            rx,
            state: Arc::clone(&self.state),
        };

        trace!(server = %self.server_id, id = %request.id, method, "Sending request");
        // A process that stops reading stdin stalls the write; the deadline covers it too.
        match tokio::time::timeout_at(handle.deadline, writer.write_frame(&request)).await {
            Ok(Ok(())) => Ok(handle),
            Ok(Err(source)) => Err(RequestError::Transport {
                server: self.server_id.clone(),
                source,
            }),
            Err(_) => {
                warn!(
                    server = %self.server_id,
                    id = %request.id,
                    method,
                    "Request timed out while writing to stdin"
                );
                Err(RequestError::Timeout {
                    server: self.server_id.clone(),
                    id: request.id.clone(),
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Send a request and wait for its response.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, RequestError> {
        self.send(method, params).await?.wait().await
    }

    /// Route one inbound frame.
    pub fn on_frame(&self, frame: Value) -> FrameDisposition {
        let message = match JsonRpcMessage::classify(frame) {
            Ok(message) => message,
            Err(reason) => {
                debug!(server = %self.server_id, %reason, "Ignoring malformed frame");
                return FrameDisposition::Invalid;
            }
        };

        match message {
            JsonRpcMessage::Response(response) => {
                let entry = lock(&self.state).pending.remove(&response.id);
                match entry {
                    Some(entry) => {
                        trace!(server = %self.server_id, id = %response.id, method = %entry.method, "Response matched");
                        // Receiver may already be gone if the caller raced its deadline.
                        let _ = entry.tx.send(response);
                        FrameDisposition::Resolved
                    }
                    None => {
                        debug!(server = %self.server_id, id = %response.id, "Discarding response with no pending request");
                        FrameDisposition::Unmatched
                    }
                }
            }
            JsonRpcMessage::Notification { method, .. } => {
                debug!(server = %self.server_id, %method, "Ignoring server notification");
                FrameDisposition::Unsolicited
            }
            JsonRpcMessage::Request { id, method, .. } => {
                debug!(server = %self.server_id, %id, %method, "Ignoring server-initiated request");
                FrameDisposition::Unsolicited
            }
        }
    }
}

impl std::fmt::Debug for RequestCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCorrelator")
            .field("server_id", &self.server_id)
            .field("timeout", &self.timeout)
            .field("pending", &self.pending_count())
            .finish()
    }
}

// === Pending Handle ===

/// Handle for one outstanding request.
///
/// Dropping it before the response arrives evicts the pending entry.
pub struct PendingResponse {
    server_id: String,
    id: RequestId,
    deadline: Instant,
    timeout: Duration,
    rx: oneshot::Receiver<JsonRpcResponse>,
    state: SharedState,
}

impl PendingResponse {
    pub const fn id(&self) -> &RequestId {
        &self.id
    }

    /// Wait until the response arrives or the deadline passes.
    pub async fn wait(mut self) -> Result<JsonRpcResponse, RequestError> {
        match tokio::time::timeout_at(self.deadline, &mut self.rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(RequestError::Closed {
                server: self.server_id.clone(),
                id: self.id.clone(),
            }),
            Err(_) => {
                warn!(server = %self.server_id, id = %self.id, timeout = ?self.timeout, "Request timed out");
                Err(RequestError::Timeout {
                    server: self.server_id.clone(),
                    id: self.id.clone(),
                    timeout: self.timeout,
                })
            }
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if lock(&self.state).pending.remove(&self.id).is_some() {
            trace!(server = %self.server_id, id = %self.id, "Evicted unanswered request");
        }
    }
}
