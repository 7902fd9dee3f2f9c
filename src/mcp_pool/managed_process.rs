// ABOUTME: One supervised MCP server: lifecycle state machine, stdio tasks and request entry point
// Combines ProcessSupervisor (OS child) with RequestCorrelator (JSON-RPC multiplexing)

//! Managed MCP process.
//!
//! A `ManagedProcess` lives for the whole pool lifetime and survives
//! restarts of the OS process underneath it. Lifecycle:
//!
//! ```text
//!            start()                spawn ok
//!  Stopped ──────────▶ Starting ─────────────▶ Running
//!     ▲                   │                      │
//!     │ stop()            │ spawn error          │ exit detected
//!     │                   ▼                      ▼
//!     └──────────────── Failed ◀─────────────────┘
//!                         │
//!                         └── monitor restart ──▶ Starting
//! ```
//!
//! The child handle exists exactly while the status is `Starting` or
//! `Running`. Each spawn attaches a new generation to the correlator and
//! starts two tasks: the output demultiplexer (stdout frames to the
//! correlator) and the stderr drain (stderr lines to the debug log).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::PoolConfig;
use super::jsonrpc::JsonRpcResponse;
use super::process_supervisor::{ExitReason, ProcessSupervisor, SupervisorError};
use super::request_router::{RequestCorrelator, RequestError};
use super::transport::{FrameReader, FrameWriter};
use crate::config::{ManagedProcessConfig, ServerType};

// === Status ===

/// Lifecycle state of a managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Stopped,
    Starting,
    Running,
    Failed,
}

impl ProcessStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time description of a managed process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub server_type: ServerType,
    pub status: ProcessStatus,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_secs: Option<u64>,
    pub failure_count: u32,
    pub last_error: Option<String>,
    pub request_count: u64,
}

#[derive(Debug)]
struct ProcessState {
    status: ProcessStatus,
    pid: Option<u32>,
    started_at: Option<DateTime<Utc>>,
    started_instant: Option<Instant>,
    failure_count: u32,
    last_error: Option<String>,
}

impl ProcessState {
    const fn new() -> Self {
        Self {
            status: ProcessStatus::Stopped,
            pid: None,
            started_at: None,
            started_instant: None,
            failure_count: 0,
            last_error: None,
        }
    }

    fn record_failure(&mut self, message: String) {
        self.status = ProcessStatus::Failed;
        self.pid = None;
        self.started_instant = None;
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_error = Some(message);
    }
}

/// Child handle plus everything tied to one spawn.
#[derive(Default)]
struct ProcessSlot {
    supervisor: ProcessSupervisor,
    generation: Option<u64>,
    tasks: Vec<JoinHandle<()>>,
}

impl ProcessSlot {
    /// Drop per-spawn resources after the child is gone.
    fn release(&mut self, correlator: &RequestCorrelator) {
        if let Some(generation) = self.generation.take() {
            correlator.detach(generation);
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

// === Managed Process ===

/// One configured MCP server and its current OS process.
pub struct ManagedProcess {
    config: ManagedProcessConfig,
    shutdown_grace: Duration,
    correlator: Arc<RequestCorrelator>,
    slot: AsyncMutex<ProcessSlot>,
    state: Mutex<ProcessState>,
    request_count: AtomicU64,
    awaiting_restart: AtomicBool,
    shutdown: Arc<AtomicBool>,
}

impl ManagedProcess {
    /// Create a stopped process.
    ///
    /// `shutdown` is the pool-wide flag; once raised, `start()` refuses to spawn.
    pub fn new(config: ManagedProcessConfig, settings: &PoolConfig, shutdown: Arc<AtomicBool>) -> Self {
        let correlator = Arc::new(RequestCorrelator::new(
            config.id.clone(),
            settings.request_timeout,
        ));
        Self {
            config,
            shutdown_grace: settings.shutdown_grace,
            correlator,
            slot: AsyncMutex::new(ProcessSlot::default()),
            state: Mutex::new(ProcessState::new()),
            request_count: AtomicU64::new(0),
            awaiting_restart: AtomicBool::new(false),
            shutdown,
        }
    }

    fn state(&self) -> MutexGuard<'_, ProcessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub const fn config(&self) -> &ManagedProcessConfig {
        &self.config
    }

    pub fn status(&self) -> ProcessStatus {
        self.state().status
    }

    pub fn is_running(&self) -> bool {
        self.status() == ProcessStatus::Running
    }

    pub fn failure_count(&self) -> u32 {
        self.state().failure_count
    }

    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Whether the monitor still intends to restart this process.
    pub fn is_awaiting_restart(&self) -> bool {
        self.awaiting_restart.load(Ordering::SeqCst)
    }

    pub(crate) fn set_awaiting_restart(&self, pending: bool) {
        self.awaiting_restart.store(pending, Ordering::SeqCst);
    }

    pub fn info(&self) -> ProcessInfo {
        let state = self.state();
        ProcessInfo {
            id: self.config.id.clone(),
            name: self.config.display_name().to_string(),
            server_type: self.config.server_type,
            status: state.status,
            pid: state.pid,
            started_at: state.started_at,
            uptime_secs: state.started_instant.map(|t| t.elapsed().as_secs()),
            failure_count: state.failure_count,
            last_error: state.last_error.clone(),
            request_count: self.request_count(),
        }
    }

    /// Spawn the OS process and its stdio tasks.
    ///
    /// # Errors
    /// Returns error when shutting down, when already running, or when the
    /// spawn fails. A spawn failure also marks the process failed and counts
    /// toward its failure ceiling.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        let mut slot = self.slot.lock().await;

        if self.shutdown.load(Ordering::SeqCst) {
            return Err(SupervisorError::ShuttingDown);
        }
        if let Some(pid) = slot.supervisor.live_pid() {
            return Err(SupervisorError::AlreadyRunning(pid));
        }

        self.state().status = ProcessStatus::Starting;
        info!(server = %self.config.id, "Starting MCP server");

        let io = match slot.supervisor.spawn(&self.config) {
            Ok(io) => io,
            Err(e) => {
                error!(server = %self.config.id, error = %e, "Failed to start MCP server");
                self.state().record_failure(e.to_string());
                return Err(e);
            }
        };

        let generation = self
            .correlator
            .attach(FrameWriter::new(self.config.id.clone(), io.stdin));
        slot.generation = Some(generation);
        slot.tasks = vec![
            tokio::spawn(demux_loop(
                self.config.id.clone(),
                io.stdout,
                Arc::clone(&self.correlator),
                generation,
            )),
            tokio::spawn(stderr_loop(self.config.id.clone(), io.stderr)),
        ];

        let pid = slot.supervisor.live_pid();
        {
            let mut state = self.state();
            state.status = ProcessStatus::Running;
            state.pid = pid;
            state.started_at = Some(Utc::now());
            state.started_instant = Some(Instant::now());
        }

        info!(server = %self.config.id, pid = ?pid, "MCP server running");
        Ok(())
    }

    /// Terminate the OS process and mark the server stopped.
    ///
    /// Outstanding requests fail immediately. Safe to call in any state.
    pub async fn stop(&self) {
        let mut slot = self.slot.lock().await;

        if slot.supervisor.has_child() {
            info!(server = %self.config.id, "Stopping MCP server");
            if let Err(e) = slot.supervisor.terminate(self.shutdown_grace).await {
                error!(server = %self.config.id, error = %e, "Error stopping MCP server");
            }
        }
        slot.release(&self.correlator);

        let mut state = self.state();
        state.status = ProcessStatus::Stopped;
        state.pid = None;
        state.started_instant = None;
    }

    /// Detect an exit of the current OS process.
    ///
    /// On exit the server is marked failed, its failure counter incremented
    /// and the exit reason recorded as last error.
    pub async fn poll_exit(&self) -> Option<ExitReason> {
        let mut slot = self.slot.lock().await;
        let reason = slot.supervisor.check_exit()?;
        slot.release(&self.correlator);
        drop(slot);

        warn!(server = %self.config.id, %reason, "MCP server exited unexpectedly");
        self.state().record_failure(format!("Process {reason}"));
        Some(reason)
    }

    /// Reset the failure counter if the process has stayed up for `threshold`.
    ///
    /// Returns true when a reset happened.
    pub fn reset_failures_if_stable(&self, threshold: Duration) -> bool {
        let mut state = self.state();
        let stable = state.status == ProcessStatus::Running
            && state.failure_count > 0
            && state.started_instant.is_some_and(|t| t.elapsed() >= threshold);
        if stable {
            info!(
                server = %self.config.id,
                failures = state.failure_count,
                "MCP server stable, resetting failure count"
            );
            state.failure_count = 0;
        }
        stable
    }

    /// Send one request and wait for its response.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, RequestError> {
        if !self.is_running() {
            return Err(RequestError::NotRunning {
                server: self.config.id.clone(),
            });
        }
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.correlator.request(method, params).await
    }

    /// Outstanding requests on the current link.
    pub fn pending_requests(&self) -> usize {
        self.correlator.pending_count()
    }
}

impl std::fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("id", &self.config.id)
            .field("status", &self.status())
            .field("failure_count", &self.failure_count())
            .finish_non_exhaustive()
    }
}

// === Stdio Tasks ===

/// Output demultiplexer: stdout frames to the correlator until EOF.
async fn demux_loop(
    server_id: String,
    stdout: ChildStdout,
    correlator: Arc<RequestCorrelator>,
    generation: u64,
) {
    let mut reader = FrameReader::new(server_id.clone(), stdout);
    debug!(server = %server_id, generation, "Output demultiplexer started");

    loop {
        match reader.next_frame().await {
            Ok(Some(frame)) => {
                correlator.on_frame(frame);
            }
            Ok(None) => {
                debug!(server = %server_id, "MCP server stdout closed");
                break;
            }
            Err(e) => {
                error!(server = %server_id, error = %e, "Read from MCP server failed");
                break;
            }
        }
    }

    // Pending requests on this generation cannot be answered anymore.
    correlator.detach(generation);
    debug!(server = %server_id, generation, "Output demultiplexer ended");
}

/// Drain stderr so the child never blocks on a full pipe.
async fn stderr_loop(server_id: String, stderr: ChildStderr) {
    let mut reader = FrameReader::new(server_id.clone(), stderr);
    loop {
        match reader.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim_end();
                if !line.is_empty() {
                    debug!(server = %server_id, stderr = %line, "MCP server stderr");
                }
            }
            Ok(None) | Err(_) => break,
        }
    }
}
