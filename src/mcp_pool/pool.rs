// ABOUTME: MCP process pool facade: start/stop every configured server, route tool calls
// Owns the managed processes, their monitors, the capability registry and metrics

//! MCP Process Pool
//!
//! The `McpProcessPool` is the single entry point the API layer talks to:
//! - Start and stop every enabled server concurrently
//! - One monitor task per server with restart-with-backoff
//! - Tool discovery and name-based call routing
//! - Aggregated tool/resource/prompt listings and status
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     McpProcessPool                        │
//! │  ┌─────────────────────────────────────────────────────┐  │
//! │  │  processes: Vec<Arc<ManagedProcess>> (config order) │  │
//! │  │     - filesystem -> ManagedProcess (running)        │  │
//! │  │     - github     -> ManagedProcess (failed)         │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! │                                                           │
//! │  ┌────────────────────┐ ┌──────────────┐ ┌─────────────┐  │
//! │  │ CapabilityRegistry │ │ PoolMetrics  │ │  monitors   │  │
//! │  │ (tool -> server)   │ │  (counters)  │ │ (per server)│  │
//! │  └────────────────────┘ └──────────────┘ └─────────────┘  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use mcp_hub::mcp_pool::{McpProcessPool, PoolConfig};
//!
//! let pool = McpProcessPool::new(PoolConfig::default(), servers);
//! pool.start_all().await?;
//!
//! let tools = pool.list_tools().await;
//! let result = pool.call_tool("read_file", json!({"path": "/tmp/x"})).await?;
//!
//! pool.stop_all().await;
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::PoolConfig;
use super::health::{HealthMonitor, HealthStatus};
use super::jsonrpc::ResponseOutcome;
use super::managed_process::{ManagedProcess, ProcessInfo, ProcessStatus};
use super::metrics::{MetricsSnapshot, PoolMetrics};
use super::process_supervisor::SupervisorError;
use super::registry::{CapabilityKind, CapabilityRegistry};
use super::request_router::RequestError;
use crate::config::ManagedProcessConfig;

/// How long `stop_all` waits for monitors to notice shutdown before aborting them
const MONITOR_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

// === Pool Errors ===

/// Errors that can occur during pool operations
#[derive(Debug, Error)]
pub enum PoolError {
    /// OS refused to start a server
    #[error("Failed to spawn server '{server}': {message}")]
    SpawnFailure { server: String, message: String },

    /// Server exited while a request was outstanding
    #[error("Server '{server}' crashed before answering")]
    ProcessCrashed { server: String },

    /// No response within the request deadline
    #[error("Request to server '{server}' timed out after {timeout:?}")]
    Timeout { server: String, timeout: Duration },

    /// No running server exposes this tool
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Server answered with a JSON-RPC error object
    #[error("Server error {code}: {message}")]
    RemoteError {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    /// Target server is not running
    #[error("Server '{0}' is not running")]
    NotRunning(String),

    /// Pool is already running when start is called
    #[error("Pool is already running")]
    AlreadyRunning,

    /// Writing to the server failed
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

impl From<RequestError> for PoolError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::NotRunning { server } => Self::NotRunning(server),
            RequestError::Timeout { server, timeout, .. } => Self::Timeout { server, timeout },
            RequestError::Closed { server, .. } => Self::ProcessCrashed { server },
            RequestError::Transport { .. } => Self::Transport(err.to_string()),
        }
    }
}

impl PoolError {
    fn from_spawn(server: &str, err: &SupervisorError) -> Self {
        Self::SpawnFailure {
            server: server.to_string(),
            message: err.to_string(),
        }
    }
}

// === MCP Process Pool ===

/// Main entry point for the MCP process pool
pub struct McpProcessPool {
    /// Configuration for the pool
    config: PoolConfig,

    /// Server definitions in routing precedence order
    servers: Vec<ManagedProcessConfig>,

    /// Managed processes, built by `start_all`
    processes: RwLock<Vec<Arc<ManagedProcess>>>,

    /// Monitor task per process
    monitors: Mutex<Vec<JoinHandle<()>>>,

    registry: CapabilityRegistry,

    /// Pool-level metrics
    metrics: Arc<PoolMetrics>,

    /// Raised by `stop_all`; checked before every restart
    shutdown: Arc<AtomicBool>,

    /// Wakes sleeping monitors on shutdown
    wake: Arc<Notify>,

    started: AtomicBool,
}

impl std::fmt::Debug for McpProcessPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpProcessPool")
            .field("config", &self.config)
            .field("server_count", &self.servers.len())
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

impl McpProcessPool {
    /// Create a pool for the given servers. Nothing is spawned until `start_all`.
    pub fn new(config: PoolConfig, servers: Vec<ManagedProcessConfig>) -> Self {
        Self {
            config,
            servers,
            processes: RwLock::new(Vec::new()),
            monitors: Mutex::new(Vec::new()),
            registry: CapabilityRegistry::new(),
            metrics: Arc::new(PoolMetrics::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            started: AtomicBool::new(false),
        }
    }

    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    async fn snapshot(&self) -> Vec<Arc<ManagedProcess>> {
        self.processes.read().await.clone()
    }

    async fn find(&self, server_id: &str) -> Option<Arc<ManagedProcess>> {
        self.processes
            .read()
            .await
            .iter()
            .find(|p| p.id() == server_id)
            .cloned()
    }

    /// Start every enabled server, spawn their monitors, then discover tools.
    ///
    /// Individual start failures are logged and leave that server `Failed`;
    /// they never abort the others.
    pub async fn start_all(&self) -> PoolResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(PoolError::AlreadyRunning);
        }
        self.shutdown.store(false, Ordering::SeqCst);

        let mut seen = HashSet::new();
        let processes: Vec<Arc<ManagedProcess>> = self
            .servers
            .iter()
            .filter(|server| server.enabled)
            .filter(|server| {
                let fresh = seen.insert(server.id.clone());
                if !fresh {
                    warn!(server = %server.id, "Duplicate server id, skipping");
                }
                fresh
            })
            .map(|server| {
                Arc::new(ManagedProcess::new(
                    server.clone(),
                    &self.config,
                    Arc::clone(&self.shutdown),
                ))
            })
            .collect();

        info!(servers = processes.len(), "Starting MCP process pool");

        let results = join_all(processes.iter().map(|p| p.start())).await;
        let mut running = 0;
        for (process, result) in processes.iter().zip(results) {
            match result {
                Ok(()) => running += 1,
                Err(e) => {
                    let err = PoolError::from_spawn(process.id(), &e);
                    error!(server = %process.id(), error = %err, "Server failed to start");
                }
            }
        }

        {
            let mut monitors = self.monitors.lock().await;
            for process in &processes {
                let monitor =
                    HealthMonitor::new(&self.config, Arc::clone(&self.shutdown), Arc::clone(&self.wake));
                monitors.push(monitor.spawn(Arc::clone(process), Arc::clone(&self.metrics)));
            }
        }

        *self.processes.write().await = processes;
        info!(running, "MCP process pool started");

        self.discover().await;
        Ok(())
    }

    /// Stop every server and its monitor. Safe to call repeatedly.
    pub async fn stop_all(&self) {
        if !self.started.load(Ordering::SeqCst) {
            debug!("Pool not started, nothing to stop");
            return;
        }
        info!("Stopping MCP process pool");

        self.shutdown.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();

        let monitors: Vec<JoinHandle<()>> = self.monitors.lock().await.drain(..).collect();
        for handle in monitors {
            let abort = handle.abort_handle();
            if tokio::time::timeout(MONITOR_JOIN_TIMEOUT, handle).await.is_err() {
                warn!("Health monitor did not stop in time, aborting");
                abort.abort();
            }
        }

        let processes = self.snapshot().await;
        join_all(processes.iter().map(|p| p.stop())).await;

        self.registry.clear();
        self.started.store(false, Ordering::SeqCst);
        info!("MCP process pool stopped");
    }

    /// Rebuild the tool routing table from every running server.
    pub async fn discover(&self) -> usize {
        let processes = self.snapshot().await;
        self.registry.discover(&processes).await
    }

    pub async fn list_tools(&self) -> Vec<Value> {
        self.list(CapabilityKind::Tools).await
    }

    pub async fn list_resources(&self) -> Vec<Value> {
        self.list(CapabilityKind::Resources).await
    }

    pub async fn list_prompts(&self) -> Vec<Value> {
        self.list(CapabilityKind::Prompts).await
    }

    async fn list(&self, kind: CapabilityKind) -> Vec<Value> {
        let processes = self.snapshot().await;
        CapabilityRegistry::list(kind, &processes).await
    }

    /// Route a tool call to the server that exposes it.
    ///
    /// Returns the `result` value of the server's response.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> PoolResult<Value> {
        let server_id = self
            .registry
            .resolve(name)
            .ok_or_else(|| PoolError::ToolNotFound(name.to_string()))?;
        let process = self
            .find(&server_id)
            .await
            .ok_or_else(|| PoolError::NotRunning(server_id.clone()))?;

        self.metrics.increment_requests();
        debug!(server = %server_id, tool = %name, "Routing tool call");

        let params = json!({ "name": name, "arguments": arguments });
        let response = match process.request("tools/call", Some(params)).await {
            Ok(response) => response,
            Err(e) => {
                self.metrics.increment_errors();
                if matches!(e, RequestError::Timeout { .. }) {
                    self.metrics.increment_timeouts();
                }
                warn!(server = %server_id, tool = %name, error = %e, "Tool call failed");
                return Err(e.into());
            }
        };

        match response.outcome {
            ResponseOutcome::Success(result) => Ok(result),
            ResponseOutcome::Failure(e) => {
                self.metrics.increment_errors();
                debug!(server = %server_id, tool = %name, error = %e, "Tool call returned an error");
                Err(PoolError::RemoteError {
                    code: e.code,
                    message: e.message,
                    data: e.data,
                })
            }
        }
    }

    /// Server id to lifecycle state.
    pub async fn status(&self) -> BTreeMap<String, ProcessStatus> {
        self.snapshot()
            .await
            .iter()
            .map(|p| (p.id().to_string(), p.status()))
            .collect()
    }

    /// Detailed per-server snapshot in pool order.
    pub async fn process_info(&self) -> Vec<ProcessInfo> {
        self.snapshot().await.iter().map(|p| p.info()).collect()
    }

    /// Overall health across servers.
    pub async fn health(&self) -> HealthStatus {
        let processes = self.snapshot().await;
        HealthStatus::aggregate(
            processes
                .iter()
                .map(|p| (p.id(), p.status(), p.is_awaiting_restart())),
        )
    }

    /// Routable tool names.
    pub fn tool_count(&self) -> usize {
        self.registry.tool_count()
    }

    /// Server id owning a tool.
    pub fn tool_owner(&self, name: &str) -> Option<String> {
        self.registry.resolve(name)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Drop for McpProcessPool {
    fn drop(&mut self) {
        // Monitors exit on their next wake; children are killed when their handles drop.
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }
}
