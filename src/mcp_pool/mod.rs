// ABOUTME: MCP process pool: runs many stdio MCP servers and multiplexes JSON-RPC over them
//
// Key components:
// - jsonrpc: tagged JSON-RPC 2.0 message model
// - transport: newline-delimited JSON framing on child stdio
// - request_router: per-process id allocation and response correlation
// - process_supervisor: OS child spawn/poll/terminate and restart backoff
// - managed_process: lifecycle state machine for one configured server
// - health: per-process monitor loop with restart-with-backoff
// - registry: tool discovery, aggregated listings, name routing
// - pool: facade used by the API layer

pub mod config;
pub mod health;
pub mod jsonrpc;
pub mod managed_process;
pub mod metrics;
pub mod pool;
pub mod process_supervisor;
pub mod registry;
pub mod request_router;
pub mod transport;

// Re-exports for convenient access
pub use config::PoolConfig;
pub use health::HealthStatus;
pub use managed_process::{ProcessInfo, ProcessStatus};
pub use metrics::MetricsSnapshot;
pub use pool::{McpProcessPool, PoolError, PoolResult};
