// ABOUTME: Per-process monitor loop detecting exits and restarting with exponential backoff
// Also aggregates process states into an overall pool health status

//! Health monitoring for the MCP process pool.
//!
//! Each managed process gets one `HealthMonitor` task for the lifetime of the
//! pool. Every `health_check_interval` it polls the child for exit. After an
//! exit it restarts the process following `min(base * 2^failures, max)`, as
//! long as the process allows restarts and its failure counter is below the
//! ceiling. Otherwise the process stays `Failed` and the loop ends.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   HealthMonitor                      │
//! │                                                      │
//! │  ┌──────────────┐    ┌──────────────┐                │
//! │  │ Check Loop   │───▶│ poll_exit()  │                │
//! │  │ (interval)   │    └──────────────┘                │
//! │  └──────────────┘           │ exited                 │
//! │          ▲                  ▼                        │
//! │          │          ┌──────────────┐                 │
//! │          │          │ Backoff wait │── shutdown ──▶ end
//! │          │          └──────────────┘                 │
//! │          │                  │                        │
//! │          │                  ▼                        │
//! │          └──────────── start() ── spawn error ─┐     │
//! │                             ▲                  │     │
//! │                             └──────────────────┘     │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The shutdown flag is checked after every wait, and `ManagedProcess::start`
//! re-checks it under the process lock, so a monitor never respawns a
//! process after the pool has begun stopping.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::PoolConfig;
use super::managed_process::{ManagedProcess, ProcessStatus};
use super::metrics::PoolMetrics;
use super::process_supervisor::{ExponentialBackoff, SupervisorError};

// === Health Status ===

/// Overall health status of the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every process is running.
    Healthy,

    /// Some processes are not running but may recover.
    Degraded {
        /// Ids of processes that are starting or awaiting restart.
        unhealthy: Vec<String>,
    },

    /// Some processes are failed or stopped.
    Critical {
        /// Ids of failed or stopped processes.
        failed: Vec<String>,
    },
}

impl HealthStatus {
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(self, Self::Critical { .. })
    }

    /// Aggregate per-process states.
    ///
    /// The flag marks failed processes whose monitor will still try again.
    pub fn aggregate<'a>(
        states: impl IntoIterator<Item = (&'a str, ProcessStatus, bool)>,
    ) -> Self {
        let mut unhealthy = Vec::new();
        let mut failed = Vec::new();

        for (id, status, restarting) in states {
            match status {
                ProcessStatus::Running => {}
                ProcessStatus::Starting => unhealthy.push(id.to_string()),
                ProcessStatus::Failed if restarting => unhealthy.push(id.to_string()),
                ProcessStatus::Failed | ProcessStatus::Stopped => failed.push(id.to_string()),
            }
        }

        if !failed.is_empty() {
            Self::Critical { failed }
        } else if !unhealthy.is_empty() {
            Self::Degraded { unhealthy }
        } else {
            Self::Healthy
        }
    }
}

// === Health Monitor ===

/// Restart policy and timing for one process monitor.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    /// Interval between liveness checks.
    interval: Duration,

    /// Failure ceiling; no restart once reached.
    max_failures: u32,

    backoff: ExponentialBackoff,

    /// Optional stable-uptime threshold for resetting the failure counter.
    failure_reset_after: Option<Duration>,

    /// Pool-wide shutdown flag.
    shutdown: Arc<AtomicBool>,

    /// Wakes sleeping monitors when shutdown is raised.
    wake: Arc<Notify>,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(config: &PoolConfig, shutdown: Arc<AtomicBool>, wake: Arc<Notify>) -> Self {
        Self {
            interval: config.health_check_interval,
            max_failures: config.max_failures,
            backoff: config.backoff(),
            failure_reset_after: config.failure_reset_after,
            shutdown,
            wake,
        }
    }

    /// Whether the monitor would restart a process after `failures` failures.
    #[must_use]
    pub fn allows_restart(&self, process: &ManagedProcess, failures: u32) -> bool {
        process.config().restart_on_failure && failures < self.max_failures
    }

    /// Start the monitoring background task for one process.
    pub fn spawn(self, process: Arc<ManagedProcess>, metrics: Arc<PoolMetrics>) -> JoinHandle<()> {
        info!(server = %process.id(), interval_ms = %self.interval.as_millis(), "Health monitor started");
        tokio::spawn(async move { self.run(process, metrics).await })
    }

    /// Sleep for `duration` unless woken. Returns true if shutdown was raised.
    async fn wait_or_shutdown(&self, duration: Duration) -> bool {
        // Register before checking the flag so a notify between the two is not lost.
        let notified = self.wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_shutdown() {
            return true;
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => {}
            () = notified => {}
        }
        self.is_shutdown()
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// The main monitor loop.
    async fn run(self, process: Arc<ManagedProcess>, metrics: Arc<PoolMetrics>) {
        let id = process.id().to_string();
        let mut restart_pending = false;

        loop {
            if !restart_pending {
                if self.wait_or_shutdown(self.interval).await {
                    debug!(server = %id, "Health monitor received shutdown signal");
                    break;
                }
                if !process.config().enabled {
                    break;
                }

                if let Some(threshold) = self.failure_reset_after {
                    process.reset_failures_if_stable(threshold);
                }

                if process.poll_exit().await.is_none() {
                    continue;
                }
                metrics.increment_crashes();
            }
            restart_pending = false;

            let failures = process.failure_count();
            if !self.allows_restart(&process, failures) {
                error!(
                    server = %id,
                    failures,
                    restart_on_failure = process.config().restart_on_failure,
                    "MCP server failed permanently"
                );
                break;
            }

            process.set_awaiting_restart(true);
            let delay = self.backoff.delay_for(failures);
            info!(
                server = %id,
                attempt = failures,
                max = self.max_failures,
                delay_ms = delay.as_millis(),
                "Restarting MCP server with backoff"
            );

            if self.wait_or_shutdown(delay).await {
                debug!(server = %id, "Restart cancelled by shutdown");
                break;
            }

            metrics.increment_restarts();
            match process.start().await {
                Ok(()) => info!(server = %id, "MCP server restarted"),
                Err(SupervisorError::ShuttingDown) => break,
                Err(SupervisorError::AlreadyRunning(pid)) => {
                    debug!(server = %id, pid, "MCP server already running");
                }
                Err(e) => {
                    warn!(server = %id, error = %e, "Restart attempt failed");
                    restart_pending = process.status() == ProcessStatus::Failed;
                }
            }
            if !restart_pending {
                process.set_awaiting_restart(false);
            }
        }

        process.set_awaiting_restart(false);
        debug!(server = %id, "Health monitor ended");
    }
}
