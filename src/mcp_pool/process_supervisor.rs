// ABOUTME: OS-level supervision of one MCP server child process
//
// Spawns the child with piped stdio, polls it for exit without blocking, and
// terminates it with SIGTERM followed by SIGKILL after a grace period. Also
// hosts the exponential backoff calculator used between restarts.

#![allow(clippy::missing_const_for_fn)]

use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, error, info, warn};

use crate::config::ManagedProcessConfig;

/// Errors that can occur during process supervision
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// Process spawn failed
    #[error("Failed to spawn '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Process already running
    #[error("Process already running with PID {0}")]
    AlreadyRunning(u32),

    /// The pool is shutting down and will not spawn new processes
    #[error("Pool is shutting down")]
    ShuttingDown,

    /// Termination failed
    #[error("Failed to terminate process: {0}")]
    TerminateFailed(#[source] std::io::Error),

    /// Invalid command
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Exited with a status code
    Code(i32),

    /// Killed by a signal
    Signal(i32),

    /// Platform gave neither a code nor a signal
    Unknown,
}

impl ExitReason {
    fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Code(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signal(signal);
            }
        }

        Self::Unknown
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exited with code {code}"),
            Self::Signal(signal) => write!(f, "terminated by signal {signal}"),
            Self::Unknown => f.write_str("terminated for an unknown reason"),
        }
    }
}

/// Exponential backoff calculator for restart delays
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    /// Delay unit multiplied by `2^failures`
    base: Duration,

    /// Maximum delay cap
    max: Duration,
}

impl ExponentialBackoff {
    #[must_use]
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before the restart that follows `failures` consecutive failures.
    ///
    /// Returns `min(base * 2^failures, max)`
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        let multiplier = 2u64.saturating_pow(failures);
        // Truncate to u64 - millis > u64::MAX is already capped by max duration
        let base_millis = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        let delay = Duration::from_millis(base_millis.saturating_mul(multiplier));

        std::cmp::min(delay, self.max)
    }
}

/// Stdio handles of a freshly spawned child.
pub struct ProcessIo {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Owner of at most one live child process.
#[derive(Debug, Default)]
pub struct ProcessSupervisor {
    child: Option<Child>,
    pid: Option<u32>,
}

impl ProcessSupervisor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the configured process.
    ///
    /// The argv is `command` followed by `args`. The environment is the
    /// current one with the configured overrides applied on top.
    ///
    /// # Errors
    /// Returns error if a process is already running, the command is empty,
    /// or the OS refuses the spawn
    pub fn spawn(&mut self, config: &ManagedProcessConfig) -> Result<ProcessIo, SupervisorError> {
        if let Some(pid) = self.live_pid() {
            return Err(SupervisorError::AlreadyRunning(pid));
        }

        let mut argv = config.argv();
        let Some(program) = argv.next() else {
            return Err(SupervisorError::InvalidCommand(
                "Command cannot be empty".to_string(),
            ));
        };
        if program.is_empty() {
            return Err(SupervisorError::InvalidCommand(
                "Executable name cannot be empty".to_string(),
            ));
        }

        let args: Vec<&str> = argv.collect();
        debug!(server = %config.id, command = %program, args = ?args, "Spawning MCP process");

        let mut command = Command::new(program);
        command
            .args(&args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &config.cwd {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| SupervisorError::SpawnFailed {
            command: program.to_string(),
            source,
        })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(SupervisorError::InvalidCommand(
                "Child stdio was not captured".to_string(),
            ));
        };

        let pid = child.id();
        info!(server = %config.id, pid = ?pid, command = %program, "MCP process spawned");

        self.child = Some(child);
        self.pid = pid;

        Ok(ProcessIo {
            stdin,
            stdout,
            stderr,
        })
    }

    /// Poll the child without blocking.
    ///
    /// Returns the exit reason once the child has exited and releases the
    /// handle; returns `None` while it is still running or when there is no
    /// child.
    pub fn check_exit(&mut self) -> Option<ExitReason> {
        let child = self.child.as_mut()?;

        match child.try_wait() {
            Ok(Some(status)) => {
                let reason = ExitReason::from_status(status);
                debug!(pid = ?self.pid, %reason, "Process exited");
                self.child = None;
                self.pid = None;
                Some(reason)
            }
            Ok(None) => None,
            Err(e) => {
                error!(pid = ?self.pid, error = %e, "Failed to check process status");
                None
            }
        }
    }

    /// Gracefully terminate the process
    ///
    /// First sends SIGTERM, waits up to `grace`, then sends SIGKILL if the
    /// process hasn't exited. A no-op when nothing is running.
    ///
    /// # Errors
    /// Returns error if the forced kill fails
    pub async fn terminate(&mut self, grace: Duration) -> Result<(), SupervisorError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let pid = self.pid.take().unwrap_or(0);
        info!(pid, "Terminating MCP process");

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Ok(raw) = i32::try_from(pid) {
                if raw > 0 {
                    if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
                        debug!(pid, error = %e, "SIGTERM delivery failed");
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            // No graceful signal available
            let _ = child.start_kill();
        }

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(pid, reason = %ExitReason::from_status(status), "Process terminated gracefully");
            }
            Ok(Err(e)) => {
                warn!(pid, error = %e, "Error waiting for process");
            }
            Err(_) => {
                warn!(pid, "Process did not terminate gracefully, sending SIGKILL");

                if let Err(e) = child.kill().await {
                    error!(pid, error = %e, "Failed to kill process");
                    return Err(SupervisorError::TerminateFailed(e));
                }
            }
        }

        Ok(())
    }

    /// PID of the live child, if any
    #[must_use]
    pub fn live_pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|_| self.pid)
    }

    /// Whether a child handle is held
    #[must_use]
    pub fn has_child(&self) -> bool {
        self.child.is_some()
    }
}
