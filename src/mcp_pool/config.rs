// ABOUTME: Tunables for the MCP process pool
//
// Defines PoolConfig with the timing parameters the pool runs on:
// - Request deadline for every JSON-RPC call
// - Monitor polling interval and restart ceiling
// - Restart backoff base and cap
// - Grace period between SIGTERM and SIGKILL

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::process_supervisor::ExponentialBackoff;

/// Configuration for the MCP process pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    // === Requests ===
    /// Deadline for a single request/response exchange
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,

    // === Health & Restart ===
    /// Interval between process liveness checks
    #[serde(with = "duration_secs")]
    pub health_check_interval: Duration,

    /// Consecutive failures after which a process is left failed
    pub max_failures: u32,

    /// Restart backoff unit, multiplied by `2^failures`
    #[serde(with = "duration_secs")]
    pub restart_backoff_base: Duration,

    /// Restart backoff cap
    #[serde(with = "duration_secs")]
    pub restart_backoff_max: Duration,

    /// Reset the failure counter once a process has stayed up this long.
    /// Disabled when unset.
    #[serde(
        with = "option_duration_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub failure_reset_after: Option<Duration>,

    // === Shutdown ===
    /// Wait between SIGTERM and SIGKILL
    #[serde(with = "duration_secs")]
    pub shutdown_grace: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),

            health_check_interval: Duration::from_secs(10),
            max_failures: 5,
            restart_backoff_base: Duration::from_secs(1),
            restart_backoff_max: Duration::from_secs(30),
            failure_reset_after: None,

            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub const fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.restart_backoff_base, self.restart_backoff_max)
    }
}

/// Serde helper for Duration as seconds (u64)
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde helper for `Option<Duration>` as seconds
mod option_duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    #[allow(clippy::ref_option)]
    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_secs()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
