// ABOUTME: Metrics and observability for the MCP process pool
//
// Tracks:
// - Requests: total, remote errors, timeouts
// - MCP processes: detected crashes, restart attempts

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Pool-level metrics
#[derive(Debug, Default)]
pub struct PoolMetrics {
    pub total_requests: AtomicU64,
    pub total_errors: AtomicU64,
    pub total_timeouts: AtomicU64,
    pub total_crashes: AtomicU64,
    pub total_restarts: AtomicU64,
}

/// Copy of the counters at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub crashes: u64,
    pub restarts: u64,
}

impl PoolMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_requests(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Any failed call, timeouts included
    pub fn increment_errors(&self) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_timeouts(&self) {
        self.total_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_crashes(&self) {
        self.total_crashes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_restarts(&self) {
        self.total_restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.total_requests.load(Ordering::Relaxed),
            errors: self.total_errors.load(Ordering::Relaxed),
            timeouts: self.total_timeouts.load(Ordering::Relaxed),
            crashes: self.total_crashes.load(Ordering::Relaxed),
            restarts: self.total_restarts.load(Ordering::Relaxed),
        }
    }
}
