//! Process-wide gateway metrics.
//!
//! Counters are atomic so concurrent tool calls never lose increments; the
//! whole struct is shared behind an `Arc` and reset on restart. There is no
//! persistence and no exporter, the health tool is the only reader.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Counters tracked across the life of the gateway process.
#[derive(Debug)]
pub struct Metrics {
    start_time: Instant,
    plugins_discovered: AtomicU64,
    tools_registered: AtomicU64,
    tool_calls_total: AtomicU64,
    tool_calls_success: AtomicU64,
    tool_calls_error: AtomicU64,
}

/// Point-in-time copy of the counters, serialized into the health payload.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub uptime_s: u64,
    pub plugins_discovered: u64,
    pub tools_registered: u64,
    pub tool_calls_total: u64,
    pub tool_calls_success: u64,
    pub tool_calls_error: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            plugins_discovered: AtomicU64::new(0),
            tools_registered: AtomicU64::new(0),
            tool_calls_total: AtomicU64::new(0),
            tool_calls_success: AtomicU64::new(0),
            tool_calls_error: AtomicU64::new(0),
        }
    }

    /// Record the result of a directory scan. Overwrites, does not add:
    /// re-discovery replaces the previous count.
    pub fn set_plugins_discovered(&self, count: u64) {
        self.plugins_discovered.store(count, Ordering::Relaxed);
    }

    pub fn record_tool_registered(&self) {
        self.tools_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_call(&self) {
        self.tool_calls_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.tool_calls_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.tool_calls_error.fetch_add(1, Ordering::Relaxed);
    }

    pub fn plugins_discovered(&self) -> u64 {
        self.plugins_discovered.load(Ordering::Relaxed)
    }

    pub fn tools_registered(&self) -> u64 {
        self.tools_registered.load(Ordering::Relaxed)
    }

    pub fn tool_calls_total(&self) -> u64 {
        self.tool_calls_total.load(Ordering::Relaxed)
    }

    pub fn tool_calls_success(&self) -> u64 {
        self.tool_calls_success.load(Ordering::Relaxed)
    }

    pub fn tool_calls_error(&self) -> u64 {
        self.tool_calls_error.load(Ordering::Relaxed)
    }

    /// Capture a consistent-enough view of the counters for health reporting.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_s: self.start_time.elapsed().as_secs(),
            plugins_discovered: self.plugins_discovered(),
            tools_registered: self.tools_registered(),
            tool_calls_total: self.tool_calls_total(),
            tool_calls_success: self.tool_calls_success(),
            tool_calls_error: self.tool_calls_error(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
