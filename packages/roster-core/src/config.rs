//! Server-side configuration.

use std::path::PathBuf;

/// Store, runtime and API configuration.
#[derive(Debug, Clone)]
pub struct RosterConfig {
    /// Tick rate in Hz (15-120)
    pub tickrate: u32,
    /// Persistence interval in ticks
    pub persistence_interval_ticks: u32,
    /// Maximum API requests per tick
    pub max_api_requests_per_tick: u32,
    /// Data directory for persistence (None = in-memory only)
    pub data_dir: Option<PathBuf>,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Response timeout in milliseconds
    pub response_timeout_ms: u64,
    /// Maximum retry attempts for transient I/O errors
    pub persistence_max_retries: u32,
    /// Delay between retry attempts in milliseconds
    pub persistence_retry_delay_ms: u64,
    /// Number of change events retained for long-poll catch-up
    pub feed_capacity: usize,
    /// Upper bound for a single feed long-poll in milliseconds
    pub feed_max_wait_ms: u64,
}

impl RosterConfig {
    /// Queue capacity of the runtime (requests beyond it are rejected).
    pub fn queue_capacity(&self) -> usize {
        self.tickrate as usize * 100
    }
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            tickrate: 60,
            persistence_interval_ticks: 10,
            max_api_requests_per_tick: 600,
            data_dir: Some(PathBuf::from("./data")),
            request_timeout_ms: 5000,        // 5 seconds default
            response_timeout_ms: 10000,      // 10 seconds default
            persistence_max_retries: 3,      // Default retry attempts
            persistence_retry_delay_ms: 100, // 100ms delay between retries
            feed_capacity: 1024,
            feed_max_wait_ms: 30_000,
        }
    }
}
