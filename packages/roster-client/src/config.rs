//! Client configuration.

use std::time::Duration;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL, e.g. `http://127.0.0.1:8080`
    pub base_url: String,
    /// Timeout for procedure calls in milliseconds
    pub request_timeout_ms: u64,
    /// Long-poll wait requested from the change feed in milliseconds
    pub feed_wait_ms: u64,
    /// Delay before retrying a failed feed poll in milliseconds
    pub retry_delay_ms: u64,
    /// Rows per grid page
    pub page_size: usize,
    /// Re-apply still-pending optimistic mutations on top of every fetched snapshot.
    /// Off by default: a refetch replaces the snapshot wholesale.
    pub reapply_pending_on_refetch: bool,
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn feed_wait(&self) -> Duration {
        Duration::from_millis(self.feed_wait_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            request_timeout_ms: 5000,
            feed_wait_ms: 25000,
            retry_delay_ms: 1000,
            page_size: 10,
            reapply_pending_on_refetch: false,
        }
    }
}
