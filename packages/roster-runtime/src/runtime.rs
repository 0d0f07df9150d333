//! Runtime loop with tick timing and request rate limiting.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use roster_core::config::RosterConfig;
use roster_core::{PersonTable, StoreError};
use tokio::sync::mpsc;

use crate::api_handlers::ApiHandlers;
use crate::api_request::ApiRequest;
use crate::Result;

/// Counters exposed for monitoring and tests.
#[derive(Debug, Default)]
pub struct RuntimeStats {
    /// Requests answered since startup
    pub processed: AtomicU64,
    /// Requests rejected because the queue was full
    pub rejected: AtomicU64,
    /// Ticks executed
    pub ticks: AtomicU64,
}

/// Main runtime loop
pub struct Runtime {
    /// Configuration
    config: RosterConfig,
    /// Tick duration
    tick_duration: Duration,
    /// API request receiver
    api_rx: mpsc::Receiver<ApiRequest>,
    /// Pending requests in arrival order
    queue: VecDeque<ApiRequest>,
    /// Maximum queue capacity (tickrate * 100)
    queue_capacity: usize,
    /// API handlers
    api_handlers: ApiHandlers,
    /// Shared counters
    stats: Arc<RuntimeStats>,
}

impl Runtime {
    /// Create a new runtime
    pub fn new(
        table: Arc<PersonTable>,
        config: RosterConfig,
        api_rx: mpsc::Receiver<ApiRequest>,
    ) -> Self {
        let tickrate = config.tickrate.max(1);
        Self {
            tick_duration: Duration::from_secs_f64(1.0 / tickrate as f64),
            queue_capacity: config.queue_capacity().max(1),
            config,
            api_rx,
            queue: VecDeque::new(),
            api_handlers: ApiHandlers::new(table),
            stats: Arc::new(RuntimeStats::default()),
        }
    }

    /// Shared handle to the runtime counters.
    pub fn stats(&self) -> Arc<RuntimeStats> {
        self.stats.clone()
    }

    /// Number of requests waiting for a later tick.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Drain API channel into the queue, rejecting requests over capacity.
    fn drain_api_channel(&mut self) {
        while let Ok(req) = self.api_rx.try_recv() {
            if self.queue.len() >= self.queue_capacity {
                tracing::warn!(
                    "Rejecting {}: queue at capacity {}",
                    req.name(),
                    self.queue_capacity
                );
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                let _ = req.into_response().send(Err(StoreError::Overloaded {
                    capacity: self.queue_capacity,
                }));
                continue;
            }
            self.queue.push_back(req);
        }
    }

    /// Process queued requests up to the per-tick limit and time budget.
    fn process_queued_requests(&mut self, tick_start: Instant, time_budget: Duration) {
        let max_requests = self.config.max_api_requests_per_tick.max(1);
        let mut processed = 0;

        while processed < max_requests && tick_start.elapsed() <= time_budget {
            let Some(req) = self.queue.pop_front() else {
                break;
            };
            tracing::debug!("Dispatching {}", req.name());
            self.api_handlers.handle_api_request(req);
            processed += 1;
        }

        self.stats
            .processed
            .fetch_add(processed as u64, Ordering::Relaxed);
    }

    /// Execute one tick without sleeping.
    pub fn tick(&mut self) -> Result<()> {
        let tick_start = Instant::now();
        let api_time_budget = self.tick_duration.mul_f32(0.8);

        self.drain_api_channel();
        self.process_queued_requests(tick_start, api_time_budget);

        self.stats.ticks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Run the runtime loop until `shutdown` is set (blocking).
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        while !shutdown.load(Ordering::Acquire) {
            let tick_start = Instant::now();
            self.tick()?;
            self.sleep_remaining(tick_start);
        }
        self.drain_pending();
        tracing::info!("Runtime loop stopped");
        Ok(())
    }

    /// Answers everything still queued or in the channel, ignoring the
    /// per-tick limit.
    fn drain_pending(&mut self) {
        self.api_rx.close();
        loop {
            self.drain_api_channel();
            if self.queue.is_empty() {
                break;
            }
            self.process_queued_requests(Instant::now(), Duration::MAX);
        }
    }

    /// Moves the runtime onto its own thread.
    pub fn spawn(mut self) -> std::io::Result<RuntimeHandle> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = self.stats();
        let flag = shutdown.clone();
        let thread = thread::Builder::new()
            .name("roster-runtime".to_string())
            .spawn(move || self.run(&flag))?;
        Ok(RuntimeHandle {
            shutdown,
            stats,
            thread: Some(thread),
        })
    }

    /// Sleep remaining tick time
    fn sleep_remaining(&self, tick_start: Instant) {
        if let Some(remaining) = self.tick_duration.checked_sub(tick_start.elapsed()) {
            std::thread::sleep(remaining);
        }
    }
}

/// Owner of a runtime thread; stops it on [`RuntimeHandle::stop`] or drop.
pub struct RuntimeHandle {
    shutdown: Arc<AtomicBool>,
    stats: Arc<RuntimeStats>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl RuntimeHandle {
    pub fn stats(&self) -> &Arc<RuntimeStats> {
        &self.stats
    }

    /// Signals the loop to stop and waits for it.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::Release);
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| StoreError::IoError("runtime thread panicked".to_string()))?,
            None => Ok(()),
        }
    }
}

impl Drop for RuntimeHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
    }
}
