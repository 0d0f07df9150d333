//! HTTP server for the Person roster.
//!
//! Wires the Person table, its data file, the runtime loop and the HTTP API
//! together, and shuts down gracefully on Ctrl+C with a final flush.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::Parser;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

use roster_api::{Router, Server};
use roster_core::persistence::PersistenceManager;
use roster_core::{ChangeFeed, PersonTable, RosterConfig, StoreError};
use roster_runtime::Runtime;

/// Command-line arguments for the roster server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "ROSTER_PORT", default_value_t = 8080)]
    port: u16,

    /// Host address to bind to
    #[arg(long, env = "ROSTER_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Tick rate for runtime loop (Hz)
    #[arg(long, env = "ROSTER_TICKRATE", default_value_t = 60)]
    tickrate: u32,

    /// Data directory for persistence
    #[arg(long, env = "ROSTER_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Keep everything in memory; no data file is read or written
    #[arg(long, env = "ROSTER_IN_MEMORY")]
    in_memory: bool,

    /// Flush the data file every N ticks
    #[arg(long, env = "ROSTER_PERSISTENCE_INTERVAL_TICKS", default_value_t = 10)]
    persistence_interval_ticks: u32,

    /// Request timeout in milliseconds
    #[arg(long, env = "ROSTER_REQUEST_TIMEOUT_MS", default_value_t = 5000)]
    request_timeout_ms: u64,

    /// Response timeout in milliseconds
    #[arg(long, env = "ROSTER_RESPONSE_TIMEOUT_MS", default_value_t = 10000)]
    response_timeout_ms: u64,

    /// Number of change events kept for feed subscribers
    #[arg(long, env = "ROSTER_FEED_CAPACITY", default_value_t = 1024)]
    feed_capacity: usize,

    /// Longest long-poll wait granted to a feed subscriber in milliseconds
    #[arg(long, env = "ROSTER_FEED_MAX_WAIT_MS", default_value_t = 30000)]
    feed_max_wait_ms: u64,
}

impl Args {
    fn config(&self) -> RosterConfig {
        RosterConfig {
            tickrate: self.tickrate,
            persistence_interval_ticks: self.persistence_interval_ticks,
            data_dir: (!self.in_memory).then(|| self.data_dir.clone()),
            request_timeout_ms: self.request_timeout_ms,
            response_timeout_ms: self.response_timeout_ms,
            feed_capacity: self.feed_capacity,
            feed_max_wait_ms: self.feed_max_wait_ms,
            ..RosterConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = args.config();
    let table = Arc::new(PersonTable::new(Arc::new(ChangeFeed::new(
        config.feed_capacity,
    ))));

    let persistence = PersistenceManager::from_config(&config).map(Arc::new);
    if let Some(persistence) = &persistence {
        match persistence.load(&table) {
            Ok(_) => {}
            Err(StoreError::DataCorruption(msg)) => {
                tracing::error!("Data file corruption detected: {}", msg);
                bail!(
                    "refusing to start: {} is corrupt; restore it from a backup or move it away",
                    persistence.data_file_path().display()
                );
            }
            Err(e) => return Err(e).context("failed to load data file"),
        }
    }

    // Runtime thread
    let (api_tx, api_rx) = mpsc::channel(config.queue_capacity());
    let runtime = Runtime::new(table.clone(), config.clone(), api_rx)
        .spawn()
        .context("failed to spawn runtime thread")?;

    // Persistence thread
    let persistence_stop = Arc::new(AtomicBool::new(false));
    let persistence_thread = match &persistence {
        Some(persistence) => Some(spawn_persistence(
            persistence.clone(),
            table.clone(),
            config.tickrate,
            persistence_stop.clone(),
        )?),
        None => {
            tracing::warn!("Running in memory; changes are lost on exit");
            None
        }
    };

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("invalid listen address")?;
    let router = Router::new(table.clone(), Arc::new(config.clone()), api_tx);
    let server = Server::bind(addr, router)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(
        host = %args.host,
        port = args.port,
        tickrate = config.tickrate,
        data_dir = ?config.data_dir,
        records = table.len(),
        "Roster server started"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_handle = tokio::spawn(server.serve(shutdown_rx));

    signal::ctrl_c()
        .await
        .context("failed to listen for ctrl_c")?;
    tracing::info!("Shutting down server...");

    let _ = shutdown_tx.send(true);
    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("Server error: {}", e),
        Err(e) => tracing::error!("Server task failed: {}", e),
    }

    if let Err(e) = runtime.stop() {
        tracing::error!("Runtime stopped with error: {}", e);
    }

    persistence_stop.store(true, Ordering::SeqCst);
    if let Some(handle) = persistence_thread {
        if handle.join().is_err() {
            tracing::error!("Persistence thread panicked");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Flushes on the persistence interval until `stop` is set, then once more.
fn spawn_persistence(
    persistence: Arc<PersistenceManager>,
    table: Arc<PersonTable>,
    tickrate: u32,
    stop: Arc<AtomicBool>,
) -> anyhow::Result<thread::JoinHandle<()>> {
    let tick_duration = Duration::from_secs_f64(1.0 / tickrate.max(1) as f64);

    let handle = thread::Builder::new()
        .name("roster-persistence".to_string())
        .spawn(move || {
            let mut failed_flushes = 0u64;
            let mut last_metrics_log = Instant::now();

            while !stop.load(Ordering::SeqCst) {
                let tick_start = Instant::now();

                if let Err(e) = persistence.tick(&table) {
                    tracing::error!("Persistence tick failed: {}", e);
                    failed_flushes += 1;
                }

                if last_metrics_log.elapsed() > Duration::from_secs(60) {
                    tracing::info!(
                        "Persistence metrics: records={}, failed_flushes={}",
                        table.len(),
                        failed_flushes
                    );
                    last_metrics_log = Instant::now();
                }

                if let Some(remaining) = tick_duration.checked_sub(tick_start.elapsed()) {
                    thread::sleep(remaining);
                }
            }

            match persistence.flush(&table) {
                Ok(true) => tracing::info!("Final flush written"),
                Ok(false) => tracing::debug!("Nothing to flush on shutdown"),
                Err(e) => tracing::error!("Final flush failed: {}", e),
            }
        })
        .context("failed to spawn persistence thread")?;
    Ok(handle)
}
