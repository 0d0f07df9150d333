//! Persistence manager for the Person data file.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::RosterConfig;
use crate::error::StoreError;
use crate::table::PersonTable;

use super::data_file::{DataFile, DATA_FILE_NAME};
use super::io_utils::{classify_io_error, retry_io_operation};

/// Flushes the Person table to disk and restores it at startup.
#[derive(Debug)]
pub struct PersistenceManager {
    /// Data directory path
    data_dir: PathBuf,
    /// Flush interval in ticks
    flush_interval_ticks: u32,
    /// Current tick count
    tick_count: AtomicU64,
    /// Table revision captured by the last successful flush
    flushed_revision: AtomicU64,
    /// Maximum retry attempts for transient I/O errors
    max_retries: u32,
    /// Delay between retry attempts in milliseconds
    retry_delay_ms: u64,
}

impl PersistenceManager {
    /// Creates a manager writing into `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>, config: &RosterConfig) -> Self {
        Self {
            data_dir: data_dir.into(),
            flush_interval_ticks: config.persistence_interval_ticks.max(1),
            tick_count: AtomicU64::new(0),
            flushed_revision: AtomicU64::new(0),
            max_retries: config.persistence_max_retries,
            retry_delay_ms: config.persistence_retry_delay_ms,
        }
    }

    /// Creates a manager for the configured data directory, if any.
    pub fn from_config(config: &RosterConfig) -> Option<Self> {
        config
            .data_dir
            .as_ref()
            .map(|dir| Self::new(dir.clone(), config))
    }

    pub fn data_file_path(&self) -> PathBuf {
        self.data_dir.join(DATA_FILE_NAME)
    }

    /// Loads the data file into `table`.
    ///
    /// # Returns
    /// Number of restored records; 0 when no data file exists yet.
    pub fn load(&self, table: &PersonTable) -> Result<usize, StoreError> {
        let path = self.data_file_path();
        if !path.exists() {
            tracing::info!("No data file at {}, starting empty", path.display());
            return Ok(0);
        }

        let bytes = retry_io_operation(
            || fs::read(&path).map_err(|e| classify_io_error(e, "Failed to read data file")),
            self.max_retries,
            self.retry_delay_ms,
            "load",
        )?;
        let file = DataFile::decode(&bytes)?;
        let count = file.records.len();
        table.restore(file.records)?;
        self.flushed_revision
            .store(table.revision(), Ordering::Release);

        tracing::info!("Restored {} records from {}", count, path.display());
        Ok(count)
    }

    /// Writes the table if it changed since the last flush.
    ///
    /// # Returns
    /// `true` if a file was written.
    pub fn flush(&self, table: &PersonTable) -> Result<bool, StoreError> {
        // Revision first: a concurrent write makes the next flush run again.
        let revision = table.revision();
        if revision == self.flushed_revision.load(Ordering::Acquire) {
            return Ok(false);
        }
        let records = table.find_many();
        let file = DataFile::new(Vec::clone(&records))?;
        let bytes = file.encode()?;

        retry_io_operation(
            || write_atomically(&self.data_dir, &bytes),
            self.max_retries,
            self.retry_delay_ms,
            "flush",
        )?;
        self.flushed_revision.store(revision, Ordering::Release);
        tracing::debug!(
            "Flushed {} records at revision {}",
            records.len(),
            revision
        );
        Ok(true)
    }

    /// Advances the tick counter, flushing every `persistence_interval_ticks`.
    pub fn tick(&self, table: &PersonTable) -> Result<(), StoreError> {
        let tick = self.tick_count.fetch_add(1, Ordering::SeqCst);
        if tick % self.flush_interval_ticks as u64 == 0 {
            self.flush(table)?;
        }
        Ok(())
    }
}

/// Writes `bytes` to the data file through a temp file and rename.
fn write_atomically(data_dir: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let temp_path = data_dir.join(format!("{}.tmp", DATA_FILE_NAME));
    let final_path = data_dir.join(DATA_FILE_NAME);

    fs::create_dir_all(data_dir)
        .map_err(|e| classify_io_error(e, "Failed to create data directory"))?;

    let mut file =
        File::create(&temp_path).map_err(|e| classify_io_error(e, "Failed to create temp file"))?;
    file.write_all(bytes)
        .map_err(|e| classify_io_error(e, "Failed to write data file"))?;
    file.sync_all()
        .map_err(|e| classify_io_error(e, "Failed to sync data file"))?;

    fs::rename(&temp_path, &final_path)
        .map_err(|e| classify_io_error(e, "Failed to rename data file"))?;
    Ok(())
}
