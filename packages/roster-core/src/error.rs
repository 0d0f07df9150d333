//! Store error types.

use thiserror::Error;

/// Record store and persistence errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Input rejected before it reached the table
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Record not found
    #[error("Record '{id}' not found in table '{table}'")]
    RecordNotFound { table: String, id: String },

    /// Lock poisoned (RwLock/Mutex poisoned)
    #[error("Lock poisoned")]
    LockPoisoned,

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timeout
    #[error("Operation timeout")]
    Timeout,

    /// Request queue is full
    #[error("Runtime overloaded: request queue at capacity {capacity}")]
    Overloaded { capacity: usize },

    /// Data corruption detected
    #[error("Data corruption detected: {0}")]
    DataCorruption(String),

    /// Disk full error during persistence
    #[error("Disk full: {0}")]
    DiskFull(String),

    /// I/O error during persistence
    #[error("I/O error: {0}")]
    IoError(String),

    /// Transient I/O error that may succeed on retry
    #[error("Transient I/O error: {0}")]
    TransientIoError(String),
}

impl StoreError {
    /// Shorthand for a validation failure.
    pub fn validation(msg: impl Into<String>) -> Self {
        StoreError::Validation(msg.into())
    }
}
