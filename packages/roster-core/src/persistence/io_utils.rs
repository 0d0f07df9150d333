//! I/O helpers for persistence.

use std::io::ErrorKind;
use std::time::Duration;

use crate::error::StoreError;

/// Maps an I/O error onto the store's error taxonomy.
pub fn classify_io_error(error: std::io::Error, context: &str) -> StoreError {
    let message = format!("{}: {}", context, error);
    match error.kind() {
        ErrorKind::StorageFull | ErrorKind::OutOfMemory => StoreError::DiskFull(message),
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => {
            StoreError::TransientIoError(message)
        }
        _ => StoreError::IoError(message),
    }
}

/// Runs `operation`, retrying transient I/O failures up to `max_retries` times.
pub fn retry_io_operation<F, T>(
    mut operation: F,
    max_retries: u32,
    retry_delay_ms: u64,
    context: &str,
) -> Result<T, StoreError>
where
    F: FnMut() -> Result<T, StoreError>,
{
    let mut attempt = 0;
    loop {
        match operation() {
            Err(StoreError::TransientIoError(msg)) if attempt < max_retries => {
                attempt += 1;
                tracing::warn!(
                    "Transient I/O error in {} (attempt {}/{}): {}",
                    context,
                    attempt,
                    max_retries,
                    msg
                );
                if retry_delay_ms > 0 {
                    std::thread::sleep(Duration::from_millis(retry_delay_ms));
                }
            }
            result => return result,
        }
    }
}
