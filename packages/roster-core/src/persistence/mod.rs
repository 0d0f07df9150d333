//! Data file flush/load and recovery for the Person table.

mod data_file;
mod io_utils;
mod persistence_manager;

pub use data_file::{DataFile, DATA_FILE_FORMAT, DATA_FILE_NAME};
pub use io_utils::{classify_io_error, retry_io_operation};
pub use persistence_manager::PersistenceManager;
