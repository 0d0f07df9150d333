//! The Person table.

#[allow(clippy::module_inception)]
mod table;

pub use table::PersonTable;
