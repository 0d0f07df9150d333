//! Integration test suite for the record store.
//!
//! 1. Persistence round trips and corruption handling
//! 2. Store and change feed working together

pub mod end_to_end_tests;
pub mod persistence_tests;
