//! Core storage for the Person roster.
//!
//! Provides the Person model and its field patches, the in-memory table,
//! the sequenced change feed, configuration, and data file persistence.

pub mod change_feed;
pub mod config;
pub mod error;
pub mod persistence;
pub mod person;
pub mod table;

pub use change_feed::{ChangeEvent, ChangeFeed, ChangeKind, FeedBatch};
pub use config::RosterConfig;
pub use error::StoreError;
pub use person::{FieldKind, FieldPatch, FieldValue, Person, PersonDraft, PersonField, PersonId};
pub use table::PersonTable;
