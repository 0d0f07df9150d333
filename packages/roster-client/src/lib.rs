//! Client library for the Person roster.
//!
//! Keeps a cached snapshot of the Person table, applies creates and field
//! edits optimistically, confirms or rolls them back when the server answers,
//! and refetches whenever the change feed reports an out-of-band change.
//! The grid module turns the snapshot into pages of rows.

pub mod config;
pub mod error;
pub mod grid;
pub mod pending;
pub mod reconciler;
pub mod reset_guard;
pub mod session;
pub mod snapshot;
pub mod subscription;
pub mod transport;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use grid::{render, CellEditor, Column, CreateForm, EditableGrid, GridView};
pub use pending::{MutationId, MutationKind, MutationState, PendingMutation};
pub use reconciler::{Notice, NoticeKind, Reconciler};
pub use reset_guard::PageResetGuard;
pub use session::{MutationHandle, Session};
pub use snapshot::{CacheSnapshot, SnapshotOrigin};
pub use subscription::FeedSubscription;
pub use transport::{ChangeSource, HttpTransport, LocalTransport, PersonApi};

/// Re-exports from roster-core for convenience.
pub use roster_core::{FieldValue, Person, PersonDraft, PersonField, PersonId};
