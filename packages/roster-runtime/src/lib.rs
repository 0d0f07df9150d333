//! Tick-based runtime executing Person procedures.
//!
//! The API layer validates requests and sends them over a channel; the
//! runtime drains that channel once per tick, applies the requests to the
//! [`PersonTable`](roster_core::PersonTable) in arrival order and answers on
//! each request's oneshot sender.

mod api_handlers;
mod api_request;
mod runtime;

pub use api_handlers::ApiHandlers;
pub use api_request::ApiRequest;
pub use runtime::{Runtime, RuntimeHandle, RuntimeStats};

use roster_core::StoreError;
use tokio::sync::oneshot;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Response sender for API requests
pub type ResponseSender = oneshot::Sender<Result<serde_json::Value>>;
