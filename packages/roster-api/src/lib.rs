//! HTTP API for the Person roster.
//!
//! Provides the procedure endpoints (`/rpc/{name}`), the long-poll change
//! feed (`/feed`), a health probe, request routing and the hyper server.

pub mod handlers;
pub mod router;
pub mod server;

pub use router::{AppState, Router, RouterError};
pub use server::Server;
