//! HTTP endpoint implementations.

mod feed_handlers;
pub mod request_utils;
pub mod response;
mod rpc_handlers;

pub use feed_handlers::{health, poll_feed};
pub use response::{error_response, success_response, ApiError, ApiResponse, ErrorResponse};
pub use rpc_handlers::rpc;
