//! Change feed and health endpoints.

use std::time::Duration;

use hyper::{body::Bytes, Response};
use serde::Serialize;

use crate::router::{AppState, RouterError};

use super::request_utils::parse_feed_query;
use super::response::json_success;

/// Long-polls the change feed.
///
/// # Endpoint
/// `GET /feed?after={seq}&timeout_ms={ms}`
///
/// # Response
/// ```json
/// {
///   "events": [{"seq": 4, "kind": "update", "table": "Person", "recordId": "...", "atMs": 0}],
///   "cursor": 4,
///   "truncated": false,
///   "epoch": "9b2f..."
/// }
/// ```
///
/// # Notes
/// - Without `after` the call returns immediately with the current cursor
/// - With `after` it returns once events past the cursor exist, or with an
///   empty list after `timeout_ms` (capped by `feed_max_wait_ms`)
/// - `truncated` means events past the cursor were evicted; treat it as a change
/// - `epoch` changes when the server restarts; cursors from another epoch
///   must be discarded
pub async fn poll_feed(query: Option<&str>, state: AppState) -> Result<Response<Bytes>, RouterError> {
    let query = parse_feed_query(query)?;
    let feed = state.table.feed();

    let batch = match query.after {
        None => feed.handshake()?,
        Some(after) => {
            let max_wait = state.config.feed_max_wait_ms;
            let wait = query.timeout_ms.unwrap_or(max_wait).min(max_wait);
            feed.wait_since(after, Duration::from_millis(wait)).await?
        }
    };

    json_success(200, batch)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Health {
    status: &'static str,
    records: usize,
    feed_cursor: u64,
}

/// Reports liveness and table size.
///
/// # Endpoint
/// `GET /health`
pub async fn health(state: AppState) -> Result<Response<Bytes>, RouterError> {
    let health = Health {
        status: "ok",
        records: state.table.len(),
        feed_cursor: state.table.feed().head()?,
    };
    json_success(200, health)
}
