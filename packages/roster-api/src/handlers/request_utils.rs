//! Request utilities for HTTP endpoints.

use http_body_util::BodyExt;
use hyper::{body::Bytes, Request, Response};
use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::oneshot;
use tokio::time;

use crate::router::RouterError;
use roster_core::{FieldPatch, StoreError};

/// Helper function to read request body with timeout
pub async fn read_request_body_with_timeout<B>(
    req: Request<B>,
    timeout_ms: u64,
) -> Result<Bytes, RouterError>
where
    B: hyper::body::Body,
    B::Error: std::fmt::Display,
{
    let timeout_duration = time::Duration::from_millis(timeout_ms);
    let body = time::timeout(timeout_duration, req.into_body().collect())
        .await
        .map_err(|_| RouterError::Timeout)?
        .map_err(|e| RouterError::InternalError(format!("Failed to read request body: {}", e)))?;
    Ok(body.to_bytes())
}

/// Helper function to wait for response with timeout
pub async fn wait_for_response_with_timeout<T>(
    rx: oneshot::Receiver<T>,
    timeout_ms: u64,
) -> Result<T, RouterError> {
    let timeout_duration = time::Duration::from_millis(timeout_ms);
    time::timeout(timeout_duration, rx)
        .await
        .map_err(|_| RouterError::Timeout)?
        .map_err(|e| RouterError::InternalError(format!("Response channel closed: {}", e)))
}

/// Map StoreError to the matching RouterError
pub fn map_store_error(e: StoreError) -> RouterError {
    match e {
        StoreError::Validation(msg) => RouterError::BadRequest(msg),
        StoreError::RecordNotFound { .. } => RouterError::NotFound(e.to_string()),
        StoreError::Timeout => RouterError::Timeout,
        StoreError::Overloaded { .. } => RouterError::Unavailable(e.to_string()),
        _ => RouterError::InternalError(format!("Runtime error: {}", e)),
    }
}

impl From<StoreError> for RouterError {
    fn from(e: StoreError) -> Self {
        map_store_error(e)
    }
}

/// Parses a JSON request body, reporting malformed input as 400.
pub fn parse_json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, RouterError> {
    if body.is_empty() {
        return Err(RouterError::BadRequest("Missing request body".to_string()));
    }
    serde_json::from_slice(body)
        .map_err(|e| RouterError::BadRequest(format!("Invalid input: {}", e)))
}

/// Input of `person.update`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePersonInput {
    /// Server-assigned record id
    pub id: String,
    /// Single-field patch
    pub data: FieldPatch,
}

/// Query string of `GET /feed`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FeedQuery {
    /// Cursor from the previous poll; absent for the handshake
    pub after: Option<u64>,
    /// Requested long-poll wait
    pub timeout_ms: Option<u64>,
}

/// Parse the feed query string.
pub fn parse_feed_query(query_str: Option<&str>) -> Result<FeedQuery, RouterError> {
    let mut query = FeedQuery::default();
    let Some(query_str) = query_str else {
        return Ok(query);
    };

    for pair in query_str.split('&').filter(|p| !p.is_empty()) {
        let Some((key, encoded_value)) = pair.split_once('=') else {
            continue;
        };
        let value = percent_decode_str(encoded_value).decode_utf8_lossy();
        let parse = |name: &str| {
            value.parse::<u64>().map_err(|e| {
                RouterError::BadRequest(format!("Invalid {} value '{}': {}", name, value, e))
            })
        };
        match key {
            "after" => query.after = Some(parse("after")?),
            "timeout_ms" => query.timeout_ms = Some(parse("timeout_ms")?),
            _ => {}
        }
    }
    Ok(query)
}

/// Helper to build HTTP response with proper error handling
pub fn build_response(status: u16, json: Vec<u8>) -> Result<Response<Bytes>, RouterError> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Bytes::from(json))
        .map_err(|e| RouterError::InternalError(format!("Failed to build response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feed_query() {
        assert_eq!(parse_feed_query(None).unwrap(), FeedQuery::default());
        assert_eq!(
            parse_feed_query(Some("after=12&timeout_ms=250&x=y")).unwrap(),
            FeedQuery {
                after: Some(12),
                timeout_ms: Some(250)
            }
        );
        assert!(parse_feed_query(Some("after=-1")).is_err());
    }

    #[test]
    fn test_map_store_error_statuses() {
        assert!(matches!(
            map_store_error(StoreError::validation("bad")),
            RouterError::BadRequest(_)
        ));
        assert!(matches!(
            map_store_error(StoreError::RecordNotFound {
                table: "Person".into(),
                id: "x".into()
            }),
            RouterError::NotFound(_)
        ));
        assert!(matches!(
            map_store_error(StoreError::Overloaded { capacity: 1 }),
            RouterError::Unavailable(_)
        ));
        assert!(matches!(
            map_store_error(StoreError::LockPoisoned),
            RouterError::InternalError(_)
        ));
    }

    #[test]
    fn test_update_input_rejects_bad_patch() {
        let body = Bytes::from_static(br#"{"id":"x","data":{"field":"age","value":"41"}}"#);
        assert!(matches!(
            parse_json_body::<UpdatePersonInput>(&body),
            Err(RouterError::BadRequest(_))
        ));
        assert!(matches!(
            parse_json_body::<UpdatePersonInput>(&Bytes::new()),
            Err(RouterError::BadRequest(_))
        ));
    }
}
