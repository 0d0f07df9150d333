//! Person procedure handlers.

use hyper::{body::Bytes, Method, Response};
use roster_core::{PersonDraft, PersonId};
use roster_runtime::ApiRequest;

use crate::router::{AppState, RouterError};

use super::request_utils::{
    map_store_error, parse_json_body, wait_for_response_with_timeout, UpdatePersonInput,
};
use super::response::json_success;

/// Executes a Person procedure.
///
/// # Endpoint
/// `POST /rpc/{name}` (`GET` is accepted for `person.getAll`)
///
/// # Procedures
/// - `person.getAll`: no input, returns every record in store order
/// - `person.create`: `{"firstName": "Ada", "lastName": "Lovelace", "age": 36}`,
///   returns the created record with its server id
/// - `person.update`: `{"id": "...", "data": {"field": "age", "value": 37}}`,
///   returns the updated record
///
/// # Errors
/// - **400 Bad Request**: malformed JSON, unknown field, type mismatch, malformed id
/// - **404 Not Found**: unknown procedure, or update of a missing record
/// - **405 Method Not Allowed**: mutation sent with `GET`
/// - **503 Service Unavailable**: runtime queue full
///
/// # Example
/// ```bash
/// curl -X POST http://localhost:8080/rpc/person.create \
///   -H "Content-Type: application/json" \
///   -d '{"firstName": "Ada", "lastName": "Lovelace", "age": 36}'
/// ```
pub async fn rpc(
    method: &Method,
    name: &str,
    body: Bytes,
    state: AppState,
) -> Result<Response<Bytes>, RouterError> {
    let (tx, rx) = tokio::sync::oneshot::channel();

    // Validate before dispatch; nothing malformed reaches the runtime.
    let api_request = match name {
        "person.getAll" => ApiRequest::GetAll { response: tx },
        "person.create" | "person.update" if *method != Method::POST => {
            return Err(RouterError::MethodNotAllowed);
        }
        "person.create" => ApiRequest::Create {
            draft: parse_json_body::<PersonDraft>(&body)?,
            response: tx,
        },
        "person.update" => {
            let input: UpdatePersonInput = parse_json_body(&body)?;
            ApiRequest::Update {
                id: PersonId::parse(&input.id).map_err(map_store_error)?,
                patch: input.data,
                response: tx,
            }
        }
        other => {
            return Err(RouterError::NotFound(format!(
                "Procedure '{}' not found",
                other
            )))
        }
    };
    tracing::debug!("RPC {}", api_request.name());

    state
        .api_tx
        .send(api_request)
        .await
        .map_err(|e| RouterError::InternalError(format!("Channel closed: {}", e)))?;

    let result = wait_for_response_with_timeout(rx, state.config.response_timeout_ms).await?;
    let data = result.map_err(map_store_error)?;

    json_success(200, data)
}
