//! API request handlers

use std::sync::Arc;

use roster_core::{PersonTable, StoreError};
use serde::Serialize;
use serde_json::Value;

use crate::api_request::ApiRequest;
use crate::Result;

/// Executes API requests against the Person table
pub struct ApiHandlers {
    /// Table instance
    table: Arc<PersonTable>,
}

impl ApiHandlers {
    /// Create new API handlers
    pub fn new(table: Arc<PersonTable>) -> Self {
        Self { table }
    }

    /// Handle API request, answering on its response channel
    pub fn handle_api_request(&self, req: ApiRequest) {
        let (result, response) = match req {
            ApiRequest::GetAll { response } => {
                let records = self.table.find_many();
                tracing::debug!("Listing {} records", records.len());
                (to_json(&*records), response)
            }
            ApiRequest::Create { draft, response } => {
                tracing::info!(
                    "Creating {} {} {}",
                    self.table.name,
                    draft.first_name,
                    draft.last_name
                );
                (self.table.create(draft).and_then(|p| to_json(&p)), response)
            }
            ApiRequest::Update {
                id,
                patch,
                response,
            } => {
                tracing::info!(
                    "Updating {} {} field {}",
                    self.table.name,
                    id,
                    patch.field()
                );
                let result = self.table.update(&id, &patch);
                if let Err(e) = &result {
                    tracing::warn!("Update of {} failed: {}", id, e);
                }
                (result.and_then(|p| to_json(&p)), response)
            }
        };
        // The caller may have timed out and dropped its receiver.
        let _ = response.send(result);
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| StoreError::SerializationError(e.to_string()))
}
