//! API request types

use roster_core::{FieldPatch, PersonDraft, PersonId};

use crate::ResponseSender;

/// Validated request from the API layer
#[derive(Debug)]
pub enum ApiRequest {
    /// Return every record
    GetAll { response: ResponseSender },
    /// Insert a new record
    Create {
        draft: PersonDraft,
        response: ResponseSender,
    },
    /// Patch one field of one record
    Update {
        id: PersonId,
        patch: FieldPatch,
        response: ResponseSender,
    },
}

impl ApiRequest {
    /// Returns true if this request mutates the table.
    pub fn is_write(&self) -> bool {
        match self {
            ApiRequest::GetAll { .. } => false,
            ApiRequest::Create { .. } => true,
            ApiRequest::Update { .. } => true,
        }
    }

    /// Procedure name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ApiRequest::GetAll { .. } => "person.getAll",
            ApiRequest::Create { .. } => "person.create",
            ApiRequest::Update { .. } => "person.update",
        }
    }

    /// Consumes the request, returning its response channel.
    pub fn into_response(self) -> ResponseSender {
        match self {
            ApiRequest::GetAll { response }
            | ApiRequest::Create { response, .. }
            | ApiRequest::Update { response, .. } => response,
        }
    }
}
