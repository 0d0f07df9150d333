use roster_core::StoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Rejected before dispatch, or a 400 from the server.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ClientError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ClientError::Validation(_))
    }

    /// Maps an HTTP error status and envelope message to the matching variant.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 => ClientError::Validation(message),
            404 => ClientError::NotFound(message),
            _ => ClientError::Server { status, message },
        }
    }
}

impl From<StoreError> for ClientError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(msg) => ClientError::Validation(msg),
            StoreError::RecordNotFound { .. } => ClientError::NotFound(e.to_string()),
            StoreError::Overloaded { .. } => ClientError::Server {
                status: 503,
                message: e.to_string(),
            },
            StoreError::SerializationError(msg) => ClientError::SerializationError(msg),
            other => ClientError::Server {
                status: 500,
                message: other.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::ProtocolError(e.to_string())
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::SerializationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
