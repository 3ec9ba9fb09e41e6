//! Errors raised while handling a connection or a single frame.

use crate::store::StoreError;

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Invalid message format: {0}")]
    MalformedPayload(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Invalid room identifier: {0:?}")]
    RoomIdentifierInvalid(String),

    #[error("Missing route parameter: {0}")]
    MissingRouteParameter(&'static str),

    #[error("Message store failure: {0}")]
    Store(#[from] StoreError),
}

impl RelayError {
    /// Stable code reported to clients in error envelopes
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            RelayError::MissingField(_) => "MISSING_FIELD",
            RelayError::UnknownCommand(_) => "UNKNOWN_COMMAND",
            RelayError::UserNotFound(_) => "USER_NOT_FOUND",
            RelayError::RoomIdentifierInvalid(_) => "ROOM_IDENTIFIER_INVALID",
            RelayError::MissingRouteParameter(_) => "MISSING_ROUTE_PARAMETER",
            RelayError::Store(_) => "STORE_ERROR",
        }
    }
}
