//! Error types for entity lookups.

use std::sync::Arc;

use ember_gql::GqlError;
use thiserror::Error;

/// Errors returned by [`EntityService`](crate::EntityService) and the batchers.
///
/// Cloneable so that a single transport failure can be delivered to every
/// waiter of a batch cycle as the same error object.
#[derive(Debug, Clone, Error)]
pub enum DataError {
    /// Neither or both of id/login were supplied.
    #[error("invalid key: exactly one of id or login must be provided")]
    InvalidKey,

    /// Argument did not satisfy the operation's contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(Arc<GqlError>),

    /// A mutation succeeded at the transport level but reported an error code.
    #[error("{operation} failed: {code}")]
    Application { operation: String, code: String },

    /// The response did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// The batch fetcher panicked while this key was in flight.
    #[error("{kind} batch aborted by a panic")]
    Panicked { kind: &'static str },

    /// The batcher was dropped before the waiter was resolved.
    #[error("lookup dropped before completion")]
    Dropped,
}

impl From<GqlError> for DataError {
    fn from(err: GqlError) -> Self {
        DataError::Transport(Arc::new(err))
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::Decode(err.to_string())
    }
}

impl DataError {
    /// The application error code, if this is an application error.
    pub fn code(&self) -> Option<&str> {
        match self {
            DataError::Application { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Check if this error came from the transport.
    pub fn is_transport(&self) -> bool {
        matches!(self, DataError::Transport(_))
    }
}
