//! Error types for the GraphQL transport.

use thiserror::Error;

/// Errors that can occur when talking to the GraphQL endpoint.
#[derive(Debug, Error)]
pub enum GqlError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Rate limited.
    #[error("rate limited{}", retry_after_secs.map(|s| format!(" (retry after {}s)", s)).unwrap_or_default())]
    RateLimited {
        /// Seconds to wait before retrying (from Retry-After header, optional).
        retry_after_secs: Option<u64>,
    },

    /// Non-success HTTP status.
    #[error("request failed ({status}): {body}")]
    Status { status: u16, body: String },

    /// The endpoint answered with GraphQL errors and no data.
    #[error("GraphQL error: {}", messages.join("; "))]
    Remote { messages: Vec<String> },

    /// The endpoint answered without `data` or `errors`.
    #[error("response carried no data")]
    MissingData,

    /// Invalid response from server.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl GqlError {
    /// Check if an error is transient and worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            GqlError::Http(e) => e.is_connect() || e.is_timeout(),
            GqlError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
