//! Transport configuration.

use std::time::Duration;

/// Public GraphQL endpoint of the streaming site.
pub const DEFAULT_ENDPOINT: &str = "https://gql.twitch.tv/gql";

/// Connection settings for [`GqlClient`](crate::GqlClient).
#[derive(Debug, Clone)]
pub struct GqlConfig {
    /// GraphQL endpoint URL.
    pub endpoint: String,
    /// Value of the `Client-ID` header.
    pub client_id: String,
    /// OAuth token sent as `Authorization: OAuth <token>` when present.
    pub oauth_token: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Extra attempts for queries that fail transiently. Mutations are never retried.
    pub max_retries: u32,
}

impl GqlConfig {
    /// Config for the given endpoint with default timeouts.
    pub fn new(endpoint: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client_id: client_id.into(),
            ..Default::default()
        }
    }

    pub fn with_oauth_token(mut self, token: impl Into<String>) -> Self {
        self.oauth_token = Some(token.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

impl Default for GqlConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            client_id: String::new(),
            oauth_token: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}
