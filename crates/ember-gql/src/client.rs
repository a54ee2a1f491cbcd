//! GraphQL client implementation.

use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::{GqlConfig, GqlError};

/// Executes GraphQL documents against a remote endpoint.
///
/// Both methods return the `data` member of a successful response. Any
/// error (network, protocol or a remote GraphQL error with no data) is
/// returned as a [`GqlError`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run a query document.
    async fn query(&self, document: &str, variables: Value) -> Result<Value, GqlError>;

    /// Run a mutation document.
    async fn mutate(&self, document: &str, variables: Value) -> Result<Value, GqlError>;
}

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: &'a Value,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorEntry {
    message: String,
}

/// HTTP client for the GraphQL endpoint.
pub struct GqlClient {
    http: Client,
    config: GqlConfig,
}

impl GqlClient {
    /// Create a new client from the given config.
    pub fn new(config: GqlConfig) -> Self {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .expect("failed to build HTTP client");

        Self { http, config }
    }

    /// Get the endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Run a document, retrying transient failures up to `retries` extra times.
    async fn execute(
        &self,
        document: &str,
        variables: Value,
        retries: u32,
    ) -> Result<Value, GqlError> {
        let request = GraphQlRequest {
            query: document,
            variables: &variables,
        };

        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(4),
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            let result = self.send_once(&request).await;

            match result {
                Err(ref e) if e.is_transient() && attempt < retries => {
                    let wait = backoff.next_backoff().unwrap_or(backoff.max_interval);
                    attempt += 1;
                    warn!(
                        attempt,
                        backoff_ms = wait.as_millis() as u64,
                        error = %e,
                        "transient GraphQL error, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                _ => return result,
            }
        }
    }

    async fn send_once(&self, request: &GraphQlRequest<'_>) -> Result<Value, GqlError> {
        let mut builder = self
            .http
            .post(&self.config.endpoint)
            .header("Client-ID", &self.config.client_id)
            .json(request);

        if let Some(token) = &self.config.oauth_token {
            builder = builder.header("Authorization", format!("OAuth {}", token));
        }

        let response = builder.send().await?;
        self.handle_response(response).await
    }

    async fn handle_response(&self, response: reqwest::Response) -> Result<Value, GqlError> {
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(GqlError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            let body = response.text().await.map_err(|e| {
                GqlError::InvalidResponse(format!(
                    "request failed ({}): failed to read response: {}",
                    status, e
                ))
            })?;
            return Err(GqlError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let body: GraphQlResponse = serde_json::from_str(&text)?;
        let messages: Vec<String> = body.errors.into_iter().map(|e| e.message).collect();

        match body.data {
            Some(data) if !data.is_null() => {
                if !messages.is_empty() {
                    warn!(errors = ?messages, "GraphQL response carried partial errors");
                }
                trace!("GraphQL response received");
                Ok(data)
            }
            _ if !messages.is_empty() => Err(GqlError::Remote { messages }),
            _ => Err(GqlError::MissingData),
        }
    }
}

#[async_trait]
impl Transport for GqlClient {
    async fn query(&self, document: &str, variables: Value) -> Result<Value, GqlError> {
        debug!(endpoint = %self.config.endpoint, "executing query");
        self.execute(document, variables, self.config.max_retries)
            .await
    }

    async fn mutate(&self, document: &str, variables: Value) -> Result<Value, GqlError> {
        debug!(endpoint = %self.config.endpoint, "executing mutation");
        self.execute(document, variables, 0).await
    }
}
