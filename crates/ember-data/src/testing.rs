//! In-memory transport for unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ember_gql::{GqlError, Transport};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub document: String,
    pub variables: Value,
    pub mutation: bool,
}

type Handler = Box<dyn Fn(&str, &Value) -> Result<Value, GqlError> + Send + Sync>;

/// Records every call and answers it with a handler.
pub struct ScriptedTransport {
    handler: Handler,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new(
        handler: impl Fn(&str, &Value) -> Result<Value, GqlError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            delay: None,
        })
    }

    /// Like [`new`](Self::new) but each call takes `delay` to answer.
    pub fn with_delay(
        delay: Duration,
        handler: impl Fn(&str, &Value) -> Result<Value, GqlError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            delay: Some(delay),
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    async fn answer(&self, document: &str, variables: Value, mutation: bool) -> Result<Value, GqlError> {
        self.calls.lock().unwrap().push(RecordedCall {
            document: document.to_string(),
            variables: variables.clone(),
            mutation,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        (self.handler)(document, &variables)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn query(&self, document: &str, variables: Value) -> Result<Value, GqlError> {
        self.answer(document, variables, false).await
    }

    async fn mutate(&self, document: &str, variables: Value) -> Result<Value, GqlError> {
        self.answer(document, variables, true).await
    }
}
