//! Batch fetchers for each entity kind.

use std::sync::Arc;

use async_trait::async_trait;
use ember_gql::Transport;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::warn;

use crate::batcher::BatchFetcher;
use crate::queries;
use crate::tags::{RawTag, TagCache, TagRecord};
use crate::types::{ChannelStream, Stream, User};
use crate::{DataError, LookupKey};

/// Key list as a GraphQL variable; an empty list is sent as null.
fn list_or_null(keys: &[String]) -> Value {
    if keys.is_empty() {
        Value::Null
    } else {
        json!(keys)
    }
}

/// Decode each node on its own. Null and malformed nodes are dropped so
/// the rest of the batch still resolves.
pub(crate) fn decode_nodes<T: DeserializeOwned>(kind: &str, nodes: Vec<Value>) -> Vec<T> {
    nodes
        .into_iter()
        .filter(|node| !node.is_null())
        .filter_map(|node| match serde_json::from_value(node) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(kind, error = %err, "skipping malformed node");
                None
            }
        })
        .collect()
}

#[derive(Deserialize)]
struct UsersData {
    #[serde(default)]
    users: Vec<Value>,
}

#[derive(Deserialize)]
struct StreamNode {
    id: String,
    login: String,
    #[serde(default)]
    stream: Option<Stream>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentTagsData {
    #[serde(default)]
    content_tags: Vec<Value>,
}

/// Resolves users by id and login.
pub struct UserFetcher {
    transport: Arc<dyn Transport>,
}

impl UserFetcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl BatchFetcher for UserFetcher {
    type Value = User;

    fn kind(&self) -> &'static str {
        "user"
    }

    async fn fetch(&self, ids: &[String], logins: &[String]) -> Result<Vec<User>, DataError> {
        let data = self
            .transport
            .query(
                queries::USER_BATCH,
                json!({ "ids": list_or_null(ids), "logins": list_or_null(logins) }),
            )
            .await?;

        let data: UsersData = serde_json::from_value(data)?;
        Ok(decode_nodes(self.kind(), data.users))
    }

    fn matches(&self, value: &User, key: &LookupKey) -> bool {
        match key {
            LookupKey::Id(id) => &value.id == id,
            LookupKey::Login(login) => &value.login == login,
        }
    }
}

/// Resolves live streams by channel id and login.
///
/// Channels that exist but are offline are left out of the result.
pub struct StreamFetcher {
    transport: Arc<dyn Transport>,
}

impl StreamFetcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl BatchFetcher for StreamFetcher {
    type Value = ChannelStream;

    fn kind(&self) -> &'static str {
        "stream"
    }

    async fn fetch(
        &self,
        ids: &[String],
        logins: &[String],
    ) -> Result<Vec<ChannelStream>, DataError> {
        let data = self
            .transport
            .query(
                queries::STREAM_BATCH,
                json!({ "ids": list_or_null(ids), "logins": list_or_null(logins) }),
            )
            .await?;

        let data: UsersData = serde_json::from_value(data)?;
        Ok(decode_nodes::<StreamNode>(self.kind(), data.users)
            .into_iter()
            .filter_map(|node| {
                node.stream.map(|stream| ChannelStream {
                    channel_id: node.id,
                    channel_login: node.login,
                    stream,
                })
            })
            .collect())
    }

    fn matches(&self, value: &ChannelStream, key: &LookupKey) -> bool {
        match key {
            LookupKey::Id(id) => &value.channel_id == id,
            LookupKey::Login(login) => &value.channel_login == login,
        }
    }
}

/// Resolves tags by id, merging every node into the shared cache.
pub struct TagFetcher {
    transport: Arc<dyn Transport>,
    cache: Arc<TagCache>,
}

impl TagFetcher {
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<TagCache>) -> Self {
        Self { transport, cache }
    }
}

#[async_trait]
impl BatchFetcher for TagFetcher {
    type Value = TagRecord;

    fn kind(&self) -> &'static str {
        "tag"
    }

    async fn fetch(&self, ids: &[String], _logins: &[String]) -> Result<Vec<TagRecord>, DataError> {
        let data = self
            .transport
            .query(queries::TAG_BATCH, json!({ "ids": list_or_null(ids) }))
            .await?;

        let data: ContentTagsData = serde_json::from_value(data)?;
        Ok(decode_nodes::<RawTag>(self.kind(), data.content_tags)
            .iter()
            .filter_map(|raw| self.cache.memorize(raw))
            .collect())
    }

    fn matches(&self, value: &TagRecord, key: &LookupKey) -> bool {
        key.id() == Some(value.id.as_str())
    }
}
