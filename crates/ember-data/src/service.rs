//! Entity lookup façade.
//!
//! [`EntityService`] owns one batcher per entity kind plus the tag cache and
//! is the only type callers need. User, stream and tag reads go through the
//! batchers; searches, one-off reads and mutations call the transport directly.

use std::sync::Arc;

use ember_gql::Transport;
use futures_util::future::join_all;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use crate::batcher::{Batcher, PendingCounts};
use crate::fetchers::{StreamFetcher, TagFetcher, UserFetcher, decode_nodes};
use crate::queries;
use crate::tags::{RawTag, TagCache, TagRecord, TagRef};
use crate::types::{Category, ChannelStream, FollowInfo, Paginated, Poll, PollOptions, User};
use crate::{DataError, LoaderConfig, LookupKey};

/// Callback for [`EntityService::get_tag_immediate`]: `(id, record, error)`.
pub type TagCallback = Box<dyn FnOnce(String, Option<TagRecord>, Option<DataError>) + Send>;

/// Callback for [`EntityService::languages_from_tags`].
pub type LanguagesCallback = Box<dyn FnOnce(Vec<String>) + Send>;

/// Pending keys per entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingSummary {
    pub users: PendingCounts,
    pub streams: PendingCounts,
    pub tags: PendingCounts,
}

#[derive(Deserialize)]
struct ApplicationError {
    code: String,
}

#[derive(Deserialize)]
struct FollowPayload {
    #[serde(default)]
    error: Option<ApplicationError>,
    #[serde(default)]
    follow: Option<FollowInfo>,
}

#[derive(Deserialize)]
struct PollPayload {
    #[serde(default)]
    error: Option<ApplicationError>,
    #[serde(default)]
    poll: Option<Poll>,
}

#[derive(Deserialize)]
struct IdNode {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastNode {
    #[serde(default)]
    last_broadcast: Option<IdNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ColorNode {
    #[serde(default)]
    primary_color_hex: Option<String>,
}

#[derive(Deserialize)]
struct FollowedNode {
    #[serde(rename = "self", default)]
    relationship: Option<Relationship>,
}

#[derive(Deserialize)]
struct Relationship {
    #[serde(default)]
    follower: Option<FollowInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection {
    #[serde(default)]
    total_count: Option<u64>,
    #[serde(default)]
    page_info: Option<PageInfo>,
    #[serde(default)]
    edges: Vec<Edge>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    has_next_page: bool,
}

#[derive(Deserialize)]
struct Edge {
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default)]
    node: Value,
}

impl Connection {
    /// Nodes are decoded one by one; a malformed node is left out of the page
    /// without affecting its cursor.
    fn into_page<T: DeserializeOwned>(self, kind: &str) -> Paginated<T> {
        let has_next = self.page_info.is_some_and(|p| p.has_next_page);
        let cursor = if has_next {
            self.edges.last().and_then(|e| e.cursor.clone())
        } else {
            None
        };

        Paginated {
            finished: cursor.is_none(),
            cursor,
            items: decode_nodes(kind, self.edges.into_iter().map(|e| e.node).collect()),
            count: self.total_count,
        }
    }
}

/// Take `field` out of a response's data and decode it. A missing or null field is `None`.
fn take_field<T: DeserializeOwned>(mut data: Value, field: &str) -> Result<Option<T>, DataError> {
    let value = data.get_mut(field).map(Value::take).unwrap_or(Value::Null);
    Ok(serde_json::from_value(value)?)
}

fn check_application_error(
    operation: &str,
    error: Option<ApplicationError>,
) -> Result<(), DataError> {
    match error {
        Some(error) => Err(DataError::Application {
            operation: operation.to_string(),
            code: error.code,
        }),
        None => Ok(()),
    }
}

fn poll_result(operation: &str, payload: Option<PollPayload>) -> Result<Option<Poll>, DataError> {
    let Some(payload) = payload else {
        return Ok(None);
    };
    check_application_error(operation, payload.error)?;
    Ok(payload.poll)
}

fn key_variables(key: &LookupKey) -> Value {
    json!({ "id": key.id(), "login": key.login() })
}

fn require_query(query: &str) -> Result<(), DataError> {
    if query.trim().is_empty() {
        return Err(DataError::InvalidArgument(
            "search query must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Move entries whose primary or display name equals `query` (ignoring case)
/// to the front, keeping relative order otherwise.
fn promote_exact<T>(items: &mut [T], query: &str, names: impl Fn(&T) -> (&str, Option<&str>)) {
    let query = query.to_lowercase();
    items.sort_by_key(|item| {
        let (primary, display) = names(item);
        let exact = primary.to_lowercase() == query
            || display.is_some_and(|d| d.to_lowercase() == query);
        !exact
    });
}

/// Runtime for background lookups. Every detached task goes through here.
fn background_runtime() -> Result<Handle, DataError> {
    Handle::try_current().map_err(|_| {
        DataError::InvalidArgument("background lookups need a tokio runtime".to_string())
    })
}

/// Entity lookups for one application session. Cheap to clone.
#[derive(Clone)]
pub struct EntityService {
    transport: Arc<dyn Transport>,
    users: Batcher<UserFetcher>,
    streams: Batcher<StreamFetcher>,
    tags: Batcher<TagFetcher>,
    tag_cache: Arc<TagCache>,
    config: LoaderConfig,
}

impl EntityService {
    /// Create a service with default batching.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, LoaderConfig::default())
    }

    pub fn with_config(transport: Arc<dyn Transport>, config: LoaderConfig) -> Self {
        let tag_cache = Arc::new(TagCache::new());

        Self {
            users: Batcher::new(
                UserFetcher::new(Arc::clone(&transport)),
                config.batch_size,
                config.debounce,
            ),
            streams: Batcher::new(
                StreamFetcher::new(Arc::clone(&transport)),
                config.batch_size,
                config.debounce,
            ),
            tags: Batcher::new(
                TagFetcher::new(Arc::clone(&transport), Arc::clone(&tag_cache)),
                config.batch_size,
                config.debounce,
            ),
            transport,
            tag_cache,
            config,
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn pending(&self) -> PendingSummary {
        PendingSummary {
            users: self.users.pending(),
            streams: self.streams.pending(),
            tags: self.tags.pending(),
        }
    }

    // =========================================================================
    // Batched lookups
    // =========================================================================

    /// Look up a user by id or login. Resolves to `None` if no such user exists.
    pub async fn get_user(
        &self,
        id: Option<&str>,
        login: Option<&str>,
    ) -> Result<Option<User>, DataError> {
        let key = LookupKey::from_parts(id, login)?;
        self.users.load(key).await
    }

    /// Look up a channel's live stream. Resolves to `None` when offline or unknown.
    pub async fn get_stream_meta(
        &self,
        id: Option<&str>,
        login: Option<&str>,
    ) -> Result<Option<ChannelStream>, DataError> {
        let key = LookupKey::from_parts(id, login)?;
        self.streams.load(key).await
    }

    // =========================================================================
    // Tags
    // =========================================================================

    /// Number of cached tags.
    pub fn tag_count(&self) -> usize {
        self.tag_cache.len()
    }

    /// Look up a tag, serving from the cache when the cached record is sufficient.
    pub async fn get_tag<T: TagRef + ?Sized>(
        &self,
        tag: &T,
        want_description: bool,
    ) -> Result<Option<TagRecord>, DataError> {
        let id = tag.tag_id();
        if id.is_empty() {
            return Err(DataError::InvalidKey);
        }

        if let Some(record) = self.tag_cache.get(id) {
            if record.satisfies(want_description) {
                trace!(id, "tag cache hit");
                return Ok(Some(record));
            }
        }

        self.tags.load(LookupKey::Id(id.to_string())).await
    }

    /// Read the cache without waiting.
    ///
    /// Returns whatever is cached, possibly incomplete. When the cached record
    /// is missing or insufficient and a callback is given, the tag is fetched
    /// in the background and the callback runs exactly once with the outcome.
    pub fn get_tag_immediate<T: TagRef + ?Sized>(
        &self,
        tag: &T,
        callback: Option<TagCallback>,
        want_description: bool,
    ) -> Option<TagRecord> {
        let id = tag.tag_id().to_string();
        let cached = self.tag_cache.get(&id);

        if cached.as_ref().is_some_and(|r| r.satisfies(want_description)) {
            return cached;
        }

        if let Some(callback) = callback {
            match background_runtime() {
                Ok(handle) => {
                    let service = self.clone();
                    handle.spawn(async move {
                        match service.get_tag(id.as_str(), want_description).await {
                            Ok(record) => callback(id, record, None),
                            Err(err) => callback(id, None, Some(err)),
                        }
                    });
                }
                Err(err) => {
                    warn!(id, "no async runtime for background tag lookup");
                    callback(id, None, Some(err));
                }
            }
        }

        cached
    }

    /// Merge a raw tag node into the cache.
    ///
    /// With `dispatch`, a now-complete record is handed to every caller
    /// waiting on that tag so no batch query is needed for them.
    pub fn memorize_tag(&self, raw: &RawTag, dispatch: bool) -> Option<TagRecord> {
        let record = self.tag_cache.memorize(raw)?;

        if dispatch && record.is_complete() {
            let notified = self
                .tags
                .resolve(&LookupKey::Id(record.id.clone()), record.clone());
            if notified > 0 {
                debug!(id = %record.id, notified, "resolved pending tag lookups from cache");
            }
        }

        Some(record)
    }

    /// Fetch the top `limit` tags, caching each one.
    #[tracing::instrument(skip(self))]
    pub async fn get_top_tags(&self, limit: u32) -> Result<Vec<TagRecord>, DataError> {
        let data = self
            .transport
            .query(queries::TOP_TAGS, json!({ "limit": limit }))
            .await?;

        let nodes: Vec<Value> = take_field(data, "topTags")?.unwrap_or_default();
        Ok(decode_nodes::<RawTag>("tag", nodes)
            .iter()
            .filter_map(|raw| self.memorize_tag(raw, true))
            .collect())
    }

    /// Search tags by name, caching each result.
    #[tracing::instrument(skip(self))]
    pub async fn matching_tags(
        &self,
        query: &str,
        locale: Option<&str>,
        category_only: bool,
    ) -> Result<Paginated<TagRecord>, DataError> {
        require_query(query)?;

        let (document, field) = if category_only {
            (queries::SEARCH_CATEGORY_TAGS, "searchCategoryTags")
        } else {
            (queries::SEARCH_LIVE_TAGS, "searchLiveTags")
        };

        let data = self
            .transport
            .query(document, json!({ "query": query, "locale": locale }))
            .await?;

        let nodes: Vec<Value> = take_field(data, field)?.unwrap_or_default();
        let tags = decode_nodes::<RawTag>("tag", nodes)
            .iter()
            .filter_map(|raw| self.memorize_tag(raw, true))
            .collect();
        Ok(Paginated::complete(tags))
    }

    /// Language codes of the cached language tags among `ids`.
    ///
    /// Tags that are not cached yet are fetched in the background; once all
    /// of them have answered, `callback` receives the recomputed list.
    pub fn languages_from_tags(
        &self,
        ids: &[String],
        callback: Option<LanguagesCallback>,
    ) -> Vec<String> {
        let languages = self.cached_languages(ids);

        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !id.is_empty() && !self.tag_cache.contains(id))
            .cloned()
            .collect();

        if let Some(callback) = callback.filter(|_| !missing.is_empty()) {
            let handle = match background_runtime() {
                Ok(handle) => handle,
                Err(err) => {
                    warn!(error = %err, "no async runtime for language refresh");
                    return languages;
                }
            };

            let service = self.clone();
            let ids = ids.to_vec();
            handle.spawn(async move {
                let lookups = missing.iter().map(|id| service.get_tag(id.as_str(), false));
                for result in join_all(lookups).await {
                    if let Err(err) = result {
                        warn!(error = %err, "tag lookup for language refresh failed");
                    }
                }

                tokio::time::sleep(service.config.language_debounce).await;
                callback(service.cached_languages(&ids));
            });
        }

        languages
    }

    fn cached_languages(&self, ids: &[String]) -> Vec<String> {
        let mut languages: Vec<String> = Vec::new();
        for id in ids {
            if let Some(language) = self.tag_cache.get(id).and_then(|t| t.language) {
                if !languages.contains(&language) {
                    languages.push(language);
                }
            }
        }
        languages
    }

    // =========================================================================
    // Direct lookups
    // =========================================================================

    async fn query_user<T: DeserializeOwned>(
        &self,
        document: &str,
        key: &LookupKey,
    ) -> Result<Option<T>, DataError> {
        let data = self.transport.query(document, key_variables(key)).await?;
        take_field(data, "user")
    }

    /// Look up a category by id or name.
    #[tracing::instrument(skip(self))]
    pub async fn get_category(
        &self,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Option<Category>, DataError> {
        let key = LookupKey::from_parts(id, name)?;
        let data = self
            .transport
            .query(
                queries::CATEGORY,
                json!({ "id": key.id(), "name": key.login() }),
            )
            .await?;
        take_field(data, "game")
    }

    /// Id of the channel's most recent broadcast.
    #[tracing::instrument(skip(self))]
    pub async fn get_broadcast_id(
        &self,
        id: Option<&str>,
        login: Option<&str>,
    ) -> Result<Option<String>, DataError> {
        let key = LookupKey::from_parts(id, login)?;
        let node: Option<BroadcastNode> = self.query_user(queries::BROADCAST_ID, &key).await?;
        Ok(node.and_then(|n| n.last_broadcast).and_then(|b| b.id))
    }

    /// The channel's primary color as a hex string without `#`.
    #[tracing::instrument(skip(self))]
    pub async fn get_channel_color(
        &self,
        id: Option<&str>,
        login: Option<&str>,
    ) -> Result<Option<String>, DataError> {
        let key = LookupKey::from_parts(id, login)?;
        let node: Option<ColorNode> = self.query_user(queries::CHANNEL_COLOR, &key).await?;
        Ok(node.and_then(|n| n.primary_color_hex))
    }

    /// Whether the signed-in user follows the channel, and since when.
    #[tracing::instrument(skip(self))]
    pub async fn get_user_followed(
        &self,
        id: Option<&str>,
        login: Option<&str>,
    ) -> Result<Option<FollowInfo>, DataError> {
        let key = LookupKey::from_parts(id, login)?;
        let node: Option<FollowedNode> = self.query_user(queries::USER_FOLLOWED, &key).await?;
        Ok(node
            .and_then(|n| n.relationship)
            .and_then(|r| r.follower))
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Search categories by name.
    #[tracing::instrument(skip(self))]
    pub async fn matching_categories(
        &self,
        query: &str,
        first: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<Paginated<Category>, DataError> {
        require_query(query)?;

        let data = self
            .transport
            .query(
                queries::SEARCH_CATEGORIES,
                json!({ "query": query, "first": first, "cursor": cursor }),
            )
            .await?;

        let connection: Option<Connection> = take_field(data, "searchCategories")?;
        let mut page = connection.map_or_else(
            || Paginated::complete(Vec::<Category>::new()),
            |c| c.into_page("category"),
        );
        promote_exact(&mut page.items, query, |c| {
            (c.name.as_str(), c.display_name.as_deref())
        });
        Ok(page)
    }

    /// Search users by login or display name.
    #[tracing::instrument(skip(self))]
    pub async fn matching_users(
        &self,
        query: &str,
        first: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<Paginated<User>, DataError> {
        require_query(query)?;

        let data = self
            .transport
            .query(
                queries::SEARCH_USERS,
                json!({ "query": query, "first": first, "cursor": cursor }),
            )
            .await?;

        let connection: Option<Connection> = take_field(data, "searchUsers")?;
        let mut page = connection.map_or_else(
            || Paginated::complete(Vec::<User>::new()),
            |c| c.into_page("user"),
        );
        promote_exact(&mut page.items, query, |u| {
            (u.login.as_str(), Some(u.display_name.as_str()))
        });
        Ok(page)
    }

    // =========================================================================
    // Follows
    // =========================================================================

    #[tracing::instrument(skip(self))]
    pub async fn follow_user(
        &self,
        channel_id: &str,
        disable_notifications: bool,
    ) -> Result<Option<FollowInfo>, DataError> {
        if channel_id.is_empty() {
            return Err(DataError::InvalidKey);
        }

        let data = self
            .transport
            .mutate(
                queries::FOLLOW_USER,
                json!({ "input": {
                    "targetID": channel_id,
                    "disableNotifications": disable_notifications,
                } }),
            )
            .await?;

        let payload: Option<FollowPayload> = take_field(data, "followUser")?;
        let Some(payload) = payload else {
            return Ok(None);
        };
        check_application_error("followUser", payload.error)?;
        Ok(payload.follow)
    }

    #[tracing::instrument(skip(self))]
    pub async fn unfollow_user(&self, channel_id: &str) -> Result<(), DataError> {
        if channel_id.is_empty() {
            return Err(DataError::InvalidKey);
        }

        let data = self
            .transport
            .mutate(
                queries::UNFOLLOW_USER,
                json!({ "input": { "targetID": channel_id } }),
            )
            .await?;

        let payload: Option<FollowPayload> = take_field(data, "unfollowUser")?;
        if let Some(payload) = payload {
            check_application_error("unfollowUser", payload.error)?;
        }
        Ok(())
    }

    // =========================================================================
    // Polls
    // =========================================================================

    #[tracing::instrument(skip(self))]
    pub async fn get_poll(&self, poll_id: &str) -> Result<Option<Poll>, DataError> {
        if poll_id.is_empty() {
            return Err(DataError::InvalidKey);
        }

        let data = self
            .transport
            .query(queries::GET_POLL, json!({ "id": poll_id }))
            .await?;
        take_field(data, "poll")
    }

    /// Start a poll on a channel.
    #[tracing::instrument(skip(self, choices, options), fields(choices = choices.len()))]
    pub async fn create_poll(
        &self,
        channel_id: &str,
        title: &str,
        choices: &[String],
        options: &PollOptions,
    ) -> Result<Option<Poll>, DataError> {
        if channel_id.is_empty() {
            return Err(DataError::InvalidKey);
        }
        if title.trim().is_empty() {
            return Err(DataError::InvalidArgument(
                "poll title must not be empty".to_string(),
            ));
        }
        if choices.len() < 2 || choices.iter().any(|c| c.trim().is_empty()) {
            return Err(DataError::InvalidArgument(
                "a poll needs at least two non-empty choices".to_string(),
            ));
        }

        let choices: Vec<Value> = choices.iter().map(|c| json!({ "title": c })).collect();
        let data = self
            .transport
            .mutate(
                queries::CREATE_POLL,
                json!({ "input": {
                    "ownedBy": channel_id,
                    "title": title,
                    "choices": choices,
                    "durationSeconds": options.duration_seconds,
                    "isSubscriberOnly": options.subscriber_only,
                    "isSubscriberMultiplierEnabled": options.subscriber_multiplier,
                    "isBitsVotingEnabled": options.bits_per_vote.is_some(),
                    "bitsCost": options.bits_per_vote.unwrap_or(0),
                    "isCommunityPointsVotingEnabled": options.channel_points_per_vote.is_some(),
                    "communityPointsCost": options.channel_points_per_vote.unwrap_or(0),
                } }),
            )
            .await?;

        poll_result("createPoll", take_field(data, "createPoll")?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn archive_poll(&self, poll_id: &str) -> Result<Option<Poll>, DataError> {
        self.poll_mutation(queries::ARCHIVE_POLL, "archivePoll", poll_id)
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn terminate_poll(&self, poll_id: &str) -> Result<Option<Poll>, DataError> {
        self.poll_mutation(queries::TERMINATE_POLL, "terminatePoll", poll_id)
            .await
    }

    async fn poll_mutation(
        &self,
        document: &str,
        operation: &str,
        poll_id: &str,
    ) -> Result<Option<Poll>, DataError> {
        if poll_id.is_empty() {
            return Err(DataError::InvalidKey);
        }

        let data = self
            .transport
            .mutate(document, json!({ "input": { "pollID": poll_id } }))
            .await?;
        poll_result(operation, take_field(data, operation)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use ember_gql::GqlError;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn tag_node(id: &str, description: Option<&str>) -> Value {
        json!({
            "id": id,
            "isAutomated": false,
            "isLanguageTag": false,
            "tagName": format!("tag_{id}"),
            "localizedName": format!("Tag {id}"),
            "scope": "ALL",
            "localizedDescription": description,
        })
    }

    fn raw(id: &str, description: Option<&str>) -> RawTag {
        serde_json::from_value(tag_node(id, description)).unwrap()
    }

    /// Answers tag batches with a described node for every requested id.
    fn tag_batch(document: &str, variables: &Value) -> Result<Value, GqlError> {
        assert_eq!(document, queries::TAG_BATCH);
        let nodes: Vec<Value> = variables["ids"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(|id| tag_node(id, Some("described")))
            .collect();
        Ok(json!({ "contentTags": nodes }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_users_by_id_and_login_share_one_query() {
        let transport = ScriptedTransport::new(|document, _| {
            assert_eq!(document, queries::USER_BATCH);
            Ok(json!({ "users": [
                { "id": "1", "login": "one", "displayName": "One" },
                null,
                { "id": "3", "login": "foo", "displayName": "Foo" }
            ] }))
        });
        let service = EntityService::new(transport.clone());

        let (one, two, foo) = tokio::join!(
            service.get_user(Some("1"), None),
            service.get_user(Some("2"), None),
            service.get_user(None, Some("foo")),
        );

        assert_eq!(one.unwrap().unwrap().login, "one");
        assert_eq!(two.unwrap(), None);
        assert_eq!(foo.unwrap().unwrap().id, "3");

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].variables,
            json!({ "ids": ["1", "2"], "logins": ["foo"] })
        );
        assert_eq!(service.pending(), PendingSummary::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_user_leaves_others_resolved() {
        let transport = ScriptedTransport::new(|_, _| {
            Ok(json!({ "users": [
                { "id": "1", "login": "one", "displayName": "One" },
                { "id": "2", "login": "two", "displayName": null }
            ] }))
        });
        let service = EntityService::new(transport.clone());

        let (one, two) = tokio::join!(
            service.get_user(Some("1"), None),
            service.get_user(Some("2"), None),
        );

        assert_eq!(one.unwrap().unwrap().display_name, "One");
        assert_eq!(two.unwrap(), None);
        assert_eq!(transport.call_count(), 1);
        assert_eq!(service.pending(), PendingSummary::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_key_rejected_without_query() {
        let transport = ScriptedTransport::new(|_, _| Ok(json!({ "users": [] })));
        let service = EntityService::new(transport.clone());

        let both = service.get_user(Some("1"), Some("foo")).await.unwrap_err();
        let neither = service.get_stream_meta(None, Some("")).await.unwrap_err();
        let empty_tag = service.get_tag("", false).await.unwrap_err();

        assert!(matches!(both, DataError::InvalidKey));
        assert!(matches!(neither, DataError::InvalidKey));
        assert!(matches!(empty_tag, DataError::InvalidKey));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_meta_offline_is_none() {
        let transport = ScriptedTransport::new(|_, _| {
            Ok(json!({ "users": [
                { "id": "1", "login": "live", "stream": { "id": "s1", "viewersCount": 7 } },
                { "id": "2", "login": "idle", "stream": null }
            ] }))
        });
        let service = EntityService::new(transport.clone());

        let (live, idle) = tokio::join!(
            service.get_stream_meta(None, Some("live")),
            service.get_stream_meta(Some("2"), None),
        );

        let live = live.unwrap().unwrap();
        assert_eq!(live.channel_id, "1");
        assert_eq!(live.stream.viewers_count, Some(7));
        assert_eq!(idle.unwrap(), None);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tag_description_requirement() {
        let transport = ScriptedTransport::new(tag_batch);
        let service = EntityService::new(transport.clone());
        service.memorize_tag(&raw("t1", None), false);

        let cached = service.get_tag("t1", false).await.unwrap().unwrap();
        assert!(!cached.is_complete());
        assert_eq!(transport.call_count(), 0);

        let full = service.get_tag("t1", true).await.unwrap().unwrap();
        assert_eq!(full.description.as_deref(), Some("described"));
        assert_eq!(transport.call_count(), 1);

        // Now complete, so no further fetch.
        service.get_tag("t1", true).await.unwrap();
        assert_eq!(transport.call_count(), 1);
        assert_eq!(service.tag_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_tag_immediate_invokes_callback_once() {
        let transport = ScriptedTransport::new(tag_batch);
        let service = EntityService::new(transport.clone());

        let (tx, rx) = oneshot::channel();
        let callback: TagCallback = Box::new(
            move |id: String, record: Option<TagRecord>, error: Option<DataError>| {
                let _ = tx.send((id, record, error));
            },
        );

        assert_eq!(service.get_tag_immediate("50", Some(callback), false), None);

        let (id, record, error) = rx.await.unwrap();
        assert_eq!(id, "50");
        assert_eq!(record.unwrap().label, "Tag 50");
        assert!(error.is_none());

        let cached = service.get_tag_immediate("50", None, false).unwrap();
        assert_eq!(cached.name, "tag_50");
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_tag_immediate_reports_failure() {
        let transport = ScriptedTransport::new(|_, _| {
            Err(GqlError::Status {
                status: 500,
                body: "boom".to_string(),
            })
        });
        let service = EntityService::new(transport);

        let (tx, rx) = oneshot::channel();
        let callback: TagCallback = Box::new(
            move |id: String, record: Option<TagRecord>, error: Option<DataError>| {
                let _ = tx.send((id, record, error));
            },
        );
        service.get_tag_immediate("7", Some(callback), true);

        let (id, record, error) = rx.await.unwrap();
        assert_eq!(id, "7");
        assert_eq!(record, None);
        assert!(error.unwrap().is_transport());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_leaves_cache_untouched() {
        let transport = ScriptedTransport::new(|_, _| Err(GqlError::MissingData));
        let service = EntityService::new(transport);
        let before = service.memorize_tag(&raw("t1", None), false).unwrap();

        let err = service.get_tag("t1", true).await.unwrap_err();
        assert!(err.is_transport());

        assert_eq!(service.tag_count(), 1);
        assert_eq!(service.get_tag_immediate("t1", None, false), Some(before));
    }

    #[tokio::test(start_paused = true)]
    async fn test_memorize_dispatch_resolves_waiters() {
        let transport = ScriptedTransport::new(tag_batch);
        let service = EntityService::new(transport.clone());

        let waiting = tokio::spawn({
            let service = service.clone();
            async move { service.get_tag("t9", true).await }
        });
        while service.pending().tags.ids == 0 {
            tokio::task::yield_now().await;
        }

        service.memorize_tag(&raw("t9", Some("from search")), true);

        let record = waiting.await.unwrap().unwrap().unwrap();
        assert_eq!(record.description.as_deref(), Some("from search"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incomplete_dispatch_keeps_waiters() {
        let transport = ScriptedTransport::new(tag_batch);
        let service = EntityService::new(transport.clone());

        let waiting = tokio::spawn({
            let service = service.clone();
            async move { service.get_tag("t9", true).await }
        });
        while service.pending().tags.ids == 0 {
            tokio::task::yield_now().await;
        }

        service.memorize_tag(&raw("t9", None), true);
        assert_eq!(service.pending().tags.ids, 1);

        let record = waiting.await.unwrap().unwrap().unwrap();
        assert_eq!(record.description.as_deref(), Some("described"));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_top_tags_resolve_pending_lookups() {
        let transport = ScriptedTransport::new(|document, variables| {
            assert_eq!(document, queries::TOP_TAGS);
            assert_eq!(variables["limit"], json!(2));
            Ok(json!({ "topTags": [tag_node("t1", Some("top")), tag_node("t2", None)] }))
        });
        let service = EntityService::new(transport.clone());

        let waiting = tokio::spawn({
            let service = service.clone();
            async move { service.get_tag("t1", true).await }
        });
        while service.pending().tags.ids == 0 {
            tokio::task::yield_now().await;
        }

        let top = service.get_top_tags(2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(service.tag_count(), 2);

        let record = waiting.await.unwrap().unwrap().unwrap();
        assert_eq!(record.description.as_deref(), Some("top"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_matching_tags_uses_category_search() {
        let transport = ScriptedTransport::new(|document, variables| {
            assert_eq!(document, queries::SEARCH_CATEGORY_TAGS);
            assert_eq!(variables["locale"], json!("de"));
            Ok(json!({ "searchCategoryTags": [tag_node("c1", None), { "id": "bad" }] }))
        });
        let service = EntityService::new(transport);

        let page = service.matching_tags("spe", Some("de"), true).await.unwrap();
        assert!(page.finished);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, "c1");
        assert_eq!(service.tag_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_languages_from_tags_refreshes_after_fetch() {
        let transport = ScriptedTransport::new(|_, _| {
            Ok(json!({ "contentTags": [{
                "id": "de-tag",
                "isAutomated": true,
                "isLanguageTag": true,
                "tagName": "language_de",
                "localizedName": "Deutsch"
            }] }))
        });
        let service = EntityService::new(transport.clone());
        service.memorize_tag(
            &RawTag {
                id: Some("en-tag".to_string()),
                is_automated: Some(true),
                is_language_tag: Some(true),
                tag_name: Some("language_en".to_string()),
                localized_name: Some("English".to_string()),
                ..Default::default()
            },
            false,
        );

        let (tx, rx) = oneshot::channel();
        let callback: LanguagesCallback = Box::new(move |languages: Vec<String>| {
            let _ = tx.send(languages);
        });
        let ids = vec![
            "en-tag".to_string(),
            "de-tag".to_string(),
            "en-tag".to_string(),
        ];

        assert_eq!(service.languages_from_tags(&ids, Some(callback)), vec!["en"]);
        assert_eq!(rx.await.unwrap(), vec!["en", "de"]);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_matching_users_promotes_exact_match() {
        let transport = ScriptedTransport::new(|document, variables| {
            assert_eq!(document, queries::SEARCH_USERS);
            assert_eq!(variables["first"], json!(3));
            assert_eq!(variables["cursor"], Value::Null);
            Ok(json!({ "searchUsers": {
                "totalCount": 12,
                "pageInfo": { "hasNextPage": true },
                "edges": [
                    { "cursor": "c1", "node": { "id": "1", "login": "foobar", "displayName": "foobar" } },
                    { "cursor": "c2", "node": { "id": "2", "login": "xfoo", "displayName": "xFoo" } },
                    { "cursor": "c3", "node": { "id": "3", "login": "foo_", "displayName": "FOO" } }
                ]
            } }))
        });
        let service = EntityService::new(transport);

        let page = service.matching_users("foo", Some(3), None).await.unwrap();
        let ids: Vec<&str> = page.items.iter().map(|u| u.id.as_str()).collect();

        assert_eq!(ids, vec!["3", "1", "2"]);
        assert_eq!(page.cursor.as_deref(), Some("c3"));
        assert!(!page.finished);
        assert_eq!(page.count, Some(12));
    }

    #[tokio::test]
    async fn test_matching_users_skips_malformed_edge() {
        let transport = ScriptedTransport::new(|_, _| {
            Ok(json!({ "searchUsers": {
                "pageInfo": { "hasNextPage": true },
                "edges": [
                    { "cursor": "c1", "node": { "id": "1", "login": "foo", "displayName": "Foo" } },
                    { "cursor": "c2", "node": { "id": "2", "login": "bar", "displayName": null } }
                ]
            } }))
        });
        let service = EntityService::new(transport);

        let page = service.matching_users("foo", None, None).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, "1");
        assert_eq!(page.cursor.as_deref(), Some("c2"));
    }

    #[tokio::test]
    async fn test_matching_categories_last_page() {
        let transport = ScriptedTransport::new(|_, _| {
            Ok(json!({ "searchCategories": {
                "totalCount": 2,
                "pageInfo": { "hasNextPage": false },
                "edges": [
                    { "cursor": "a", "node": { "id": "10", "name": "Chess Variants" } },
                    { "cursor": "b", "node": { "id": "11", "name": "chess", "displayName": "Chess" } }
                ]
            } }))
        });
        let service = EntityService::new(transport);

        let page = service.matching_categories("Chess", None, Some("prev")).await.unwrap();
        assert_eq!(page.items[0].id, "11");
        assert_eq!(page.cursor, None);
        assert!(page.finished);
    }

    #[tokio::test]
    async fn test_empty_search_rejected() {
        let transport = ScriptedTransport::new(|_, _| Ok(json!({})));
        let service = EntityService::new(transport.clone());

        let err = service.matching_categories("  ", None, None).await.unwrap_err();
        assert!(matches!(err, DataError::InvalidArgument(_)));
        let err = service.matching_tags("", None, false).await.unwrap_err();
        assert!(matches!(err, DataError::InvalidArgument(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_follow_application_error() {
        let transport = ScriptedTransport::new(|document, _| {
            assert_eq!(document, queries::FOLLOW_USER);
            Ok(json!({ "followUser": { "error": { "code": "FORBIDDEN" }, "follow": null } }))
        });
        let service = EntityService::new(transport.clone());

        let err = service.follow_user("123", true).await.unwrap_err();
        assert_eq!(err.code(), Some("FORBIDDEN"));

        let calls = transport.calls();
        assert!(calls[0].mutation);
        assert_eq!(
            calls[0].variables,
            json!({ "input": { "targetID": "123", "disableNotifications": true } })
        );
    }

    #[tokio::test]
    async fn test_follow_and_unfollow() {
        let transport = ScriptedTransport::new(|document, _| {
            if document == queries::FOLLOW_USER {
                Ok(json!({ "followUser": { "error": null, "follow": {
                    "followedAt": "2026-03-01T12:00:00Z",
                    "disableNotifications": false
                } } }))
            } else {
                Ok(json!({ "unfollowUser": { "error": null, "follow": null } }))
            }
        });
        let service = EntityService::new(transport.clone());

        let follow = service.follow_user("123", false).await.unwrap().unwrap();
        assert!(follow.followed_at.is_some());
        service.unfollow_user("123").await.unwrap();
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_user_followed_and_channel_lookups() {
        let transport = ScriptedTransport::new(|document, variables| {
            assert_eq!(variables["login"], json!("foo"));
            match document {
                d if d == queries::USER_FOLLOWED => {
                    Ok(json!({ "user": { "id": "1", "self": { "follower": null } } }))
                }
                d if d == queries::BROADCAST_ID => {
                    Ok(json!({ "user": { "id": "1", "lastBroadcast": { "id": "b42" } } }))
                }
                _ => Ok(json!({ "user": { "id": "1", "primaryColorHex": "9146FF" } })),
            }
        });
        let service = EntityService::new(transport);

        assert_eq!(service.get_user_followed(None, Some("foo")).await.unwrap(), None);
        assert_eq!(
            service.get_broadcast_id(None, Some("foo")).await.unwrap().as_deref(),
            Some("b42")
        );
        assert_eq!(
            service.get_channel_color(None, Some("foo")).await.unwrap().as_deref(),
            Some("9146FF")
        );
    }

    #[tokio::test]
    async fn test_unknown_category_is_none() {
        let transport = ScriptedTransport::new(|_, variables| {
            assert_eq!(variables["name"], json!("Nothing"));
            Ok(json!({ "game": null }))
        });
        let service = EntityService::new(transport);

        assert_eq!(service.get_category(None, Some("Nothing")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_poll_validation() {
        let transport = ScriptedTransport::new(|_, _| Ok(json!({})));
        let service = EntityService::new(transport.clone());
        let options = PollOptions::default();

        let one_choice = vec!["yes".to_string()];
        let err = service
            .create_poll("1", "Question?", &one_choice, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::InvalidArgument(_)));

        let choices = vec!["yes".to_string(), "no".to_string()];
        let err = service.create_poll("1", " ", &choices, &options).await.unwrap_err();
        assert!(matches!(err, DataError::InvalidArgument(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_create_and_terminate_poll() {
        let transport = ScriptedTransport::new(|document, _| {
            let poll = json!({
                "id": "p1",
                "title": "Best opening?",
                "status": "ACTIVE",
                "durationSeconds": 120,
                "choices": [
                    { "id": "c1", "title": "e4", "votes": { "total": 3 } },
                    { "id": "c2", "title": "d4", "votes": { "total": 1 } }
                ]
            });
            if document == queries::CREATE_POLL {
                Ok(json!({ "createPoll": { "error": null, "poll": poll } }))
            } else {
                Ok(json!({ "terminatePoll": { "error": { "code": "POLL_NOT_ACTIVE" }, "poll": null } }))
            }
        });
        let service = EntityService::new(transport.clone());
        let options = PollOptions {
            duration_seconds: 120,
            bits_per_vote: Some(10),
            ..Default::default()
        };

        let choices = vec!["e4".to_string(), "d4".to_string()];
        let poll = service
            .create_poll("1", "Best opening?", &choices, &options)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(poll.choices.len(), 2);
        assert_eq!(poll.choices[0].votes.as_ref().map(|v| v.total), Some(3));

        let input = &transport.calls()[0].variables["input"];
        assert_eq!(input["ownedBy"], json!("1"));
        assert_eq!(input["durationSeconds"], json!(120));
        assert_eq!(input["isBitsVotingEnabled"], json!(true));
        assert_eq!(input["bitsCost"], json!(10));
        assert_eq!(input["isCommunityPointsVotingEnabled"], json!(false));
        assert_eq!(input["choices"], json!([{ "title": "e4" }, { "title": "d4" }]));

        let err = service.terminate_poll("p1").await.unwrap_err();
        assert_eq!(err.code(), Some("POLL_NOT_ACTIVE"));
    }

    #[test]
    fn test_get_tag_immediate_outside_runtime() {
        let transport = ScriptedTransport::new(|_, _| Ok(json!({})));
        let service = EntityService::new(transport.clone());

        let (tx, rx) = std::sync::mpsc::channel();
        let callback: TagCallback = Box::new(
            move |id: String, record: Option<TagRecord>, error: Option<DataError>| {
                tx.send((id, record.is_some(), error.is_some())).unwrap();
            },
        );

        assert_eq!(service.get_tag_immediate("1", Some(callback), false), None);
        assert_eq!(rx.recv().unwrap(), ("1".to_string(), false, true));
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn test_languages_from_tags_outside_runtime() {
        let transport = ScriptedTransport::new(|_, _| Ok(json!({})));
        let service = EntityService::new(transport.clone());
        service.memorize_tag(
            &RawTag {
                id: Some("en-tag".to_string()),
                is_language_tag: Some(true),
                tag_name: Some("language_en".to_string()),
                localized_name: Some("English".to_string()),
                ..Default::default()
            },
            false,
        );

        let callback: LanguagesCallback = Box::new(|_| panic!("no refresh outside a runtime"));
        let ids = vec!["en-tag".to_string(), "missing".to_string()];

        assert_eq!(service.languages_from_tags(&ids, Some(callback)), vec!["en"]);
        assert_eq!(transport.call_count(), 0);
    }
}
