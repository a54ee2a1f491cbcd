//! GraphQL documents used by the lookups.

/// Batched user lookup by ids and/or logins.
pub const USER_BATCH: &str = r#"query EmberUserBatch($ids: [ID!], $logins: [String!]) {
  users(ids: $ids, logins: $logins) {
    id
    login
    displayName
    profileImageURL(width: 70)
    description
  }
}"#;

/// Batched stream lookup by channel ids and/or logins.
pub const STREAM_BATCH: &str = r#"query EmberStreamBatch($ids: [ID!], $logins: [String!]) {
  users(ids: $ids, logins: $logins) {
    id
    login
    stream {
      id
      createdAt
      type
      viewersCount
      game { id name displayName boxArtURL }
    }
  }
}"#;

/// Batched tag lookup by ids.
pub const TAG_BATCH: &str = r#"query EmberTagBatch($ids: [ID!]) {
  contentTags(ids: $ids) {
    id
    isAutomated
    isLanguageTag
    tagName
    localizedName
    scope
    localizedDescription
  }
}"#;

pub const TOP_TAGS: &str = r#"query EmberTopTags($limit: Int) {
  topTags(limit: $limit) {
    id
    isAutomated
    isLanguageTag
    tagName
    localizedName
    scope
    localizedDescription
  }
}"#;

pub const SEARCH_LIVE_TAGS: &str = r#"query EmberSearchLiveTags($query: String!, $locale: String) {
  searchLiveTags(userQuery: $query, locale: $locale, limit: 100) {
    id
    isAutomated
    isLanguageTag
    tagName
    localizedName
    scope
  }
}"#;

pub const SEARCH_CATEGORY_TAGS: &str = r#"query EmberSearchCategoryTags($query: String!, $locale: String) {
  searchCategoryTags(userQuery: $query, locale: $locale, limit: 100) {
    id
    isAutomated
    isLanguageTag
    tagName
    localizedName
    scope
  }
}"#;

pub const SEARCH_CATEGORIES: &str = r#"query EmberSearchCategories($query: String!, $first: Int, $cursor: Cursor) {
  searchCategories(query: $query, first: $first, after: $cursor) {
    totalCount
    pageInfo { hasNextPage }
    edges {
      cursor
      node { id name displayName boxArtURL }
    }
  }
}"#;

pub const SEARCH_USERS: &str = r#"query EmberSearchUsers($query: String!, $first: Int, $cursor: Cursor) {
  searchUsers(userQuery: $query, first: $first, after: $cursor) {
    totalCount
    pageInfo { hasNextPage }
    edges {
      cursor
      node { id login displayName profileImageURL(width: 50) }
    }
  }
}"#;

pub const CATEGORY: &str = r#"query EmberCategory($id: ID, $name: String) {
  game(id: $id, name: $name) { id name displayName boxArtURL }
}"#;

pub const BROADCAST_ID: &str = r#"query EmberBroadcastId($id: ID, $login: String) {
  user(id: $id, login: $login) {
    id
    lastBroadcast { id }
  }
}"#;

pub const CHANNEL_COLOR: &str = r#"query EmberChannelColor($id: ID, $login: String) {
  user(id: $id, login: $login) {
    id
    primaryColorHex
  }
}"#;

pub const USER_FOLLOWED: &str = r#"query EmberUserFollowed($id: ID, $login: String) {
  user(id: $id, login: $login) {
    id
    self {
      follower { followedAt disableNotifications }
    }
  }
}"#;

pub const FOLLOW_USER: &str = r#"mutation EmberFollowUser($input: FollowUserInput!) {
  followUser(input: $input) {
    error { code }
    follow { followedAt disableNotifications }
  }
}"#;

pub const UNFOLLOW_USER: &str = r#"mutation EmberUnfollowUser($input: UnfollowUserInput!) {
  unfollowUser(input: $input) {
    error { code }
    follow { followedAt disableNotifications }
  }
}"#;

pub const GET_POLL: &str = r#"query EmberPoll($id: ID!) {
  poll(id: $id) {
    id title status durationSeconds startedAt endedAt
    choices { id title votes { total } }
  }
}"#;

pub const CREATE_POLL: &str = r#"mutation EmberCreatePoll($input: CreatePollInput!) {
  createPoll(input: $input) {
    error { code }
    poll {
      id title status durationSeconds startedAt endedAt
      choices { id title votes { total } }
    }
  }
}"#;

pub const ARCHIVE_POLL: &str = r#"mutation EmberArchivePoll($input: ArchivePollInput!) {
  archivePoll(input: $input) {
    error { code }
    poll {
      id title status durationSeconds startedAt endedAt
      choices { id title votes { total } }
    }
  }
}"#;

pub const TERMINATE_POLL: &str = r#"mutation EmberTerminatePoll($input: TerminatePollInput!) {
  terminatePoll(input: $input) {
    error { code }
    poll {
      id title status durationSeconds startedAt endedAt
      choices { id title votes { total } }
    }
  }
}"#;
