//! Entity records returned by lookups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub login: String,
    pub display_name: String,
    #[serde(rename = "profileImageURL", default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A game or other directory category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(rename = "boxArtURL", default)]
    pub box_art_url: Option<String>,
}

/// A live broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "type", default)]
    pub stream_type: Option<String>,
    #[serde(default)]
    pub viewers_count: Option<u64>,
    #[serde(default)]
    pub game: Option<Category>,
}

/// A channel that is currently live, with its stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStream {
    pub channel_id: String,
    pub channel_login: String,
    pub stream: Stream,
}

/// Follow relationship between the signed-in user and a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowInfo {
    #[serde(default)]
    pub followed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub disable_notifications: bool,
}

/// One page of a search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginated<T> {
    /// Continuation cursor; `None` once finished.
    pub cursor: Option<String>,
    pub items: Vec<T>,
    pub finished: bool,
    pub count: Option<u64>,
}

impl<T> Paginated<T> {
    /// A single, complete page.
    pub fn complete(items: Vec<T>) -> Self {
        Self {
            cursor: None,
            items,
            finished: true,
            count: None,
        }
    }
}

/// A channel poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub choices: Vec<PollChoice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollChoice {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub votes: Option<PollVotes>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollVotes {
    #[serde(default)]
    pub total: u64,
}

/// Settings for a new poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOptions {
    pub duration_seconds: u32,
    pub subscriber_only: bool,
    pub subscriber_multiplier: bool,
    pub bits_per_vote: Option<u32>,
    pub channel_points_per_vote: Option<u32>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            duration_seconds: 60,
            subscriber_only: false,
            subscriber_multiplier: false,
            bits_per_vote: None,
            channel_points_per_vote: None,
        }
    }
}
