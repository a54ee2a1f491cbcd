//! Process-lifetime memoization of content tags.
//!
//! Tag records are merged, never removed: a later node may add or refresh the
//! label and description but an absent field never erases a present one.

use std::sync::OnceLock;

use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// Canonical names of language tags follow `language_<code>`.
fn language_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^language_(.+)$").unwrap())
}

/// A content tag as delivered by the GraphQL endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTag {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub is_automated: Option<bool>,
    #[serde(default)]
    pub is_language_tag: Option<bool>,
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub localized_name: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub localized_description: Option<String>,
}

/// The merged, cached view of a tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagRecord {
    pub id: String,
    /// Same as `id`.
    pub value: String,
    pub is_auto: bool,
    pub is_language: bool,
    /// Language code derived from `name` for language tags.
    pub language: Option<String>,
    /// Canonical name, e.g. `language_en`.
    pub name: String,
    /// Localized display label.
    pub label: String,
    pub scope: Option<String>,
    pub description: Option<String>,
}

impl TagRecord {
    fn empty(id: &str) -> Self {
        Self {
            id: id.to_string(),
            value: id.to_string(),
            is_auto: false,
            is_language: false,
            language: None,
            name: String::new(),
            label: String::new(),
            scope: None,
            description: None,
        }
    }

    /// A tag is complete once it carries a description.
    pub fn is_complete(&self) -> bool {
        self.description.is_some()
    }

    /// Whether this record answers a lookup that may require a description.
    pub fn satisfies(&self, want_description: bool) -> bool {
        !want_description || self.is_complete()
    }
}

/// Anything that identifies a tag: a bare id or a record.
pub trait TagRef {
    fn tag_id(&self) -> &str;
}

impl TagRef for str {
    fn tag_id(&self) -> &str {
        self
    }
}

impl TagRef for String {
    fn tag_id(&self) -> &str {
        self
    }
}

impl TagRef for TagRecord {
    fn tag_id(&self) -> &str {
        &self.id
    }
}

impl TagRef for RawTag {
    fn tag_id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }
}

/// Tag records by id.
#[derive(Debug, Default)]
pub struct TagCache {
    tags: DashMap<String, TagRecord>,
}

impl TagCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the cached record for `id`, possibly incomplete.
    pub fn get(&self, id: &str) -> Option<TagRecord> {
        self.tags.get(id).map(|r| r.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tags.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Merge `raw` into the cache and return the updated record.
    ///
    /// Nodes without an id, canonical name or label are ignored.
    pub fn memorize(&self, raw: &RawTag) -> Option<TagRecord> {
        let (Some(id), Some(name), Some(label)) = (
            raw.id.as_deref().filter(|s| !s.is_empty()),
            raw.tag_name.as_deref(),
            raw.localized_name.as_deref(),
        ) else {
            warn!(id = ?raw.id, "ignoring malformed tag node");
            return None;
        };

        let mut entry = self
            .tags
            .entry(id.to_string())
            .or_insert_with(|| TagRecord::empty(id));
        let tag = entry.value_mut();

        tag.is_auto = raw.is_automated.unwrap_or(tag.is_auto);
        tag.is_language = raw.is_language_tag.unwrap_or(tag.is_language);
        tag.name = name.to_string();
        tag.label = label.to_string();

        if tag.is_language {
            if let Some(caps) = language_regex().captures(name) {
                tag.language = Some(caps[1].to_string());
            }
        }

        if let Some(scope) = &raw.scope {
            tag.scope = Some(scope.clone());
        }
        if let Some(description) = &raw.localized_description {
            tag.description = Some(description.clone());
        }

        trace!(id, complete = tag.is_complete(), "memorized tag");
        Some(tag.clone())
    }
}
