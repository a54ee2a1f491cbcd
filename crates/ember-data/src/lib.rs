//! Batched entity lookups for Ember.
//!
//! This crate provides:
//! - A debounced batch scheduler that coalesces user, stream and tag lookups
//!   into one GraphQL query per cycle
//! - A process-lifetime tag cache with monotonic merging
//! - [`EntityService`], the façade applications talk to, which also covers
//!   searches, follows and polls

mod batcher;
mod config;
mod error;
mod fetchers;
mod key;
pub mod queries;
mod registry;
mod service;
mod tags;
mod types;

#[cfg(test)]
mod testing;

pub use batcher::{BatchFetcher, Batcher, PendingCounts};
pub use config::{DEFAULT_BATCH_SIZE, DEFAULT_DEBOUNCE, DEFAULT_LANGUAGE_DEBOUNCE, LoaderConfig};
pub use error::DataError;
pub use fetchers::{StreamFetcher, TagFetcher, UserFetcher};
pub use key::LookupKey;
pub use registry::{Waiter, WaiterRegistry, WaiterResult};
pub use service::{EntityService, LanguagesCallback, PendingSummary, TagCallback};
pub use tags::{RawTag, TagCache, TagRecord, TagRef};
pub use types::{
    Category, ChannelStream, FollowInfo, Paginated, Poll, PollChoice, PollOptions, PollVotes,
    Stream, User,
};
