//! GraphQL transport for Ember.
//!
//! This crate provides the single seam through which every entity lookup
//! reaches the remote GraphQL endpoint.
//!
//! ## Features
//!
//! - **Transport trait**: `query`/`mutate` over a document and its variables
//! - **HTTP Client**: reqwest-backed client with retry on transient failures
//! - **Errors**: transport, protocol and remote GraphQL errors in one enum

mod client;
mod config;
mod error;

pub use client::{GqlClient, Transport};
pub use config::{DEFAULT_ENDPOINT, GqlConfig};
pub use error::GqlError;
