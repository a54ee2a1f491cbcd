//! Subcommand implementations. Every command prints its result as JSON.

use ember_data::{DataError, EntityService, LanguagesCallback, PollOptions};
use futures_util::future::join_all;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use serde_json::json;
use tokio::sync::oneshot;
use tracing::{info, warn};

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{}", json);
    Ok(())
}

pub async fn user(service: &EntityService, id: Option<&str>, login: Option<&str>) -> Result<()> {
    let user = service.get_user(id, login).await.into_diagnostic()?;
    print_json(&user)
}

/// Resolve every id and login concurrently so they share batch cycles.
pub async fn users(service: &EntityService, ids: &[String], logins: &[String]) -> Result<()> {
    let by_id = ids.iter().map(|id| service.get_user(Some(id.as_str()), None));
    let by_login = logins.iter().map(|login| service.get_user(None, Some(login.as_str())));

    let (by_id, by_login) = tokio::join!(join_all(by_id), join_all(by_login));

    let mut found = Vec::new();
    for result in by_id.into_iter().chain(by_login) {
        match result {
            Ok(user) => found.push(user),
            Err(err @ DataError::InvalidKey) => warn!(error = %err, "skipping empty key"),
            Err(err) => return Err(err).into_diagnostic(),
        }
    }

    info!(requested = ids.len() + logins.len(), "user lookups complete");
    print_json(&found)
}

pub async fn stream(service: &EntityService, id: Option<&str>, login: Option<&str>) -> Result<()> {
    let stream = service.get_stream_meta(id, login).await.into_diagnostic()?;
    print_json(&stream)
}

pub async fn tag(service: &EntityService, id: &str, describe: bool) -> Result<()> {
    let tag = service.get_tag(id, describe).await.into_diagnostic()?;
    print_json(&tag)
}

pub async fn top_tags(service: &EntityService, limit: u32) -> Result<()> {
    let tags = service.get_top_tags(limit).await.into_diagnostic()?;
    print_json(&tags)
}

pub async fn search_tags(
    service: &EntityService,
    query: &str,
    locale: Option<&str>,
    category_only: bool,
) -> Result<()> {
    let page = service
        .matching_tags(query, locale, category_only)
        .await
        .into_diagnostic()?;
    print_json(&page)
}

/// Print the cached languages, then the refreshed list once missing tags arrive.
pub async fn languages(service: &EntityService, ids: &[String]) -> Result<()> {
    let (tx, rx) = oneshot::channel();
    let callback: LanguagesCallback = Box::new(move |languages: Vec<String>| {
        let _ = tx.send(languages);
    });

    let cached = service.languages_from_tags(ids, Some(callback));

    // The callback only runs when some tag was missing from the cache.
    let refreshed = rx.await.unwrap_or_else(|_| cached.clone());
    print_json(&json!({ "cached": cached, "languages": refreshed }))
}

pub async fn search_categories(
    service: &EntityService,
    query: &str,
    first: Option<u32>,
    cursor: Option<&str>,
) -> Result<()> {
    let page = service
        .matching_categories(query, first, cursor)
        .await
        .into_diagnostic()?;
    print_json(&page)
}

pub async fn search_users(
    service: &EntityService,
    query: &str,
    first: Option<u32>,
    cursor: Option<&str>,
) -> Result<()> {
    let page = service
        .matching_users(query, first, cursor)
        .await
        .into_diagnostic()?;
    print_json(&page)
}

pub async fn category(service: &EntityService, id: Option<&str>, name: Option<&str>) -> Result<()> {
    let category = service.get_category(id, name).await.into_diagnostic()?;
    print_json(&category)
}

pub async fn broadcast_id(
    service: &EntityService,
    id: Option<&str>,
    login: Option<&str>,
) -> Result<()> {
    let broadcast = service.get_broadcast_id(id, login).await.into_diagnostic()?;
    print_json(&json!({ "broadcastId": broadcast }))
}

pub async fn color(service: &EntityService, id: Option<&str>, login: Option<&str>) -> Result<()> {
    let color = service.get_channel_color(id, login).await.into_diagnostic()?;
    print_json(&json!({ "color": color }))
}

pub async fn followed(service: &EntityService, id: Option<&str>, login: Option<&str>) -> Result<()> {
    let follow = service.get_user_followed(id, login).await.into_diagnostic()?;
    print_json(&follow)
}

pub async fn follow(service: &EntityService, channel_id: &str, quiet: bool) -> Result<()> {
    let follow = service
        .follow_user(channel_id, quiet)
        .await
        .into_diagnostic()?;
    info!(channel_id, "followed");
    print_json(&follow)
}

pub async fn unfollow(service: &EntityService, channel_id: &str) -> Result<()> {
    service.unfollow_user(channel_id).await.into_diagnostic()?;
    info!(channel_id, "unfollowed");
    print_json(&json!({ "unfollowed": channel_id }))
}

pub async fn poll_create(
    service: &EntityService,
    channel_id: &str,
    title: &str,
    choices: &[String],
    options: &PollOptions,
) -> Result<()> {
    let poll = service
        .create_poll(channel_id, title, choices, options)
        .await
        .into_diagnostic()?;
    print_json(&poll)
}

pub async fn poll_get(service: &EntityService, poll_id: &str) -> Result<()> {
    let poll = service.get_poll(poll_id).await.into_diagnostic()?;
    print_json(&poll)
}

pub async fn poll_archive(service: &EntityService, poll_id: &str) -> Result<()> {
    let poll = service.archive_poll(poll_id).await.into_diagnostic()?;
    print_json(&poll)
}

pub async fn poll_terminate(service: &EntityService, poll_id: &str) -> Result<()> {
    let poll = service.terminate_poll(poll_id).await.into_diagnostic()?;
    print_json(&poll)
}
