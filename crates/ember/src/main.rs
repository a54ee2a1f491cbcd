//! Ember: batched entity lookups from the command line
//!
//! Subcommands map onto the lookup service:
//! - `user`, `users`, `stream`: batched user and stream lookups
//! - `tag`, `top-tags`, `search-tags`, `languages`: tag cache
//! - `search-categories`, `search-users`, `category`: directory
//! - `follow`, `unfollow`, `followed`: follow state
//! - `poll-*`: channel polls

use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use ember_data::{EntityService, PollOptions};
use ember_gql::{DEFAULT_ENDPOINT, GqlClient, GqlConfig};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "ember")]
#[command(about = "Batched entity lookups against a GraphQL endpoint", long_about = None)]
struct Cli {
    /// GraphQL endpoint URL
    #[arg(long, env = "EMBER_GQL_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Client-ID header value
    #[arg(long, env = "EMBER_CLIENT_ID")]
    client_id: String,

    /// OAuth token, required for follows and polls
    #[arg(long, env = "EMBER_OAUTH_TOKEN")]
    oauth_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Exactly one of `--id` or `--login`.
#[derive(Args)]
struct KeyArgs {
    #[arg(long, conflicts_with = "login", required_unless_present = "login")]
    id: Option<String>,

    #[arg(long)]
    login: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up a user
    User {
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Look up several users at once (one batched query)
    Users {
        /// User ids
        #[arg(long = "id")]
        ids: Vec<String>,

        /// User logins
        #[arg(long = "login")]
        logins: Vec<String>,
    },

    /// Look up a channel's live stream
    Stream {
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Look up a tag by id
    Tag {
        id: String,

        /// Require the tag description
        #[arg(long)]
        describe: bool,
    },

    /// List the top tags
    TopTags {
        #[arg(long, default_value = "25")]
        limit: u32,
    },

    /// Search tags by name
    SearchTags {
        query: String,

        #[arg(long)]
        locale: Option<String>,

        /// Search category tags instead of live stream tags
        #[arg(long)]
        category_only: bool,
    },

    /// Language codes of the given tags
    Languages { ids: Vec<String> },

    /// Search categories by name
    SearchCategories {
        query: String,

        #[arg(long)]
        first: Option<u32>,

        /// Continuation cursor from a previous page
        #[arg(long)]
        cursor: Option<String>,
    },

    /// Search users by login or display name
    SearchUsers {
        query: String,

        #[arg(long)]
        first: Option<u32>,

        #[arg(long)]
        cursor: Option<String>,
    },

    /// Look up a category by id or name
    Category {
        #[arg(long, conflicts_with = "name", required_unless_present = "name")]
        id: Option<String>,

        #[arg(long)]
        name: Option<String>,
    },

    /// Id of a channel's latest broadcast
    BroadcastId {
        #[command(flatten)]
        key: KeyArgs,
    },

    /// A channel's primary color
    Color {
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Whether the signed-in user follows a channel
    Followed {
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Follow a channel
    Follow {
        channel_id: String,

        /// Follow without notifications
        #[arg(long)]
        quiet: bool,
    },

    /// Unfollow a channel
    Unfollow { channel_id: String },

    /// Start a poll
    PollCreate {
        channel_id: String,

        title: String,

        /// Poll choice (repeat for each choice)
        #[arg(long = "choice", required = true)]
        choices: Vec<String>,

        /// Duration in seconds
        #[arg(long, default_value = "60")]
        duration: u32,

        #[arg(long)]
        subscriber_only: bool,

        #[arg(long)]
        subscriber_multiplier: bool,

        /// Bits per extra vote
        #[arg(long)]
        bits: Option<u32>,

        /// Channel points per extra vote
        #[arg(long)]
        points: Option<u32>,
    },

    /// Show a poll
    PollGet { poll_id: String },

    /// Archive a poll
    PollArchive { poll_id: String },

    /// End a poll early
    PollTerminate { poll_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ember=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = GqlConfig::new(cli.endpoint, cli.client_id);
    if let Some(token) = cli.oauth_token {
        config = config.with_oauth_token(token);
    }
    let service = EntityService::new(Arc::new(GqlClient::new(config)));

    match cli.command {
        Commands::User { key } => {
            commands::user(&service, key.id.as_deref(), key.login.as_deref()).await
        }
        Commands::Users { ids, logins } => commands::users(&service, &ids, &logins).await,
        Commands::Stream { key } => {
            commands::stream(&service, key.id.as_deref(), key.login.as_deref()).await
        }
        Commands::Tag { id, describe } => commands::tag(&service, &id, describe).await,
        Commands::TopTags { limit } => commands::top_tags(&service, limit).await,
        Commands::SearchTags {
            query,
            locale,
            category_only,
        } => commands::search_tags(&service, &query, locale.as_deref(), category_only).await,
        Commands::Languages { ids } => commands::languages(&service, &ids).await,
        Commands::SearchCategories {
            query,
            first,
            cursor,
        } => commands::search_categories(&service, &query, first, cursor.as_deref()).await,
        Commands::SearchUsers {
            query,
            first,
            cursor,
        } => commands::search_users(&service, &query, first, cursor.as_deref()).await,
        Commands::Category { id, name } => {
            commands::category(&service, id.as_deref(), name.as_deref()).await
        }
        Commands::BroadcastId { key } => {
            commands::broadcast_id(&service, key.id.as_deref(), key.login.as_deref()).await
        }
        Commands::Color { key } => {
            commands::color(&service, key.id.as_deref(), key.login.as_deref()).await
        }
        Commands::Followed { key } => {
            commands::followed(&service, key.id.as_deref(), key.login.as_deref()).await
        }
        Commands::Follow { channel_id, quiet } => {
            commands::follow(&service, &channel_id, quiet).await
        }
        Commands::Unfollow { channel_id } => commands::unfollow(&service, &channel_id).await,
        Commands::PollCreate {
            channel_id,
            title,
            choices,
            duration,
            subscriber_only,
            subscriber_multiplier,
            bits,
            points,
        } => {
            let options = PollOptions {
                duration_seconds: duration,
                subscriber_only,
                subscriber_multiplier,
                bits_per_vote: bits,
                channel_points_per_vote: points,
            };
            commands::poll_create(&service, &channel_id, &title, &choices, &options).await
        }
        Commands::PollGet { poll_id } => commands::poll_get(&service, &poll_id).await,
        Commands::PollArchive { poll_id } => commands::poll_archive(&service, &poll_id).await,
        Commands::PollTerminate { poll_id } => {
            commands::poll_terminate(&service, &poll_id).await
        }
    }
}
