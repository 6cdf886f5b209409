//! CLI command implementations

pub mod config;
pub mod download;
pub mod list;
pub mod resources;

pub use config::execute as config;
pub use download::execute as download;
pub use list::execute as list;
pub use resources::execute as resources;

use crate::cache::LocalMetadataCache;
use crate::config::Config;
use crate::error::FeedResult;
use crate::protocol::{RetryPolicy, UreqFetcher, UserAgent};
use crate::repository::{RepositoryFactory, ResourceCatalog};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Build a repository factory with the standard providers from config
fn repository_factory(config: &Config) -> FeedResult<RepositoryFactory> {
    let user_agent = config
        .http
        .user_agent
        .as_deref()
        .map(UserAgent::new)
        .unwrap_or_default();
    let policy = RetryPolicy::from_process();
    debug!("HTTP retry policy: {:?}", policy);

    let fetcher = UreqFetcher::new(user_agent, policy, Duration::from_secs(config.http.timeout_secs));
    let catalog = ResourceCatalog::standard(Arc::new(fetcher), Arc::new(LocalMetadataCache::new()));
    RepositoryFactory::new(catalog)
}

/// Token that fires on Ctrl-C
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupted, cancelling");
            child.cancel();
        }
    });
    token
}
