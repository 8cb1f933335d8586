//! Storage seams for the pipeline
//!
//! The aggregator and feed generator only see these traits; the process entry
//! point decides which backends sit behind them.

use async_trait::async_trait;

use crate::{
    error::AppResult,
    models::{CatalogPage, CatalogQuery, Feed, PreferenceDelta, UserPreferenceProfile},
};

pub mod catalog;
pub mod connection;
pub mod feeds;
pub mod keys;
pub mod memory;
pub mod preferences;

pub use catalog::{create_pool, PgCatalog};
pub use connection::{connect_manager, create_redis_client};
pub use feeds::RedisFeedStore;
pub use keys::StoreKey;
pub use preferences::RedisPreferenceStore;

/// Persisted per-user preference profiles
///
/// Owned by the aggregator; the feed generator only calls [`load`](Self::load).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Installs an empty profile if, and only if, none exists yet
    async fn ensure_initialized(&self, user_id: &str) -> AppResult<()>;

    /// Atomically adds every key of `delta` and its update weight
    ///
    /// Returns the counter value after the increment.
    async fn increment(&self, user_id: &str, delta: &PreferenceDelta) -> AppResult<f64>;

    async fn reset_counter(&self, user_id: &str) -> AppResult<()>;

    /// Atomically adds `amount` to the counter alone
    async fn add_to_counter(&self, user_id: &str, amount: f64) -> AppResult<()>;

    async fn load(&self, user_id: &str) -> AppResult<Option<UserPreferenceProfile>>;
}

/// Persisted per-user feeds
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Replaces the user's feed in a single write
    async fn put(&self, feed: &Feed) -> AppResult<()>;

    async fn get(&self, user_id: &str) -> AppResult<Option<Feed>>;
}

/// Read-only view of the movie/show metadata store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Fetches one page of ids matching `query`, starting after `cursor`
    async fn query_page(&self, query: &CatalogQuery, cursor: Option<String>)
        -> AppResult<CatalogPage>;
}
