//! In-process backends for tests and local runs
//!
//! Each store holds its lock for the whole operation, which gives the same
//! atomicity the Redis implementations get from single commands.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Catalog, FeedStore, PreferenceStore};
use crate::channel::TriggerSink;
use crate::error::AppResult;
use crate::models::{
    CatalogItem, CatalogPage, CatalogQuery, ContentType, Feed, PreferenceDelta, RecomputeTrigger,
    UserPreferenceProfile,
};

#[derive(Default)]
pub struct MemoryPreferenceStore {
    profiles: RwLock<HashMap<String, UserPreferenceProfile>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a profile directly, bypassing the aggregator
    pub async fn insert(&self, profile: UserPreferenceProfile) {
        self.profiles
            .write()
            .await
            .insert(profile.user_id.clone(), profile);
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn ensure_initialized(&self, user_id: &str) -> AppResult<()> {
        self.profiles
            .write()
            .await
            .entry(user_id.to_string())
            .or_insert_with(|| UserPreferenceProfile::empty(user_id));
        Ok(())
    }

    async fn increment(&self, user_id: &str, delta: &PreferenceDelta) -> AppResult<f64> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .entry(user_id.to_string())
            .or_insert_with(|| UserPreferenceProfile::empty(user_id));
        Ok(profile.apply(delta))
    }

    async fn reset_counter(&self, user_id: &str) -> AppResult<()> {
        if let Some(profile) = self.profiles.write().await.get_mut(user_id) {
            profile.update_counter = 0.0;
        }
        Ok(())
    }

    async fn add_to_counter(&self, user_id: &str, amount: f64) -> AppResult<()> {
        self.profiles
            .write()
            .await
            .entry(user_id.to_string())
            .or_insert_with(|| UserPreferenceProfile::empty(user_id))
            .update_counter += amount;
        Ok(())
    }

    async fn load(&self, user_id: &str) -> AppResult<Option<UserPreferenceProfile>> {
        Ok(self.profiles.read().await.get(user_id).cloned())
    }
}

#[derive(Default)]
pub struct MemoryFeedStore {
    feeds: RwLock<HashMap<String, Feed>>,
}

impl MemoryFeedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedStore for MemoryFeedStore {
    async fn put(&self, feed: &Feed) -> AppResult<()> {
        self.feeds
            .write()
            .await
            .insert(feed.user_id.clone(), feed.clone());
        Ok(())
    }

    async fn get(&self, user_id: &str) -> AppResult<Option<Feed>> {
        Ok(self.feeds.read().await.get(user_id).cloned())
    }
}

/// Catalog over fixed item lists, paginated like the Postgres catalog
pub struct MemoryCatalog {
    movies: Vec<CatalogItem>,
    shows: Vec<CatalogItem>,
    page_size: usize,
    queries: RwLock<Vec<CatalogQuery>>,
}

impl MemoryCatalog {
    pub fn new(mut movies: Vec<CatalogItem>, mut shows: Vec<CatalogItem>, page_size: usize) -> Self {
        movies.sort_by(|a, b| a.id.cmp(&b.id));
        shows.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            movies,
            shows,
            page_size: page_size.max(1),
            queries: RwLock::new(Vec::new()),
        }
    }

    /// Every page request received so far, in order
    pub async fn queries(&self) -> Vec<CatalogQuery> {
        self.queries.read().await.clone()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn query_page(
        &self,
        query: &CatalogQuery,
        cursor: Option<String>,
    ) -> AppResult<CatalogPage> {
        self.queries.write().await.push(query.clone());

        let items = match query.content_type {
            ContentType::Movie => &self.movies,
            ContentType::Show => &self.shows,
        };

        let ids: Vec<String> = items
            .iter()
            .filter(|item| cursor.as_deref().map_or(true, |after| item.id.as_str() > after))
            .filter(|item| item.matches(query.category, &query.keys))
            .take(self.page_size)
            .map(|item| item.id.clone())
            .collect();

        let next_cursor = if ids.len() == self.page_size {
            ids.last().cloned()
        } else {
            None
        };

        Ok(CatalogPage { ids, next_cursor })
    }
}

/// Collects emitted triggers instead of publishing them
#[derive(Default)]
pub struct MemoryTriggerSink {
    emitted: RwLock<Vec<RecomputeTrigger>>,
}

impl MemoryTriggerSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn emitted(&self) -> Vec<RecomputeTrigger> {
        self.emitted.read().await.clone()
    }

    /// Removes and returns everything emitted so far
    pub async fn drain(&self) -> Vec<RecomputeTrigger> {
        std::mem::take(&mut *self.emitted.write().await)
    }
}

#[async_trait]
impl TriggerSink for MemoryTriggerSink {
    async fn emit(&self, trigger: &RecomputeTrigger) -> AppResult<()> {
        self.emitted.write().await.push(trigger.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    fn movie(id: &str, genres: &[&str]) -> CatalogItem {
        CatalogItem {
            id: id.to_string(),
            actors: vec![],
            directors: vec![],
            genres: genres.iter().map(|g| g.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_catalog_pages_in_id_order() {
        let catalog = MemoryCatalog::new(
            vec![
                movie("m3", &["Drama"]),
                movie("m1", &["Drama"]),
                movie("m2", &["Comedy"]),
                movie("m4", &["Drama", "Comedy"]),
            ],
            vec![],
            2,
        );
        let query = CatalogQuery {
            content_type: ContentType::Movie,
            category: Category::Genre,
            keys: vec!["Drama".to_string()],
        };

        let first = catalog.query_page(&query, None).await.unwrap();
        assert_eq!(first.ids, vec!["m1", "m3"]);
        assert_eq!(first.next_cursor.as_deref(), Some("m3"));

        let second = catalog.query_page(&query, first.next_cursor).await.unwrap();
        assert_eq!(second.ids, vec!["m4"]);
        assert_eq!(second.next_cursor, None);
    }

    #[tokio::test]
    async fn test_reset_counter_on_missing_profile_is_noop() {
        let store = MemoryPreferenceStore::new();
        store.reset_counter("ghost").await.unwrap();
        assert!(store.load("ghost").await.unwrap().is_none());
    }
}
