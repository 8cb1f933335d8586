use std::sync::Arc;

use rand::Rng;

use crate::{
    db::{Catalog, FeedStore, PreferenceStore},
    error::{AppError, AppResult},
    models::{CatalogQuery, Category, ContentType, Feed, UserPreferenceProfile},
    services::{ranking::top_keys, sampling::sample_pools, RetryPolicy},
};

/// Tunables for feed regeneration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedSettings {
    /// Keys taken from each category map
    pub top_n: usize,
    /// Items sampled from each query's result set
    pub sample_size: usize,
    /// Pages drained per catalog query
    pub max_pages: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            top_n: 3,
            sample_size: 3,
            max_pages: 20,
        }
    }
}

/// Full result sets of every catalog query, before sampling
///
/// One entry per executed query, in category order (actors, genres, directors).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidatePools {
    pub movies: Vec<Vec<String>>,
    pub shows: Vec<Vec<String>>,
}

impl CandidatePools {
    fn pools_mut(&mut self, content_type: ContentType) -> &mut Vec<Vec<String>> {
        match content_type {
            ContentType::Movie => &mut self.movies,
            ContentType::Show => &mut self.shows,
        }
    }

    pub fn query_count(&self) -> usize {
        self.movies.len() + self.shows.len()
    }
}

/// Samples every query's result set and shuffles the merged, deduplicated pools
pub fn assemble_feed<R: Rng + ?Sized>(
    user_id: &str,
    pools: &CandidatePools,
    sample_size: usize,
    rng: &mut R,
) -> Feed {
    let movies = sample_pools(&pools.movies, sample_size, rng);
    let shows = sample_pools(&pools.shows, sample_size, rng);
    Feed::new(user_id, movies, shows)
}

/// Rebuilds a user's feed from their preference profile
pub struct FeedGenerator {
    preferences: Arc<dyn PreferenceStore>,
    catalog: Arc<dyn Catalog>,
    feeds: Arc<dyn FeedStore>,
    retry: RetryPolicy,
    settings: FeedSettings,
}

impl FeedGenerator {
    pub fn new(
        preferences: Arc<dyn PreferenceStore>,
        catalog: Arc<dyn Catalog>,
        feeds: Arc<dyn FeedStore>,
        retry: RetryPolicy,
        settings: FeedSettings,
    ) -> Self {
        Self {
            preferences,
            catalog,
            feeds,
            retry,
            settings,
        }
    }

    /// Loads the profile, queries the catalog and overwrites the stored feed
    ///
    /// Fails with [`AppError::ProfileNotFound`] when the user has no profile;
    /// no feed is written in that case.
    #[tracing::instrument(skip(self))]
    pub async fn regenerate(&self, user_id: &str) -> AppResult<Feed> {
        let preferences = self.preferences.as_ref();
        let profile = self
            .retry
            .run("load_profile", || preferences.load(user_id))
            .await?
            .ok_or_else(|| AppError::ProfileNotFound(user_id.to_string()))?;

        let pools = self.collect_candidate_pools(&profile).await?;

        let feed = assemble_feed(user_id, &pools, self.settings.sample_size, &mut rand::rng());

        let feeds = self.feeds.as_ref();
        self.retry.run("put_feed", || feeds.put(&feed)).await?;

        tracing::info!(
            user_id = %user_id,
            queries = pools.query_count(),
            movies = feed.feed_movies.len(),
            shows = feed.feed_shows.len(),
            "Feed regenerated"
        );

        Ok(feed)
    }

    /// Runs one catalog query per content type for every category with keys
    pub async fn collect_candidate_pools(
        &self,
        profile: &UserPreferenceProfile,
    ) -> AppResult<CandidatePools> {
        let mut pools = CandidatePools::default();

        for category in Category::FEED_ORDER {
            let keys = top_keys(profile.scores(category), self.settings.top_n);
            if keys.is_empty() {
                continue;
            }

            for content_type in ContentType::ALL {
                let query = CatalogQuery {
                    content_type,
                    category,
                    keys: keys.clone(),
                };
                let ids = self.query_all(&query).await?;
                pools.pools_mut(content_type).push(ids);
            }
        }

        Ok(pools)
    }

    /// Drains the query page by page, up to the configured page cap
    async fn query_all(&self, query: &CatalogQuery) -> AppResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut cursor = None;

        for _ in 0..self.settings.max_pages {
            let page = self.catalog.query_page(query, cursor).await?;
            ids.extend(page.ids);

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(ids),
            }
        }

        tracing::warn!(
            content_type = %query.content_type,
            category = %query.category,
            max_pages = self.settings.max_pages,
            collected = ids.len(),
            "Catalog page cap reached, candidate pool truncated"
        );

        Ok(ids)
    }
}
