use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::keys::StoreKey;
use super::FeedStore;
use crate::error::AppResult;
use crate::models::Feed;

/// Feeds stored as one JSON document per user under `feed:{user}`
#[derive(Clone)]
pub struct RedisFeedStore {
    conn: ConnectionManager,
}

impl RedisFeedStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl FeedStore for RedisFeedStore {
    async fn put(&self, feed: &Feed) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let key = StoreKey::Feed(feed.user_id.clone()).to_string();
        let json = serde_json::to_string(feed)?;

        let _: () = conn.set(&key, json).await?;
        Ok(())
    }

    async fn get(&self, user_id: &str) -> AppResult<Option<Feed>> {
        let mut conn = self.conn.clone();
        let key = StoreKey::Feed(user_id.to_string()).to_string();

        let stored: Option<String> = conn.get(&key).await?;
        match stored {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_put_replaces_feed() {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let client = redis::Client::open(redis_url).unwrap();
        let store = RedisFeedStore::new(ConnectionManager::new(client).await.unwrap());
        let user_id = format!("test-{}", uuid::Uuid::new_v4());

        store
            .put(&Feed::new(&user_id, vec!["m1".to_string()], vec!["s1".to_string()]))
            .await
            .unwrap();
        store
            .put(&Feed::new(&user_id, vec!["m2".to_string()], vec![]))
            .await
            .unwrap();

        let feed = store.get(&user_id).await.unwrap().unwrap();
        assert_eq!(feed.feed_movies, vec!["m2"]);
        assert!(feed.feed_shows.is_empty());

        let mut conn = store.conn.clone();
        let _: () = conn.del(StoreKey::Feed(user_id).to_string()).await.unwrap();
    }
}
