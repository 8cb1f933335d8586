use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Materialized feed for one user, replaced wholesale on every regeneration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
    pub user_id: String,
    pub feed_movies: Vec<String>,
    pub feed_shows: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl Feed {
    pub fn new(user_id: impl Into<String>, feed_movies: Vec<String>, feed_shows: Vec<String>) -> Self {
        Self {
            user_id: user_id.into(),
            feed_movies,
            feed_shows,
            generated_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.feed_movies.is_empty() && self.feed_shows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_serialization() {
        let feed = Feed::new("u1", vec!["m1".to_string()], vec![]);
        let json = serde_json::to_value(&feed).unwrap();

        assert_eq!(json["userId"], "u1");
        assert_eq!(json["feedMovies"][0], "m1");
        assert!(json["feedShows"].as_array().unwrap().is_empty());
        assert!(json["generatedAt"].is_string());
    }
}
