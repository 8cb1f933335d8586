use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;

use super::PreferenceDelta;

/// Scores for one category, keyed by actor/director/genre name
pub type CategoryScores = HashMap<String, f64>;

/// A dimension along which user taste is tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Actor,
    Director,
    Genre,
}

impl Category {
    /// Order in which categories feed candidate pools: actors, genres, directors
    pub const FEED_ORDER: [Category; 3] = [Category::Actor, Category::Genre, Category::Director];

    /// Name of the catalog column holding this category's values
    pub fn catalog_field(self) -> &'static str {
        match self {
            Category::Actor => "actors",
            Category::Director => "directors",
            Category::Genre => "genres",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Actor => write!(f, "actor"),
            Category::Director => write!(f, "director"),
            Category::Genre => write!(f, "genre"),
        }
    }
}

/// Per-user taste profile
///
/// Mutated only through additive merges; scores are never overwritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferenceProfile {
    pub user_id: String,
    #[serde(default)]
    pub actors: CategoryScores,
    #[serde(default)]
    pub directors: CategoryScores,
    #[serde(default)]
    pub genres: CategoryScores,
    #[serde(default)]
    pub update_counter: f64,
}

impl UserPreferenceProfile {
    /// Creates a profile with empty maps and a zero counter
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn scores(&self, category: Category) -> &CategoryScores {
        match category {
            Category::Actor => &self.actors,
            Category::Director => &self.directors,
            Category::Genre => &self.genres,
        }
    }

    pub fn scores_mut(&mut self, category: Category) -> &mut CategoryScores {
        match category {
            Category::Actor => &mut self.actors,
            Category::Director => &mut self.directors,
            Category::Genre => &mut self.genres,
        }
    }

    /// Adds a merged delta, initializing unseen keys to zero first
    ///
    /// Returns the counter value after the merge.
    pub fn apply(&mut self, delta: &PreferenceDelta) -> f64 {
        for (category, key, value) in delta.entries() {
            *self
                .scores_mut(category)
                .entry(key.to_string())
                .or_insert(0.0) += value;
        }
        self.update_counter += delta.update_weight;
        self.update_counter
    }
}
