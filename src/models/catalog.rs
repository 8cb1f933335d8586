use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::Category;

/// Type of content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Movie,
    Show,
}

impl ContentType {
    pub const ALL: [ContentType; 2] = [ContentType::Movie, ContentType::Show];

    /// Catalog table holding this content type
    pub fn table(self) -> &'static str {
        match self {
            ContentType::Movie => "movie",
            ContentType::Show => "show",
        }
    }
}

impl Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.table())
    }
}

/// A catalog title with the category values it can be matched on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    #[serde(default)]
    pub actors: Vec<String>,
    #[serde(default)]
    pub directors: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl CatalogItem {
    pub fn values(&self, category: Category) -> &[String] {
        match category {
            Category::Actor => &self.actors,
            Category::Director => &self.directors,
            Category::Genre => &self.genres,
        }
    }

    /// True when the item carries any of `keys` in the given category
    pub fn matches(&self, category: Category, keys: &[String]) -> bool {
        self.values(category).iter().any(|value| keys.contains(value))
    }
}

/// Titles of one content type whose category field contains any of `keys`
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogQuery {
    pub content_type: ContentType,
    pub category: Category,
    pub keys: Vec<String>,
}

/// One page of matching content ids, ordered by id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogPage {
    pub ids: Vec<String>,
    /// Cursor for the next page, absent on the last page
    pub next_cursor: Option<String>,
}
