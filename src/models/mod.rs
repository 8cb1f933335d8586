mod catalog;
mod delta;
mod event;
mod feed;
mod profile;

pub use catalog::{CatalogItem, CatalogPage, CatalogQuery, ContentType};
pub use delta::PreferenceDelta;
pub use event::{PreferenceChangeEvent, RecomputeTrigger};
pub use feed::Feed;
pub use profile::{Category, CategoryScores, UserPreferenceProfile};
