use std::fmt::Display;

use crate::models::Category;

/// Hash field holding the recompute counter inside a preference hash
pub const COUNTER_FIELD: &str = "updateCounter";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    Preferences(String),
    Feed(String),
}

impl Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKey::Preferences(user_id) => write!(f, "pref:{}", user_id),
            StoreKey::Feed(user_id) => write!(f, "feed:{}", user_id),
        }
    }
}

/// Hash field for one category score, e.g. `genre:Drama`
pub fn score_field(category: Category, key: &str) -> String {
    format!("{}:{}", category, key)
}

/// Splits a hash field back into its category and key
///
/// Returns `None` for the counter field and anything unrecognised.
pub fn parse_score_field(field: &str) -> Option<(Category, &str)> {
    let (prefix, key) = field.split_once(':')?;
    let category = match prefix {
        "actor" => Category::Actor,
        "director" => Category::Director,
        "genre" => Category::Genre,
        _ => return None,
    };
    Some((category, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_key_display() {
        assert_eq!(StoreKey::Preferences("u1".to_string()).to_string(), "pref:u1");
        assert_eq!(StoreKey::Feed("u1".to_string()).to_string(), "feed:u1");
    }

    #[test]
    fn test_score_field_round_trip_keeps_colons_in_key() {
        let field = score_field(Category::Actor, "Jean-Luc: The Sequel");
        assert_eq!(field, "actor:Jean-Luc: The Sequel");
        assert_eq!(
            parse_score_field(&field),
            Some((Category::Actor, "Jean-Luc: The Sequel"))
        );
    }

    #[test]
    fn test_counter_field_is_not_a_score() {
        assert_eq!(parse_score_field(COUNTER_FIELD), None);
        assert_eq!(parse_score_field("studio:Ghibli"), None);
    }
}
