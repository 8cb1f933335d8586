use std::collections::BTreeMap;

use super::{Category, PreferenceChangeEvent};

/// Merged effect of every event for one user within one batch
///
/// Ordered maps keep store commands in a stable order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreferenceDelta {
    pub actors: BTreeMap<String, f64>,
    pub directors: BTreeMap<String, f64>,
    pub genres: BTreeMap<String, f64>,
    pub update_weight: f64,
}

impl PreferenceDelta {
    /// Folds one event into the delta
    pub fn absorb(&mut self, event: &PreferenceChangeEvent) {
        for (category, keys) in [
            (Category::Actor, &event.actors),
            (Category::Director, &event.directors),
            (Category::Genre, &event.genres),
        ] {
            let scores = self.scores_mut(category);
            for key in keys {
                *scores.entry(key.clone()).or_insert(0.0) += event.change_weight;
            }
        }
        self.update_weight += event.update_weight;
    }

    pub fn scores(&self, category: Category) -> &BTreeMap<String, f64> {
        match category {
            Category::Actor => &self.actors,
            Category::Director => &self.directors,
            Category::Genre => &self.genres,
        }
    }

    fn scores_mut(&mut self, category: Category) -> &mut BTreeMap<String, f64> {
        match category {
            Category::Actor => &mut self.actors,
            Category::Director => &mut self.directors,
            Category::Genre => &mut self.genres,
        }
    }

    /// Every (category, key, delta) triple, actors first
    pub fn entries(&self) -> impl Iterator<Item = (Category, &str, f64)> + '_ {
        [Category::Actor, Category::Director, Category::Genre]
            .into_iter()
            .flat_map(move |category| {
                self.scores(category)
                    .iter()
                    .map(move |(key, value)| (category, key.as_str(), *value))
            })
    }

    /// Number of category keys touched
    pub fn key_count(&self) -> usize {
        self.actors.len() + self.directors.len() + self.genres.len()
    }
}
