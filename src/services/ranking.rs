use std::cmp::Ordering;

use crate::models::CategoryScores;

/// Returns up to `n` keys ranked by score, highest first
///
/// Equal scores are ordered by key, ascending, so the result does not depend
/// on map iteration order.
pub fn top_keys(scores: &CategoryScores, n: usize) -> Vec<String> {
    let mut ranked: Vec<(&String, f64)> = scores.iter().map(|(key, score)| (key, *score)).collect();

    ranked.sort_by(|(key_a, score_a), (key_b, score_b)| {
        match score_b.total_cmp(score_a) {
            Ordering::Equal => key_a.cmp(key_b),
            other => other,
        }
    });

    ranked
        .into_iter()
        .take(n)
        .map(|(key, _)| key.clone())
        .collect()
}
