use std::collections::HashSet;

use rand::seq::{index, SliceRandom};
use rand::Rng;

/// Draws up to `amount` distinct items uniformly at random
pub fn sample_distinct<R: Rng + ?Sized>(pool: &[String], amount: usize, rng: &mut R) -> Vec<String> {
    let amount = amount.min(pool.len());
    index::sample(rng, pool.len(), amount)
        .into_iter()
        .map(|i| pool[i].clone())
        .collect()
}

/// Drops repeated ids, keeping the first occurrence
pub fn dedup_ids(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// Samples every pool, merges the samples, dedups and shuffles the result
pub fn sample_pools<R: Rng + ?Sized>(pools: &[Vec<String>], amount: usize, rng: &mut R) -> Vec<String> {
    let mut merged = Vec::new();
    for pool in pools {
        merged.extend(sample_distinct(pool, amount, rng));
    }

    let mut unique = dedup_ids(merged);
    unique.shuffle(rng);
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_samples_three_distinct_from_five() {
        let pool = ids(&["m1", "m2", "m3", "m4", "m5"]);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let sample = sample_distinct(&pool, 3, &mut rng);
            assert_eq!(sample.len(), 3);
            let unique: HashSet<_> = sample.iter().collect();
            assert_eq!(unique.len(), 3);
            assert!(sample.iter().all(|id| pool.contains(id)));
        }
    }

    #[test]
    fn test_small_and_empty_pools() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(sample_distinct(&[], 3, &mut rng).is_empty());

        let mut sample = sample_distinct(&ids(&["a", "b"]), 3, &mut rng);
        sample.sort();
        assert_eq!(sample, ids(&["a", "b"]));
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        assert_eq!(
            dedup_ids(ids(&["b", "a", "b", "c", "a"])),
            ids(&["b", "a", "c"])
        );
    }

    #[test]
    fn test_sample_pools_counts_shared_titles_once() {
        let pools = vec![ids(&["m1", "m2"]), ids(&["m2", "m3"]), vec![]];
        let mut rng = StdRng::seed_from_u64(3);

        let mut merged = sample_pools(&pools, 3, &mut rng);
        merged.sort();

        assert_eq!(merged, ids(&["m1", "m2", "m3"]));
    }

    #[test]
    fn test_same_seed_same_order() {
        let pools = vec![ids(&["m1", "m2", "m3", "m4", "m5", "m6"])];
        let a = sample_pools(&pools, 3, &mut StdRng::seed_from_u64(42));
        let b = sample_pools(&pools, 3, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }
}
