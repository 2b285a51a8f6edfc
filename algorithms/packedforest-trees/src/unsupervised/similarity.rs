use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

/// Number of independently locked shards
pub const NUM_SHARDS: usize = 64;

/// Counts how often two observations end up in the same leaf, over all trees
///
/// Keys are `(i, j)` with `i <= j`. The map is split into shards selected by key, each behind
/// its own lock, so trees finishing at the same time rarely wait on each other. Trees count
/// into a private map first and merge it once.
#[derive(Debug)]
pub struct SimilarityMatrix {
    shards: Vec<Mutex<HashMap<(usize, usize), f64>>>,
}

impl Default for SimilarityMatrix {
    fn default() -> Self {
        Self::new()
    }
}

impl SimilarityMatrix {
    pub fn new() -> Self {
        SimilarityMatrix {
            shards: (0..NUM_SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard(key: (usize, usize)) -> usize {
        key.0.wrapping_mul(0x9E37_79B9).wrapping_add(key.1) % NUM_SHARDS
    }

    /// Counts every pair of `observations`, including each observation with itself, into `local`
    pub fn count_pairs(observations: &[usize], local: &mut HashMap<(usize, usize), f64>) {
        for (i, &a) in observations.iter().enumerate() {
            for &b in observations[..=i].iter() {
                *local.entry((a.min(b), a.max(b))).or_insert(0.0) += 1.0;
            }
        }
    }

    /// Adds the counts of one tree
    pub fn merge(&self, local: HashMap<(usize, usize), f64>) {
        let mut by_shard: Vec<Vec<((usize, usize), f64)>> = vec![Vec::new(); NUM_SHARDS];
        for (key, count) in local {
            by_shard[Self::shard(key)].push((key, count));
        }
        for (shard, entries) in self.shards.iter().zip(by_shard) {
            if entries.is_empty() {
                continue;
            }
            let mut shard = shard.lock();
            for (key, count) in entries {
                *shard.entry(key).or_insert(0.0) += count;
            }
        }
    }

    /// Co-occurrence count of observations `i` and `j`
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let key = (i.min(j), i.max(j));
        self.shards[Self::shard(key)]
            .lock()
            .get(&key)
            .copied()
            .unwrap_or(0.0)
    }

    /// Number of distinct pairs counted
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All counts in key order
    pub fn pair_matrix(&self) -> BTreeMap<(usize, usize), f64> {
        let mut matrix = BTreeMap::new();
        for shard in self.shards.iter() {
            matrix.extend(shard.lock().iter().map(|(&key, &count)| (key, count)));
        }
        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn pairs_are_counted_once_per_leaf() {
        let mut local = HashMap::new();
        SimilarityMatrix::count_pairs(&[4, 1, 7], &mut local);
        assert_eq!(local.len(), 6);
        assert_eq!(local[&(1, 4)], 1.0);
        assert_eq!(local[&(4, 4)], 1.0);
        assert!(!local.contains_key(&(4, 1)));
    }

    #[test]
    fn concurrent_merges_add_up() {
        let matrix = SimilarityMatrix::new();
        (0..32).into_par_iter().for_each(|_| {
            let mut local = HashMap::new();
            SimilarityMatrix::count_pairs(&[0, 1, 2, 3, 4], &mut local);
            matrix.merge(local);
        });

        assert_eq!(matrix.len(), 15);
        assert_eq!(matrix.get(3, 1), 32.0);
        assert_eq!(matrix.get(2, 2), 32.0);
        assert_eq!(matrix.get(9, 2), 0.0);

        let ordered: Vec<_> = matrix.pair_matrix().keys().copied().collect();
        assert_eq!(ordered.first(), Some(&(0, 0)));
        assert_eq!(ordered.last(), Some(&(4, 4)));
    }
}
