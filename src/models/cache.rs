//! Bounded memoization for ranking computations.
//!
//! Ranking a batch of queries repeats the same per-(entity, relation)
//! intermediate (a hyperplane projection for TransH, a transformed query
//! vector for RESCAL) whenever a relation recurs across queries. The cache is
//! injectable and purely a performance toggle: scores are numerically
//! identical with or without it.

use std::collections::HashMap;

use ndarray::Array1;

/// Which transform a cached vector holds.
///
/// Models whose head- and tail-side transforms differ (RESCAL applies M one
/// way and Mᵀ the other) key the two directions apart; direction-independent
/// transforms (the TransH projection) use [`Transform::Forward`] on both
/// sides and share entries across directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transform {
    Forward,
    Transposed,
}

/// Bounded `(entity_id, relation_id, transform) -> vector` memo.
#[derive(Debug, Clone, Default)]
pub struct ProjectionCache {
    map: HashMap<(usize, usize, Transform), Array1<f32>>,
    capacity: usize,
}

impl ProjectionCache {
    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// A cache holding at most `capacity` entries; once full, further
    /// insertions are dropped rather than evicted.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity.min(1 << 16)),
            capacity,
        }
    }

    /// Fetch the memoized vector for `key`, computing (and possibly storing)
    /// it on a miss.
    pub fn get_or_compute<F>(&mut self, key: (usize, usize, Transform), compute: F) -> Array1<f32>
    where
        F: FnOnce() -> Array1<f32>,
    {
        if let Some(hit) = self.map.get(&key) {
            return hit.clone();
        }
        let value = compute();
        if self.map.len() < self.capacity {
            self.map.insert(key, value.clone());
        }
        value
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the cache currently holds no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drop all entries, keeping the capacity.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}
