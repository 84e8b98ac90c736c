//! Validated triple storage, train/valid/test splits, and per-relation
//! corruption-side probabilities.
//!
//! The store only promises triples over the supplied dictionaries: input
//! triples referencing unknown identifiers are dropped silently at
//! construction. Triples are kept sorted so batch iteration order is
//! reproducible.

use std::collections::{HashMap, HashSet};

use rand::prelude::*;
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dictionary::Dictionary;

/// A (subject, predicate, object) fact over dense integer ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    /// Subject (head) entity id.
    pub subject: usize,
    /// Predicate (relation) id.
    pub predicate: usize,
    /// Object (tail) entity id.
    pub object: usize,
}

impl Triple {
    /// Create a new id triple.
    pub fn new(subject: usize, predicate: usize, object: usize) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }
}

/// An immutable collection of validated id triples.
#[derive(Debug, Clone)]
pub struct TripleStore {
    triples: Vec<Triple>,
    num_entities: usize,
    num_relations: usize,
}

impl TripleStore {
    /// Build a store from labelled triples and the two dictionaries.
    ///
    /// Triples whose subject, predicate, or object is absent from its
    /// dictionary are skipped. The surviving triples are sorted.
    pub fn from_labels<'a, I>(triples: I, entities: &Dictionary, relations: &Dictionary) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str, &'a str)>,
    {
        let mut ids: Vec<Triple> = triples
            .into_iter()
            .filter_map(|(s, p, o)| {
                let s = entities.id(s)?;
                let p = relations.id(p)?;
                let o = entities.id(o)?;
                Some(Triple::new(s, p, o))
            })
            .collect();
        ids.sort_unstable();
        debug!(kept = ids.len(), "built triple store");
        Self {
            triples: ids,
            num_entities: entities.len(),
            num_relations: relations.len(),
        }
    }

    /// Build a store directly from id triples (already validated by caller).
    pub fn from_ids(mut triples: Vec<Triple>, num_entities: usize, num_relations: usize) -> Self {
        triples.sort_unstable();
        Self {
            triples,
            num_entities,
            num_relations,
        }
    }

    /// The sorted triples.
    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    /// Number of triples.
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    /// Whether the store holds no triples.
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Number of entity ids the store was built over.
    pub fn num_entities(&self) -> usize {
        self.num_entities
    }

    /// Number of relation ids the store was built over.
    pub fn num_relations(&self) -> usize {
        self.num_relations
    }

    /// The triples as a hash set, for known-true filtering.
    pub fn known_set(&self) -> HashSet<Triple> {
        self.triples.iter().copied().collect()
    }

    /// Partition the store into disjoint train/validation/test stores.
    ///
    /// `valid_proportion` and `test_proportion` of the triples are drawn by
    /// random index selection without replacement; the remainder is the train
    /// set. The three splits are pairwise disjoint and their union recovers
    /// the full store.
    pub fn split(&self, valid_proportion: f64, test_proportion: f64, seed: u64) -> (Self, Self, Self) {
        let n = self.triples.len();
        let valid_size = (valid_proportion * n as f64).floor() as usize;
        let test_size = (test_proportion * n as f64).floor() as usize;

        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = XorShiftRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let valid_idx: HashSet<usize> = indices[..valid_size].iter().copied().collect();
        let test_idx: HashSet<usize> = indices[valid_size..valid_size + test_size]
            .iter()
            .copied()
            .collect();

        let mut train = Vec::with_capacity(n - valid_size - test_size);
        let mut valid = Vec::with_capacity(valid_size);
        let mut test = Vec::with_capacity(test_size);
        for (i, &t) in self.triples.iter().enumerate() {
            if valid_idx.contains(&i) {
                valid.push(t);
            } else if test_idx.contains(&i) {
                test.push(t);
            } else {
                train.push(t);
            }
        }

        (
            Self::from_ids(train, self.num_entities, self.num_relations),
            Self::from_ids(valid, self.num_entities, self.num_relations),
            Self::from_ids(test, self.num_entities, self.num_relations),
        )
    }

    /// Per-relation Bernoulli corruption-side probabilities.
    ///
    /// For each relation: tails-per-head / (tails-per-head + heads-per-tail),
    /// computed over the full store before any split. The probability is the
    /// chance of corrupting the *head* side when sampling a negative for that
    /// relation. Relations with no observed triples fall back to 0.5.
    pub fn bernoulli_probs(&self) -> Vec<f64> {
        let mut heads: HashMap<usize, HashSet<usize>> = HashMap::new();
        let mut tails: HashMap<usize, HashSet<usize>> = HashMap::new();
        let mut pairs: HashMap<usize, usize> = HashMap::new();

        for t in &self.triples {
            heads.entry(t.predicate).or_default().insert(t.subject);
            tails.entry(t.predicate).or_default().insert(t.object);
            *pairs.entry(t.predicate).or_insert(0) += 1;
        }

        (0..self.num_relations)
            .map(|p| {
                let num_heads = heads.get(&p).map_or(0, HashSet::len);
                let num_tails = tails.get(&p).map_or(0, HashSet::len);
                if num_heads == 0 || num_tails == 0 {
                    warn!(relation = p, "relation without substantiated triples, defaulting corruption probability to 0.5");
                    return 0.5;
                }
                let n = pairs[&p] as f64;
                let tph = n / num_heads as f64;
                let hpt = n / num_tails as f64;
                tph / (tph + hpt)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_dicts() -> (Dictionary, Dictionary) {
        (
            Dictionary::from_keys(["a", "b", "c", "d"]),
            Dictionary::from_keys(["r", "s"]),
        )
    }

    #[test]
    fn test_unknown_ids_dropped() {
        let (ents, rels) = toy_dicts();
        let store = TripleStore::from_labels(
            vec![("a", "r", "b"), ("a", "r", "zzz"), ("nope", "r", "b"), ("a", "missing", "b")],
            &ents,
            &rels,
        );
        assert_eq!(store.len(), 1);
        assert_eq!(store.triples()[0], Triple::new(0, 0, 1));
    }

    #[test]
    fn test_all_ids_in_range() {
        let (ents, rels) = toy_dicts();
        let store = TripleStore::from_labels(
            vec![("a", "r", "b"), ("b", "s", "c"), ("c", "r", "d")],
            &ents,
            &rels,
        );
        for t in store.triples() {
            assert!(t.subject < store.num_entities());
            assert!(t.object < store.num_entities());
            assert!(t.predicate < store.num_relations());
        }
    }

    #[test]
    fn test_split_is_exact_partition() {
        let triples: Vec<Triple> = (0..50)
            .map(|i| Triple::new(i % 10, i % 3, (i + 1) % 10))
            .collect();
        let store = TripleStore::from_ids(triples, 10, 3);
        let (train, valid, test) = store.split(0.2, 0.3, 7);

        assert_eq!(train.len() + valid.len() + test.len(), store.len());

        let mut union: Vec<Triple> = Vec::new();
        union.extend_from_slice(train.triples());
        union.extend_from_slice(valid.triples());
        union.extend_from_slice(test.triples());
        union.sort_unstable();
        assert_eq!(union, store.triples());
    }

    #[test]
    fn test_split_sizes() {
        let triples: Vec<Triple> = (0..100).map(|i| Triple::new(i, 0, (i + 1) % 100)).collect();
        let store = TripleStore::from_ids(triples, 100, 1);
        let (train, valid, test) = store.split(0.1, 0.2, 42);
        assert_eq!(valid.len(), 10);
        assert_eq!(test.len(), 20);
        assert_eq!(train.len(), 70);
    }

    #[test]
    fn test_bernoulli_probs() {
        // Relation 0: one head (0) with two tails -> tph = 2, two tails with
        // one head each -> hpt = 1. Probability of corrupting the head side:
        // 2 / (2 + 1).
        let store = TripleStore::from_ids(
            vec![Triple::new(0, 0, 1), Triple::new(0, 0, 2)],
            3,
            2,
        );
        let probs = store.bernoulli_probs();
        assert!((probs[0] - 2.0 / 3.0).abs() < 1e-12);
        // Relation 1 has no triples -> default
        assert!((probs[1] - 0.5).abs() < 1e-12);
    }
}
