//! Cyclic mini-batch generation with negative sampling.
//!
//! The generator never signals end-of-data: it walks the sorted triple list
//! with a wrapping cursor, implicitly repeating the dataset each epoch.
//! Negatives corrupt exactly one slot of a positive triple, with the side
//! chosen per triple by a Bernoulli coin (optionally biased per relation).

use rand::prelude::*;
use rand_xorshift::XorShiftRng;

use crate::store::{Triple, TripleStore};

/// Infinite cyclic batch generator over a triple set.
#[derive(Debug, Clone)]
pub struct TripleBatchGenerator {
    triples: Vec<Triple>,
    num_entities: usize,
    negatives_per_positive: usize,
    sample_negative: bool,
    bern_probs: Option<Vec<f64>>,
    cursor: usize,
    rng: XorShiftRng,
}

impl TripleBatchGenerator {
    /// Create a generator over the store's triples.
    ///
    /// When `sample_negative` is true, each served positive is paired with a
    /// corrupted triple and repeated `negatives_per_positive` times per batch.
    /// `bern_probs`, when supplied, biases the corruption side per relation;
    /// without it both sides are corrupted with probability 0.5.
    pub fn new(
        store: &TripleStore,
        negatives_per_positive: usize,
        sample_negative: bool,
        bern_probs: Option<Vec<f64>>,
        seed: u64,
    ) -> Self {
        Self {
            triples: store.triples().to_vec(),
            num_entities: store.num_entities(),
            negatives_per_positive: negatives_per_positive.max(1),
            sample_negative,
            bern_probs,
            cursor: 0,
            rng: XorShiftRng::seed_from_u64(seed),
        }
    }

    /// Number of distinct triples the generator cycles over.
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    /// Whether the underlying triple list is empty.
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Produce the next batch of positives and matched negatives.
    ///
    /// With negative sampling, `batch_size / negatives_per_positive` distinct
    /// positives are drawn; each appears once per negative draw, so both
    /// returned vectors have the same length. Without negative sampling the
    /// next `batch_size` positives are returned with an empty negative list.
    pub fn next_batch(&mut self, batch_size: usize) -> (Vec<Triple>, Vec<Triple>) {
        let mut positives = Vec::with_capacity(batch_size);
        let mut negatives = Vec::new();
        if self.triples.is_empty() {
            return (positives, negatives);
        }

        let distinct = if self.sample_negative {
            negatives.reserve(batch_size);
            batch_size / self.negatives_per_positive
        } else {
            batch_size
        };

        for _ in 0..distinct {
            if self.cursor >= self.triples.len() {
                self.cursor = 0;
            }
            let positive = self.triples[self.cursor];
            if self.sample_negative {
                for _ in 0..self.negatives_per_positive {
                    positives.push(positive);
                    negatives.push(self.corrupt(positive));
                }
            } else {
                positives.push(positive);
            }
            self.cursor += 1;
        }
        (positives, negatives)
    }

    /// Corrupt one slot of a positive triple.
    ///
    /// A Bernoulli coin picks the side (head with the relation's probability);
    /// the replacement is uniform over all entity ids except the one being
    /// replaced. Ids that happen to reconstruct another known-true triple stay
    /// eligible; filtering those is the evaluator's job.
    fn corrupt(&mut self, positive: Triple) -> Triple {
        let head_probability = self
            .bern_probs
            .as_ref()
            .and_then(|p| p.get(positive.predicate).copied())
            .unwrap_or(0.5);

        let mut negative = positive;
        if self.rng.random_bool(head_probability) {
            negative.subject = self.uniform_excluding(positive.subject);
        } else {
            negative.object = self.uniform_excluding(positive.object);
        }
        negative
    }

    /// Uniform entity id from `[0, num_entities)` excluding `skip`.
    fn uniform_excluding(&mut self, skip: usize) -> usize {
        debug_assert!(self.num_entities > 1, "cannot corrupt with a single entity");
        let drawn = self.rng.random_range(0..self.num_entities - 1);
        if drawn >= skip {
            drawn + 1
        } else {
            drawn
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TripleStore;

    fn toy_store() -> TripleStore {
        TripleStore::from_ids(
            vec![
                Triple::new(0, 0, 1),
                Triple::new(1, 0, 2),
                Triple::new(2, 1, 3),
                Triple::new(3, 1, 4),
            ],
            5,
            2,
        )
    }

    #[test]
    fn test_cyclic_iteration_repeats_in_order() {
        let store = toy_store();
        let mut generator = TripleBatchGenerator::new(&store, 1, false, None, 1);
        for round in 0..3 {
            let (positives, negatives) = generator.next_batch(store.len());
            assert!(negatives.is_empty());
            assert_eq!(positives, store.triples(), "round {round} out of order");
        }
    }

    #[test]
    fn test_cyclic_iteration_counts() {
        let store = toy_store();
        let mut generator = TripleBatchGenerator::new(&store, 1, false, None, 1);
        let n = 5;
        let (positives, _) = generator.next_batch(n * store.len());
        for t in store.triples() {
            assert_eq!(positives.iter().filter(|p| *p == t).count(), n);
        }
    }

    #[test]
    fn test_negative_batch_shape() {
        let store = toy_store();
        let mut generator = TripleBatchGenerator::new(&store, 2, true, None, 9);
        let (positives, negatives) = generator.next_batch(8);
        assert_eq!(positives.len(), 8);
        assert_eq!(negatives.len(), 8);
        // Each distinct positive repeated once per negative draw
        assert_eq!(positives[0], positives[1]);
        assert_ne!(positives[1], positives[2]);
    }

    #[test]
    fn test_negative_differs_only_in_corrupted_slot() {
        let store = toy_store();
        let mut generator = TripleBatchGenerator::new(&store, 2, true, None, 123);
        let (positives, negatives) = generator.next_batch(64);
        for (p, n) in positives.iter().zip(&negatives) {
            assert_eq!(p.predicate, n.predicate);
            let head_corrupted = p.subject != n.subject;
            let tail_corrupted = p.object != n.object;
            assert!(
                head_corrupted ^ tail_corrupted,
                "exactly one slot must differ: {p:?} vs {n:?}"
            );
        }
    }

    #[test]
    fn test_bernoulli_bias_steers_corruption_side() {
        let store = toy_store();
        // Relation 0 always corrupts the head, relation 1 never does.
        let probs = vec![1.0, 0.0];
        let mut generator = TripleBatchGenerator::new(&store, 1, true, Some(probs), 5);
        let (positives, negatives) = generator.next_batch(200);
        for (p, n) in positives.iter().zip(&negatives) {
            if p.predicate == 0 {
                assert_ne!(p.subject, n.subject);
                assert_eq!(p.object, n.object);
            } else {
                assert_eq!(p.subject, n.subject);
                assert_ne!(p.object, n.object);
            }
        }
    }

    #[test]
    fn test_uniform_excluding_never_returns_skip() {
        let store = toy_store();
        let mut generator = TripleBatchGenerator::new(&store, 1, true, None, 77);
        for skip in 0..5 {
            for _ in 0..50 {
                assert_ne!(generator.uniform_excluding(skip), skip);
            }
        }
    }
}
