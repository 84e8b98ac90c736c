//! Filtered link-prediction evaluation.
//!
//! For every evaluation triple both the head and the tail are replaced by
//! each candidate entity; the rank of the true entity among the candidates
//! yields Mean Rank, MRR and Hits@k. Ranking is *filtered*: candidates that
//! form a different known-true triple are not counted as errors, since the
//! model is right to score them highly.
//!
//! Head and tail ranks are pooled into one metric set, and the same ranks are
//! additionally grouped per relation for the breakdown report.

use std::collections::{HashMap, HashSet};

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::models::{ProjectionCache, TranslationModel};
use crate::store::Triple;

/// Aggregate ranking quality over a pool of ranks.
///
/// Hits@k values are percentages in `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankMetrics {
    pub mean_rank: f64,
    pub mrr: f64,
    pub hits_at_10: f64,
    pub hits_at_3: f64,
    pub hits_at_1: f64,
    /// Number of ranks pooled into the aggregate.
    pub count: usize,
}

impl RankMetrics {
    /// Aggregate a pool of 1-based ranks.
    pub fn from_ranks(ranks: &[usize]) -> Self {
        if ranks.is_empty() {
            return Self {
                mean_rank: 0.0,
                mrr: 0.0,
                hits_at_10: 0.0,
                hits_at_3: 0.0,
                hits_at_1: 0.0,
                count: 0,
            };
        }
        let n = ranks.len() as f64;
        let hits = |k: usize| 100.0 * ranks.iter().filter(|&&r| r <= k).count() as f64 / n;
        Self {
            mean_rank: ranks.iter().sum::<usize>() as f64 / n,
            mrr: ranks.iter().map(|&r| 1.0 / r as f64).sum::<f64>() / n,
            hits_at_10: hits(10),
            hits_at_3: hits(3),
            hits_at_1: hits(1),
            count: ranks.len(),
        }
    }
}

/// Pooled metrics plus the per-relation breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Metrics over all head and tail ranks.
    pub all: RankMetrics,
    /// Metrics keyed by relation id.
    pub per_relation: HashMap<usize, RankMetrics>,
}

/// Filtered ranking evaluator over a fixed set of known-true triples.
///
/// The known set should cover the union of the train, validation and test
/// splits so that no true triple is counted as a ranking error.
#[derive(Debug, Clone)]
pub struct RankingEvaluator {
    known: HashSet<Triple>,
    cache_capacity: usize,
}

impl RankingEvaluator {
    /// Evaluator filtering against `known`, with the default projection-cache
    /// budget.
    pub fn new(known: HashSet<Triple>) -> Self {
        Self {
            known,
            cache_capacity: 1 << 14,
        }
    }

    /// Override the projection-cache entry budget; 0 disables the cache.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Rank every triple on both sides and aggregate.
    pub fn evaluate(&self, model: &dyn TranslationModel, triples: &[Triple]) -> EvaluationReport {
        let mut cache = if self.cache_capacity == 0 {
            ProjectionCache::disabled()
        } else {
            ProjectionCache::bounded(self.cache_capacity)
        };
        let head_scores = model.rank_heads(triples, &mut cache);
        let tail_scores = model.rank_tails(triples, &mut cache);

        let mut pooled = Vec::with_capacity(triples.len() * 2);
        let mut by_relation: HashMap<usize, Vec<usize>> = HashMap::new();
        for (i, &triple) in triples.iter().enumerate() {
            let head_rank = self.filtered_rank(head_scores.row(i), triple.subject, |j| {
                Triple::new(j, triple.predicate, triple.object)
            });
            let tail_rank = self.filtered_rank(tail_scores.row(i), triple.object, |j| {
                Triple::new(triple.subject, triple.predicate, j)
            });
            pooled.push(head_rank);
            pooled.push(tail_rank);
            let slot = by_relation.entry(triple.predicate).or_default();
            slot.push(head_rank);
            slot.push(tail_rank);
        }
        EvaluationReport {
            all: RankMetrics::from_ranks(&pooled),
            per_relation: by_relation
                .into_iter()
                .map(|(relation, ranks)| (relation, RankMetrics::from_ranks(&ranks)))
                .collect(),
        }
    }

    /// 1-based filtered rank of `true_id` within one score row.
    ///
    /// Strictly-better candidates count against the rank unless substituting
    /// them yields another known-true triple.
    fn filtered_rank<F>(&self, scores: ArrayView1<'_, f32>, true_id: usize, candidate: F) -> usize
    where
        F: Fn(usize) -> Triple,
    {
        let true_score = scores[true_id];
        let mut rank = 1;
        for (j, &score) in scores.iter().enumerate() {
            if j == true_id || score <= true_score {
                continue;
            }
            if self.known.contains(&candidate(j)) {
                continue;
            }
            rank += 1;
        }
        rank
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelConfig, ModelKind, TransE};
    use proptest::prelude::*;

    #[test]
    fn test_metrics_from_empty_pool() {
        let metrics = RankMetrics::from_ranks(&[]);
        assert_eq!(metrics.count, 0);
        assert_eq!(metrics.mean_rank, 0.0);
    }

    #[test]
    fn test_metrics_percentages() {
        let metrics = RankMetrics::from_ranks(&[1, 2, 5, 20]);
        assert_eq!(metrics.count, 4);
        assert!((metrics.mean_rank - 7.0).abs() < 1e-9);
        assert!((metrics.hits_at_10 - 75.0).abs() < 1e-9);
        assert!((metrics.hits_at_3 - 50.0).abs() < 1e-9);
        assert!((metrics.hits_at_1 - 25.0).abs() < 1e-9);
    }

    /// Four entities placed so a known-true triple outranks the test triple:
    /// the raw rank is 2, the filtered rank 1.
    #[test]
    fn test_filtering_discards_known_true_competitor() {
        let mut model = TransE::new(ModelConfig::new(4, 1, 2));
        model
            .init_entities(&[
                (0, vec![0.0, 0.0]),
                (1, vec![1.0, 0.0]),
                (2, vec![0.9, 0.0]),
                (3, vec![-5.0, 5.0]),
            ])
            .unwrap();
        // relation vector [1, 0]: entity 1 is the exact translation target,
        // entity 2 the test answer
        let mut snapshot = model.checkpoint();
        snapshot.relations.row_mut(0).assign(&ndarray::arr1(&[1.0, 0.0]));
        model.restore(&snapshot).unwrap();
        assert_eq!(model.kind(), ModelKind::TransE);

        let test_triple = Triple::new(0, 0, 2);
        let known: HashSet<Triple> =
            [Triple::new(0, 0, 1), test_triple].into_iter().collect();

        let filtered = RankingEvaluator::new(known);
        let raw = RankingEvaluator::new([test_triple].into_iter().collect());

        let filtered_report = filtered.evaluate(&model, &[test_triple]);
        let raw_report = raw.evaluate(&model, &[test_triple]);
        // Tail rank is the second pooled entry
        assert!(raw_report.all.mean_rank > filtered_report.all.mean_rank);
        assert_eq!(filtered_report.per_relation.len(), 1);
    }

    #[test]
    fn test_per_relation_counts_sum_to_pool() {
        let model = TransE::new(ModelConfig::new(6, 3, 4));
        let triples = vec![
            Triple::new(0, 0, 1),
            Triple::new(2, 1, 3),
            Triple::new(4, 1, 5),
        ];
        let evaluator = RankingEvaluator::new(triples.iter().copied().collect());
        let report = evaluator.evaluate(&model, &triples);
        assert_eq!(report.all.count, 6);
        let per_relation: usize = report.per_relation.values().map(|m| m.count).sum();
        assert_eq!(per_relation, 6);
        assert_eq!(report.per_relation[&1].count, 4);
    }

    proptest! {
        #[test]
        fn test_hits_monotone_in_k(ranks in prop::collection::vec(1usize..200, 1..64)) {
            let metrics = RankMetrics::from_ranks(&ranks);
            prop_assert!(metrics.hits_at_1 <= metrics.hits_at_3);
            prop_assert!(metrics.hits_at_3 <= metrics.hits_at_10);
            prop_assert!(metrics.mrr <= 1.0 + 1e-9);
            prop_assert!(metrics.mean_rank >= 1.0);
        }
    }
}
