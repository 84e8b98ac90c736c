//! TransE: relations as translations (Bordes et al. 2013).
//!
//! If (h, r, t) holds, then h + r ≈ t in embedding space. Score is the
//! negative L2 distance ‖h + r − t‖, so a perfect triple scores 0.

use std::collections::HashSet;

use ndarray::{Array1, Array2};

use super::{
    l2_norm, margin_loss, ModelConfig, ModelCore, ModelKind, ProjectionCache, TranslationModel,
};
use crate::checkpoint::Checkpoint;
use crate::error::{Error, Result};
use crate::sequence::SequenceBatch;
use crate::store::Triple;

/// Plain translation model.
#[derive(Debug, Clone)]
pub struct TransE {
    core: ModelCore,
}

impl TransE {
    /// Allocate tables per the configuration.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            core: ModelCore::new(config),
        }
    }

    /// The translation residual h + r − t.
    fn residual(&self, t: Triple) -> Array1<f32> {
        let h = self.core.entities.row(t.subject);
        let r = self.core.relations.row(t.predicate);
        let o = self.core.entities.row(t.object);
        (&h + &r) - &o
    }

    /// SGD update from the squared-residual surrogate.
    ///
    /// `step > 0` pulls the triple together, `step < 0` pushes it apart.
    fn apply_gradient(&mut self, t: Triple, residual: &Array1<f32>, step: f32) {
        let update = residual * (2.0 * step);
        self.core
            .entities
            .row_mut(t.subject)
            .zip_mut_with(&update, |x, &g| *x -= g);
        self.core
            .relations
            .row_mut(t.predicate)
            .zip_mut_with(&update, |x, &g| *x -= g);
        self.core
            .entities
            .row_mut(t.object)
            .zip_mut_with(&update, |x, &g| *x += g);
    }
}

impl TranslationModel for TransE {
    fn kind(&self) -> ModelKind {
        ModelKind::TransE
    }

    fn num_entities(&self) -> usize {
        self.core.entities.nrows()
    }

    fn num_relations(&self) -> usize {
        self.core.relations.nrows()
    }

    fn dim(&self) -> usize {
        self.core.config.dim
    }

    fn score_triple(&self, triple: Triple) -> f32 {
        -l2_norm(self.residual(triple).view())
    }

    fn train_batch(
        &mut self,
        positives: &[Triple],
        negatives: &[Triple],
        learning_rate: f32,
    ) -> f32 {
        assert_eq!(
            positives.len(),
            negatives.len(),
            "positive/negative batches must be parallel"
        );
        if positives.is_empty() {
            return 0.0;
        }
        let margin = self.core.config.margin;
        let mut total = 0.0;
        let mut touched = HashSet::new();
        for (&pos, &neg) in positives.iter().zip(negatives) {
            let pos_residual = self.residual(pos);
            let neg_residual = self.residual(neg);
            let loss = margin_loss(
                margin,
                -l2_norm(pos_residual.view()),
                -l2_norm(neg_residual.view()),
            );
            touched.extend([pos.subject, pos.object, neg.subject, neg.object]);
            if loss > 0.0 {
                total += loss;
                self.apply_gradient(pos, &pos_residual, learning_rate);
                self.apply_gradient(neg, &neg_residual, -learning_rate);
            }
        }
        self.core.apply_entity_norm_penalty(&touched, learning_rate);
        self.core.apply_sub_property_penalty(learning_rate);
        total / positives.len() as f32
    }

    fn sequence_step(&mut self, batch: &SequenceBatch, learning_rate: f32) -> f32 {
        self.core.sequence_step(batch, learning_rate)
    }

    fn rank_heads(&self, queries: &[Triple], _cache: &mut ProjectionCache) -> Array2<f32> {
        let n = self.num_entities();
        let mut scores = Array2::zeros((queries.len(), n));
        for (i, query) in queries.iter().enumerate() {
            // h should land on t - r
            let target =
                &self.core.entities.row(query.object) - &self.core.relations.row(query.predicate);
            for j in 0..n {
                let diff = &self.core.entities.row(j) - &target;
                scores[[i, j]] = -l2_norm(diff.view());
            }
        }
        scores
    }

    fn rank_tails(&self, queries: &[Triple], _cache: &mut ProjectionCache) -> Array2<f32> {
        let n = self.num_entities();
        let mut scores = Array2::zeros((queries.len(), n));
        for (i, query) in queries.iter().enumerate() {
            let target =
                &self.core.entities.row(query.subject) + &self.core.relations.row(query.predicate);
            for j in 0..n {
                let diff = &target - &self.core.entities.row(j);
                scores[[i, j]] = -l2_norm(diff.view());
            }
        }
        scores
    }

    fn entity_table(&self) -> &Array2<f32> {
        &self.core.entities
    }

    fn entity_table_mut(&mut self) -> &mut Array2<f32> {
        &mut self.core.entities
    }

    fn relation_table(&self) -> &Array2<f32> {
        &self.core.relations
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            kind: ModelKind::TransE,
            dim: self.core.config.dim,
            entities: self.core.entities.clone(),
            relations: self.core.relations.clone(),
            normals: None,
            auxiliary: None,
            relation_matrices: None,
        }
    }

    fn restore(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        if checkpoint.kind != ModelKind::TransE {
            return Err(Error::ShapeMismatch(format!(
                "checkpoint is for {}, not TransE",
                checkpoint.kind.name()
            )));
        }
        if checkpoint.entities.dim() != self.core.entities.dim()
            || checkpoint.relations.dim() != self.core.relations.dim()
        {
            return Err(Error::ShapeMismatch(
                "checkpoint table shapes do not match the model".into(),
            ));
        }
        self.core.entities.assign(&checkpoint.entities);
        self.core.relations.assign(&checkpoint.relations);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_model() -> TransE {
        TransE::new(ModelConfig::new(5, 2, 4))
    }

    #[test]
    fn test_perfect_translation_scores_zero() {
        let mut model = toy_model();
        model.core.entities.row_mut(0).fill(0.0);
        model.core.relations.row_mut(0).fill(1.0);
        model.core.entities.row_mut(1).fill(1.0);
        let score = model.score_triple(Triple::new(0, 0, 1));
        assert!(score.abs() < 1e-6);
    }

    #[test]
    fn test_training_separates_positive_from_negative() {
        let mut model = toy_model();
        let positives = vec![Triple::new(0, 0, 1), Triple::new(1, 0, 2)];
        let negatives = vec![Triple::new(0, 0, 3), Triple::new(1, 0, 4)];
        for _ in 0..200 {
            model.train_batch(&positives, &negatives, 0.05);
        }
        assert!(model.score_triple(positives[0]) > model.score_triple(negatives[0]));
        assert!(model.score_triple(positives[1]) > model.score_triple(negatives[1]));
    }

    #[test]
    fn test_rank_matrices_match_score_triple() {
        let model = toy_model();
        let queries = vec![Triple::new(0, 1, 2), Triple::new(3, 0, 4)];
        let mut cache = ProjectionCache::disabled();
        let tails = model.rank_tails(&queries, &mut cache);
        let heads = model.rank_heads(&queries, &mut cache);
        for (i, q) in queries.iter().enumerate() {
            for j in 0..model.num_entities() {
                let tail_score = model.score_triple(Triple::new(q.subject, q.predicate, j));
                let head_score = model.score_triple(Triple::new(j, q.predicate, q.object));
                assert!((tails[[i, j]] - tail_score).abs() < 1e-5);
                assert!((heads[[i, j]] - head_score).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_checkpoint_restore_roundtrip() {
        let mut model = toy_model();
        let positives = vec![Triple::new(0, 0, 1)];
        let negatives = vec![Triple::new(0, 0, 3)];
        model.train_batch(&positives, &negatives, 0.1);
        let snapshot = model.checkpoint();
        let before = model.score_triple(positives[0]);
        model.train_batch(&positives, &negatives, 0.5);
        model.restore(&snapshot).unwrap();
        assert!((model.score_triple(positives[0]) - before).abs() < 1e-6);
    }

    #[test]
    fn test_restore_rejects_wrong_kind() {
        let mut model = toy_model();
        let mut snapshot = model.checkpoint();
        snapshot.kind = ModelKind::TransH;
        assert!(model.restore(&snapshot).is_err());
    }
}
