//! RESCAL: bilinear relational scoring (Nickel et al. 2011).
//!
//! Each relation is a dense dim×dim matrix M and a triple scores hᵀ·M·t.
//! Unlike the translation variants the score is already a plausibility value
//! rather than a negative distance, so gradient steps raise the positive
//! score and lower the negative one directly.

use std::collections::HashSet;

use ndarray::{Array1, Array2, Array3, Axis};

use super::{
    margin_loss, ModelConfig, ModelCore, ModelKind, ProjectionCache, Transform, TranslationModel,
};
use crate::checkpoint::Checkpoint;
use crate::error::{Error, Result};
use crate::sequence::SequenceBatch;
use crate::store::Triple;

/// Bilinear model with one matrix per relation.
#[derive(Debug, Clone)]
pub struct Rescal {
    core: ModelCore,
    /// Relation matrices, (num_relations, dim, dim).
    matrices: Array3<f32>,
}

impl Rescal {
    /// Allocate tables per the configuration.
    pub fn new(config: ModelConfig) -> Self {
        let mut core = ModelCore::new(config);
        let dim = core.config.dim;
        let bound = (6.0 / dim as f32).sqrt();
        let matrices = {
            use rand::Rng;
            Array3::from_shape_fn((core.config.num_relations, dim, dim), |_| {
                core.rng.random_range(-bound..bound)
            })
        };
        Self { core, matrices }
    }

    fn bilinear(&self, t: Triple) -> f32 {
        let m = self.matrices.index_axis(Axis(0), t.predicate);
        let h = self.core.entities.row(t.subject);
        let o = self.core.entities.row(t.object);
        h.dot(&m.dot(&o))
    }

    /// SGD update on the raw bilinear score.
    ///
    /// `step > 0` raises the score, `step < 0` lowers it.
    fn apply_gradient(&mut self, t: Triple, step: f32) {
        let h = self.core.entities.row(t.subject).to_owned();
        let o = self.core.entities.row(t.object).to_owned();
        let m = self.matrices.index_axis(Axis(0), t.predicate);
        let grad_h: Array1<f32> = m.dot(&o);
        let grad_o: Array1<f32> = m.t().dot(&h);

        self.core
            .entities
            .row_mut(t.subject)
            .zip_mut_with(&grad_h, |x, &g| *x += step * g);
        self.core
            .entities
            .row_mut(t.object)
            .zip_mut_with(&grad_o, |x, &g| *x += step * g);

        // ∂s/∂M = h ⊗ t
        let mut m = self.matrices.index_axis_mut(Axis(0), t.predicate);
        for (i, &hi) in h.iter().enumerate() {
            m.row_mut(i).zip_mut_with(&o, |x, &ov| *x += step * hi * ov);
        }
    }
}

impl TranslationModel for Rescal {
    fn kind(&self) -> ModelKind {
        ModelKind::Rescal
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
        self.bilinear(triple)
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
            let loss = margin_loss(margin, self.bilinear(pos), self.bilinear(neg));
            touched.extend([pos.subject, pos.object, neg.subject, neg.object]);
            if loss > 0.0 {
                total += loss;
                self.apply_gradient(pos, learning_rate);
                self.apply_gradient(neg, -learning_rate);
            }
        }
        self.core.apply_entity_norm_penalty(&touched, learning_rate);
        self.core.apply_sub_property_penalty(learning_rate);
        total / positives.len() as f32
    }

    fn sequence_step(&mut self, batch: &SequenceBatch, learning_rate: f32) -> f32 {
        self.core.sequence_step(batch, learning_rate)
    }

    fn rank_heads(&self, queries: &[Triple], cache: &mut ProjectionCache) -> Array2<f32> {
        let n = self.num_entities();
        let mut scores = Array2::zeros((queries.len(), n));
        for (i, query) in queries.iter().enumerate() {
            let p = query.predicate;
            // Candidate head scores are e_j · (M t); memoize the transformed tail
            let transformed = cache.get_or_compute((query.object, p, Transform::Forward), || {
                self.matrices
                    .index_axis(Axis(0), p)
                    .dot(&self.core.entities.row(query.object))
            });
            for j in 0..n {
                scores[[i, j]] = self.core.entities.row(j).dot(&transformed);
            }
        }
        scores
    }

    fn rank_tails(&self, queries: &[Triple], cache: &mut ProjectionCache) -> Array2<f32> {
        let n = self.num_entities();
        let mut scores = Array2::zeros((queries.len(), n));
        for (i, query) in queries.iter().enumerate() {
            let p = query.predicate;
            // Mᵀ h is keyed apart from the head-side M t for the same pair
            let transformed = cache.get_or_compute((query.subject, p, Transform::Transposed), || {
                self.matrices
                    .index_axis(Axis(0), p)
                    .t()
                    .dot(&self.core.entities.row(query.subject))
            });
            for j in 0..n {
                scores[[i, j]] = transformed.dot(&self.core.entities.row(j));
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
            kind: ModelKind::Rescal,
            dim: self.core.config.dim,
            entities: self.core.entities.clone(),
            relations: self.core.relations.clone(),
            normals: None,
            auxiliary: None,
            relation_matrices: Some(self.matrices.clone()),
        }
    }

    fn restore(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        if checkpoint.kind != ModelKind::Rescal {
            return Err(Error::ShapeMismatch(format!(
                "checkpoint is for {}, not RESCAL",
                checkpoint.kind.name()
            )));
        }
        let matrices = checkpoint.relation_matrices.as_ref().ok_or_else(|| {
            Error::ShapeMismatch("RESCAL checkpoint without relation matrices".into())
        })?;
        if checkpoint.entities.dim() != self.core.entities.dim()
            || matrices.dim() != self.matrices.dim()
        {
            return Err(Error::ShapeMismatch(
                "checkpoint table shapes do not match the model".into(),
            ));
        }
        self.core.entities.assign(&checkpoint.entities);
        self.core.relations.assign(&checkpoint.relations);
        self.matrices.assign(matrices);
        Ok(())
    }
}
