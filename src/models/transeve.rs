//! TransEve: translation over blended entity and event vectors.
//!
//! Entities that double as events carry an auxiliary vector trained by the
//! sequence objective's geometry; scoring uses the sum c = e + v so that
//! co-occurrence structure feeds directly into triple plausibility. Entities
//! outside the event vocabulary keep a zero auxiliary row and reduce to plain
//! TransE behavior.

use std::collections::HashSet;

use ndarray::{Array1, Array2};

use super::{
    l2_norm, margin_loss, uniform_table, ModelConfig, ModelCore, ModelKind, ProjectionCache,
    TranslationModel,
};
use crate::checkpoint::Checkpoint;
use crate::error::{Error, Result};
use crate::sequence::SequenceBatch;
use crate::store::Triple;

/// Translation model over blended entity/event vectors.
#[derive(Debug, Clone)]
pub struct TransEve {
    core: ModelCore,
    /// Auxiliary event vectors, (num_entities, dim). Rows at or beyond the
    /// event vocabulary stay zero.
    auxiliary: Array2<f32>,
    event_vocab: usize,
}

impl TransEve {
    /// Allocate tables per the configuration.
    ///
    /// Without an event layer in the configuration every entity gets an
    /// auxiliary vector.
    pub fn new(config: ModelConfig) -> Self {
        let mut core = ModelCore::new(config);
        let event_vocab = core
            .config
            .event
            .as_ref()
            .map(|e| e.vocab_size.min(core.config.num_entities))
            .unwrap_or(core.config.num_entities);
        let mut auxiliary = Array2::zeros((core.config.num_entities, core.config.dim));
        let seeded = uniform_table(event_vocab, core.config.dim, &mut core.rng);
        auxiliary
            .slice_mut(ndarray::s![..event_vocab, ..])
            .assign(&seeded);
        Self {
            core,
            auxiliary,
            event_vocab,
        }
    }

    /// Blended vector e + v for one entity.
    fn combined(&self, id: usize) -> Array1<f32> {
        &self.core.entities.row(id) + &self.auxiliary.row(id)
    }

    /// Residual c(h) + r − c(t).
    fn residual(&self, t: Triple) -> Array1<f32> {
        let r = self.core.relations.row(t.predicate);
        self.combined(t.subject) + &r - self.combined(t.object)
    }

    /// SGD update; the blended sum routes the same gradient to both tables.
    fn apply_gradient(&mut self, t: Triple, residual: &Array1<f32>, step: f32) {
        let update = residual * (2.0 * step);
        self.core
            .entities
            .row_mut(t.subject)
            .zip_mut_with(&update, |x, &g| *x -= g);
        self.core
            .entities
            .row_mut(t.object)
            .zip_mut_with(&update, |x, &g| *x += g);
        self.core
            .relations
            .row_mut(t.predicate)
            .zip_mut_with(&update, |x, &g| *x -= g);
        if t.subject < self.event_vocab {
            self.auxiliary
                .row_mut(t.subject)
                .zip_mut_with(&update, |x, &g| *x -= g);
        }
        if t.object < self.event_vocab {
            self.auxiliary
                .row_mut(t.object)
                .zip_mut_with(&update, |x, &g| *x += g);
        }
    }
}

impl TranslationModel for TransEve {
    fn kind(&self) -> ModelKind {
        ModelKind::TransEve
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
            let target =
                self.combined(query.object) - &self.core.relations.row(query.predicate);
            for j in 0..n {
                let diff = self.combined(j) - &target;
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
                self.combined(query.subject) + &self.core.relations.row(query.predicate);
            for j in 0..n {
                let diff = &target - &self.combined(j);
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
            kind: ModelKind::TransEve,
            dim: self.core.config.dim,
            entities: self.core.entities.clone(),
            relations: self.core.relations.clone(),
            normals: None,
            auxiliary: Some(self.auxiliary.clone()),
            relation_matrices: None,
        }
    }

    fn restore(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        if checkpoint.kind != ModelKind::TransEve {
            return Err(Error::ShapeMismatch(format!(
                "checkpoint is for {}, not TransEve",
                checkpoint.kind.name()
            )));
        }
        let auxiliary = checkpoint
            .auxiliary
            .as_ref()
            .ok_or_else(|| Error::ShapeMismatch("TransEve checkpoint without auxiliary".into()))?;
        if checkpoint.entities.dim() != self.core.entities.dim()
            || checkpoint.relations.dim() != self.core.relations.dim()
            || auxiliary.dim() != self.auxiliary.dim()
        {
            return Err(Error::ShapeMismatch(
                "checkpoint table shapes do not match the model".into(),
            ));
        }
        self.core.entities.assign(&checkpoint.entities);
        self.core.relations.assign(&checkpoint.relations);
        self.auxiliary.assign(auxiliary);
        Ok(())
    }
}
