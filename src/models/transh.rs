//! TransH: translation on relation-specific hyperplanes (Wang et al. 2014).
//!
//! Each relation carries a unit normal w; entities are projected onto the
//! hyperplane (v − (v·w)w) before the translation is applied, so one entity
//! can occupy different roles under different relations. A soft orthogonality
//! penalty keeps the translation vector near the hyperplane, and the normals
//! are renormalized to unit length after every optimizer step.

use std::collections::HashSet;

use ndarray::{Array1, Array2, ArrayView1};

use super::{
    l2_norm, margin_loss, uniform_table, ModelConfig, ModelCore, ModelKind, ProjectionCache,
    Transform, TranslationModel,
};
use crate::checkpoint::Checkpoint;
use crate::error::{Error, Result};
use crate::sequence::SequenceBatch;
use crate::store::Triple;

/// Tolerance below which the orthogonality penalty is not applied.
const ORTHO_EPSILON: f32 = 1e-3;

/// Hyperplane translation model.
#[derive(Debug, Clone)]
pub struct TransH {
    core: ModelCore,
    /// Unit hyperplane normals, (num_relations, dim).
    normals: Array2<f32>,
}

fn project(v: ArrayView1<'_, f32>, w: ArrayView1<'_, f32>) -> Array1<f32> {
    let dot = v.dot(&w);
    &v - &(&w * dot)
}

impl TransH {
    /// Allocate tables per the configuration; normals start at unit length.
    pub fn new(config: ModelConfig) -> Self {
        let mut core = ModelCore::new(config);
        let mut normals = uniform_table(
            core.config.num_relations,
            core.config.dim,
            &mut core.rng,
        );
        normalize_rows(&mut normals);
        Self { core, normals }
    }

    /// Residual proj(h) + r − proj(t) on relation `p`'s hyperplane.
    fn residual(&self, t: Triple) -> Array1<f32> {
        let w = self.normals.row(t.predicate);
        let h = project(self.core.entities.row(t.subject), w);
        let o = project(self.core.entities.row(t.object), w);
        let r = self.core.relations.row(t.predicate);
        h + &r - o
    }

    /// SGD update from the squared-residual surrogate.
    ///
    /// `step > 0` pulls the triple together, `step < 0` pushes it apart.
    fn apply_gradient(&mut self, t: Triple, residual: &Array1<f32>, step: f32) {
        let w = self.normals.row(t.predicate).to_owned();
        let h = self.core.entities.row(t.subject).to_owned();
        let o = self.core.entities.row(t.object).to_owned();
        let wd = w.dot(residual);

        // Entity gradient passes through the projection: d − (d·w)w
        let projected_residual = residual - &(&w * wd);
        let entity_update = &projected_residual * (2.0 * step);
        self.core
            .entities
            .row_mut(t.subject)
            .zip_mut_with(&entity_update, |x, &g| *x -= g);
        self.core
            .entities
            .row_mut(t.object)
            .zip_mut_with(&entity_update, |x, &g| *x += g);

        let relation_update = residual * (2.0 * step);
        self.core
            .relations
            .row_mut(t.predicate)
            .zip_mut_with(&relation_update, |x, &g| *x -= g);

        // ∂‖d‖²/∂w = 2[((t·w)d + (w·d)t) − ((h·w)d + (w·d)h)]
        let hw = h.dot(&w);
        let ow = o.dot(&w);
        let grad_w = (residual * (ow - hw) + &((&o - &h) * wd)) * 2.0;
        self.normals
            .row_mut(t.predicate)
            .zip_mut_with(&grad_w, |x, &g| *x -= step * g);
    }

    /// Soft penalty keeping r near the hyperplane of w: lambda (w·r)²/‖r‖².
    fn apply_orthogonality_penalty(&mut self, relation: usize, learning_rate: f32) {
        let lambda = self.core.config.lambda;
        if lambda == 0.0 {
            return;
        }
        let w = self.normals.row(relation).to_owned();
        let r = self.core.relations.row(relation).to_owned();
        let r_sq = r.dot(&r).max(f32::EPSILON);
        let z = w.dot(&r);
        if z * z / r_sq <= ORTHO_EPSILON {
            return;
        }
        let grad_w = &r * (2.0 * z / r_sq);
        let grad_r = &w * (2.0 * z / r_sq) - &r * (2.0 * z * z / (r_sq * r_sq));
        let scale = learning_rate * lambda;
        self.normals
            .row_mut(relation)
            .zip_mut_with(&grad_w, |x, &g| *x -= scale * g);
        self.core
            .relations
            .row_mut(relation)
            .zip_mut_with(&grad_r, |x, &g| *x -= scale * g);
    }
}

fn normalize_rows(table: &mut Array2<f32>) {
    for mut row in table.rows_mut() {
        let norm = l2_norm(row.view());
        if norm > f32::EPSILON {
            row.iter_mut().for_each(|x| *x /= norm);
        }
    }
}

impl TranslationModel for TransH {
    fn kind(&self) -> ModelKind {
        ModelKind::TransH
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
        let mut relations = HashSet::new();
        for (&pos, &neg) in positives.iter().zip(negatives) {
            let pos_residual = self.residual(pos);
            let neg_residual = self.residual(neg);
            let loss = margin_loss(
                margin,
                -l2_norm(pos_residual.view()),
                -l2_norm(neg_residual.view()),
            );
            touched.extend([pos.subject, pos.object, neg.subject, neg.object]);
            relations.insert(pos.predicate);
            if loss > 0.0 {
                total += loss;
                self.apply_gradient(pos, &pos_residual, learning_rate);
                self.apply_gradient(neg, &neg_residual, -learning_rate);
            }
        }
        for relation in relations {
            self.apply_orthogonality_penalty(relation, learning_rate);
        }
        self.core.apply_entity_norm_penalty(&touched, learning_rate);
        self.core.apply_sub_property_penalty(learning_rate);
        total / positives.len() as f32
    }

    fn sequence_step(&mut self, batch: &SequenceBatch, learning_rate: f32) -> f32 {
        self.core.sequence_step(batch, learning_rate)
    }

    fn post_step(&mut self) {
        normalize_rows(&mut self.normals);
    }

    fn rank_heads(&self, queries: &[Triple], cache: &mut ProjectionCache) -> Array2<f32> {
        let n = self.num_entities();
        let mut scores = Array2::zeros((queries.len(), n));
        for (i, query) in queries.iter().enumerate() {
            let p = query.predicate;
            let w = self.normals.row(p);
            // The projection is the same on both sides, so entries are
            // shared across rank directions.
            let projected_tail = cache.get_or_compute((query.object, p, Transform::Forward), || {
                project(self.core.entities.row(query.object), w)
            });
            let target = &projected_tail - &self.core.relations.row(p);
            for j in 0..n {
                let projected = cache.get_or_compute((j, p, Transform::Forward), || {
                    project(self.core.entities.row(j), w)
                });
                let diff = &projected - &target;
                scores[[i, j]] = -l2_norm(diff.view());
            }
        }
        scores
    }

    fn rank_tails(&self, queries: &[Triple], cache: &mut ProjectionCache) -> Array2<f32> {
        let n = self.num_entities();
        let mut scores = Array2::zeros((queries.len(), n));
        for (i, query) in queries.iter().enumerate() {
            let p = query.predicate;
            let w = self.normals.row(p);
            let projected_head = cache.get_or_compute((query.subject, p, Transform::Forward), || {
                project(self.core.entities.row(query.subject), w)
            });
            let target = &projected_head + &self.core.relations.row(p);
            for j in 0..n {
                let projected = cache.get_or_compute((j, p, Transform::Forward), || {
                    project(self.core.entities.row(j), w)
                });
                let diff = &target - &projected;
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
            kind: ModelKind::TransH,
            dim: self.core.config.dim,
            entities: self.core.entities.clone(),
            relations: self.core.relations.clone(),
            normals: Some(self.normals.clone()),
            auxiliary: None,
            relation_matrices: None,
        }
    }

    fn restore(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        if checkpoint.kind != ModelKind::TransH {
            return Err(Error::ShapeMismatch(format!(
                "checkpoint is for {}, not TransH",
                checkpoint.kind.name()
            )));
        }
        let normals = checkpoint
            .normals
            .as_ref()
            .ok_or_else(|| Error::ShapeMismatch("TransH checkpoint without normals".into()))?;
        if checkpoint.entities.dim() != self.core.entities.dim()
            || checkpoint.relations.dim() != self.core.relations.dim()
            || normals.dim() != self.normals.dim()
        {
            return Err(Error::ShapeMismatch(
                "checkpoint table shapes do not match the model".into(),
            ));
        }
        self.core.entities.assign(&checkpoint.entities);
        self.core.relations.assign(&checkpoint.relations);
        self.normals.assign(normals);
        Ok(())
    }
}
