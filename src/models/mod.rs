//! Translation-based scoring models.
//!
//! Four variants share one capability set: allocate embedding tables, score a
//! triple, take a margin-ranking gradient step against matched negatives,
//! take an auxiliary skip-gram step over the shared entity table, enforce
//! hard constraints after the optimizer step, and rank every candidate
//! entity against a fixed query side.
//!
//! | Model | Geometry | Extra parameters |
//! |-------|----------|------------------|
//! | TransE | h + r ≈ t | none |
//! | TransH | projection onto relation hyperplane, then translation | unit normal per relation |
//! | TransEve | translation over entity + event vectors | auxiliary vector per entity |
//! | RESCAL | bilinear hᵀ·M·t | matrix per relation |
//!
//! Scores are plausibility scores: higher is more plausible. The translation
//! variants use the negative Euclidean distance, so a perfect triple scores 0.

mod cache;
mod event;
mod rescal;
mod transe;
mod transeve;
mod transh;

pub use cache::{ProjectionCache, Transform};
pub use event::SequenceObjective;
pub use rescal::Rescal;
pub use transe::TransE;
pub use transeve::TransEve;
pub use transh::TransH;

use std::collections::HashSet;

use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};

use crate::checkpoint::Checkpoint;
use crate::error::{Error, Result};
use crate::sequence::SequenceBatch;
use crate::store::Triple;

/// The four scoring variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    /// Plain translation.
    TransE,
    /// Hyperplane projection before translation.
    TransH,
    /// Translation over blended entity/event vectors.
    TransEve,
    /// Bilinear relation matrices.
    Rescal,
}

impl ModelKind {
    /// Model name for reports and checkpoints.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TransE => "TransE",
            Self::TransH => "TransH",
            Self::TransEve => "TransEve",
            Self::Rescal => "RESCAL",
        }
    }
}

/// Auxiliary event-sequence objective parameters.
#[derive(Debug, Clone)]
pub struct EventConfig {
    /// Size of the event vocabulary; event entity ids occupy `[0, vocab_size)`.
    pub vocab_size: usize,
    /// Negative samples per sequence example.
    pub num_negatives: usize,
}

/// Construction parameters common to all variants.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Number of entity ids.
    pub num_entities: usize,
    /// Number of relation ids.
    pub num_relations: usize,
    /// Embedding dimension.
    pub dim: usize,
    /// Margin of the ranking loss.
    pub margin: f32,
    /// Weight of the soft regularization terms.
    pub lambda: f32,
    /// Weight of the auxiliary sequence loss.
    pub alpha: f32,
    /// Seed for table initialisation and model-owned sampling.
    pub seed: u64,
    /// `(sub, sup)` relation id pairs for the hierarchy alignment penalty.
    pub sub_property_pairs: Vec<(usize, usize)>,
    /// Enables the sequence objective when present.
    pub event: Option<EventConfig>,
}

impl ModelConfig {
    /// Minimal configuration without regularization or event layer.
    pub fn new(num_entities: usize, num_relations: usize, dim: usize) -> Self {
        Self {
            num_entities,
            num_relations,
            dim,
            margin: 1.0,
            lambda: 0.0,
            alpha: 1.0,
            seed: 42,
            sub_property_pairs: Vec::new(),
            event: None,
        }
    }

    /// Set the ranking-loss margin.
    pub fn with_margin(mut self, margin: f32) -> Self {
        self.margin = margin;
        self
    }

    /// Set the regularization weight.
    pub fn with_lambda(mut self, lambda: f32) -> Self {
        self.lambda = lambda;
        self
    }

    /// Set the sequence-loss weight.
    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Enable the auxiliary sequence objective.
    pub fn with_event(mut self, vocab_size: usize, num_negatives: usize) -> Self {
        self.event = Some(EventConfig {
            vocab_size,
            num_negatives,
        });
        self
    }

    /// Set the sub-property hierarchy pairs.
    pub fn with_sub_properties(mut self, pairs: Vec<(usize, usize)>) -> Self {
        self.sub_property_pairs = pairs;
        self
    }
}

/// Capability set shared by the four scoring variants.
///
/// The training loop is written once against this trait; each variant only
/// supplies its scoring math and gradients.
pub trait TranslationModel {
    /// Which variant this is.
    fn kind(&self) -> ModelKind;

    /// Number of entity rows.
    fn num_entities(&self) -> usize;

    /// Number of relation rows.
    fn num_relations(&self) -> usize;

    /// Embedding dimension.
    fn dim(&self) -> usize;

    /// Plausibility score of a triple (higher = more plausible).
    fn score_triple(&self, triple: Triple) -> f32;

    /// One margin-ranking SGD step over parallel positive/negative batches.
    ///
    /// Returns the mean margin loss of the batch. The two slices must have
    /// equal length; a mismatch is a caller bug, not a recoverable condition.
    fn train_batch(&mut self, positives: &[Triple], negatives: &[Triple], learning_rate: f32) -> f32;

    /// One SGD step of the auxiliary sequence objective, sharing the entity
    /// table. Returns the weighted sequence loss; 0 when the objective is
    /// disabled or the batch is empty.
    fn sequence_step(&mut self, batch: &SequenceBatch, learning_rate: f32) -> f32;

    /// Hard constraints applied after every optimizer step.
    fn post_step(&mut self) {}

    /// Score every entity as a substitute head for each `(_, p, o)` query.
    ///
    /// Returns a `[queries × num_entities]` matrix. The cache is a pure
    /// performance toggle; results are identical with or without it.
    fn rank_heads(&self, queries: &[Triple], cache: &mut ProjectionCache) -> Array2<f32>;

    /// Score every entity as a substitute tail for each `(s, p, _)` query.
    fn rank_tails(&self, queries: &[Triple], cache: &mut ProjectionCache) -> Array2<f32>;

    /// The entity embedding table.
    fn entity_table(&self) -> &Array2<f32>;

    /// Mutable access to the entity table (pre-training initialisation).
    fn entity_table_mut(&mut self) -> &mut Array2<f32>;

    /// The relation embedding table.
    fn relation_table(&self) -> &Array2<f32>;

    /// Snapshot every parameter table.
    fn checkpoint(&self) -> Checkpoint;

    /// Restore a snapshot taken from a model of the same variant and shape.
    fn restore(&mut self, checkpoint: &Checkpoint) -> Result<()>;

    /// Overwrite a subset of entity rows with pre-trained embeddings,
    /// leaving the remainder at their random initialisation.
    fn init_entities(&mut self, rows: &[(usize, Vec<f32>)]) -> Result<()> {
        let dim = self.dim();
        let table = self.entity_table_mut();
        for (id, values) in rows {
            if *id >= table.nrows() {
                return Err(Error::ShapeMismatch(format!(
                    "entity id {id} out of range for table with {} rows",
                    table.nrows()
                )));
            }
            if values.len() != dim {
                return Err(Error::ShapeMismatch(format!(
                    "pre-trained embedding of length {} for dimension {dim}",
                    values.len()
                )));
            }
            table
                .row_mut(*id)
                .assign(&Array1::from_vec(values.clone()));
        }
        Ok(())
    }
}

/// Construct a boxed model of the requested variant.
pub fn build_model(kind: ModelKind, config: ModelConfig) -> Box<dyn TranslationModel> {
    match kind {
        ModelKind::TransE => Box::new(TransE::new(config)),
        ModelKind::TransH => Box::new(TransH::new(config)),
        ModelKind::TransEve => Box::new(TransEve::new(config)),
        ModelKind::Rescal => Box::new(Rescal::new(config)),
    }
}

/// Uniform table initialisation in ±sqrt(6 / dim).
pub(crate) fn uniform_table(rows: usize, dim: usize, rng: &mut XorShiftRng) -> Array2<f32> {
    let bound = (6.0 / dim as f32).sqrt();
    Array2::from_shape_fn((rows, dim), |_| rng.random_range(-bound..bound))
}

/// L2 norm of a vector view.
pub(crate) fn l2_norm(v: ArrayView1<'_, f32>) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Margin ranking loss over plausibility scores.
pub(crate) fn margin_loss(margin: f32, positive_score: f32, negative_score: f32) -> f32 {
    (margin - positive_score + negative_score).max(0.0)
}

/// State shared by all variants: the two base tables, the optional sequence
/// objective, and the regularization bookkeeping.
#[derive(Debug, Clone)]
pub(crate) struct ModelCore {
    pub entities: Array2<f32>,
    pub relations: Array2<f32>,
    pub config: ModelConfig,
    pub event: Option<SequenceObjective>,
    pub rng: XorShiftRng,
}

impl ModelCore {
    pub fn new(config: ModelConfig) -> Self {
        let mut rng = XorShiftRng::seed_from_u64(config.seed);
        let entities = uniform_table(config.num_entities, config.dim, &mut rng);
        let relations = uniform_table(config.num_relations, config.dim, &mut rng);
        let event = config.event.as_ref().map(|e| {
            SequenceObjective::new(
                e.vocab_size,
                config.dim,
                e.num_negatives,
                config.alpha,
                &mut rng,
            )
        });
        Self {
            entities,
            relations,
            config,
            event,
            rng,
        }
    }

    /// Weighted sequence step against the shared entity table.
    pub fn sequence_step(&mut self, batch: &SequenceBatch, learning_rate: f32) -> f32 {
        match &mut self.event {
            Some(objective) => objective.step(&mut self.entities, batch, learning_rate),
            None => 0.0,
        }
    }

    /// Soft unit-ball penalty on the entity rows touched this step.
    ///
    /// Gradient of `lambda * sum(max(0, ||e|| - 1))` restricted to the batch.
    pub fn apply_entity_norm_penalty(&mut self, touched: &HashSet<usize>, learning_rate: f32) {
        let lambda = self.config.lambda;
        if lambda == 0.0 {
            return;
        }
        for &id in touched {
            let row = self.entities.row(id);
            let norm = l2_norm(row);
            if norm > 1.0 {
                let scale = learning_rate * lambda / norm;
                let mut row = self.entities.row_mut(id);
                row.iter_mut().for_each(|x| *x -= scale * *x);
            }
        }
    }

    /// Pull each sub-relation vector toward its super-relation vector.
    ///
    /// Penalty `lambda * sum(1 - r_sub · r_sup)` over the configured pairs.
    pub fn apply_sub_property_penalty(&mut self, learning_rate: f32) {
        let lambda = self.config.lambda;
        if lambda == 0.0 || self.config.sub_property_pairs.is_empty() {
            return;
        }
        let pairs = self.config.sub_property_pairs.clone();
        for (sub, sup) in pairs {
            let sup_row = self.relations.row(sup).to_owned();
            let sub_row = self.relations.row(sub).to_owned();
            self.relations
                .row_mut(sub)
                .iter_mut()
                .zip(sup_row.iter())
                .for_each(|(s, &u)| *s += learning_rate * lambda * u);
            self.relations
                .row_mut(sup)
                .iter_mut()
                .zip(sub_row.iter())
                .for_each(|(s, &u)| *s += learning_rate * lambda * u);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_table_bound() {
        let mut rng = XorShiftRng::seed_from_u64(1);
        let table = uniform_table(10, 16, &mut rng);
        let bound = (6.0f32 / 16.0).sqrt();
        for &x in &table {
            assert!(x.abs() <= bound);
        }
    }

    #[test]
    fn test_margin_loss() {
        // Positive already ahead of negative by more than the margin
        assert_eq!(margin_loss(1.0, 2.0, 0.5), 0.0);
        // Violation: margin 1, gap only 0.5
        assert!((margin_loss(1.0, 0.5, 0.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_build_model_kinds() {
        let config = ModelConfig::new(4, 2, 8);
        for kind in [
            ModelKind::TransE,
            ModelKind::TransH,
            ModelKind::TransEve,
            ModelKind::Rescal,
        ] {
            let model = build_model(kind, config.clone());
            assert_eq!(model.kind(), kind);
            assert_eq!(model.num_entities(), 4);
            assert_eq!(model.num_relations(), 2);
            assert_eq!(model.dim(), 8);
        }
    }

    #[test]
    fn test_init_entities_partial() {
        let mut model = TransE::new(ModelConfig::new(3, 1, 2));
        let before = model.entity_table().row(2).to_owned();
        model
            .init_entities(&[(0, vec![1.0, 2.0]), (1, vec![3.0, 4.0])])
            .unwrap();
        assert_eq!(model.entity_table().row(0).to_vec(), vec![1.0, 2.0]);
        assert_eq!(model.entity_table().row(1).to_vec(), vec![3.0, 4.0]);
        assert_eq!(model.entity_table().row(2), before);
    }

    #[test]
    fn test_init_entities_dim_mismatch() {
        let mut model = TransE::new(ModelConfig::new(3, 1, 2));
        assert!(model.init_entities(&[(0, vec![1.0])]).is_err());
        assert!(model.init_entities(&[(9, vec![1.0, 2.0])]).is_err());
    }
}
