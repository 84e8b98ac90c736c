//! The training loop: margin-ranking steps, interleaved sequence steps,
//! periodic validation, and best-checkpoint tracking.
//!
//! One loop serves all model variants through [`TranslationModel`]. Every
//! `eval_step_size` steps the model is evaluated on the validation split and
//! offered to the best trackers; a tracker persists its snapshot to disk
//! before it records the improved score, so an interrupted run never claims a
//! better checkpoint than the one on disk.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::checkpoint::Checkpoint;
use crate::error::Result;
use crate::evaluation::RankingEvaluator;
use crate::models::TranslationModel;
use crate::sampling::TripleBatchGenerator;
use crate::sequence::SequenceBatcher;
use crate::store::Triple;

/// Loop hyperparameters.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Passes over the training triples.
    pub epochs: usize,
    /// Triples per gradient step (positives × negative draws).
    pub batch_size: usize,
    /// SGD learning rate.
    pub learning_rate: f32,
    /// Steps between validation evaluations.
    pub eval_step_size: usize,
    /// Examples per auxiliary sequence step.
    pub sequence_batch_size: usize,
}

impl TrainingConfig {
    pub fn new(epochs: usize, batch_size: usize, learning_rate: f32) -> Self {
        Self {
            epochs,
            batch_size: batch_size.max(1),
            learning_rate,
            eval_step_size: 1000,
            sequence_batch_size: 128,
        }
    }

    /// Set the validation cadence.
    pub fn with_eval_step_size(mut self, eval_step_size: usize) -> Self {
        self.eval_step_size = eval_step_size.max(1);
        self
    }

    /// Set the sequence batch size.
    pub fn with_sequence_batch_size(mut self, sequence_batch_size: usize) -> Self {
        self.sequence_batch_size = sequence_batch_size.max(1);
        self
    }
}

/// Tracks the best validation Mean Rank seen so far, keeping the matching
/// snapshot in memory and optionally mirroring it to disk.
#[derive(Debug, Clone)]
pub struct BestTracker {
    best_mean_rank: f64,
    snapshot: Option<Checkpoint>,
    path: Option<PathBuf>,
}

impl Default for BestTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl BestTracker {
    /// In-memory tracker.
    pub fn new() -> Self {
        Self {
            best_mean_rank: f64::INFINITY,
            snapshot: None,
            path: None,
        }
    }

    /// Tracker that also writes each improved snapshot to `path`.
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            best_mean_rank: f64::INFINITY,
            snapshot: None,
            path: Some(path),
        }
    }

    /// Offer a validation result. On improvement the snapshot is taken (and
    /// saved, if a path is set) before the score is recorded; returns whether
    /// the model improved.
    pub fn observe(&mut self, mean_rank: f64, model: &dyn TranslationModel) -> Result<bool> {
        if mean_rank >= self.best_mean_rank {
            return Ok(false);
        }
        let snapshot = model.checkpoint();
        if let Some(path) = &self.path {
            snapshot.save(path)?;
        }
        self.snapshot = Some(snapshot);
        self.best_mean_rank = mean_rank;
        Ok(true)
    }

    /// Best validation Mean Rank observed, infinite before the first
    /// improvement.
    pub fn best_mean_rank(&self) -> f64 {
        self.best_mean_rank
    }

    /// Snapshot matching the best score.
    pub fn snapshot(&self) -> Option<&Checkpoint> {
        self.snapshot.as_ref()
    }
}

/// One validation measurement.
#[derive(Debug, Clone, Copy)]
pub struct EvalPoint {
    pub step: usize,
    pub mean_rank: f64,
    pub hits_at_10: f64,
}

/// What a training run produced.
#[derive(Debug, Clone, Default)]
pub struct TrainOutcome {
    /// Margin loss per step.
    pub losses: Vec<f32>,
    /// Auxiliary sequence loss per step (empty without a sequence batcher).
    pub sequence_losses: Vec<f32>,
    /// Validation measurements in step order.
    pub evaluations: Vec<EvalPoint>,
    /// Total steps taken.
    pub steps: usize,
}

/// Drives the optimizer over one model.
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    /// Run the full loop.
    ///
    /// `global_best` lets a hyperparameter sweep share one tracker across
    /// runs while `local_best` belongs to this run alone.
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &self,
        model: &mut dyn TranslationModel,
        generator: &mut TripleBatchGenerator,
        mut sequences: Option<&mut dyn SequenceBatcher>,
        validation: &[Triple],
        evaluator: &RankingEvaluator,
        local_best: &mut BestTracker,
        mut global_best: Option<&mut BestTracker>,
    ) -> Result<TrainOutcome> {
        let steps_per_epoch = (generator.len() / self.config.batch_size).max(1);
        let num_steps = steps_per_epoch * self.config.epochs;
        info!(
            model = model.kind().name(),
            num_steps,
            batch_size = self.config.batch_size,
            learning_rate = self.config.learning_rate,
            "starting training"
        );

        let mut outcome = TrainOutcome::default();
        for step in 1..=num_steps {
            let (positives, negatives) = generator.next_batch(self.config.batch_size);
            let loss = model.train_batch(&positives, &negatives, self.config.learning_rate);
            outcome.losses.push(loss);

            if let Some(batcher) = sequences.as_deref_mut() {
                let batch = batcher.next_batch(self.config.sequence_batch_size);
                let sequence_loss = model.sequence_step(&batch, self.config.learning_rate);
                outcome.sequence_losses.push(sequence_loss);
            }
            model.post_step();

            let at_milestone = step % self.config.eval_step_size == 0 || step == num_steps;
            if at_milestone && !validation.is_empty() {
                let report = evaluator.evaluate(model, validation);
                let improved = local_best.observe(report.all.mean_rank, model)?;
                if let Some(tracker) = global_best.as_deref_mut() {
                    tracker.observe(report.all.mean_rank, model)?;
                }
                info!(
                    step,
                    loss,
                    mean_rank = report.all.mean_rank,
                    hits_at_10 = report.all.hits_at_10,
                    improved,
                    "validation"
                );
                outcome.evaluations.push(EvalPoint {
                    step,
                    mean_rank: report.all.mean_rank,
                    hits_at_10: report.all.hits_at_10,
                });
            } else {
                debug!(step, loss, "train step");
            }
        }
        outcome.steps = num_steps;
        Ok(outcome)
    }
}

/// Train the shared entity table on sequences alone, before any triple step.
///
/// Returns the per-step sequence losses.
pub fn pretrain_sequences(
    model: &mut dyn TranslationModel,
    batcher: &mut dyn SequenceBatcher,
    steps: usize,
    batch_size: usize,
    learning_rate: f32,
) -> Vec<f32> {
    let mut losses = Vec::with_capacity(steps);
    for step in 1..=steps {
        let batch = batcher.next_batch(batch_size);
        let loss = model.sequence_step(&batch, learning_rate);
        losses.push(loss);
        debug!(step, loss, "pre-training step");
    }
    losses
}
