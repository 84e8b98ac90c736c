//! Auxiliary skip-gram objective over event sequences.
//!
//! Co-occurrence of events regularizes the same entity vectors used for
//! triple scoring: the entity table doubles as the input word-embedding
//! table, while the objective owns a separate output table, discarded after
//! training. Negative sampling turns the softmax over the event vocabulary
//! into binary classification, one positive context against `k` random
//! events.

use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xorshift::XorShiftRng;

use crate::sequence::SequenceBatch;

// 15 keeps exp(-z) above f32 epsilon, so the sigmoid never rounds to 0 or 1.
const SIGMOID_CLAMP: f32 = 15.0;

fn sigmoid(z: f32) -> f32 {
    let z = z.clamp(-SIGMOID_CLAMP, SIGMOID_CLAMP);
    1.0 / (1.0 + (-z).exp())
}

/// Sampled-softmax-style skip-gram loss sharing the entity table.
#[derive(Debug, Clone)]
pub struct SequenceObjective {
    /// Output (context) embeddings, (vocab_size, dim). Start at zero.
    output: Array2<f32>,
    vocab_size: usize,
    num_negatives: usize,
    alpha: f32,
    rng: XorShiftRng,
}

impl SequenceObjective {
    /// Create the objective over the first `vocab_size` entity ids.
    pub fn new(
        vocab_size: usize,
        dim: usize,
        num_negatives: usize,
        alpha: f32,
        rng: &mut XorShiftRng,
    ) -> Self {
        Self {
            output: Array2::zeros((vocab_size, dim)),
            vocab_size,
            num_negatives: num_negatives.max(1),
            alpha,
            rng: XorShiftRng::seed_from_u64(rng.random()),
        }
    }

    /// One SGD step over a sequence batch against the shared entity table.
    ///
    /// Returns the weighted mean loss; 0 for an empty batch. Ids outside the
    /// event vocabulary are skipped.
    pub fn step(
        &mut self,
        entities: &mut Array2<f32>,
        batch: &SequenceBatch,
        learning_rate: f32,
    ) -> f32 {
        if batch.is_empty() || self.vocab_size < 2 {
            return 0.0;
        }
        let mut loss = 0.0;
        let mut examples = 0usize;
        match batch {
            SequenceBatch::Pairs { inputs, labels } => {
                for (&input, &label) in inputs.iter().zip(labels) {
                    if input >= self.vocab_size || label >= self.vocab_size {
                        continue;
                    }
                    let v = entities.row(input).to_owned();
                    let grad_v = self.classify(&v, label, learning_rate, &mut loss);
                    let step_size = learning_rate * self.alpha;
                    entities
                        .row_mut(input)
                        .iter_mut()
                        .zip(grad_v.iter())
                        .for_each(|(x, &g)| *x -= step_size * g);
                    examples += 1;
                }
            }
            SequenceBatch::Windows {
                contexts, labels, ..
            } => {
                for (context, &label) in contexts.iter().zip(labels) {
                    if label >= self.vocab_size {
                        continue;
                    }
                    let window: Vec<usize> = context
                        .iter()
                        .copied()
                        .filter(|&id| id < self.vocab_size)
                        .collect();
                    if window.is_empty() {
                        continue;
                    }
                    // Input vector is the mean of the window rows
                    let mut v = Array1::zeros(entities.ncols());
                    for &id in &window {
                        v += &entities.row(id);
                    }
                    v /= window.len() as f32;
                    let grad_v = self.classify(&v, label, learning_rate, &mut loss);
                    let scale = learning_rate * self.alpha / window.len() as f32;
                    for &id in &window {
                        entities
                            .row_mut(id)
                            .iter_mut()
                            .zip(grad_v.iter())
                            .for_each(|(x, &g)| *x -= scale * g);
                    }
                    examples += 1;
                }
            }
        }
        if examples == 0 {
            return 0.0;
        }
        self.alpha * loss / examples as f32
    }

    /// Binary classification of `label` against sampled negatives.
    ///
    /// Updates the output rows in place and returns the gradient with respect
    /// to the input vector.
    fn classify(
        &mut self,
        v: &Array1<f32>,
        label: usize,
        learning_rate: f32,
        loss: &mut f32,
    ) -> Array1<f32> {
        let mut grad_v = Array1::zeros(v.len());
        let step_size = learning_rate * self.alpha;

        let z = self.output.row(label).dot(v);
        let p = sigmoid(z);
        *loss -= p.max(f32::EPSILON).ln();
        let g = p - 1.0;
        grad_v.scaled_add(g, &self.output.row(label).to_owned());
        self.output
            .row_mut(label)
            .iter_mut()
            .zip(v.iter())
            .for_each(|(u, &x)| *u -= step_size * g * x);

        for _ in 0..self.num_negatives {
            let mut negative = self.rng.random_range(0..self.vocab_size - 1);
            if negative >= label {
                negative += 1;
            }
            let z = self.output.row(negative).dot(v);
            let p = sigmoid(z);
            *loss -= (1.0 - p).max(f32::EPSILON).ln();
            grad_v.scaled_add(p, &self.output.row(negative).to_owned());
            self.output
                .row_mut(negative)
                .iter_mut()
                .zip(v.iter())
                .for_each(|(u, &x)| *u -= step_size * p * x);
        }
        grad_v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn toy_entities() -> Array2<f32> {
        Array2::from_shape_fn((4, 3), |(i, j)| 0.1 * (i as f32 + 1.0) * (j as f32 - 1.0))
    }

    #[test]
    fn test_sigmoid_bounds() {
        assert!(sigmoid(-100.0) > 0.0);
        assert!(sigmoid(100.0) < 1.0);
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut rng = XorShiftRng::seed_from_u64(1);
        let mut objective = SequenceObjective::new(4, 3, 2, 1.0, &mut rng);
        let mut entities = toy_entities();
        let before = entities.clone();
        let batch = SequenceBatch::Pairs {
            inputs: vec![],
            labels: vec![],
        };
        assert_eq!(objective.step(&mut entities, &batch, 0.1), 0.0);
        assert_eq!(entities, before);
    }

    #[test]
    fn test_pairs_loss_decreases() {
        let mut rng = XorShiftRng::seed_from_u64(2);
        let mut objective = SequenceObjective::new(4, 3, 1, 1.0, &mut rng);
        let mut entities = toy_entities();
        let batch = SequenceBatch::Pairs {
            inputs: vec![0, 1, 0, 1],
            labels: vec![1, 0, 1, 0],
        };
        let mut losses = Vec::new();
        for _ in 0..50 {
            losses.push(objective.step(&mut entities, &batch, 0.2));
        }
        assert!(
            losses[losses.len() - 1] < losses[0],
            "loss should fall: {losses:?}"
        );
    }

    #[test]
    fn test_out_of_vocab_ids_skipped() {
        let mut rng = XorShiftRng::seed_from_u64(3);
        // Vocabulary covers only the first two entity ids
        let mut objective = SequenceObjective::new(2, 3, 1, 1.0, &mut rng);
        let mut entities = toy_entities();
        let before_row3 = entities.row(3).to_owned();
        let batch = SequenceBatch::Pairs {
            inputs: vec![3, 0],
            labels: vec![1, 1],
        };
        objective.step(&mut entities, &batch, 0.1);
        assert_eq!(entities.row(3), before_row3);
    }

    #[test]
    fn test_windows_update_all_context_rows() {
        let mut rng = XorShiftRng::seed_from_u64(4);
        let mut objective = SequenceObjective::new(4, 3, 1, 1.0, &mut rng);
        let mut entities = toy_entities();
        // Warm up output table so the input gradient is non-zero
        let warmup = SequenceBatch::Windows {
            contexts: vec![vec![0, 1]],
            labels: vec![2],
            sequence_ids: None,
        };
        objective.step(&mut entities, &warmup, 0.5);
        let before = entities.clone();
        objective.step(&mut entities, &warmup, 0.5);
        assert_ne!(entities.row(0), before.row(0));
        assert_ne!(entities.row(1), before.row(1));
        assert_eq!(entities.row(3), before.row(3));
    }
}
