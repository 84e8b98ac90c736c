//! Batch generators for the auxiliary event-sequence objective.
//!
//! Both generators eagerly materialise every (context, target) example from
//! the supplied event-id sequences, shuffle the list once with the seeded RNG,
//! and then serve batches cyclically with wraparound, mirroring the infinite
//! iteration of [`crate::sampling::TripleBatchGenerator`].

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use rand::prelude::*;
use rand_xorshift::XorShiftRng;

use crate::error::Result;

/// A batch of sequence examples, in the shape the model consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceBatch {
    /// Skip-gram `(target, context)` pairs.
    Pairs {
        /// Target (center) event ids.
        inputs: Vec<usize>,
        /// Context event ids to be predicted.
        labels: Vec<usize>,
    },
    /// Predictive windows: the preceding `window` ids and the next id.
    Windows {
        /// Context windows, each of fixed window length.
        contexts: Vec<Vec<usize>>,
        /// Next event id per window.
        labels: Vec<usize>,
        /// Originating sequence index per example, when tagging is enabled.
        sequence_ids: Option<Vec<usize>>,
    },
}

impl SequenceBatch {
    /// Number of examples in the batch.
    pub fn len(&self) -> usize {
        match self {
            Self::Pairs { inputs, .. } => inputs.len(),
            Self::Windows { labels, .. } => labels.len(),
        }
    }

    /// Whether the batch holds no examples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Common contract of the two sequence batchers.
pub trait SequenceBatcher {
    /// Produce the next cyclic batch of up to `batch_size` examples.
    fn next_batch(&mut self, batch_size: usize) -> SequenceBatch;

    /// Number of precomputed examples.
    fn num_examples(&self) -> usize;
}

/// Skip-gram pairs: every interior position emits one `(target, context)`
/// example per non-zero offset in the symmetric window.
#[derive(Debug, Clone)]
pub struct SkipgramBatchGenerator {
    data: Vec<(usize, usize)>,
    cursor: usize,
}

impl SkipgramBatchGenerator {
    /// Precompute and shuffle all window pairs.
    pub fn new(sequences: &[Vec<usize>], window: usize, seed: u64) -> Self {
        let mut data = Vec::new();
        for seq in sequences {
            if seq.len() < 2 * window + 1 {
                continue;
            }
            for target in window..seq.len() - window {
                for offset in -(window as isize)..=window as isize {
                    if offset == 0 {
                        continue;
                    }
                    let context = (target as isize + offset) as usize;
                    data.push((seq[target], seq[context]));
                }
            }
        }
        let mut rng = XorShiftRng::seed_from_u64(seed);
        data.shuffle(&mut rng);
        Self { data, cursor: 0 }
    }
}

impl SequenceBatcher for SkipgramBatchGenerator {
    fn next_batch(&mut self, batch_size: usize) -> SequenceBatch {
        let mut inputs = Vec::with_capacity(batch_size);
        let mut labels = Vec::with_capacity(batch_size);
        if !self.data.is_empty() {
            for _ in 0..batch_size {
                self.cursor %= self.data.len();
                let (target, context) = self.data[self.cursor];
                inputs.push(target);
                labels.push(context);
                self.cursor += 1;
            }
        }
        SequenceBatch::Pairs { inputs, labels }
    }

    fn num_examples(&self) -> usize {
        self.data.len()
    }
}

/// Predictive windows: each position past the window emits the preceding
/// `window` ids and the next id, optionally tagged with the sequence index
/// for concatenation-style modelling.
#[derive(Debug, Clone)]
pub struct PredictiveBatchGenerator {
    data: Vec<(Vec<usize>, usize, usize)>,
    include_sequence_ids: bool,
    cursor: usize,
}

impl PredictiveBatchGenerator {
    /// Precompute and shuffle all predictive windows.
    pub fn new(sequences: &[Vec<usize>], window: usize, include_sequence_ids: bool, seed: u64) -> Self {
        let mut data = Vec::new();
        if window > 0 {
            for (seq_id, seq) in sequences.iter().enumerate() {
                for target in window..seq.len() {
                    let context: Vec<usize> = seq[target - window..target].to_vec();
                    data.push((context, seq[target], seq_id));
                }
            }
        }
        let mut rng = XorShiftRng::seed_from_u64(seed);
        data.shuffle(&mut rng);
        Self {
            data,
            include_sequence_ids,
            cursor: 0,
        }
    }
}

impl SequenceBatcher for PredictiveBatchGenerator {
    fn next_batch(&mut self, batch_size: usize) -> SequenceBatch {
        let mut contexts = Vec::with_capacity(batch_size);
        let mut labels = Vec::with_capacity(batch_size);
        let mut sequence_ids = Vec::with_capacity(batch_size);
        if !self.data.is_empty() {
            for _ in 0..batch_size {
                self.cursor %= self.data.len();
                let (context, label, seq_id) = &self.data[self.cursor];
                contexts.push(context.clone());
                labels.push(*label);
                sequence_ids.push(*seq_id);
                self.cursor += 1;
            }
        }
        SequenceBatch::Windows {
            contexts,
            labels,
            sequence_ids: self.include_sequence_ids.then_some(sequence_ids),
        }
    }

    fn num_examples(&self) -> usize {
        self.data.len()
    }
}

/// Persist event sequences as a JSON blob under `dir/name.json`.
pub fn save_sequences(sequences: &[Vec<usize>], dir: &Path, name: &str) -> Result<()> {
    let file = File::create(dir.join(format!("{name}.json")))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, sequences)?;
    writer.flush()?;
    Ok(())
}

/// Load event sequences previously stored with [`save_sequences`].
pub fn load_sequences(dir: &Path, name: &str) -> Result<Vec<Vec<usize>>> {
    let file = File::open(dir.join(format!("{name}.json")))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}
