//! Hyperparameter grid sweep.
//!
//! The driver owns the experiment-level choices (model variant, split
//! proportions, corruption mode, event layer); the grid supplies the numeric
//! hyperparameters. Each combination trains from scratch, restores its own
//! best validation checkpoint, is measured on the held-out test split, and
//! contributes rows to the CSV report. A single tracker shared across runs
//! keeps the best model of the whole sweep.

use std::path::PathBuf;

use tracing::info;

use crate::dictionary::Dictionary;
use crate::error::Result;
use crate::evaluation::{RankMetrics, RankingEvaluator};
use crate::models::{build_model, ModelConfig, ModelKind};
use crate::report::{expand_report, MetricsReport, ReportRow};
use crate::sampling::TripleBatchGenerator;
use crate::sequence::{PredictiveBatchGenerator, SequenceBatcher, SkipgramBatchGenerator};
use crate::store::TripleStore;
use crate::training::{BestTracker, Trainer, TrainingConfig};

/// Which batcher feeds the auxiliary sequence objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLayer {
    /// Symmetric skip-gram pairs.
    Skipgram,
    /// Preceding-window next-event prediction.
    Predictive,
    /// Predictive windows tagged with their originating sequence.
    Concat,
}

/// One grid point.
#[derive(Debug, Clone, PartialEq)]
pub struct HyperParams {
    pub embedding_size: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub lambda: f32,
    pub alpha: f32,
    /// Sequence window radius.
    pub num_skips: usize,
    /// Negative samples per sequence example.
    pub num_sampled: usize,
    /// Sequence examples per auxiliary step.
    pub batch_size_sg: usize,
}

/// Axes of the grid; the sweep visits the full Cartesian product.
#[derive(Debug, Clone)]
pub struct ParamGrid {
    pub embedding_sizes: Vec<usize>,
    pub batch_sizes: Vec<usize>,
    pub learning_rates: Vec<f32>,
    pub lambdas: Vec<f32>,
    pub alphas: Vec<f32>,
    pub num_skips: Vec<usize>,
    pub num_sampled: Vec<usize>,
    pub batch_sizes_sg: Vec<usize>,
}

impl ParamGrid {
    /// A degenerate grid holding exactly one combination.
    pub fn single(params: &HyperParams) -> Self {
        Self {
            embedding_sizes: vec![params.embedding_size],
            batch_sizes: vec![params.batch_size],
            learning_rates: vec![params.learning_rate],
            lambdas: vec![params.lambda],
            alphas: vec![params.alpha],
            num_skips: vec![params.num_skips],
            num_sampled: vec![params.num_sampled],
            batch_sizes_sg: vec![params.batch_size_sg],
        }
    }

    /// Every combination, in axis-major order.
    pub fn combinations(&self) -> Vec<HyperParams> {
        let mut all = Vec::new();
        for &embedding_size in &self.embedding_sizes {
            for &batch_size in &self.batch_sizes {
                for &learning_rate in &self.learning_rates {
                    for &lambda in &self.lambdas {
                        for &alpha in &self.alphas {
                            for &num_skips in &self.num_skips {
                                for &num_sampled in &self.num_sampled {
                                    for &batch_size_sg in &self.batch_sizes_sg {
                                        all.push(HyperParams {
                                            embedding_size,
                                            batch_size,
                                            learning_rate,
                                            lambda,
                                            alpha,
                                            num_skips,
                                            num_sampled,
                                            batch_size_sg,
                                        });
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        all
    }
}

/// Experiment-level settings shared by every grid point.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub kind: ModelKind,
    pub epochs: usize,
    pub eval_step_size: usize,
    pub valid_proportion: f64,
    pub test_proportion: f64,
    /// Bias the corruption side per relation instead of a fair coin.
    pub use_bernoulli: bool,
    pub negatives_per_positive: usize,
    pub seed: u64,
    /// Enables the auxiliary sequence objective.
    pub event_layer: Option<EventLayer>,
    /// Event vocabulary size; entity ids below it double as event ids.
    pub event_vocab_size: usize,
    pub sub_property_pairs: Vec<(usize, usize)>,
    /// Directory for per-run and sweep-wide best checkpoints; in-memory
    /// tracking only when absent.
    pub checkpoint_dir: Option<PathBuf>,
    pub report_path: PathBuf,
}

impl SweepConfig {
    pub fn new(kind: ModelKind, report_path: PathBuf) -> Self {
        Self {
            kind,
            epochs: 100,
            eval_step_size: 1000,
            valid_proportion: 0.1,
            test_proportion: 0.1,
            use_bernoulli: false,
            negatives_per_positive: 1,
            seed: 42,
            event_layer: None,
            event_vocab_size: 0,
            sub_property_pairs: Vec::new(),
            checkpoint_dir: None,
            report_path,
        }
    }
}

/// What the sweep found.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    /// Grid point with the best validation Mean Rank.
    pub best_params: Option<HyperParams>,
    /// Its validation Mean Rank.
    pub best_mean_rank: f64,
    /// Test metrics of the sweep-wide best model.
    pub best_test: Option<RankMetrics>,
    /// Number of grid points visited.
    pub runs: usize,
}

fn base_row(params: &HyperParams) -> ReportRow {
    ReportRow {
        relation: String::new(),
        embedding_size: params.embedding_size,
        batch_size: params.batch_size,
        learning_rate: params.learning_rate,
        num_skips: params.num_skips,
        num_sampled: params.num_sampled,
        batch_size_sg: params.batch_size_sg,
        mean_rank: 0.0,
        mrr: 0.0,
        hits_top_10: 0.0,
        hits_top_3: 0.0,
        hits_top_1: 0.0,
    }
}

/// Runs the grid.
#[derive(Debug, Clone)]
pub struct SweepDriver {
    config: SweepConfig,
}

impl SweepDriver {
    pub fn new(config: SweepConfig) -> Self {
        Self { config }
    }

    fn sequence_batcher(
        &self,
        sequences: &[Vec<usize>],
        params: &HyperParams,
    ) -> Option<Box<dyn SequenceBatcher>> {
        let seed = self.config.seed;
        self.config.event_layer.map(|layer| -> Box<dyn SequenceBatcher> {
            match layer {
                EventLayer::Skipgram => {
                    Box::new(SkipgramBatchGenerator::new(sequences, params.num_skips, seed))
                }
                EventLayer::Predictive => Box::new(PredictiveBatchGenerator::new(
                    sequences,
                    params.num_skips,
                    false,
                    seed,
                )),
                EventLayer::Concat => Box::new(PredictiveBatchGenerator::new(
                    sequences,
                    params.num_skips,
                    true,
                    seed,
                )),
            }
        })
    }

    /// Visit every grid point over one dataset.
    ///
    /// Splits, Bernoulli probabilities, and the known-true filter set are all
    /// computed once from the full store, so every run competes on the same
    /// data.
    pub fn run(
        &self,
        store: &TripleStore,
        relations: &Dictionary,
        sequences: &[Vec<usize>],
        grid: &ParamGrid,
    ) -> Result<SweepOutcome> {
        let config = &self.config;
        let (train, valid, test) = store.split(
            config.valid_proportion,
            config.test_proportion,
            config.seed,
        );
        let bern_probs = config.use_bernoulli.then(|| store.bernoulli_probs());
        let evaluator = RankingEvaluator::new(store.known_set());

        let mut report = MetricsReport::create(&config.report_path)?;
        let mut global_best = match &config.checkpoint_dir {
            Some(dir) => BestTracker::with_path(dir.join("sweep_best.json")),
            None => BestTracker::new(),
        };

        let combinations = grid.combinations();
        info!(
            model = config.kind.name(),
            runs = combinations.len(),
            train = train.len(),
            valid = valid.len(),
            test = test.len(),
            "starting sweep"
        );

        let mut best_params = None;
        let mut best_mean_rank = f64::INFINITY;
        for (run, params) in combinations.iter().enumerate() {
            let run_seed = config.seed.wrapping_add(run as u64);
            let mut model_config = ModelConfig::new(
                store.num_entities(),
                store.num_relations(),
                params.embedding_size,
            )
            .with_lambda(params.lambda)
            .with_alpha(params.alpha)
            .with_seed(run_seed)
            .with_sub_properties(config.sub_property_pairs.clone());
            if config.event_layer.is_some() {
                model_config =
                    model_config.with_event(config.event_vocab_size, params.num_sampled);
            }
            let mut model = build_model(config.kind, model_config);

            let mut generator = TripleBatchGenerator::new(
                &train,
                config.negatives_per_positive,
                true,
                bern_probs.clone(),
                run_seed,
            );
            let mut batcher = self.sequence_batcher(sequences, params);

            let mut local_best = match &config.checkpoint_dir {
                Some(dir) => BestTracker::with_path(dir.join(format!("run_{run}.json"))),
                None => BestTracker::new(),
            };

            let trainer = Trainer::new(
                TrainingConfig::new(config.epochs, params.batch_size, params.learning_rate)
                    .with_eval_step_size(config.eval_step_size)
                    .with_sequence_batch_size(params.batch_size_sg),
            );
            trainer.run(
                model.as_mut(),
                &mut generator,
                batcher
                    .as_mut()
                    .map(|b| b.as_mut() as &mut dyn SequenceBatcher),
                valid.triples(),
                &evaluator,
                &mut local_best,
                Some(&mut global_best),
            )?;

            // Measure the run's best validation model on the test split
            if let Some(snapshot) = local_best.snapshot() {
                model.restore(snapshot)?;
            }
            let test_report = evaluator.evaluate(model.as_ref(), test.triples());
            report.write_rows(&expand_report(&base_row(params), &test_report, relations))?;

            info!(
                run,
                valid_mean_rank = local_best.best_mean_rank(),
                test_mean_rank = test_report.all.mean_rank,
                "finished run"
            );
            if local_best.best_mean_rank() < best_mean_rank {
                best_mean_rank = local_best.best_mean_rank();
                best_params = Some(params.clone());
            }
        }

        // Closing measurement: the sweep-wide best model on the test split,
        // appended as the final rows of the report.
        let mut best_test = None;
        if let (Some(params), Some(snapshot)) = (&best_params, global_best.snapshot()) {
            let mut model_config = ModelConfig::new(
                store.num_entities(),
                store.num_relations(),
                params.embedding_size,
            )
            .with_lambda(params.lambda)
            .with_alpha(params.alpha)
            .with_seed(config.seed)
            .with_sub_properties(config.sub_property_pairs.clone());
            if config.event_layer.is_some() {
                model_config =
                    model_config.with_event(config.event_vocab_size, params.num_sampled);
            }
            let mut model = build_model(config.kind, model_config);
            model.restore(snapshot)?;
            let test_report = evaluator.evaluate(model.as_ref(), test.triples());
            report.write_rows(&expand_report(&base_row(params), &test_report, relations))?;
            info!(
                valid_mean_rank = global_best.best_mean_rank(),
                test_mean_rank = test_report.all.mean_rank,
                "sweep best on test"
            );
            best_test = Some(test_report.all);
        }

        Ok(SweepOutcome {
            best_params,
            best_mean_rank,
            best_test,
            runs: combinations.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Triple;

    fn toy_grid() -> ParamGrid {
        ParamGrid {
            embedding_sizes: vec![4, 8],
            batch_sizes: vec![2],
            learning_rates: vec![0.05],
            lambdas: vec![0.0],
            alphas: vec![1.0],
            num_skips: vec![1],
            num_sampled: vec![2],
            batch_sizes_sg: vec![4],
        }
    }

    fn toy_store() -> TripleStore {
        let triples: Vec<Triple> = (0..30)
            .map(|i| Triple::new(i % 6, i % 2, (i + 1) % 6))
            .collect();
        TripleStore::from_ids(triples, 6, 2)
    }

    #[test]
    fn test_combinations_cartesian_product() {
        let grid = toy_grid();
        let all = grid.combinations();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].embedding_size, 4);
        assert_eq!(all[1].embedding_size, 8);
    }

    #[test]
    fn test_single_grid() {
        let grid = toy_grid();
        let first = &grid.combinations()[0];
        let single = ParamGrid::single(first);
        assert_eq!(single.combinations(), vec![first.clone()]);
    }

    #[test]
    fn test_sweep_writes_report_and_picks_best() {
        let dir = tempfile::tempdir().unwrap();
        let report_path = dir.path().join("report.csv");
        let mut config = SweepConfig::new(ModelKind::TransE, report_path.clone());
        config.epochs = 10;
        config.eval_step_size = 20;
        config.valid_proportion = 0.2;
        config.test_proportion = 0.2;
        config.checkpoint_dir = Some(dir.path().to_path_buf());

        let store = toy_store();
        let relations = Dictionary::from_keys(["r0", "r1"]);
        let driver = SweepDriver::new(config);
        let outcome = driver.run(&store, &relations, &[], &toy_grid()).unwrap();

        assert_eq!(outcome.runs, 2);
        assert!(outcome.best_params.is_some());
        assert!(outcome.best_mean_rank.is_finite());
        assert!(outcome.best_test.is_some());
        assert!(dir.path().join("sweep_best.json").exists());

        let mut reader = csv::Reader::from_path(&report_path).unwrap();
        let rows: Vec<csv::StringRecord> =
            reader.records().collect::<std::result::Result<_, _>>().unwrap();
        // Two runs and the closing best-model block, each an "all" row plus
        // one row per relation present in the test split
        assert_eq!(rows.len() % 3, 0);
        let block = rows.len() / 3;
        assert_eq!(&rows[0][0], "all");
        assert_eq!(&rows[2 * block][0], "all");
        let best = outcome.best_params.unwrap();
        assert_eq!(rows[2 * block][1], best.embedding_size.to_string());
    }

    #[test]
    fn test_event_layer_sweep_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SweepConfig::new(ModelKind::TransEve, dir.path().join("report.csv"));
        config.epochs = 5;
        config.eval_step_size = 50;
        config.valid_proportion = 0.2;
        config.test_proportion = 0.2;
        config.event_layer = Some(EventLayer::Skipgram);
        config.event_vocab_size = 6;

        let store = toy_store();
        let relations = Dictionary::from_keys(["r0", "r1"]);
        let sequences = vec![vec![0, 1, 2, 3, 4, 5, 0, 1]];
        let grid = ParamGrid::single(&grid_point());
        let outcome = SweepDriver::new(config)
            .run(&store, &relations, &sequences, &grid)
            .unwrap();
        assert_eq!(outcome.runs, 1);
    }

    fn grid_point() -> HyperParams {
        HyperParams {
            embedding_size: 4,
            batch_size: 2,
            learning_rate: 0.05,
            lambda: 0.01,
            alpha: 0.5,
            num_skips: 1,
            num_sampled: 2,
            batch_size_sg: 4,
        }
    }
}
