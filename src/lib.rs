//! `vektra` learns knowledge-graph embeddings from RDF-style triples and,
//! optionally, from event sequences sharing the same entity vocabulary.
//!
//! The crate covers the full experiment loop: dense id dictionaries, a
//! validated triple store with splits, cyclic negative-sampling batch
//! generation, four scoring models behind one trait, a margin-ranking
//! training loop with best-checkpoint tracking, filtered link-prediction
//! evaluation, a hyperparameter grid sweep, and a CSV metrics report.
//!
//! | Model | Geometry | Extra parameters |
//! |-------|----------|------------------|
//! | TransE | h + r ≈ t | none |
//! | TransH | projection onto relation hyperplane, then translation | unit normal per relation |
//! | TransEve | translation over entity + event vectors | auxiliary vector per entity |
//! | RESCAL | bilinear hᵀ·M·t | matrix per relation |
//!
//! A typical run: build [`Dictionary`]s over the labels, load a
//! [`TripleStore`], split it, train a model from [`build_model`] with a
//! [`Trainer`] (or sweep a whole [`ParamGrid`] with the [`SweepDriver`]), and
//! evaluate with the [`RankingEvaluator`].

pub mod checkpoint;
pub mod dictionary;
pub mod error;
pub mod evaluation;
pub mod models;
pub mod report;
pub mod sampling;
pub mod sequence;
pub mod store;
pub mod sweep;
pub mod training;

pub use checkpoint::Checkpoint;
pub use dictionary::Dictionary;
pub use error::{Error, Result};
pub use evaluation::{EvaluationReport, RankMetrics, RankingEvaluator};
pub use models::{
    build_model, ModelConfig, ModelKind, ProjectionCache, Transform, TranslationModel,
};
pub use report::{expand_report, MetricsReport, ReportRow};
pub use sampling::TripleBatchGenerator;
pub use sequence::{
    load_sequences, save_sequences, PredictiveBatchGenerator, SequenceBatch, SequenceBatcher,
    SkipgramBatchGenerator,
};
pub use store::{Triple, TripleStore};
pub use sweep::{EventLayer, HyperParams, ParamGrid, SweepConfig, SweepDriver, SweepOutcome};
pub use training::{pretrain_sequences, BestTracker, TrainOutcome, Trainer, TrainingConfig};
