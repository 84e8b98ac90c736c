use std::collections::HashSet;

use vektra::{
    build_model, BestTracker, Dictionary, EventLayer, HyperParams, ModelConfig, ModelKind,
    ParamGrid, RankingEvaluator, SweepConfig, SweepDriver, Trainer, TrainingConfig,
    TripleBatchGenerator, TripleStore,
};

fn toy_graph() -> TripleStore {
    // 5 entities, 2 relations, a handful of facts
    let entities = Dictionary::from_keys(["alice", "bob", "carol", "dave", "erin"]);
    let relations = Dictionary::from_keys(["knows", "mentors"]);
    TripleStore::from_labels(
        vec![
            ("alice", "knows", "bob"),
            ("bob", "knows", "carol"),
            ("carol", "knows", "dave"),
            ("dave", "knows", "erin"),
            ("alice", "mentors", "carol"),
            ("bob", "mentors", "dave"),
            ("carol", "mentors", "erin"),
            ("erin", "knows", "alice"),
        ],
        &entities,
        &relations,
    )
}

/// 50 steps of batch-2 TransE training on the toy graph must drive the loss
/// down and place true triples in the top half of the candidate ranking.
#[test]
fn test_training_learns_toy_graph() {
    let store = toy_graph();
    let mut model = build_model(
        ModelKind::TransE,
        ModelConfig::new(store.num_entities(), store.num_relations(), 4).with_seed(13),
    );
    let mut generator = TripleBatchGenerator::new(&store, 1, true, None, 13);
    let evaluator = RankingEvaluator::new(store.known_set());
    let mut best = BestTracker::new();

    // steps_per_epoch = 8 / 2 = 4, so 13 epochs give 52 steps
    let config = TrainingConfig::new(13, 2, 0.05).with_eval_step_size(10);
    let outcome = Trainer::new(config)
        .run(
            model.as_mut(),
            &mut generator,
            None,
            store.triples(),
            &evaluator,
            &mut best,
            None,
        )
        .unwrap();

    assert_eq!(outcome.steps, 52);
    let early: f32 = outcome.losses[..5].iter().sum();
    let late: f32 = outcome.losses[outcome.losses.len() - 5..].iter().sum();
    assert!(late < early, "loss should fall: early {early}, late {late}");

    let report = evaluator.evaluate(model.as_ref(), store.triples());
    assert!(
        report.all.mean_rank < store.num_entities() as f64 / 2.0,
        "mean rank {} not in top half of {} entities",
        report.all.mean_rank,
        store.num_entities()
    );
    assert_eq!(report.per_relation.len(), 2);
}

/// Every model variant survives the same loop and improves over its
/// untrained self.
#[test]
fn test_all_variants_train() {
    let store = toy_graph();
    for kind in [
        ModelKind::TransE,
        ModelKind::TransH,
        ModelKind::TransEve,
        ModelKind::Rescal,
    ] {
        let mut model = build_model(
            kind,
            ModelConfig::new(store.num_entities(), store.num_relations(), 4)
                .with_lambda(0.01)
                .with_seed(7),
        );
        let evaluator = RankingEvaluator::new(store.known_set());
        let untrained = evaluator.evaluate(model.as_ref(), store.triples());

        let mut generator = TripleBatchGenerator::new(&store, 1, true, None, 7);
        let mut best = BestTracker::new();
        Trainer::new(TrainingConfig::new(40, 4, 0.05).with_eval_step_size(40))
            .run(
                model.as_mut(),
                &mut generator,
                None,
                store.triples(),
                &evaluator,
                &mut best,
                None,
            )
            .unwrap();

        let trained = evaluator.evaluate(model.as_ref(), store.triples());
        assert!(
            trained.all.mean_rank <= untrained.all.mean_rank,
            "{} got worse: {} -> {}",
            kind.name(),
            untrained.all.mean_rank,
            trained.all.mean_rank
        );
    }
}

/// Filtering must never hurt: against the same model and triples, the
/// filtered evaluator can only report ranks at or below the raw ones.
#[test]
fn test_filtered_ranks_never_exceed_raw() {
    let store = toy_graph();
    let model = build_model(
        ModelKind::TransH,
        ModelConfig::new(store.num_entities(), store.num_relations(), 4),
    );
    let triples = store.triples();

    let filtered = RankingEvaluator::new(store.known_set());
    // Raw: only the evaluated triples themselves are known
    let raw = RankingEvaluator::new(HashSet::new());

    let filtered_report = filtered.evaluate(model.as_ref(), triples);
    let raw_report = raw.evaluate(model.as_ref(), triples);
    assert!(filtered_report.all.mean_rank <= raw_report.all.mean_rank);
    assert!(filtered_report.all.hits_at_10 >= raw_report.all.hits_at_10);
}

/// Full sweep over the toy graph with event co-training: report rows appear,
/// checkpoints land on disk, and the winner is reproducible from its file.
#[test]
fn test_sweep_with_event_layer() {
    let dir = tempfile::tempdir().unwrap();
    let report_path = dir.path().join("metrics.csv");

    let mut config = SweepConfig::new(ModelKind::TransEve, report_path.clone());
    config.epochs = 15;
    config.eval_step_size = 10;
    config.valid_proportion = 0.25;
    config.test_proportion = 0.25;
    config.use_bernoulli = true;
    config.event_layer = Some(EventLayer::Skipgram);
    config.event_vocab_size = 5;
    config.checkpoint_dir = Some(dir.path().to_path_buf());
    config.seed = 99;

    let store = toy_graph();
    let relations = Dictionary::from_keys(["knows", "mentors"]);
    let sequences = vec![vec![0, 1, 2, 3, 4, 0, 2, 4], vec![4, 3, 2, 1, 0]];
    let grid = ParamGrid::single(&HyperParams {
        embedding_size: 4,
        batch_size: 2,
        learning_rate: 0.05,
        lambda: 0.01,
        alpha: 0.5,
        num_skips: 1,
        num_sampled: 2,
        batch_size_sg: 4,
    });

    let outcome = SweepDriver::new(config)
        .run(&store, &relations, &sequences, &grid)
        .unwrap();
    assert_eq!(outcome.runs, 1);
    assert!(outcome.best_params.is_some());

    assert!(dir.path().join("run_0.json").exists());
    assert!(dir.path().join("sweep_best.json").exists());

    let mut reader = csv::Reader::from_path(&report_path).unwrap();
    let rows: Vec<csv::StringRecord> = reader
        .records()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(&rows[0][0], "all");
    // Per-relation rows carry dictionary labels
    assert!(rows.iter().any(|r| &r[0] == "knows"));
    assert!(rows.iter().any(|r| &r[0] == "mentors"));

    // The persisted best checkpoint restores into a fresh model
    let snapshot = vektra::Checkpoint::load(&dir.path().join("sweep_best.json")).unwrap();
    let mut fresh = build_model(
        ModelKind::TransEve,
        ModelConfig::new(store.num_entities(), store.num_relations(), 4).with_event(5, 2),
    );
    fresh.restore(&snapshot).unwrap();
}
