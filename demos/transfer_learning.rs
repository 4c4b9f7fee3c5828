//! Transfer Learning Setup Example
//!
//! Demonstrates the file-driven setup of a transfer-learning run:
//! 1. Writing a classes split file and a TOML configuration
//! 2. Building the data module from them
//! 3. Pre-training batches over base graphs with local labels
//! 4. Frozen novel test episodes served by a worker pool
//! 5. Persisting the metadata artifact
//!
//! Run with: cargo run --example transfer_learning

use fewshot_graph_episodes::prelude::*;
use rand::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Transfer Learning Setup Example ===\n");

    let workdir = tempfile::tempdir()?;
    let mut rng = StdRng::seed_from_u64(7);

    // 1. Files
    println!("1. Writing split and config files...");
    let dataset = SyntheticGraphs {
        num_classes: 10,
        graphs_per_class: 16,
        ..Default::default()
    }
    .generate(&mut rng)?;

    let split_path = workdir.path().join("classes_split.json");
    dataset.classes_split(4).to_file(&split_path)?;

    let mut config = Config::default();
    config.data.dataset_name = "synthetic-transfer".to_string();
    config.data.classes_split_path = Some(split_path);
    config.data.num_test_episodes = 12;
    config.data.seed = Some(7);
    config.episode = EpisodeHParams::new(4, 3, 5)?;
    config.loader.train.batch_size = 32;
    config.loader.test.batch_size = 4;
    config.loader.test.num_workers = 2;

    let config_path = workdir.path().join("config.toml");
    config.to_file(&config_path)?;
    println!("   - {}", config_path.display());

    // 2. Data module
    println!("\n2. Building the data module...");
    let config = Config::from_file(&config_path)?;
    let module = FewShotDataModule::new(config, dataset.graphs, dataset.class_to_label)?;
    let stages = module.setup_transfer(&mut module.setup_rng())?;
    println!("   - base mapping: {:?}", stages.base_mapping.global_to_local());
    println!("   - novel mapping: {:?}", stages.novel_mapping.global_to_local());

    // 3. Pre-training
    println!("\n3. Pre-training batches...");
    let mut train_loader = module.transfer_train_loader(&stages)?;
    for batch in train_loader.iter()? {
        let batch = batch?;
        println!(
            "   - {} graphs, {} nodes, local labels up to {:?}",
            batch.num_graphs(),
            batch.num_nodes(),
            batch.labels.iter().max()
        );
    }

    // 4. Meta-testing
    println!("\n4. Novel test episodes...");
    let scorer = PrototypeScorer::new(SimilarityMetric::NegSquaredEuclidean);
    for mut loader in module.transfer_test_loaders(&stages)? {
        for batch in loader.iter()? {
            let batch = batch?;
            let similarities = scorer.score_checked(&batch)?;
            let predictions = predict_local_labels(similarities.view(), batch.hparams.num_classes_per_episode)?;
            let acc = accuracy(predictions.view(), batch.label_targets.view())?;
            println!(
                "   - {} episodes, labels {}, accuracy {:.1}%",
                batch.num_episodes,
                batch.labels,
                acc * 100.0
            );
        }
    }

    // 5. Metadata
    println!("\n5. Saving metadata...");
    let metadata_dir = workdir.path().join("checkpoint");
    let path = module.metadata()?.save(&metadata_dir)?;
    let restored = MetaData::load(&metadata_dir)?;
    println!("   - {} ({} classes)", path.display(), restored.num_classes());

    println!("\n=== Example Complete ===");
    Ok(())
}
