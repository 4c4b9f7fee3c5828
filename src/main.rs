//! CLI for checking configurations and exercising the episode pipeline.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fewshot_graph_episodes::prelude::*;

#[derive(Parser)]
#[command(name = "fsgraph")]
#[command(about = "Episodic sampling and batching for few-shot graph classification")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate the configuration
    Check,

    /// Run the data pipeline on a synthetic pool
    DryRun {
        #[command(flatten)]
        pool: SyntheticArgs,

        /// Which setup to run
        #[arg(short, long, value_enum, default_value = "meta")]
        mode: Mode,

        /// Training batches to draw
        #[arg(short, long, default_value = "5")]
        batches: usize,
    },

    /// Write the metadata artifact for a synthetic pool
    Metadata {
        #[command(flatten)]
        pool: SyntheticArgs,

        /// Output directory
        #[arg(short, long, default_value = "checkpoints")]
        output: PathBuf,
    },
}

#[derive(Args)]
struct SyntheticArgs {
    /// Number of classes
    #[arg(long, default_value = "8")]
    classes: usize,

    /// Graphs per class
    #[arg(long, default_value = "20")]
    graphs_per_class: usize,

    /// Classes held out as novel
    #[arg(long, default_value = "3")]
    novel: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Meta,
    Transfer,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path).with_context(|| format!("reading {}", path.display()))?,
        None => Config::default(),
    };
    config.validate()?;
    Ok(config)
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn synthetic_module(config: Config, args: &SyntheticArgs) -> Result<FewShotDataModule> {
    let generator = SyntheticGraphs {
        num_classes: args.classes,
        graphs_per_class: args.graphs_per_class,
        ..Default::default()
    };
    let mut rng = match config.data.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let dataset = generator.generate(&mut rng)?;
    let split = dataset.classes_split(args.novel);

    Ok(FewShotDataModule::with_classes_split(
        config,
        dataset.graphs,
        dataset.class_to_label,
        split,
    )?)
}

fn run_meta(module: &FewShotDataModule, batches: usize) -> Result<()> {
    let stages = module.setup_meta(&mut module.setup_rng())?;
    let scorer = PrototypeScorer::default();

    let mut train_loader = module.meta_train_loader(&stages)?;
    for (idx, batch) in train_loader.iter()?.take(batches).enumerate() {
        let batch = batch?;
        let similarities = scorer.score_checked(&batch)?;
        let loss = cosine_embedding_loss(similarities.view(), batch.cosine_targets.view(), 0.0)?;
        info!(
            "Train batch {}: {} episodes, {} support / {} query nodes, loss {:.4}",
            idx,
            batch.num_episodes,
            batch.supports.num_nodes(),
            batch.queries.num_nodes(),
            loss
        );
    }

    for mut loader in module.test_loaders(&stages.test)? {
        let mut correct = 0.0;
        let mut total = 0;
        for batch in loader.iter()? {
            let batch = batch?;
            let similarities = scorer.score_checked(&batch)?;
            let predictions = predict_local_labels(similarities.view(), batch.hparams.num_classes_per_episode)?;
            let batch_accuracy = accuracy(predictions.view(), batch.label_targets.view())?;
            correct += batch_accuracy * predictions.len() as f64;
            total += predictions.len();
        }
        info!("Test accuracy over {} queries: {:.3}", total, correct / total.max(1) as f64);
    }

    Ok(())
}

fn run_transfer(module: &FewShotDataModule, batches: usize) -> Result<()> {
    let stages = module.setup_transfer(&mut module.setup_rng())?;
    info!("Base labels: {:?}", stages.base_mapping.global_to_local());
    info!("Novel labels: {:?}", stages.novel_mapping.global_to_local());

    let mut train_loader = module.transfer_train_loader(&stages)?;
    for (idx, batch) in train_loader.iter()?.take(batches).enumerate() {
        let batch = batch?;
        info!(
            "Pre-training batch {}: {} graphs, {} nodes, {} edges",
            idx,
            batch.num_graphs(),
            batch.num_nodes(),
            batch.num_edges()
        );
    }

    for mut loader in module.transfer_val_loaders(&stages)? {
        let graphs: usize = loader
            .iter()?
            .map(|batch| batch.map(|b| b.num_graphs()))
            .sum::<fewshot_graph_episodes::Result<usize>>()?;
        info!("Validation graphs: {}", graphs);
    }

    for mut loader in module.transfer_test_loaders(&stages)? {
        info!("Test batches: {}", loader.iter()?.count());
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    init_logging(&config.logging.level);

    match cli.command {
        Commands::Check => {
            info!("Configuration is valid");
            info!("  Dataset: {}", config.data.dataset_name);
            info!(
                "  Episodes: {}-way {}-shot {}-query",
                config.episode.num_classes_per_episode,
                config.episode.num_supports_per_class,
                config.episode.num_queries_per_class
            );
            let split = ClassesSplit::resolve(config.data.classes_split_path.as_deref())?;
            info!("  Classes split: {} base, {} novel", split.base.len(), split.novel.len());
        }

        Commands::DryRun { pool, mode, batches } => {
            let module = synthetic_module(config, &pool)?;
            match mode {
                Mode::Meta => run_meta(&module, batches)?,
                Mode::Transfer => run_transfer(&module, batches)?,
            }
        }

        Commands::Metadata { pool, output } => {
            let module = synthetic_module(config, &pool)?;
            let path = module.metadata()?.save(&output)?;
            info!("Metadata written to {}", path.display());
        }
    }

    Ok(())
}
