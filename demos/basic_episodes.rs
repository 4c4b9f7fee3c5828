//! Basic Episode Sampling Example
//!
//! This example walks through the core pipeline:
//! 1. Building a graph pool with a base/novel split
//! 2. Sampling N-way K-shot Q-query episodes
//! 3. Collating episodes into one batch
//! 4. Scoring the batch with the prototype scorer
//!
//! Run with: cargo run --example basic_episodes

use std::sync::Arc;

use fewshot_graph_episodes::prelude::*;
use rand::prelude::*;

fn main() -> anyhow::Result<()> {
    println!("=== Basic Episode Sampling Example ===\n");

    let mut rng = StdRng::seed_from_u64(42);

    // 1. Pool
    println!("1. Generating a synthetic graph pool...");
    let dataset = SyntheticGraphs {
        num_classes: 6,
        graphs_per_class: 15,
        ..Default::default()
    }
    .generate(&mut rng)?;
    let classes_split = dataset.classes_split(2);
    let labels_split = LabelsSplit::from_classes(&classes_split, &dataset.class_to_label)?;
    let pool = GraphPool::new(dataset.graphs, labels_split)?;

    let base = pool.stage(Stage::Base);
    println!("   - {} graphs, base labels {:?}", pool.num_graphs(), base.labels());
    println!("   - novel labels {:?}\n", pool.labels_split().novel());

    // 2. Episodes
    println!("2. Sampling 3-way 2-shot 3-query episodes...");
    let sampler = EpisodeSampler::new(EpisodeHParams::new(3, 2, 3)?)?;
    let episodes: Vec<Episode> = (0..4)
        .map(|_| sampler.sample_episode(&base, &mut rng))
        .collect::<fewshot_graph_episodes::Result<_>>()?;

    for (idx, episode) in episodes.iter().enumerate() {
        println!(
            "   - episode {}: labels {:?}, {} support nodes, {} query nodes",
            idx,
            episode.labels,
            episode.support_nodes(),
            episode.query_nodes()
        );
    }

    // 3. Collation
    println!("\n3. Collating...");
    let batch = EpisodeBatch::collate(&episodes, sampler.hparams())?;
    println!("   - supports: {} graphs / {} nodes", batch.supports.num_graphs(), batch.supports.num_nodes());
    println!("   - queries: {} graphs / {} nodes", batch.queries.num_graphs(), batch.queries.num_nodes());
    println!("   - supports_len: {}", batch.supports_len);
    println!("   - cosine_targets: {} entries", batch.cosine_targets.len());
    println!("   - label_targets: {}", batch.label_targets);

    // 4. Scoring
    println!("\n4. Scoring with class prototypes...");
    let scorer = PrototypeScorer::new(SimilarityMetric::Cosine);
    let similarities = scorer.score_checked(&batch)?;
    let loss = cosine_embedding_loss(similarities.view(), batch.cosine_targets.view(), 0.0)?;
    let predictions = predict_local_labels(similarities.view(), 3)?;
    let acc = accuracy(predictions.view(), batch.label_targets.view())?;

    let global = batch.map_to_global_labels(&predictions.to_vec())?;
    println!("   - loss: {:.4}", loss);
    println!("   - accuracy: {:.1}%", acc * 100.0);
    println!("   - first predictions (global): {:?}", &global[..6]);

    // Episodes reference the pool graphs instead of copying them
    let samples = base.samples();
    let shared = episodes[0]
        .supports
        .iter()
        .all(|graph| samples.iter().any(|candidate| Arc::ptr_eq(candidate, graph)));
    println!("\n   Episodes share pool graphs: {}", shared);

    println!("\n=== Example Complete ===");
    Ok(())
}
