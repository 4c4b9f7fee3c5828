//! # Few-Shot Graph Episodes
//!
//! Episodic sampling and batching for few-shot graph classification.
//!
//! ## Overview
//!
//! A pool of labeled graphs is split into base classes (meta-training) and
//! novel classes (meta-testing). From a stage pool the library samples
//! N-way K-shot Q-query episodes and collates batches of them into one
//! training-ready structure: stacked graphs with offset bookkeeping,
//! per-episode assignment vectors, and the ±1 / class-index targets a
//! similarity model is trained against.
//!
//! ```text
//! GraphPool -> EpisodeSampler -> [Episode] -> EpisodeBatch::collate -> EpisodeBatch -> model
//! ```
//!
//! ## Modules
//!
//! - `graph` - Graph records and disjoint-union graph batching
//! - `data` - Pools, split files, label remapping and metadata
//! - `episode` - Episode shape, sampler and collation
//! - `dataset` - Iterable (re-sampled) and map (frozen) episodic datasets
//! - `loader` - Batch loaders with an optional worker pool
//! - `datamodule` - Meta-learning and transfer-learning stage setup
//! - `scoring` - Model contract, reference prototype scorer and loss helpers
//! - `config` - TOML configuration
//! - `utils` - Shared numeric helpers

pub mod config;
pub mod data;
pub mod datamodule;
pub mod dataset;
pub mod episode;
pub mod error;
pub mod graph;
pub mod loader;
pub mod scoring;
pub mod utils;

pub use error::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    // Graphs
    pub use crate::graph::{Graph, GraphBatch, Label};

    // Pools and splits
    pub use crate::data::{
        split_train_val, ClassSamples, ClassesSplit, GraphPool, LabelMapping, LabelsSplit, MetaData,
        QuerySupportSplit, Stage, StagePool, SyntheticDataset, SyntheticGraphs,
    };

    // Episodes
    pub use crate::episode::{AssignmentVectors, Episode, EpisodeBatch, EpisodeHParams, EpisodeSampler};

    // Datasets and loaders
    pub use crate::dataset::{EpisodicDataset, IterableEpisodicDataset, MapEpisodicDataset, TransferSourceDataset};
    pub use crate::loader::{BatchStream, EpisodicDataLoader, GraphDataLoader, LoaderConfig, StageLoaderConfig};

    // Setup
    pub use crate::config::Config;
    pub use crate::datamodule::{FewShotDataModule, MetaLearningStages, TransferStages};

    // Scoring
    pub use crate::scoring::{
        accuracy, cosine_embedding_loss, predict_local_labels, EpisodeScorer, PrototypeScorer, SimilarityMetric,
    };

    pub use crate::error::{Error, Result};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
