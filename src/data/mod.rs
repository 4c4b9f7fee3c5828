//! Graph pools and the files that describe them
//!
//! This module provides:
//! - Base/novel partitioning of a labeled graph collection
//! - Class and query/support split files
//! - Global-to-local label remapping for the transfer-learning stage
//! - The metadata artifact persisted next to checkpoints
//! - A synthetic graph generator for demos and tests

mod metadata;
mod pool;
mod remap;
mod split;
mod synthetic;

pub use metadata::MetaData;
pub use pool::{ClassSamples, GraphPool, Stage, StagePool};
pub use remap::LabelMapping;
pub use split::{split_train_val, ClassesSplit, LabelsSplit, QuerySupportSplit};
pub use synthetic::{SyntheticDataset, SyntheticGraphs};
