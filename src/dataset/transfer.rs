//! Plain graph dataset for the transfer-learning pre-training stage

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::graph::{Graph, Label};

/// Individual labeled graphs, batched with [`crate::loader::GraphDataLoader`].
#[derive(Debug, Clone, Default)]
pub struct TransferSourceDataset {
    graphs: Vec<Arc<Graph>>,
}

impl TransferSourceDataset {
    /// Wrap `graphs`, usually already relabeled to local labels
    pub fn new(graphs: Vec<Arc<Graph>>) -> Self {
        Self { graphs }
    }

    /// Number of graphs
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    /// Whether the dataset holds no graphs
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// Graph at `index`
    pub fn get(&self, index: usize) -> Option<&Arc<Graph>> {
        self.graphs.get(index)
    }

    /// Graph at `index`, shared with the dataset
    pub fn graph(&self, index: usize) -> Result<Arc<Graph>> {
        self.get(index).cloned().ok_or_else(|| {
            Error::InvalidParameter(format!(
                "graph index {} out of range for {} graphs",
                index,
                self.graphs.len()
            ))
        })
    }

    /// All graphs in order
    pub fn graphs(&self) -> &[Arc<Graph>] {
        &self.graphs
    }

    /// Distinct labels present, ascending
    pub fn labels(&self) -> Vec<Label> {
        let mut labels: Vec<Label> = self.graphs.iter().map(|g| g.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        labels
    }
}
