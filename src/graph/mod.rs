//! Graph records used as episode samples.
//!
//! A [`Graph`] is an immutable labeled record: a node-feature matrix, an edge
//! list over local node indices and the global class label. Pools share graphs
//! through `Arc<Graph>`, so episodes and batches never copy node features until
//! [`GraphBatch`] concatenates them.

mod batch;

pub use batch::GraphBatch;

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Global class label as stored in the dataset.
pub type Label = usize;

/// A single labeled graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    /// Node features (num_nodes, feature_dim)
    node_features: Array2<f64>,
    /// Directed edges as (source, target) local node indices
    edges: Vec<(usize, usize)>,
    /// Class label
    label: Label,
}

impl Graph {
    /// Create a graph, checking that every edge endpoint is a valid node index.
    pub fn new(node_features: Array2<f64>, edges: Vec<(usize, usize)>, label: Label) -> Result<Self> {
        let num_nodes = node_features.nrows();
        if let Some(&(src, dst)) = edges.iter().find(|(s, t)| *s >= num_nodes || *t >= num_nodes) {
            return Err(Error::InvalidGraph(format!(
                "edge ({}, {}) out of range for {} nodes",
                src, dst, num_nodes
            )));
        }

        Ok(Self {
            node_features,
            edges,
            label,
        })
    }

    /// Number of nodes
    pub fn num_nodes(&self) -> usize {
        self.node_features.nrows()
    }

    /// Number of edges
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Width of the node feature vectors
    pub fn feature_dim(&self) -> usize {
        self.node_features.ncols()
    }

    /// Class label
    pub fn label(&self) -> Label {
        self.label
    }

    /// Node feature matrix
    pub fn node_features(&self) -> &Array2<f64> {
        &self.node_features
    }

    /// Features of a single node
    pub fn node(&self, idx: usize) -> Option<ArrayView1<'_, f64>> {
        (idx < self.num_nodes()).then(|| self.node_features.row(idx))
    }

    /// Edge list
    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// A copy of this graph carrying a different label.
    ///
    /// Used by label remapping, which must never touch graphs that other
    /// pools still reference.
    pub fn with_label(&self, label: Label) -> Self {
        Self {
            node_features: self.node_features.clone(),
            edges: self.edges.clone(),
            label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_graph_creation() {
        let graph = Graph::new(array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]], vec![(0, 1), (1, 2)], 3).unwrap();

        assert_eq!(graph.num_nodes(), 3);
        assert_eq!(graph.num_edges(), 2);
        assert_eq!(graph.feature_dim(), 2);
        assert_eq!(graph.label(), 3);
        assert_eq!(graph.node(2).unwrap().to_vec(), vec![1.0, 1.0]);
        assert!(graph.node(3).is_none());
    }

    #[test]
    fn test_edge_out_of_range() {
        let result = Graph::new(array![[1.0], [2.0]], vec![(0, 2)], 0);
        assert!(matches!(result, Err(Error::InvalidGraph(_))));
    }

    #[test]
    fn test_with_label_leaves_original() {
        let graph = Graph::new(array![[1.0]], vec![], 10).unwrap();
        let relabeled = graph.with_label(0);

        assert_eq!(graph.label(), 10);
        assert_eq!(relabeled.label(), 0);
        assert_eq!(graph.node_features(), relabeled.node_features());
    }
}
