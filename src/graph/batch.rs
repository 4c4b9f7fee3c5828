//! Disjoint-union batching of variable-sized graphs.

use std::ops::Range;
use std::sync::Arc;

use ndarray::{concatenate, s, Array1, Array2, ArrayView2, Axis};

use super::{Graph, Label};
use crate::error::{Error, Result};

/// Many graphs merged into one disconnected graph.
///
/// Node features are stacked, edge indices are shifted by each graph's node
/// offset, and two demultiplexing vectors map every node and every edge back
/// to the graph it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphBatch {
    /// Stacked node features (total_nodes, feature_dim)
    pub node_features: Array2<f64>,
    /// Edges re-indexed into the stacked node space
    pub edge_index: Vec<(usize, usize)>,
    /// For each node, the index of its source graph
    pub node_to_graph: Vec<usize>,
    /// For each edge, the index of its source graph
    pub edge_to_graph: Vec<usize>,
    /// Node offsets, `num_graphs + 1` entries; graph `i` owns nodes
    /// `node_offsets[i]..node_offsets[i + 1]`
    pub node_offsets: Vec<usize>,
    /// Label of every graph, in batch order
    pub labels: Vec<Label>,
}

impl GraphBatch {
    /// Merge graphs in the given order.
    ///
    /// All graphs must share the same feature width.
    pub fn from_graphs(graphs: &[Arc<Graph>]) -> Result<Self> {
        let Some(first) = graphs.first() else {
            return Ok(Self::empty());
        };

        let feature_dim = first.feature_dim();
        if let Some((idx, g)) = graphs
            .iter()
            .enumerate()
            .find(|(_, g)| g.feature_dim() != feature_dim)
        {
            return Err(Error::ShapeMismatch(format!(
                "graph {} has feature width {}, expected {}",
                idx,
                g.feature_dim(),
                feature_dim
            )));
        }

        let total_nodes: usize = graphs.iter().map(|g| g.num_nodes()).sum();
        let total_edges: usize = graphs.iter().map(|g| g.num_edges()).sum();

        let mut edge_index = Vec::with_capacity(total_edges);
        let mut node_to_graph = Vec::with_capacity(total_nodes);
        let mut edge_to_graph = Vec::with_capacity(total_edges);
        let mut node_offsets = Vec::with_capacity(graphs.len() + 1);
        let mut labels = Vec::with_capacity(graphs.len());

        let mut offset = 0;
        for (graph_idx, graph) in graphs.iter().enumerate() {
            node_offsets.push(offset);
            labels.push(graph.label());
            node_to_graph.extend(std::iter::repeat(graph_idx).take(graph.num_nodes()));

            for &(src, dst) in graph.edges() {
                edge_index.push((src + offset, dst + offset));
                edge_to_graph.push(graph_idx);
            }

            offset += graph.num_nodes();
        }
        node_offsets.push(offset);

        let views: Vec<ArrayView2<'_, f64>> = graphs.iter().map(|g| g.node_features().view()).collect();
        let node_features =
            concatenate(Axis(0), &views).map_err(|e| Error::ShapeMismatch(e.to_string()))?;

        Ok(Self {
            node_features,
            edge_index,
            node_to_graph,
            edge_to_graph,
            node_offsets,
            labels,
        })
    }

    fn empty() -> Self {
        Self {
            node_features: Array2::zeros((0, 0)),
            edge_index: Vec::new(),
            node_to_graph: Vec::new(),
            edge_to_graph: Vec::new(),
            node_offsets: vec![0],
            labels: Vec::new(),
        }
    }

    /// Number of graphs in the batch
    pub fn num_graphs(&self) -> usize {
        self.labels.len()
    }

    /// Total number of nodes
    pub fn num_nodes(&self) -> usize {
        self.node_features.nrows()
    }

    /// Total number of edges
    pub fn num_edges(&self) -> usize {
        self.edge_index.len()
    }

    /// Width of the node features
    pub fn feature_dim(&self) -> usize {
        self.node_features.ncols()
    }

    /// Node range owned by graph `idx`
    pub fn node_range(&self, idx: usize) -> Option<Range<usize>> {
        (idx < self.num_graphs()).then(|| self.node_offsets[idx]..self.node_offsets[idx + 1])
    }

    /// Node features of graph `idx`
    pub fn graph_features(&self, idx: usize) -> Option<ArrayView2<'_, f64>> {
        self.node_range(idx)
            .map(|range| self.node_features.slice(s![range, ..]))
    }

    /// Number of nodes of every graph, in batch order
    pub fn graph_sizes(&self) -> Vec<usize> {
        self.node_offsets.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Global mean pooling: one row per graph.
    ///
    /// Graphs without nodes pool to a zero vector.
    pub fn mean_pool(&self) -> Array2<f64> {
        let mut pooled = Array2::zeros((self.num_graphs(), self.feature_dim()));

        for (graph_idx, mut row) in pooled.axis_iter_mut(Axis(0)).enumerate() {
            let range = self.node_offsets[graph_idx]..self.node_offsets[graph_idx + 1];
            if range.is_empty() {
                continue;
            }
            let mean: Array1<f64> = self
                .node_features
                .slice(s![range, ..])
                .mean_axis(Axis(0))
                .unwrap_or_else(|| Array1::zeros(self.feature_dim()));
            row.assign(&mean);
        }

        pooled
    }
}
