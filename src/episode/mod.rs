//! Episodes for N-way K-shot Q-query graph classification.
//!
//! This module provides:
//! - [`EpisodeHParams`], the fixed (N, K, Q) shape shared by every episode
//! - [`Episode`], one sampled task referencing pool graphs
//! - [`EpisodeSampler`], which draws episodes from a stage pool
//! - [`EpisodeBatch`], the collated form handed to a model

mod batch;
mod sampler;

pub use batch::{AssignmentVectors, EpisodeBatch};
pub use sampler::EpisodeSampler;

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::{Graph, Label};

/// Shape of every episode: N classes, K supports and Q queries per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpisodeHParams {
    /// Number of classes per episode (N-way)
    pub num_classes_per_episode: usize,
    /// Number of support graphs per class (K-shot)
    pub num_supports_per_class: usize,
    /// Number of query graphs per class
    pub num_queries_per_class: usize,
}

impl Default for EpisodeHParams {
    fn default() -> Self {
        Self {
            num_classes_per_episode: 3,
            num_supports_per_class: 5,
            num_queries_per_class: 10,
        }
    }
}

impl EpisodeHParams {
    /// Create validated hyperparameters
    pub fn new(
        num_classes_per_episode: usize,
        num_supports_per_class: usize,
        num_queries_per_class: usize,
    ) -> Result<Self> {
        let hparams = Self {
            num_classes_per_episode,
            num_supports_per_class,
            num_queries_per_class,
        };
        hparams.validate()?;
        Ok(hparams)
    }

    /// Check that N, K and Q are all positive.
    ///
    /// Deserialized values bypass [`EpisodeHParams::new`], so consumers call this again.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("num_classes_per_episode", self.num_classes_per_episode),
            ("num_supports_per_class", self.num_supports_per_class),
            ("num_queries_per_class", self.num_queries_per_class),
        ] {
            if value == 0 {
                return Err(Error::InvalidParameter(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }

    /// N * K
    pub fn supports_per_episode(&self) -> usize {
        self.num_classes_per_episode * self.num_supports_per_class
    }

    /// N * Q
    pub fn queries_per_episode(&self) -> usize {
        self.num_classes_per_episode * self.num_queries_per_class
    }

    /// K + Q, the draw size for a class without a query/support split
    pub fn samples_per_class(&self) -> usize {
        self.num_supports_per_class + self.num_queries_per_class
    }
}

/// One sampled N-way K-shot Q-query task.
///
/// `supports` holds N blocks of K graphs and `queries` N blocks of Q graphs;
/// block `i` of both belongs to class `labels[i]`. Labels are global ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    /// Support graphs, class-major (N * K)
    pub supports: Vec<Arc<Graph>>,
    /// Query graphs, class-major (N * Q)
    pub queries: Vec<Arc<Graph>>,
    /// The N chosen global labels, in block order
    pub labels: Vec<Label>,
    /// Shared episode shape
    pub hparams: Arc<EpisodeHParams>,
}

impl Episode {
    /// Build an episode and check its invariants
    pub fn new(
        supports: Vec<Arc<Graph>>,
        queries: Vec<Arc<Graph>>,
        labels: Vec<Label>,
        hparams: Arc<EpisodeHParams>,
    ) -> Result<Self> {
        let episode = Self {
            supports,
            queries,
            labels,
            hparams,
        };
        episode.validate()?;
        Ok(episode)
    }

    /// Check lengths, label distinctness and block/label alignment.
    pub fn validate(&self) -> Result<()> {
        let hp = &self.hparams;
        hp.validate()?;

        if self.supports.len() != hp.supports_per_episode() {
            return Err(Error::ShapeMismatch(format!(
                "episode has {} supports, expected {}",
                self.supports.len(),
                hp.supports_per_episode()
            )));
        }
        if self.queries.len() != hp.queries_per_episode() {
            return Err(Error::ShapeMismatch(format!(
                "episode has {} queries, expected {}",
                self.queries.len(),
                hp.queries_per_episode()
            )));
        }

        let distinct: HashSet<Label> = self.labels.iter().copied().collect();
        if self.labels.len() != hp.num_classes_per_episode || distinct.len() != self.labels.len() {
            return Err(Error::ShapeMismatch(format!(
                "episode labels {:?} are not {} distinct classes",
                self.labels, hp.num_classes_per_episode
            )));
        }

        for (class_idx, &label) in self.labels.iter().enumerate() {
            let misplaced = self
                .supports_of_class(class_idx)
                .iter()
                .chain(self.queries_of_class(class_idx))
                .find(|g| g.label() != label);
            if let Some(graph) = misplaced {
                return Err(Error::ShapeMismatch(format!(
                    "graph with label {} found in the block of label {}",
                    graph.label(),
                    label
                )));
            }
        }

        Ok(())
    }

    /// Number of classes (N)
    pub fn n_way(&self) -> usize {
        self.labels.len()
    }

    /// Support graphs of the `class_idx`-th chosen class
    pub fn supports_of_class(&self, class_idx: usize) -> &[Arc<Graph>] {
        let k = self.hparams.num_supports_per_class;
        let start = (class_idx * k).min(self.supports.len());
        let end = (start + k).min(self.supports.len());
        &self.supports[start..end]
    }

    /// Query graphs of the `class_idx`-th chosen class
    pub fn queries_of_class(&self, class_idx: usize) -> &[Arc<Graph>] {
        let q = self.hparams.num_queries_per_class;
        let start = (class_idx * q).min(self.queries.len());
        let end = (start + q).min(self.queries.len());
        &self.queries[start..end]
    }

    /// Total node count over all supports
    pub fn support_nodes(&self) -> usize {
        self.supports.iter().map(|g| g.num_nodes()).sum()
    }

    /// Total node count over all queries
    pub fn query_nodes(&self) -> usize {
        self.queries.iter().map(|g| g.num_nodes()).sum()
    }

    /// Whether both episodes reference the very same graph records in the
    /// same order, with the same labels.
    pub fn same_graphs(&self, other: &Episode) -> bool {
        fn same(a: &[Arc<Graph>], b: &[Arc<Graph>]) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Arc::ptr_eq(x, y))
        }

        self.labels == other.labels
            && same(&self.supports, &other.supports)
            && same(&self.queries, &other.queries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn graph(label: Label, nodes: usize) -> Arc<Graph> {
        Arc::new(Graph::new(Array2::zeros((nodes, 2)), vec![], label).unwrap())
    }

    #[test]
    fn test_hparams_validation() {
        assert!(EpisodeHParams::new(2, 3, 2).is_ok());
        assert!(matches!(
            EpisodeHParams::new(2, 0, 2),
            Err(Error::InvalidParameter(_))
        ));

        let hp = EpisodeHParams::new(2, 3, 2).unwrap();
        assert_eq!(hp.supports_per_episode(), 6);
        assert_eq!(hp.queries_per_episode(), 4);
        assert_eq!(hp.samples_per_class(), 5);
    }

    #[test]
    fn test_episode_blocks() {
        let hp = Arc::new(EpisodeHParams::new(2, 2, 1).unwrap());
        let supports = vec![graph(4, 3), graph(4, 2), graph(9, 5), graph(9, 1)];
        let queries = vec![graph(4, 2), graph(9, 4)];
        let episode = Episode::new(supports, queries, vec![4, 9], hp).unwrap();

        assert_eq!(episode.n_way(), 2);
        assert_eq!(episode.supports_of_class(1).len(), 2);
        assert!(episode.supports_of_class(1).iter().all(|g| g.label() == 9));
        assert_eq!(episode.queries_of_class(0)[0].label(), 4);
        assert_eq!(episode.support_nodes(), 11);
        assert_eq!(episode.query_nodes(), 6);
        assert!(episode.same_graphs(&episode.clone()));
    }

    #[test]
    fn test_episode_rejects_misaligned_blocks() {
        let hp = Arc::new(EpisodeHParams::new(2, 1, 1).unwrap());
        let result = Episode::new(
            vec![graph(9, 1), graph(4, 1)],
            vec![graph(4, 1), graph(9, 1)],
            vec![4, 9],
            hp,
        );
        assert!(matches!(result, Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn test_episode_rejects_duplicate_labels() {
        let hp = Arc::new(EpisodeHParams::new(2, 1, 1).unwrap());
        let result = Episode::new(
            vec![graph(4, 1), graph(4, 1)],
            vec![graph(4, 1), graph(4, 1)],
            vec![4, 4],
            hp,
        );
        assert!(matches!(result, Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn test_episode_rejects_wrong_length() {
        let hp = Arc::new(EpisodeHParams::new(1, 2, 1).unwrap());
        let result = Episode::new(vec![graph(0, 1)], vec![graph(0, 1)], vec![0], hp);
        assert!(matches!(result, Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn test_episode_rejects_zero_way_hparams() {
        let hp = Arc::new(EpisodeHParams {
            num_classes_per_episode: 0,
            ..Default::default()
        });
        let result = Episode::new(vec![], vec![], vec![], hp);
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }
}
