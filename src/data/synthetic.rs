//! Synthetic labeled graphs for demos, dry runs and tests

use std::collections::BTreeMap;

use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::split::ClassesSplit;
use crate::error::{Error, Result};
use crate::graph::{Graph, Label};

/// Generator of random graphs whose node features cluster around a
/// class-dependent mean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticGraphs {
    /// Number of classes (labels `0..num_classes`)
    pub num_classes: usize,
    /// Graphs generated for every class
    pub graphs_per_class: usize,
    /// Smallest graph size
    pub min_nodes: usize,
    /// Largest graph size (inclusive)
    pub max_nodes: usize,
    /// Node feature width
    pub feature_dim: usize,
    /// Probability of each directed edge (i, j), i != j
    pub edge_probability: f64,
    /// Distance between consecutive class means
    pub class_separation: f64,
    /// Standard deviation of node features around the class mean
    pub noise_std: f64,
}

impl Default for SyntheticGraphs {
    fn default() -> Self {
        Self {
            num_classes: 8,
            graphs_per_class: 20,
            min_nodes: 4,
            max_nodes: 12,
            feature_dim: 8,
            edge_probability: 0.3,
            class_separation: 1.0,
            noise_std: 0.25,
        }
    }
}

/// Output of [`SyntheticGraphs::generate`]
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    /// Generated graphs, grouped by label in ascending order
    pub graphs: Vec<Graph>,
    /// `class_<label>` -> label
    pub class_to_label: BTreeMap<String, Label>,
}

impl SyntheticDataset {
    /// Name of the class with `label`
    pub fn class_name(label: Label) -> String {
        format!("class_{}", label)
    }

    /// A split that puts the last `num_novel` classes into the novel set.
    pub fn classes_split(&self, num_novel: usize) -> ClassesSplit {
        let num_classes = self.class_to_label.len();
        let boundary = num_classes.saturating_sub(num_novel);

        ClassesSplit::new(
            (0..boundary).map(Self::class_name).collect(),
            (boundary..num_classes).map(Self::class_name).collect(),
        )
    }
}

impl SyntheticGraphs {
    /// Generate the dataset
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<SyntheticDataset> {
        if self.min_nodes == 0 || self.min_nodes > self.max_nodes {
            return Err(Error::InvalidParameter(format!(
                "node range {}..={} is empty or starts at zero",
                self.min_nodes, self.max_nodes
            )));
        }
        if !(0.0..=1.0).contains(&self.edge_probability) {
            return Err(Error::InvalidParameter(format!(
                "edge_probability must be in [0, 1], got {}",
                self.edge_probability
            )));
        }

        let noise = Normal::new(0.0, self.noise_std)
            .map_err(|e| Error::InvalidParameter(format!("noise_std: {}", e)))?;

        let mut graphs = Vec::with_capacity(self.num_classes * self.graphs_per_class);
        for label in 0..self.num_classes {
            let center = label as f64 * self.class_separation;
            for _ in 0..self.graphs_per_class {
                let num_nodes = rng.gen_range(self.min_nodes..=self.max_nodes);

                let mut features = Array2::zeros((num_nodes, self.feature_dim));
                for ((_, f), value) in features.indexed_iter_mut() {
                    // Alternate the sign per feature so classes differ in direction too
                    let sign = if f % 2 == 0 { 1.0 } else { -1.0 };
                    *value = sign * center + noise.sample(rng);
                }

                let mut edges = Vec::new();
                for src in 0..num_nodes {
                    for dst in 0..num_nodes {
                        if src != dst && rng.gen_bool(self.edge_probability) {
                            edges.push((src, dst));
                        }
                    }
                }

                graphs.push(Graph::new(features, edges, label)?);
            }
        }

        let class_to_label = (0..self.num_classes)
            .map(|label| (SyntheticDataset::class_name(label), label))
            .collect();

        Ok(SyntheticDataset {
            graphs,
            class_to_label,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generate_counts() {
        let config = SyntheticGraphs {
            num_classes: 4,
            graphs_per_class: 10,
            ..Default::default()
        };
        let dataset = config.generate(&mut StdRng::seed_from_u64(42)).unwrap();

        assert_eq!(dataset.graphs.len(), 40);
        assert_eq!(dataset.class_to_label.len(), 4);
        assert_eq!(dataset.class_to_label["class_3"], 3);
        assert!(dataset
            .graphs
            .iter()
            .all(|g| g.num_nodes() >= config.min_nodes && g.num_nodes() <= config.max_nodes));
        assert!(dataset.graphs.iter().all(|g| g.feature_dim() == config.feature_dim));
    }

    #[test]
    fn test_classes_split() {
        let config = SyntheticGraphs {
            num_classes: 5,
            graphs_per_class: 1,
            ..Default::default()
        };
        let dataset = config.generate(&mut StdRng::seed_from_u64(1)).unwrap();
        let split = dataset.classes_split(2);

        assert_eq!(split.base, vec!["class_0", "class_1", "class_2"]);
        assert_eq!(split.novel, vec!["class_3", "class_4"]);
    }

    #[test]
    fn test_invalid_node_range() {
        let config = SyntheticGraphs {
            min_nodes: 5,
            max_nodes: 3,
            ..Default::default()
        };
        assert!(config.generate(&mut StdRng::seed_from_u64(0)).is_err());
    }
}
