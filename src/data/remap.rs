//! Dense renumbering of global labels

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::{Graph, Label};

/// Sorted global labels mapped to `0..len`, e.g. `[2, 5, 10] -> [0, 1, 2]`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabelMapping {
    global_to_local: BTreeMap<Label, Label>,
    local_to_global: Vec<Label>,
}

impl LabelMapping {
    /// Build the mapping from any label collection; duplicates are ignored.
    pub fn from_labels(labels: &[Label]) -> Self {
        let mut local_to_global = labels.to_vec();
        local_to_global.sort_unstable();
        local_to_global.dedup();

        let global_to_local = local_to_global
            .iter()
            .enumerate()
            .map(|(local, &global)| (global, local))
            .collect();

        Self {
            global_to_local,
            local_to_global,
        }
    }

    /// Local index of a global label
    pub fn local(&self, global: Label) -> Option<Label> {
        self.global_to_local.get(&global).copied()
    }

    /// Global label of a local index
    pub fn global(&self, local: Label) -> Option<Label> {
        self.local_to_global.get(local).copied()
    }

    /// Number of mapped labels
    pub fn len(&self) -> usize {
        self.local_to_global.len()
    }

    /// Whether no labels are mapped
    pub fn is_empty(&self) -> bool {
        self.local_to_global.is_empty()
    }

    /// The full global-to-local table
    pub fn global_to_local(&self) -> &BTreeMap<Label, Label> {
        &self.global_to_local
    }

    /// Map a sequence of global labels
    pub fn to_local(&self, labels: &[Label]) -> Result<Vec<Label>> {
        labels.iter().map(|&label| self.require_local(label)).collect()
    }

    /// Map a sequence of local labels back to global ones
    pub fn to_global(&self, labels: &[Label]) -> Result<Vec<Label>> {
        labels
            .iter()
            .map(|&local| {
                self.global(local).ok_or_else(|| {
                    Error::Configuration(format!("local label {} outside 0..{}", local, self.len()))
                })
            })
            .collect()
    }

    /// A relabeled copy of `graph`
    pub fn relabel(&self, graph: &Graph) -> Result<Graph> {
        Ok(graph.with_label(self.require_local(graph.label())?))
    }

    /// Relabeled copies of `graphs`, in order
    pub fn relabel_all(&self, graphs: &[Arc<Graph>]) -> Result<Vec<Arc<Graph>>> {
        graphs
            .iter()
            .map(|graph| self.relabel(graph).map(Arc::new))
            .collect()
    }

    fn require_local(&self, global: Label) -> Result<Label> {
        self.local(global).ok_or_else(|| {
            Error::Configuration(format!("label {} is not part of the mapping", global))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_dense_mapping() {
        let mapping = LabelMapping::from_labels(&[10, 2, 5, 2]);

        assert_eq!(mapping.len(), 3);
        assert_eq!(mapping.local(2), Some(0));
        assert_eq!(mapping.local(5), Some(1));
        assert_eq!(mapping.local(10), Some(2));
        assert_eq!(mapping.local(3), None);
        assert_eq!(mapping.global(2), Some(10));
        assert_eq!(mapping.to_local(&[10, 2]).unwrap(), vec![2, 0]);
        assert_eq!(mapping.to_global(&[1, 1, 0]).unwrap(), vec![5, 5, 2]);
    }

    #[test]
    fn test_relabel_returns_new_graph() {
        let mapping = LabelMapping::from_labels(&[3, 8]);
        let original = Arc::new(Graph::new(Array2::zeros((2, 1)), vec![(0, 1)], 8).unwrap());

        let relabeled = mapping.relabel_all(&[Arc::clone(&original)]).unwrap();

        assert_eq!(relabeled[0].label(), 1);
        assert_eq!(relabeled[0].edges(), original.edges());
        assert_eq!(original.label(), 8);
        assert!(!Arc::ptr_eq(&relabeled[0], &original));
    }

    #[test]
    fn test_unknown_label() {
        let mapping = LabelMapping::from_labels(&[1]);
        let graph = Graph::new(Array2::zeros((1, 1)), vec![], 4).unwrap();

        assert!(matches!(mapping.relabel(&graph), Err(Error::Configuration(_))));
        assert!(mapping.to_global(&[1]).is_err());
    }
}
