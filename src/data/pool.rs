//! Labeled graph pools partitioned into base and novel classes

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::remap::LabelMapping;
use super::split::{LabelsSplit, QuerySupportSplit};
use crate::error::{Error, Result};
use crate::graph::{Graph, Label};

/// Which side of the class split a pool serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Meta-training classes
    Base,
    /// Meta-testing classes
    Novel,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Base => write!(f, "base"),
            Stage::Novel => write!(f, "novel"),
        }
    }
}

/// Every graph of a dataset, bucketed by label, plus the base/novel split.
///
/// The pool is immutable after construction and is shared read-only by
/// datasets and loader workers.
#[derive(Debug, Clone)]
pub struct GraphPool {
    by_label: BTreeMap<Label, Vec<Arc<Graph>>>,
    labels_split: LabelsSplit,
    feature_dim: Option<usize>,
}

impl GraphPool {
    /// Bucket `graphs` by label. Every graph must have the same feature width.
    pub fn new(graphs: Vec<Graph>, labels_split: LabelsSplit) -> Result<Self> {
        let feature_dim = graphs.first().map(Graph::feature_dim);
        if let (Some(dim), Some(other)) = (
            feature_dim,
            graphs.iter().find(|g| Some(g.feature_dim()) != feature_dim),
        ) {
            return Err(Error::ShapeMismatch(format!(
                "graph with label {} has feature width {}, expected {}",
                other.label(),
                other.feature_dim(),
                dim
            )));
        }

        let mut by_label: BTreeMap<Label, Vec<Arc<Graph>>> = BTreeMap::new();
        for graph in graphs {
            by_label.entry(graph.label()).or_default().push(Arc::new(graph));
        }

        let pool = Self {
            by_label,
            labels_split,
            feature_dim,
        };

        info!(
            "Graph pool: {} graphs over {} labels ({} base, {} novel, {} outside the split)",
            pool.num_graphs(),
            pool.by_label.len(),
            pool.stage_graph_count(Stage::Base),
            pool.stage_graph_count(Stage::Novel),
            pool.excluded_count()
        );

        Ok(pool)
    }

    /// Total number of graphs, including those outside both stages
    pub fn num_graphs(&self) -> usize {
        self.by_label.values().map(Vec::len).sum()
    }

    /// Node feature width, `None` for an empty pool
    pub fn feature_dim(&self) -> Option<usize> {
        self.feature_dim
    }

    /// The base/novel label split
    pub fn labels_split(&self) -> &LabelsSplit {
        &self.labels_split
    }

    /// Graphs carrying `label`
    pub fn graphs_with_label(&self, label: Label) -> &[Arc<Graph>] {
        self.by_label.get(&label).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of graphs whose label is neither base nor novel
    pub fn excluded_count(&self) -> usize {
        self.by_label
            .iter()
            .filter(|(&label, _)| self.labels_split.stage_of(label).is_none())
            .map(|(_, graphs)| graphs.len())
            .sum()
    }

    fn stage_graph_count(&self, stage: Stage) -> usize {
        self.labels_split
            .labels(stage)
            .iter()
            .map(|&label| self.graphs_with_label(label).len())
            .sum()
    }

    /// The graphs of one stage, grouped by label.
    ///
    /// Graphs are shared, not copied. A stage label without graphs gets an
    /// empty bucket, so sampling it reports insufficient samples.
    pub fn stage(&self, stage: Stage) -> StagePool {
        let labels = self.labels_split.labels(stage).to_vec();
        let classes = labels
            .iter()
            .map(|&label| (label, self.graphs_with_label(label).to_vec()))
            .collect();

        StagePool::new(stage, classes)
    }
}

/// The sampling candidates of one class
#[derive(Debug, Clone, PartialEq)]
pub enum ClassSamples {
    /// Supports and queries are drawn from one pool without overlap inside an episode
    Shared(Vec<Arc<Graph>>),
    /// Supports and queries come from disjoint candidate pools
    Separated {
        supports: Vec<Arc<Graph>>,
        queries: Vec<Arc<Graph>>,
    },
}

impl ClassSamples {
    /// Total number of candidate graphs
    pub fn len(&self) -> usize {
        match self {
            ClassSamples::Shared(graphs) => graphs.len(),
            ClassSamples::Separated { supports, queries } => supports.len() + queries.len(),
        }
    }

    /// Whether the class has no candidates at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn iter(&self) -> impl Iterator<Item = &Arc<Graph>> {
        let (first, second) = match self {
            ClassSamples::Shared(graphs) => (graphs.as_slice(), &[] as &[Arc<Graph>]),
            ClassSamples::Separated { supports, queries } => (supports.as_slice(), queries.as_slice()),
        };
        first.iter().chain(second)
    }
}

/// The sampling view of one stage: its labels in ascending order and the
/// candidates of each label.
#[derive(Debug, Clone, PartialEq)]
pub struct StagePool {
    stage: Stage,
    labels: Vec<Label>,
    classes: BTreeMap<Label, ClassSamples>,
}

impl StagePool {
    /// Build a shared (not query/support separated) stage pool
    pub fn new(stage: Stage, classes: BTreeMap<Label, Vec<Arc<Graph>>>) -> Self {
        let labels = classes.keys().copied().collect();
        let classes = classes
            .into_iter()
            .map(|(label, graphs)| (label, ClassSamples::Shared(graphs)))
            .collect();

        Self {
            stage,
            labels,
            classes,
        }
    }

    /// Stage served by this pool
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Stage labels in ascending order
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Number of stage labels
    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }

    /// Candidates of one label
    pub fn class(&self, label: Label) -> Option<&ClassSamples> {
        self.classes.get(&label)
    }

    /// Whether supports and queries come from disjoint candidate pools
    pub fn is_separated(&self) -> bool {
        self.classes
            .values()
            .any(|c| matches!(c, ClassSamples::Separated { .. }))
    }

    /// Candidate count per label
    pub fn class_sizes(&self) -> BTreeMap<Label, usize> {
        self.classes.iter().map(|(&label, c)| (label, c.len())).collect()
    }

    /// Total number of candidate graphs
    pub fn num_samples(&self) -> usize {
        self.classes.values().map(ClassSamples::len).sum()
    }

    /// All candidates flattened in ascending label order.
    ///
    /// This is the index space of [`QuerySupportSplit`].
    pub fn samples(&self) -> Vec<Arc<Graph>> {
        self.classes.values().flat_map(|c| c.iter().cloned()).collect()
    }

    /// Partition every class into support and query candidates according to
    /// `split`, whose indices refer to [`StagePool::samples`].
    pub fn separate(&self, split: &QuerySupportSplit) -> Result<StagePool> {
        if self.is_separated() {
            return Err(Error::Configuration(format!(
                "{} pool is already split into supports and queries",
                self.stage
            )));
        }

        let samples = self.samples();
        split.validate(samples.len())?;

        let mut supports: BTreeMap<Label, Vec<Arc<Graph>>> = BTreeMap::new();
        let mut queries: BTreeMap<Label, Vec<Arc<Graph>>> = BTreeMap::new();
        for &idx in &split.support_idxs {
            let graph = &samples[idx];
            supports.entry(graph.label()).or_default().push(Arc::clone(graph));
        }
        for &idx in &split.query_idxs {
            let graph = &samples[idx];
            queries.entry(graph.label()).or_default().push(Arc::clone(graph));
        }

        let classes = self
            .labels
            .iter()
            .map(|&label| {
                let samples = ClassSamples::Separated {
                    supports: supports.remove(&label).unwrap_or_default(),
                    queries: queries.remove(&label).unwrap_or_default(),
                };
                (label, samples)
            })
            .collect();

        debug!(
            "Separated {} pool: {} support and {} query candidates",
            self.stage,
            split.support_idxs.len(),
            split.query_idxs.len()
        );

        Ok(StagePool {
            stage: self.stage,
            labels: self.labels.clone(),
            classes,
        })
    }

    /// Renumber the stage labels to `0..num_labels` in ascending order.
    ///
    /// Produces relabeled copies of the graphs; the graphs referenced by
    /// `self` (and by any other pool) are left untouched.
    pub fn to_local_labels(&self) -> Result<(StagePool, LabelMapping)> {
        let mapping = LabelMapping::from_labels(&self.labels);

        let relabel = |graphs: &[Arc<Graph>]| mapping.relabel_all(graphs);
        let mut classes = BTreeMap::new();
        for (&label, samples) in &self.classes {
            let local = mapping.local(label).ok_or_else(|| {
                Error::Configuration(format!("label {} missing from its own mapping", label))
            })?;
            let samples = match samples {
                ClassSamples::Shared(graphs) => ClassSamples::Shared(relabel(graphs)?),
                ClassSamples::Separated { supports, queries } => ClassSamples::Separated {
                    supports: relabel(supports)?,
                    queries: relabel(queries)?,
                },
            };
            classes.insert(local, samples);
        }

        info!("{} global to local labels: {:?}", self.stage, mapping.global_to_local());

        let pool = StagePool {
            stage: self.stage,
            labels: (0..mapping.len()).collect(),
            classes,
        };
        Ok((pool, mapping))
    }
}
