//! Collation of episodes into one training batch

use std::ops::Range;
use std::sync::Arc;

use ndarray::{s, Array1, ArrayView1, Axis};
use tracing::debug;

use super::{Episode, EpisodeHParams};
use crate::error::{Error, Result};
use crate::graph::{Graph, GraphBatch, Label};
use crate::utils::argmax;

/// Episode index of every flattened support and query graph.
///
/// Laid out as B blocks of constant size N*K (supports) and N*Q (queries).
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentVectors {
    /// Episode of each support graph (B*N*K)
    pub supports: Array1<usize>,
    /// Episode of each query graph (B*N*Q)
    pub queries: Array1<usize>,
}

/// B episodes merged into one batch
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeBatch {
    /// All support graphs, episode-major then class-major (B*N*K graphs)
    pub supports: GraphBatch,
    /// All query graphs, same layout (B*N*Q graphs)
    pub queries: GraphBatch,
    /// Global labels of every episode, concatenated (B*N)
    pub labels: Array1<Label>,
    /// Shared episode shape
    pub hparams: Arc<EpisodeHParams>,
    /// Episode index of every support and query graph
    pub assignment_vectors: AssignmentVectors,
    /// Total support node count per episode (B)
    pub supports_len: Array1<usize>,
    /// Total query node count per episode (B)
    pub queries_len: Array1<usize>,
    /// +1/-1 per (query, candidate class) pair, query-major (B*N*Q*N)
    pub cosine_targets: Array1<i64>,
    /// Position of the true class among the N candidates, per query (B*N*Q)
    pub label_targets: Array1<usize>,
    /// Number of episodes (B)
    pub num_episodes: usize,
}

impl EpisodeBatch {
    /// Collate `episodes` in order.
    ///
    /// Every episode must match `hparams` exactly; anything else is a
    /// [`Error::ShapeMismatch`], as is an empty list. Non-positive N, K or Q
    /// is an [`Error::InvalidParameter`].
    pub fn collate(episodes: &[Episode], hparams: &Arc<EpisodeHParams>) -> Result<Self> {
        hparams.validate()?;
        if episodes.is_empty() {
            return Err(Error::ShapeMismatch("cannot collate an empty episode list".into()));
        }

        let n = hparams.num_classes_per_episode;
        let nk = hparams.supports_per_episode();
        let nq = hparams.queries_per_episode();

        for (idx, episode) in episodes.iter().enumerate() {
            if episode.supports.len() != nk || episode.queries.len() != nq || episode.labels.len() != n {
                return Err(Error::ShapeMismatch(format!(
                    "episode {} has {} supports, {} queries and {} labels, expected {}, {} and {}",
                    idx,
                    episode.supports.len(),
                    episode.queries.len(),
                    episode.labels.len(),
                    nk,
                    nq,
                    n
                )));
            }
        }

        let num_episodes = episodes.len();

        let supports: Vec<Arc<Graph>> = episodes.iter().flat_map(|e| e.supports.iter().cloned()).collect();
        let queries: Vec<Arc<Graph>> = episodes.iter().flat_map(|e| e.queries.iter().cloned()).collect();
        let labels: Array1<Label> = episodes.iter().flat_map(|e| e.labels.iter().copied()).collect();

        let assignment_vectors = AssignmentVectors {
            supports: (0..num_episodes).flat_map(|e| std::iter::repeat(e).take(nk)).collect(),
            queries: (0..num_episodes).flat_map(|e| std::iter::repeat(e).take(nq)).collect(),
        };

        let supports_len: Array1<usize> = episodes.iter().map(Episode::support_nodes).collect();
        let queries_len: Array1<usize> = episodes.iter().map(Episode::query_nodes).collect();

        let cosine_targets = cosine_targets(episodes, nq * n)?;
        let label_targets = label_targets(&cosine_targets, n)?;

        let batch = Self {
            supports: GraphBatch::from_graphs(&supports)?,
            queries: GraphBatch::from_graphs(&queries)?,
            labels,
            hparams: Arc::clone(hparams),
            assignment_vectors,
            supports_len,
            queries_len,
            cosine_targets,
            label_targets,
            num_episodes,
        };

        debug!(
            "Collated {} episodes: {} support graphs ({} nodes), {} query graphs ({} nodes)",
            num_episodes,
            batch.supports.num_graphs(),
            batch.supports.num_nodes(),
            batch.queries.num_graphs(),
            batch.queries.num_nodes()
        );

        Ok(batch)
    }

    /// Number of episodes (B)
    pub fn batch_size(&self) -> usize {
        self.num_episodes
    }

    /// Indices of episode `episode`'s graphs inside [`EpisodeBatch::supports`]
    pub fn support_range(&self, episode: usize) -> Range<usize> {
        let nk = self.hparams.supports_per_episode();
        episode * nk..(episode + 1) * nk
    }

    /// Indices of episode `episode`'s graphs inside [`EpisodeBatch::queries`]
    pub fn query_range(&self, episode: usize) -> Range<usize> {
        let nq = self.hparams.queries_per_episode();
        episode * nq..(episode + 1) * nq
    }

    /// The N global labels of episode `episode`, in block order
    pub fn episode_labels(&self, episode: usize) -> ArrayView1<'_, Label> {
        let n = self.hparams.num_classes_per_episode;
        self.labels.slice(s![episode * n..(episode + 1) * n])
    }

    /// True global label of every flattened query graph
    pub fn query_labels(&self) -> &[Label] {
        &self.queries.labels
    }

    /// Translate per-query local predictions (`0..N`, as produced from the
    /// similarity scores) into global labels using each query's episode.
    pub fn map_to_global_labels(&self, local_predictions: &[usize]) -> Result<Vec<Label>> {
        let n = self.hparams.num_classes_per_episode;
        let nq = self.hparams.queries_per_episode();

        if local_predictions.len() != self.num_episodes * nq {
            return Err(Error::ShapeMismatch(format!(
                "got {} predictions for {} queries",
                local_predictions.len(),
                self.num_episodes * nq
            )));
        }

        local_predictions
            .iter()
            .enumerate()
            .map(|(query_idx, &local)| {
                if local >= n {
                    return Err(Error::InvalidParameter(format!(
                        "local prediction {} outside 0..{}",
                        local, n
                    )));
                }
                let episode = query_idx / nq;
                Ok(self.labels[episode * n + local])
            })
            .collect()
    }
}

/// One +1/-1 entry per (query, candidate label) pair, query-major.
fn cosine_targets(episodes: &[Episode], per_episode: usize) -> Result<Array1<i64>> {
    let mut targets = Vec::with_capacity(episodes.len() * per_episode);

    for episode in episodes {
        for query in &episode.queries {
            let mut hits = 0;
            for &label in &episode.labels {
                let hit = query.label() == label;
                hits += usize::from(hit);
                targets.push(if hit { 1 } else { -1 });
            }
            if hits != 1 {
                return Err(Error::ShapeMismatch(format!(
                    "query label {} is not exactly one of the episode labels {:?}",
                    query.label(),
                    episode.labels
                )));
            }
        }
    }

    Ok(Array1::from(targets))
}

/// Row-wise argmax of `cosine_targets` reshaped to (B*N*Q, N).
fn label_targets(cosine_targets: &Array1<i64>, n: usize) -> Result<Array1<usize>> {
    let rows = cosine_targets.len() / n;
    let matrix = cosine_targets
        .view()
        .into_shape((rows, n))
        .map_err(|e| Error::ShapeMismatch(e.to_string()))?;

    Ok(matrix
        .axis_iter(Axis(0))
        .map(|row| argmax(row.iter()).unwrap_or_default())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn graph(label: Label, nodes: usize) -> Arc<Graph> {
        Arc::new(Graph::new(Array2::from_elem((nodes, 2), label as f64), vec![], label).unwrap())
    }

    /// N=2, K=1, Q=2 episode over `labels`, node counts from `sizes`
    fn episode(labels: [Label; 2], sizes: [usize; 6], hparams: &Arc<EpisodeHParams>) -> Episode {
        let [a, b] = labels;
        Episode::new(
            vec![graph(a, sizes[0]), graph(b, sizes[1])],
            vec![graph(a, sizes[2]), graph(a, sizes[3]), graph(b, sizes[4]), graph(b, sizes[5])],
            labels.to_vec(),
            Arc::clone(hparams),
        )
        .unwrap()
    }

    fn hparams() -> Arc<EpisodeHParams> {
        Arc::new(EpisodeHParams::new(2, 1, 2).unwrap())
    }

    #[test]
    fn test_collate_layout() {
        let hp = hparams();
        let episodes = vec![
            episode([1, 4], [2, 3, 1, 1, 2, 2], &hp),
            episode([0, 3], [1, 1, 4, 1, 1, 1], &hp),
        ];
        let batch = EpisodeBatch::collate(&episodes, &hp).unwrap();

        assert_eq!(batch.num_episodes, 2);
        assert_eq!(batch.supports.num_graphs(), 4);
        assert_eq!(batch.queries.num_graphs(), 8);
        assert_eq!(batch.labels, array![1, 4, 0, 3]);
        assert_eq!(batch.assignment_vectors.supports, array![0, 0, 1, 1]);
        assert_eq!(batch.assignment_vectors.queries, array![0, 0, 0, 0, 1, 1, 1, 1]);
        assert_eq!(batch.supports_len, array![5, 2]);
        assert_eq!(batch.queries_len, array![6, 7]);
        assert_eq!(batch.supports.num_nodes(), 7);
        assert_eq!(batch.queries.num_nodes(), 13);
    }

    #[test]
    fn test_targets() {
        let hp = hparams();
        let batch = EpisodeBatch::collate(&[episode([2, 5], [1; 6], &hp)], &hp).unwrap();

        assert_eq!(batch.cosine_targets, array![1, -1, 1, -1, -1, 1, -1, 1]);
        assert_eq!(batch.label_targets, array![0, 0, 1, 1]);
        assert_eq!(batch.query_labels(), &[2, 2, 5, 5]);
    }

    #[test]
    fn test_per_episode_views() {
        let hp = hparams();
        let episodes = vec![episode([1, 4], [1; 6], &hp), episode([0, 3], [1; 6], &hp)];
        let batch = EpisodeBatch::collate(&episodes, &hp).unwrap();

        assert_eq!(batch.support_range(1), 2..4);
        assert_eq!(batch.query_range(1), 4..8);
        assert_eq!(batch.episode_labels(1), array![0, 3]);
    }

    #[test]
    fn test_map_to_global_labels() {
        let hp = hparams();
        let episodes = vec![episode([1, 4], [1; 6], &hp), episode([0, 3], [1; 6], &hp)];
        let batch = EpisodeBatch::collate(&episodes, &hp).unwrap();

        let global = batch.map_to_global_labels(&[0, 1, 1, 1, 0, 0, 1, 0]).unwrap();
        assert_eq!(global, vec![1, 4, 4, 4, 0, 0, 3, 0]);

        assert!(matches!(
            batch.map_to_global_labels(&[0, 1]),
            Err(Error::ShapeMismatch(_))
        ));
        assert!(batch.map_to_global_labels(&[2; 8]).is_err());
    }

    #[test]
    fn test_empty_list() {
        let hp = hparams();
        assert!(matches!(EpisodeBatch::collate(&[], &hp), Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn test_hparams_mismatch() {
        let hp = hparams();
        let other = Arc::new(EpisodeHParams::new(2, 2, 2).unwrap());
        let episodes = vec![episode([1, 4], [1; 6], &hp)];

        assert!(matches!(
            EpisodeBatch::collate(&episodes, &other),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_query_outside_episode_labels() {
        let hp = hparams();
        // Bypass Episode::new to build an episode that violates its invariants
        let broken = Episode {
            supports: vec![graph(1, 1), graph(4, 1)],
            queries: vec![graph(1, 1), graph(1, 1), graph(4, 1), graph(9, 1)],
            labels: vec![1, 4],
            hparams: Arc::clone(&hp),
        };

        assert!(matches!(
            EpisodeBatch::collate(&[broken], &hp),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_zero_way_hparams_rejected() {
        let hp = Arc::new(EpisodeHParams {
            num_classes_per_episode: 0,
            ..Default::default()
        });
        // Struct literal skips the checks in Episode::new
        let empty = Episode {
            supports: vec![],
            queries: vec![],
            labels: vec![],
            hparams: Arc::clone(&hp),
        };

        assert!(matches!(
            EpisodeBatch::collate(&[empty], &hp),
            Err(Error::InvalidParameter(_))
        ));
    }
}
