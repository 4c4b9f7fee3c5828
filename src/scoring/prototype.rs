//! Prototype scorer: a parameter-free reference model for episode batches

use ndarray::{s, Array1, Array2, Axis};

use super::{EpisodeScorer, SimilarityMetric};
use crate::episode::EpisodeBatch;
use crate::error::{Error, Result};

/// Scores queries against class prototypes.
///
/// Graph embeddings are the mean of their node features; a class prototype
/// is the mean of its K support embeddings.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrototypeScorer {
    metric: SimilarityMetric,
}

impl PrototypeScorer {
    /// Create a scorer using `metric`
    pub fn new(metric: SimilarityMetric) -> Self {
        Self { metric }
    }

    /// Similarity metric in use
    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    /// Class prototypes, one row per (episode, class) pair: (B*N, feature_dim)
    pub fn prototypes(&self, batch: &EpisodeBatch) -> Result<Array2<f64>> {
        let k = batch.hparams.num_supports_per_class;
        let embeddings = batch.supports.mean_pool();
        let num_classes = batch.labels.len();

        if embeddings.nrows() != num_classes * k {
            return Err(Error::ShapeMismatch(format!(
                "{} support embeddings for {} classes of {} supports",
                embeddings.nrows(),
                num_classes,
                k
            )));
        }

        let mut prototypes = Array2::zeros((num_classes, embeddings.ncols()));
        for (class_idx, mut row) in prototypes.axis_iter_mut(Axis(0)).enumerate() {
            let block = embeddings.slice(s![class_idx * k..(class_idx + 1) * k, ..]);
            if let Some(mean) = block.mean_axis(Axis(0)) {
                row.assign(&mean);
            }
        }

        Ok(prototypes)
    }
}

impl EpisodeScorer for PrototypeScorer {
    fn score(&self, batch: &EpisodeBatch) -> Result<Array1<f64>> {
        let n = batch.hparams.num_classes_per_episode;
        let nq = batch.hparams.queries_per_episode();

        let prototypes = self.prototypes(batch)?;
        let queries = batch.queries.mean_pool();

        let mut similarities = Vec::with_capacity(queries.nrows() * n);
        for (query_idx, query) in queries.axis_iter(Axis(0)).enumerate() {
            let episode = query_idx / nq;
            for class_idx in 0..n {
                let prototype = prototypes.row(episode * n + class_idx);
                similarities.push(self.metric.compute(query, prototype));
            }
        }

        Ok(Array1::from(similarities))
    }
}
