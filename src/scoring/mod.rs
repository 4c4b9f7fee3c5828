//! Scoring episode batches
//!
//! A model consumes an [`EpisodeBatch`] and returns one similarity per
//! (query, candidate class) pair, query-major and class-minor, aligned with
//! [`EpisodeBatch::cosine_targets`]. This module holds that contract, a
//! reference [`PrototypeScorer`], and the loss and prediction helpers that
//! consume the aligned sequences.

mod prototype;
mod similarity;

pub use prototype::PrototypeScorer;
pub use similarity::SimilarityMetric;

use ndarray::{Array1, ArrayView1, Axis};

use crate::episode::EpisodeBatch;
use crate::error::{Error, Result};
use crate::utils::argmax;

/// A model over episode batches.
pub trait EpisodeScorer {
    /// Similarities of length B*N*Q*N, ordered like `cosine_targets`
    fn score(&self, batch: &EpisodeBatch) -> Result<Array1<f64>>;

    /// Score `batch` and check the output length against the contract
    fn score_checked(&self, batch: &EpisodeBatch) -> Result<Array1<f64>> {
        let similarities = self.score(batch)?;
        if similarities.len() != batch.cosine_targets.len() {
            return Err(Error::ShapeMismatch(format!(
                "scorer returned {} similarities, batch has {} targets",
                similarities.len(),
                batch.cosine_targets.len()
            )));
        }
        Ok(similarities)
    }
}

/// Mean cosine embedding loss:
/// `1 - s` for a +1 target and `max(0, s - margin)` for a -1 target.
pub fn cosine_embedding_loss(similarities: ArrayView1<'_, f64>, targets: ArrayView1<'_, i64>, margin: f64) -> Result<f64> {
    if similarities.len() != targets.len() {
        return Err(Error::ShapeMismatch(format!(
            "{} similarities for {} targets",
            similarities.len(),
            targets.len()
        )));
    }
    if similarities.is_empty() {
        return Ok(0.0);
    }

    let total: f64 = similarities
        .iter()
        .zip(targets.iter())
        .map(|(&s, &t)| if t > 0 { 1.0 - s } else { (s - margin).max(0.0) })
        .sum();

    Ok(total / similarities.len() as f64)
}

/// Predicted class position (`0..n`) of every query: the argmax of the
/// similarities reshaped to (queries, n).
pub fn predict_local_labels(similarities: ArrayView1<'_, f64>, n: usize) -> Result<Array1<usize>> {
    if n == 0 || similarities.len() % n != 0 {
        return Err(Error::ShapeMismatch(format!(
            "{} similarities cannot be split into rows of {}",
            similarities.len(),
            n
        )));
    }

    let matrix = similarities
        .into_shape((similarities.len() / n, n))
        .map_err(|e| Error::ShapeMismatch(e.to_string()))?;

    Ok(matrix
        .axis_iter(Axis(0))
        .map(|row| argmax(row.iter()).unwrap_or_default())
        .collect())
}

/// Share of predictions equal to their targets
pub fn accuracy(predictions: ArrayView1<'_, usize>, targets: ArrayView1<'_, usize>) -> Result<f64> {
    if predictions.len() != targets.len() {
        return Err(Error::ShapeMismatch(format!(
            "{} predictions for {} targets",
            predictions.len(),
            targets.len()
        )));
    }
    if predictions.is_empty() {
        return Ok(0.0);
    }

    let correct = predictions.iter().zip(targets.iter()).filter(|(p, t)| p == t).count();
    Ok(correct as f64 / predictions.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::{Episode, EpisodeHParams};
    use crate::graph::{Graph, Label};
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};
    use std::sync::Arc;

    /// Graphs of class `label` have every node at `direction`
    fn graph(label: Label, direction: [f64; 2]) -> Arc<Graph> {
        let features = Array2::from_shape_fn((3, 2), |(_, f)| direction[f]);
        Arc::new(Graph::new(features, vec![(0, 1), (1, 2)], label).unwrap())
    }

    fn batch() -> EpisodeBatch {
        let hp = Arc::new(EpisodeHParams::new(2, 2, 1).unwrap());
        let episode = Episode::new(
            vec![
                graph(3, [1.0, 0.0]),
                graph(3, [1.0, 0.1]),
                graph(8, [0.0, 1.0]),
                graph(8, [0.1, 1.0]),
            ],
            vec![graph(3, [2.0, 0.1]), graph(8, [0.0, 0.5])],
            vec![3, 8],
            Arc::clone(&hp),
        )
        .unwrap();
        EpisodeBatch::collate(&[episode], &hp).unwrap()
    }

    #[test]
    fn test_prototype_scorer_ranks_true_class_first() {
        let batch = batch();
        let scorer = PrototypeScorer::new(SimilarityMetric::Cosine);

        let prototypes = scorer.prototypes(&batch).unwrap();
        assert_eq!(prototypes.dim(), (2, 2));
        assert_relative_eq!(prototypes[[0, 1]], 0.05, epsilon = 1e-12);

        let similarities = scorer.score_checked(&batch).unwrap();
        assert_eq!(similarities.len(), 4);

        let predictions = predict_local_labels(similarities.view(), 2).unwrap();
        assert_eq!(predictions, batch.label_targets);
        assert_relative_eq!(
            accuracy(predictions.view(), batch.label_targets.view()).unwrap(),
            1.0
        );
        assert_eq!(batch.map_to_global_labels(predictions.as_slice().unwrap()).unwrap(), vec![3, 8]);
    }

    #[test]
    fn test_euclidean_scorer_agrees() {
        let batch = batch();
        let scorer = PrototypeScorer::new(SimilarityMetric::NegSquaredEuclidean);
        let similarities = scorer.score(&batch).unwrap();

        assert!(similarities.iter().all(|&s| s <= 0.0));
        assert_eq!(predict_local_labels(similarities.view(), 2).unwrap(), array![0, 1]);
    }

    #[test]
    fn test_cosine_embedding_loss() {
        let similarities = array![1.0, -0.2, 0.5, 0.3];
        let targets = array![1, -1, 1, -1];

        // (0 + 0 + 0.5 + 0.3) / 4
        let loss = cosine_embedding_loss(similarities.view(), targets.view(), 0.0).unwrap();
        assert_relative_eq!(loss, 0.2, epsilon = 1e-12);

        // (0 + 0 + 0.5 + 0.05) / 4
        let loss = cosine_embedding_loss(similarities.view(), targets.view(), 0.25).unwrap();
        assert_relative_eq!(loss, 0.1375, epsilon = 1e-12);

        assert!(cosine_embedding_loss(similarities.view(), array![1].view(), 0.0).is_err());
    }

    #[test]
    fn test_predict_rejects_ragged_input() {
        assert!(matches!(
            predict_local_labels(array![0.1, 0.2, 0.3].view(), 2),
            Err(Error::ShapeMismatch(_))
        ));
    }
}
