//! Similarity functions between embeddings

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// How a query embedding is compared with a class prototype.
///
/// Larger values mean "more similar" for every variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// (x·y)/(||x|| ||y||), the scale `cosine_targets` are defined on
    #[default]
    Cosine,
    /// -sum((x-y)^2)
    NegSquaredEuclidean,
}

impl SimilarityMetric {
    /// Compute similarity between two vectors
    pub fn compute(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        match self {
            SimilarityMetric::Cosine => Self::cosine(a, b),
            SimilarityMetric::NegSquaredEuclidean => {
                let diff = &a - &b;
                -diff.dot(&diff)
            }
        }
    }

    fn cosine(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        let norm_a = a.dot(&a).sqrt();
        let norm_b = b.dot(&b).sqrt();

        // Zero vectors are orthogonal to everything
        if norm_a < 1e-8 || norm_b < 1e-8 {
            return 0.0;
        }

        a.dot(&b) / (norm_a * norm_b)
    }
}
