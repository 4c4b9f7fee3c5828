//! Episode sampling from a stage pool
//!
//! One sampling engine shared by the iterable and map datasets.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use super::{Episode, EpisodeHParams};
use crate::data::{ClassSamples, StagePool};
use crate::error::{Error, Result};
use crate::graph::{Graph, Label};

/// Draws N-way K-shot Q-query episodes.
///
/// The sampler holds no state besides the episode shape; all randomness
/// comes from the generator passed to [`EpisodeSampler::sample_episode`].
#[derive(Debug, Clone)]
pub struct EpisodeSampler {
    hparams: Arc<EpisodeHParams>,
}

impl EpisodeSampler {
    /// Create a sampler for the given episode shape
    pub fn new(hparams: EpisodeHParams) -> Result<Self> {
        hparams.validate()?;
        Ok(Self {
            hparams: Arc::new(hparams),
        })
    }

    /// Create a sampler sharing an existing hyperparameter record
    pub fn with_shared(hparams: Arc<EpisodeHParams>) -> Result<Self> {
        hparams.validate()?;
        Ok(Self { hparams })
    }

    /// Episode shape
    pub fn hparams(&self) -> &Arc<EpisodeHParams> {
        &self.hparams
    }

    /// Check that `pool` can serve episodes at all: it has at least N labels
    /// and every label has enough candidates.
    pub fn check_pool(&self, pool: &StagePool) -> Result<()> {
        self.check_classes(pool)?;
        for &label in pool.labels() {
            self.class_draw_sizes(pool, label)?;
        }
        Ok(())
    }

    /// Sample one episode.
    ///
    /// N labels are drawn uniformly without replacement and sorted
    /// ascending; that order is both the `labels` order and the class-block
    /// order of supports and queries. The episode references the pool's
    /// graphs and keeps global labels.
    pub fn sample_episode<R: Rng + ?Sized>(&self, pool: &StagePool, rng: &mut R) -> Result<Episode> {
        self.check_classes(pool)?;

        let n = self.hparams.num_classes_per_episode;
        let k = self.hparams.num_supports_per_class;
        let q = self.hparams.num_queries_per_class;

        let mut labels: Vec<Label> = pool.labels().choose_multiple(rng, n).copied().collect();
        labels.sort_unstable();

        let mut supports = Vec::with_capacity(n * k);
        let mut queries = Vec::with_capacity(n * q);

        for &label in &labels {
            let (class_supports, class_queries) = self.draw_class(pool, label, rng)?;
            supports.extend(class_supports);
            queries.extend(class_queries);
        }

        debug!("Sampled {} episode with labels {:?}", pool.stage(), labels);

        Episode::new(supports, queries, labels, Arc::clone(&self.hparams))
    }

    fn check_classes(&self, pool: &StagePool) -> Result<()> {
        let required = self.hparams.num_classes_per_episode;
        if pool.num_labels() < required {
            return Err(Error::InsufficientClasses {
                required,
                available: pool.num_labels(),
            });
        }
        Ok(())
    }

    /// Candidate pools of `label`, after checking their sizes
    fn class_draw_sizes<'a>(&self, pool: &'a StagePool, label: Label) -> Result<&'a ClassSamples> {
        let k = self.hparams.num_supports_per_class;
        let q = self.hparams.num_queries_per_class;

        let samples = pool.class(label).ok_or(Error::InsufficientSamples {
            label,
            required: k + q,
            available: 0,
        })?;

        match samples {
            ClassSamples::Shared(graphs) if graphs.len() < k + q => Err(Error::InsufficientSamples {
                label,
                required: k + q,
                available: graphs.len(),
            }),
            ClassSamples::Separated { supports, .. } if supports.len() < k => {
                Err(Error::InsufficientSamples {
                    label,
                    required: k,
                    available: supports.len(),
                })
            }
            ClassSamples::Separated { queries, .. } if queries.len() < q => {
                Err(Error::InsufficientSamples {
                    label,
                    required: q,
                    available: queries.len(),
                })
            }
            _ => Ok(samples),
        }
    }

    fn draw_class<R: Rng + ?Sized>(
        &self,
        pool: &StagePool,
        label: Label,
        rng: &mut R,
    ) -> Result<(Vec<Arc<Graph>>, Vec<Arc<Graph>>)> {
        let k = self.hparams.num_supports_per_class;
        let q = self.hparams.num_queries_per_class;

        let drawn = match self.class_draw_sizes(pool, label)? {
            ClassSamples::Shared(graphs) => {
                let mut drawn: Vec<Arc<Graph>> = graphs.choose_multiple(rng, k + q).cloned().collect();
                let queries = drawn.split_off(k);
                (drawn, queries)
            }
            ClassSamples::Separated { supports, queries } => (
                supports.choose_multiple(rng, k).cloned().collect(),
                queries.choose_multiple(rng, q).cloned().collect(),
            ),
        };

        Ok(drawn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{QuerySupportSplit, Stage};
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::{BTreeMap, HashSet};

    fn stage_pool(spec: &[(Label, usize)]) -> StagePool {
        let classes: BTreeMap<Label, Vec<Arc<Graph>>> = spec
            .iter()
            .map(|&(label, count)| {
                let graphs = (0..count)
                    .map(|i| Arc::new(Graph::new(Array2::zeros((i % 4 + 1, 3)), vec![], label).unwrap()))
                    .collect();
                (label, graphs)
            })
            .collect();
        StagePool::new(Stage::Base, classes)
    }

    #[test]
    fn test_episode_shape() {
        let pool = stage_pool(&[(0, 10), (1, 10), (2, 10), (3, 10)]);
        let sampler = EpisodeSampler::new(EpisodeHParams::new(2, 3, 2).unwrap()).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..50 {
            let episode = sampler.sample_episode(&pool, &mut rng).unwrap();
            assert_eq!(episode.supports.len(), 6);
            assert_eq!(episode.queries.len(), 4);
            assert_eq!(episode.labels.len(), 2);
            assert!(episode.labels.windows(2).all(|w| w[0] < w[1]));
            assert!(episode.labels.iter().all(|l| *l < 4));
        }
    }

    #[test]
    fn test_no_repeats_within_class_draw() {
        let pool = stage_pool(&[(0, 5), (1, 5)]);
        let sampler = EpisodeSampler::new(EpisodeHParams::new(2, 3, 2).unwrap()).unwrap();
        let episode = sampler.sample_episode(&pool, &mut StdRng::seed_from_u64(7)).unwrap();

        let ptrs: HashSet<*const Graph> = episode
            .supports
            .iter()
            .chain(&episode.queries)
            .map(Arc::as_ptr)
            .collect();
        assert_eq!(ptrs.len(), 10);
    }

    #[test]
    fn test_episode_references_pool_graphs() {
        let pool = stage_pool(&[(0, 6), (1, 6)]);
        let sampler = EpisodeSampler::new(EpisodeHParams::new(2, 2, 2).unwrap()).unwrap();
        let episode = sampler.sample_episode(&pool, &mut StdRng::seed_from_u64(3)).unwrap();

        let samples = pool.samples();
        assert!(episode
            .supports
            .iter()
            .all(|g| samples.iter().any(|s| Arc::ptr_eq(s, g))));
    }

    #[test]
    fn test_insufficient_classes() {
        let pool = stage_pool(&[(0, 10), (1, 10), (2, 10), (3, 10)]);
        let sampler = EpisodeSampler::new(EpisodeHParams::new(5, 3, 2).unwrap()).unwrap();
        let result = sampler.sample_episode(&pool, &mut StdRng::seed_from_u64(0));

        assert!(matches!(
            result,
            Err(Error::InsufficientClasses {
                required: 5,
                available: 4
            })
        ));
    }

    #[test]
    fn test_insufficient_samples() {
        let pool = stage_pool(&[(7, 4)]);
        let sampler = EpisodeSampler::new(EpisodeHParams::new(1, 3, 2).unwrap()).unwrap();
        let result = sampler.sample_episode(&pool, &mut StdRng::seed_from_u64(0));

        assert!(matches!(
            result,
            Err(Error::InsufficientSamples {
                label: 7,
                required: 5,
                available: 4
            })
        ));
        assert!(sampler.check_pool(&pool).is_err());
    }

    #[test]
    fn test_separated_pools() {
        let pool = stage_pool(&[(0, 6), (1, 6)]);
        // label 0 -> idx 0..6, label 1 -> idx 6..12
        let split = QuerySupportSplit {
            support_idxs: vec![0, 1, 2, 6, 7, 8],
            query_idxs: vec![3, 4, 5, 9, 10, 11],
        };
        let separated = pool.separate(&split).unwrap();
        let samples = pool.samples();

        let sampler = EpisodeSampler::new(EpisodeHParams::new(2, 3, 3).unwrap()).unwrap();
        let episode = sampler
            .sample_episode(&separated, &mut StdRng::seed_from_u64(11))
            .unwrap();

        let support_set: HashSet<*const Graph> =
            [0, 1, 2, 6, 7, 8].iter().map(|&i| Arc::as_ptr(&samples[i])).collect();
        assert!(episode.supports.iter().all(|g| support_set.contains(&Arc::as_ptr(g))));
        assert!(episode.queries.iter().all(|g| !support_set.contains(&Arc::as_ptr(g))));

        let too_many_queries = EpisodeSampler::new(EpisodeHParams::new(2, 1, 4).unwrap()).unwrap();
        assert!(matches!(
            too_many_queries.sample_episode(&separated, &mut StdRng::seed_from_u64(0)),
            Err(Error::InsufficientSamples { required: 4, available: 3, .. })
        ));
    }
}
