//! Episodic datasets
//!
//! Both variants wrap the same [`EpisodeSampler`]:
//! - [`IterableEpisodicDataset`] re-samples on every traversal (meta-training)
//! - [`MapEpisodicDataset`] samples once and serves frozen episodes (evaluation)

mod transfer;

pub use transfer::TransferSourceDataset;

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;
use tracing::info;

use crate::data::StagePool;
use crate::episode::{Episode, EpisodeHParams, EpisodeSampler};
use crate::error::{Error, Result};

/// A finite source of episodes that loader workers can share.
pub trait EpisodicDataset: Send + Sync {
    /// Number of episodes per traversal
    fn len(&self) -> usize;

    /// Whether the dataset serves no episodes
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Episode shape
    fn hparams(&self) -> &Arc<EpisodeHParams>;

    /// Episode at position `index` of the current traversal.
    ///
    /// Indexed datasets ignore `rng`; the others draw from it.
    fn episode(&self, index: usize, rng: &mut StdRng) -> Result<Episode>;

    /// Whether `episode(i, _)` is the same for every call, which makes
    /// shuffling meaningful.
    fn is_indexed(&self) -> bool;
}

fn check_n_episodes(n_episodes: usize) -> Result<()> {
    if n_episodes == 0 {
        return Err(Error::InvalidParameter("n_episodes must be positive".into()));
    }
    Ok(())
}

/// Lazily sampled episodes; every traversal draws a fresh set.
#[derive(Debug, Clone)]
pub struct IterableEpisodicDataset {
    pool: Arc<StagePool>,
    sampler: EpisodeSampler,
    n_episodes: usize,
}

impl IterableEpisodicDataset {
    /// Create the dataset. Fails if the pool cannot serve the episode shape.
    pub fn new(pool: Arc<StagePool>, sampler: EpisodeSampler, n_episodes: usize) -> Result<Self> {
        check_n_episodes(n_episodes)?;
        sampler.check_pool(&pool)?;

        info!(
            "Iterable episodic dataset: {} episodes per epoch over {} {} labels",
            n_episodes,
            pool.num_labels(),
            pool.stage()
        );

        Ok(Self {
            pool,
            sampler,
            n_episodes,
        })
    }

    /// Sampling pool
    pub fn pool(&self) -> &Arc<StagePool> {
        &self.pool
    }

    /// One traversal: `n_episodes` freshly sampled episodes.
    pub fn iter<'a, R: Rng + ?Sized>(&'a self, rng: &'a mut R) -> impl Iterator<Item = Result<Episode>> + 'a {
        (0..self.n_episodes).map(move |_| self.sampler.sample_episode(&self.pool, &mut *rng))
    }
}

impl EpisodicDataset for IterableEpisodicDataset {
    fn len(&self) -> usize {
        self.n_episodes
    }

    fn hparams(&self) -> &Arc<EpisodeHParams> {
        self.sampler.hparams()
    }

    fn episode(&self, _index: usize, rng: &mut StdRng) -> Result<Episode> {
        self.sampler.sample_episode(&self.pool, rng)
    }

    fn is_indexed(&self) -> bool {
        false
    }
}

/// Episodes sampled once at construction and cached.
///
/// `get(i)` always returns the same episode, so repeated evaluation passes
/// see identical tasks.
#[derive(Debug, Clone)]
pub struct MapEpisodicDataset {
    episodes: Vec<Episode>,
    hparams: Arc<EpisodeHParams>,
}

impl MapEpisodicDataset {
    /// Sample `n_episodes` episodes from `pool` eagerly.
    pub fn new<R: Rng + ?Sized>(
        pool: &StagePool,
        sampler: &EpisodeSampler,
        n_episodes: usize,
        rng: &mut R,
    ) -> Result<Self> {
        check_n_episodes(n_episodes)?;

        let episodes = (0..n_episodes)
            .map(|_| sampler.sample_episode(pool, rng))
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Map episodic dataset: {} frozen episodes over {} {} labels",
            n_episodes,
            pool.num_labels(),
            pool.stage()
        );

        Ok(Self {
            episodes,
            hparams: Arc::clone(sampler.hparams()),
        })
    }

    /// Cached episode at `index`
    pub fn get(&self, index: usize) -> Option<&Episode> {
        self.episodes.get(index)
    }

    /// All cached episodes, in index order
    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }
}

impl EpisodicDataset for MapEpisodicDataset {
    fn len(&self) -> usize {
        self.episodes.len()
    }

    fn hparams(&self) -> &Arc<EpisodeHParams> {
        &self.hparams
    }

    fn episode(&self, index: usize, _rng: &mut StdRng) -> Result<Episode> {
        self.get(index).cloned().ok_or_else(|| {
            Error::InvalidParameter(format!(
                "episode index {} out of range for {} episodes",
                index,
                self.episodes.len()
            ))
        })
    }

    fn is_indexed(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Stage;
    use crate::graph::{Graph, Label};
    use ndarray::Array2;
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    fn pool() -> Arc<StagePool> {
        let classes: BTreeMap<Label, Vec<Arc<Graph>>> = (0..4)
            .map(|label| {
                let graphs = (0..10)
                    .map(|_| Arc::new(Graph::new(Array2::zeros((2, 2)), vec![(0, 1)], label).unwrap()))
                    .collect();
                (label, graphs)
            })
            .collect();
        Arc::new(StagePool::new(Stage::Base, classes))
    }

    fn sampler() -> EpisodeSampler {
        EpisodeSampler::new(EpisodeHParams::new(2, 3, 2).unwrap()).unwrap()
    }

    #[test]
    fn test_zero_episodes_rejected() {
        assert!(matches!(
            IterableEpisodicDataset::new(pool(), sampler(), 0),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            MapEpisodicDataset::new(&pool(), &sampler(), 0, &mut StdRng::seed_from_u64(0)),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_iterable_traversals_resample() {
        let dataset = IterableEpisodicDataset::new(pool(), sampler(), 20).unwrap();
        let mut rng = StdRng::seed_from_u64(5);

        let first: Vec<Episode> = dataset.iter(&mut rng).collect::<Result<_>>().unwrap();
        let second: Vec<Episode> = dataset.iter(&mut rng).collect::<Result<_>>().unwrap();

        assert_eq!(first.len(), 20);
        assert_eq!(second.len(), 20);
        assert!(first.iter().zip(&second).any(|(a, b)| !a.same_graphs(b)));
    }

    #[test]
    fn test_map_is_frozen() {
        let dataset = MapEpisodicDataset::new(&pool(), &sampler(), 5, &mut StdRng::seed_from_u64(9)).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let mut other_rng = StdRng::seed_from_u64(2);

        for i in 0..dataset.len() {
            let a = dataset.episode(i, &mut rng).unwrap();
            let b = dataset.episode(i, &mut other_rng).unwrap();
            assert!(a.same_graphs(&b));
            assert!(a.same_graphs(dataset.get(i).unwrap()));
        }
        assert!(dataset.episode(5, &mut rng).is_err());
    }

    #[test]
    fn test_insufficient_pool_rejected_upfront() {
        let sampler = EpisodeSampler::new(EpisodeHParams::new(5, 1, 1).unwrap()).unwrap();
        assert!(matches!(
            IterableEpisodicDataset::new(pool(), sampler, 10),
            Err(Error::InsufficientClasses { .. })
        ));
    }
}
