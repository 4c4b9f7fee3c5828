//! Batch loaders over episodic and plain graph datasets
//!
//! Loaders group dataset positions into batches, build each batch (episode
//! sampling + collation, or plain graph batching) either inline or on a pool
//! of worker threads, and yield the batches in order through a [`BatchStream`].

mod stream;

pub use stream::BatchStream;

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::{EpisodicDataset, TransferSourceDataset};
use crate::episode::EpisodeBatch;
use crate::error::{Error, Result};
use crate::graph::GraphBatch;
use stream::Producer;

/// Loader options for one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Episodes (or graphs) per batch
    pub batch_size: usize,
    /// Worker threads; 0 builds batches on the consumer thread
    pub num_workers: usize,
    /// Request page-locked host memory from device-aware consumers.
    /// Host-side batching is unaffected.
    pub pin_memory: bool,
    /// Shuffle positions every epoch (indexed datasets only)
    pub shuffle: bool,
    /// Batches each worker may produce ahead of the consumer
    pub prefetch_per_worker: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            num_workers: 0,
            pin_memory: false,
            shuffle: false,
            prefetch_per_worker: 2,
        }
    }
}

impl LoaderConfig {
    /// Reject zero batch sizes and zero-capacity queues
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidParameter("batch_size must be positive".into()));
        }
        if self.prefetch_per_worker == 0 {
            return Err(Error::InvalidParameter("prefetch_per_worker must be positive".into()));
        }
        Ok(())
    }
}

/// Independent loader options for every stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageLoaderConfig {
    pub train: LoaderConfig,
    pub val: LoaderConfig,
    pub test: LoaderConfig,
}

impl Default for StageLoaderConfig {
    fn default() -> Self {
        Self {
            train: LoaderConfig {
                num_workers: 2,
                ..Default::default()
            },
            val: LoaderConfig::default(),
            test: LoaderConfig::default(),
        }
    }
}

impl StageLoaderConfig {
    pub fn validate(&self) -> Result<()> {
        self.train.validate()?;
        self.val.validate()?;
        self.test.validate()
    }
}

/// Random state for one worker in one epoch.
///
/// Seeded loaders are reproducible for a fixed worker count.
fn worker_rng(seed: Option<u64>, epoch: u64, worker: usize) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(
            seed ^ epoch.wrapping_mul(0x9E37_79B9_7F4A_7C15)
                ^ (worker as u64 + 1).wrapping_mul(0xBF58_476D_1CE4_E5B9),
        ),
        None => StdRng::from_entropy(),
    }
}

/// Split `0..len` into batches, shuffled first if requested.
fn batch_plan(len: usize, batch_size: usize, shuffle: bool, rng: &mut StdRng) -> Vec<Vec<usize>> {
    let mut positions: Vec<usize> = (0..len).collect();
    if shuffle {
        positions.shuffle(rng);
    }
    positions.chunks(batch_size).map(<[usize]>::to_vec).collect()
}

fn start_stream<T: Send + 'static>(
    plan: Vec<Vec<usize>>,
    config: &LoaderConfig,
    seed: Option<u64>,
    epoch: u64,
    producer: Producer<T>,
) -> Result<BatchStream<T>> {
    if config.num_workers == 0 {
        Ok(BatchStream::inline(plan, producer, worker_rng(seed, epoch, 0)))
    } else {
        BatchStream::spawn(plan, config.num_workers, config.prefetch_per_worker, producer, |worker| {
            worker_rng(seed, epoch, worker)
        })
    }
}

/// Groups episodes into [`EpisodeBatch`]es.
///
/// Every call to [`EpisodicDataLoader::iter`] starts a new epoch. An
/// iterable dataset yields fresh episodes each epoch; an indexed one yields
/// its frozen episodes, reordered when `shuffle` is set.
pub struct EpisodicDataLoader<D> {
    dataset: Arc<D>,
    config: LoaderConfig,
    seed: Option<u64>,
    epoch: u64,
}

impl<D: EpisodicDataset + 'static> EpisodicDataLoader<D> {
    /// Create a loader
    pub fn new(dataset: Arc<D>, config: LoaderConfig) -> Result<Self> {
        config.validate()?;

        if config.shuffle && !dataset.is_indexed() {
            debug!("shuffle has no effect on a re-sampling episodic dataset");
        }

        info!(
            "Episodic loader: {} episodes, batch size {}, {} workers",
            dataset.len(),
            config.batch_size,
            config.num_workers
        );

        Ok(Self {
            dataset,
            config,
            seed: None,
            epoch: 0,
        })
    }

    /// Make every epoch reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Loader options
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// The wrapped dataset
    pub fn dataset(&self) -> &Arc<D> {
        &self.dataset
    }

    /// Batches per epoch; the last batch may be smaller.
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.config.batch_size)
    }

    /// Epochs started so far
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Start the next epoch
    pub fn iter(&mut self) -> Result<BatchStream<EpisodeBatch>> {
        let epoch = self.epoch;
        self.epoch += 1;

        let shuffle = self.config.shuffle && self.dataset.is_indexed();
        // The plan rng is kept apart from the worker rngs so that the order
        // does not depend on the worker count.
        let mut plan_rng = worker_rng(self.seed.map(|s| !s), epoch, 0);
        let plan = batch_plan(self.dataset.len(), self.config.batch_size, shuffle, &mut plan_rng);

        let dataset = Arc::clone(&self.dataset);
        let hparams = Arc::clone(self.dataset.hparams());
        let producer: Producer<EpisodeBatch> = Arc::new(move |positions: &[usize], rng: &mut StdRng| {
            let episodes = positions
                .iter()
                .map(|&position| dataset.episode(position, rng))
                .collect::<Result<Vec<_>>>()?;
            EpisodeBatch::collate(&episodes, &hparams)
        });

        start_stream(plan, &self.config, self.seed, epoch, producer)
    }
}

/// Groups the graphs of a [`TransferSourceDataset`] into [`GraphBatch`]es.
pub struct GraphDataLoader {
    dataset: Arc<TransferSourceDataset>,
    config: LoaderConfig,
    seed: Option<u64>,
    epoch: u64,
}

impl GraphDataLoader {
    /// Create a loader
    pub fn new(dataset: Arc<TransferSourceDataset>, config: LoaderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            dataset,
            config,
            seed: None,
            epoch: 0,
        })
    }

    /// Make the shuffling reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Batches per epoch
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.config.batch_size)
    }

    /// Start the next epoch
    pub fn iter(&mut self) -> Result<BatchStream<GraphBatch>> {
        let epoch = self.epoch;
        self.epoch += 1;

        let mut plan_rng = worker_rng(self.seed.map(|s| !s), epoch, 0);
        let plan = batch_plan(self.dataset.len(), self.config.batch_size, self.config.shuffle, &mut plan_rng);

        let dataset = Arc::clone(&self.dataset);
        let producer: Producer<GraphBatch> = Arc::new(move |positions: &[usize], _rng: &mut StdRng| {
            let graphs = positions
                .iter()
                .map(|&position| dataset.graph(position))
                .collect::<Result<Vec<_>>>()?;
            GraphBatch::from_graphs(&graphs)
        });

        start_stream(plan, &self.config, self.seed, epoch, producer)
    }
}
