//! Stage setup for meta-learning and transfer-learning runs
//!
//! Turns a loaded graph list plus a [`Config`] into the datasets and loaders
//! of every stage. All label remapping and pool splitting happens here,
//! before any loader worker starts.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::config::Config;
use crate::data::{
    split_train_val, ClassesSplit, GraphPool, LabelMapping, LabelsSplit, MetaData, QuerySupportSplit, Stage,
    StagePool,
};
use crate::dataset::{EpisodicDataset, IterableEpisodicDataset, MapEpisodicDataset, TransferSourceDataset};
use crate::episode::{EpisodeHParams, EpisodeSampler};
use crate::error::{Error, Result};
use crate::graph::{Graph, Label};
use crate::loader::{EpisodicDataLoader, GraphDataLoader, LoaderConfig};

/// Datasets of a meta-learning run
#[derive(Debug, Clone)]
pub struct MetaLearningStages {
    /// Re-sampled base episodes
    pub train: Arc<IterableEpisodicDataset>,
    /// Frozen novel episodes
    pub test: Vec<Arc<MapEpisodicDataset>>,
}

/// Datasets of a transfer-learning run. Labels are local to their stage.
#[derive(Debug, Clone)]
pub struct TransferStages {
    /// Base graphs for supervised pre-training
    pub train: Arc<TransferSourceDataset>,
    /// Held-out base graphs
    pub val: Vec<Arc<TransferSourceDataset>>,
    /// Frozen novel episodes over labels `0..num_novel`
    pub test: Vec<Arc<MapEpisodicDataset>>,
    /// Base global -> local labels
    pub base_mapping: LabelMapping,
    /// Novel global -> local labels
    pub novel_mapping: LabelMapping,
}

/// Few-shot graph classification data setup
#[derive(Debug, Clone)]
pub struct FewShotDataModule {
    config: Config,
    class_to_label: BTreeMap<String, Label>,
    classes_split: ClassesSplit,
    pool: GraphPool,
    sampler: EpisodeSampler,
}

impl FewShotDataModule {
    /// Build the module, reading the classes split from
    /// `config.data.classes_split_path`.
    pub fn new(config: Config, graphs: Vec<Graph>, class_to_label: BTreeMap<String, Label>) -> Result<Self> {
        let classes_split = ClassesSplit::resolve(config.data.classes_split_path.as_deref())?;
        Self::with_classes_split(config, graphs, class_to_label, classes_split)
    }

    /// Build the module with an explicit classes split
    pub fn with_classes_split(
        config: Config,
        graphs: Vec<Graph>,
        class_to_label: BTreeMap<String, Label>,
        classes_split: ClassesSplit,
    ) -> Result<Self> {
        config.validate()?;

        let labels_split = LabelsSplit::from_classes(&classes_split, &class_to_label)?;
        let pool = GraphPool::new(graphs, labels_split)?;
        let sampler = EpisodeSampler::new(config.episode)?;

        info!(
            "Data module for '{}': {} base and {} novel classes",
            config.data.dataset_name,
            classes_split.base.len(),
            classes_split.novel.len()
        );

        Ok(Self {
            config,
            class_to_label,
            classes_split,
            pool,
            sampler,
        })
    }

    /// Configuration the module was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The full graph pool
    pub fn pool(&self) -> &GraphPool {
        &self.pool
    }

    /// Episode shape
    pub fn hparams(&self) -> &Arc<EpisodeHParams> {
        self.sampler.hparams()
    }

    /// Class name -> global label
    pub fn class_to_label(&self) -> &BTreeMap<String, Label> {
        &self.class_to_label
    }

    /// Random state for setup: seeded from the configuration if a seed is set
    pub fn setup_rng(&self) -> StdRng {
        match self.config.data.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Metadata to persist next to checkpoints
    pub fn metadata(&self) -> Result<MetaData> {
        let feature_dim = self
            .pool
            .feature_dim()
            .ok_or_else(|| Error::Configuration("cannot describe an empty graph pool".into()))?;

        Ok(MetaData::new(
            self.class_to_label.clone(),
            feature_dim,
            **self.sampler.hparams(),
            self.classes_split.clone(),
        ))
    }

    fn base_training_pool<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<StagePool> {
        let base = self.pool.stage(Stage::Base);
        if !self.config.data.separated_query_support {
            return Ok(base);
        }

        let split = match &self.config.data.query_support_split_path {
            Some(path) => QuerySupportSplit::from_file(path)?,
            None => {
                info!("No query/support split provided, splitting base classes");
                QuerySupportSplit::per_class(&base, self.config.data.support_ratio, rng)?
            }
        };
        base.separate(&split)
    }

    /// Meta-learning setup: re-sampled base episodes for training and
    /// frozen novel episodes for testing.
    pub fn setup_meta<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<MetaLearningStages> {
        let train_pool = Arc::new(self.base_training_pool(rng)?);
        let train = IterableEpisodicDataset::new(
            train_pool,
            self.sampler.clone(),
            self.config.data.num_train_episodes,
        )?;

        let novel = self.pool.stage(Stage::Novel);
        let test = MapEpisodicDataset::new(&novel, &self.sampler, self.config.data.num_test_episodes, rng)?;

        Ok(MetaLearningStages {
            train: Arc::new(train),
            test: vec![Arc::new(test)],
        })
    }

    /// Transfer-learning setup: base graphs renumbered to `0..num_base` and
    /// split into train/val, novel episodes over labels `0..num_novel`.
    ///
    /// The shared pool keeps its global labels; relabeled copies are made.
    pub fn setup_transfer<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<TransferStages> {
        let (base, base_mapping) = self.pool.stage(Stage::Base).to_local_labels()?;
        let (train, val) = split_train_val(&base.samples(), self.config.data.train_val_split_ratio, rng)?;
        info!("Transfer split: {} train and {} val base graphs", train.len(), val.len());

        let (novel, novel_mapping) = self.pool.stage(Stage::Novel).to_local_labels()?;
        let test = MapEpisodicDataset::new(&novel, &self.sampler, self.config.data.num_test_episodes, rng)?;

        Ok(TransferStages {
            train: Arc::new(TransferSourceDataset::new(train)),
            val: vec![Arc::new(TransferSourceDataset::new(val))],
            test: vec![Arc::new(test)],
            base_mapping,
            novel_mapping,
        })
    }

    /// Training loader of a meta-learning run
    pub fn meta_train_loader(&self, stages: &MetaLearningStages) -> Result<EpisodicDataLoader<IterableEpisodicDataset>> {
        self.seeded(EpisodicDataLoader::new(Arc::clone(&stages.train), self.config.loader.train.clone())?)
    }

    /// Test loaders; frozen episodes are never shuffled
    pub fn test_loaders(&self, test: &[Arc<MapEpisodicDataset>]) -> Result<Vec<EpisodicDataLoader<MapEpisodicDataset>>> {
        let config = LoaderConfig {
            shuffle: false,
            ..self.config.loader.test.clone()
        };
        self.episode_loaders(test, config)
    }

    /// Novel-episode loaders of a transfer-learning run: one episode per
    /// batch, unshuffled, whatever `loader.test.batch_size` says.
    pub fn transfer_test_loaders(
        &self,
        stages: &TransferStages,
    ) -> Result<Vec<EpisodicDataLoader<MapEpisodicDataset>>> {
        let config = LoaderConfig {
            batch_size: 1,
            shuffle: false,
            ..self.config.loader.test.clone()
        };
        self.episode_loaders(&stages.test, config)
    }

    fn episode_loaders(
        &self,
        datasets: &[Arc<MapEpisodicDataset>],
        config: LoaderConfig,
    ) -> Result<Vec<EpisodicDataLoader<MapEpisodicDataset>>> {
        datasets
            .iter()
            .map(|dataset| self.seeded(EpisodicDataLoader::new(Arc::clone(dataset), config.clone())?))
            .collect()
    }

    /// Pre-training loader of a transfer-learning run; always shuffled
    pub fn transfer_train_loader(&self, stages: &TransferStages) -> Result<GraphDataLoader> {
        let config = LoaderConfig {
            shuffle: true,
            ..self.config.loader.train.clone()
        };
        let loader = GraphDataLoader::new(Arc::clone(&stages.train), config)?;
        Ok(match self.config.data.seed {
            Some(seed) => loader.with_seed(seed),
            None => loader,
        })
    }

    /// Validation loaders of a transfer-learning run
    pub fn transfer_val_loaders(&self, stages: &TransferStages) -> Result<Vec<GraphDataLoader>> {
        let config = LoaderConfig {
            shuffle: false,
            ..self.config.loader.val.clone()
        };
        stages
            .val
            .iter()
            .map(|dataset| GraphDataLoader::new(Arc::clone(dataset), config.clone()))
            .collect()
    }

    fn seeded<D: EpisodicDataset + 'static>(&self, loader: EpisodicDataLoader<D>) -> Result<EpisodicDataLoader<D>> {
        Ok(match self.config.data.seed {
            Some(seed) => loader.with_seed(seed),
            None => loader,
        })
    }
}
