//! Dataset metadata persisted next to model checkpoints.
//!
//! A model restored from a checkpoint needs the class dictionary, the feature
//! width, the episode shape and the class split, but not the graph pool itself.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::split::ClassesSplit;
use crate::episode::EpisodeHParams;
use crate::error::Result;
use crate::graph::Label;

/// File name of the metadata inside its directory
pub const METADATA_FILE: &str = "data.json";

/// Everything a model needs to know about the data it was trained on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaData {
    /// Class name -> global label
    pub classes_to_label_dict: BTreeMap<String, Label>,
    /// Node feature width
    pub feature_dim: usize,
    /// Episode shape
    pub episode_hparams: EpisodeHParams,
    /// Base/novel class split
    pub classes_split: ClassesSplit,
}

impl MetaData {
    /// Create metadata
    pub fn new(
        classes_to_label_dict: BTreeMap<String, Label>,
        feature_dim: usize,
        episode_hparams: EpisodeHParams,
        classes_split: ClassesSplit,
    ) -> Self {
        Self {
            classes_to_label_dict,
            feature_dim,
            episode_hparams,
            classes_split,
        }
    }

    /// Number of classes in the dataset
    pub fn num_classes(&self) -> usize {
        self.classes_to_label_dict.len()
    }

    /// Number of classes per episode
    pub fn num_classes_per_episode(&self) -> usize {
        self.episode_hparams.num_classes_per_episode
    }

    /// Serialize into `dir/data.json`, creating `dir` if needed.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        debug!("Saving MetaData to '{}'", dir.display());

        std::fs::create_dir_all(dir)?;
        let path = dir.join(METADATA_FILE);
        std::fs::write(&path, self.to_json()?)?;
        Ok(path)
    }

    /// Deserialize from `dir/data.json`
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        debug!("Loading MetaData from '{}'", dir.display());

        let content = std::fs::read_to_string(dir.join(METADATA_FILE))?;
        Self::from_json(&content)
    }

    /// Pretty JSON representation
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse the JSON representation
    pub fn from_json(content: &str) -> Result<Self> {
        let metadata: Self = serde_json::from_str(content)?;
        metadata.episode_hparams.validate()?;
        Ok(metadata)
    }
}
