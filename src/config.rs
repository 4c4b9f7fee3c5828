//! Configuration handling.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::episode::EpisodeHParams;
use crate::error::{Error, Result};
use crate::loader::StageLoaderConfig;

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Dataset and split configuration
    pub data: DataConfig,
    /// Episode shape
    pub episode: EpisodeHParams,
    /// Per-stage loader options
    pub loader: StageLoaderConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check every numeric option.
    pub fn validate(&self) -> Result<()> {
        self.data.validate()?;
        self.episode.validate()?;
        self.loader.validate()
    }
}

/// Dataset and split configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Dataset name
    pub dataset_name: String,
    /// Data directory
    pub data_dir: PathBuf,
    /// JSON file with the base/novel class split
    pub classes_split_path: Option<PathBuf>,
    /// JSON file with support/query indices
    pub query_support_split_path: Option<PathBuf>,
    /// Draw supports and queries from disjoint candidate pools
    pub separated_query_support: bool,
    /// Share of each class used as support candidates when separated
    pub support_ratio: f64,
    /// Episodes per meta-training epoch
    pub num_train_episodes: usize,
    /// Frozen episodes for meta-testing
    pub num_test_episodes: usize,
    /// Share of base graphs kept for training in transfer learning
    pub train_val_split_ratio: f64,
    /// Seed for splits, frozen episodes and loaders
    pub seed: Option<u64>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dataset_name: "synthetic".to_string(),
            data_dir: PathBuf::from("data"),
            classes_split_path: None,
            query_support_split_path: None,
            separated_query_support: false,
            support_ratio: 0.5,
            num_train_episodes: 1000,
            num_test_episodes: 200,
            train_val_split_ratio: 0.8,
            seed: None,
        }
    }
}

impl DataConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_train_episodes == 0 || self.num_test_episodes == 0 {
            return Err(Error::InvalidParameter(
                "num_train_episodes and num_test_episodes must be positive".into(),
            ));
        }
        if !(self.support_ratio > 0.0 && self.support_ratio <= 1.0) {
            return Err(Error::InvalidParameter(format!(
                "support_ratio must be in (0, 1], got {}",
                self.support_ratio
            )));
        }
        if !(self.train_val_split_ratio > 0.0 && self.train_val_split_ratio < 1.0) {
            return Err(Error::InvalidParameter(format!(
                "train_val_split_ratio must be in (0, 1), got {}",
                self.train_val_split_ratio
            )));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [data]
            classes_split_path = "splits/classes.json"
            num_train_episodes = 50

            [episode]
            num_classes_per_episode = 2
            num_supports_per_class = 3
            num_queries_per_class = 2

            [loader.train]
            batch_size = 4
            num_workers = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.data.num_train_episodes, 50);
        assert_eq!(config.data.num_test_episodes, 200);
        assert_eq!(config.data.classes_split_path, Some(PathBuf::from("splits/classes.json")));
        assert_eq!(config.episode.supports_per_episode(), 6);
        assert_eq!(config.loader.train.batch_size, 4);
        assert_eq!(config.loader.train.prefetch_per_worker, 2);
        assert_eq!(config.loader.test.num_workers, 0);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.data.seed = Some(7);
        config.loader.val.shuffle = true;
        config.to_file(&path).unwrap();

        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_ratio() {
        let mut config = Config::default();
        config.data.train_val_split_ratio = 1.0;
        assert!(matches!(config.validate(), Err(Error::InvalidParameter(_))));
    }
}
