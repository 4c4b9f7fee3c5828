//! Class splits, label splits and query/support index splits

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::pool::{Stage, StagePool};
use crate::error::{Error, Result};
use crate::graph::Label;

/// Base/novel partition of class names, as stored in the split file:
/// `{"base": [...], "novel": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassesSplit {
    /// Classes used for meta-training
    pub base: Vec<String>,
    /// Classes held out for meta-testing
    pub novel: Vec<String>,
}

impl ClassesSplit {
    /// Create a split from class names
    pub fn new(base: Vec<String>, novel: Vec<String>) -> Self {
        Self { base, novel }
    }

    /// Load a split file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load the split from `path`, failing if none was configured.
    ///
    /// Deriving a split automatically is not supported.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Err(Error::Configuration(
                "no classes split provided and automatic split generation is not supported".into(),
            )),
        }
    }

    /// Write the split as pretty JSON
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Base/novel partition of global labels. Both lists are sorted and disjoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelsSplit {
    base: Vec<Label>,
    novel: Vec<Label>,
}

impl LabelsSplit {
    /// Build a split from label lists, rejecting overlap.
    pub fn new(base: impl IntoIterator<Item = Label>, novel: impl IntoIterator<Item = Label>) -> Result<Self> {
        let base: BTreeSet<Label> = base.into_iter().collect();
        let novel: BTreeSet<Label> = novel.into_iter().collect();

        let overlap: Vec<Label> = base.intersection(&novel).copied().collect();
        if !overlap.is_empty() {
            return Err(Error::Configuration(format!(
                "labels {:?} are both base and novel",
                overlap
            )));
        }

        Ok(Self {
            base: base.into_iter().collect(),
            novel: novel.into_iter().collect(),
        })
    }

    /// Translate class names to labels through the dataset's class dictionary.
    pub fn from_classes(split: &ClassesSplit, class_to_label: &BTreeMap<String, Label>) -> Result<Self> {
        let lookup = |classes: &[String]| -> Result<Vec<Label>> {
            classes
                .iter()
                .map(|class| {
                    class_to_label.get(class).copied().ok_or_else(|| {
                        Error::Configuration(format!("class '{}' is not in the dataset", class))
                    })
                })
                .collect()
        };

        Self::new(lookup(&split.base)?, lookup(&split.novel)?)
    }

    /// Sorted base labels
    pub fn base(&self) -> &[Label] {
        &self.base
    }

    /// Sorted novel labels
    pub fn novel(&self) -> &[Label] {
        &self.novel
    }

    /// Labels of a stage
    pub fn labels(&self, stage: Stage) -> &[Label] {
        match stage {
            Stage::Base => &self.base,
            Stage::Novel => &self.novel,
        }
    }

    /// Stage a label belongs to, if any
    pub fn stage_of(&self, label: Label) -> Option<Stage> {
        if self.base.binary_search(&label).is_ok() {
            Some(Stage::Base)
        } else if self.novel.binary_search(&label).is_ok() {
            Some(Stage::Novel)
        } else {
            None
        }
    }
}

/// Disjoint support and query index sets over a stage's flattened samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySupportSplit {
    /// Indices of support candidates
    pub support_idxs: Vec<usize>,
    /// Indices of query candidates
    pub query_idxs: Vec<usize>,
}

impl QuerySupportSplit {
    /// Load an externally produced split
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the split as JSON
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    /// Split every class of `pool` independently: after a shuffle,
    /// `ceil(support_ratio * class_size)` graphs become support candidates
    /// and the rest query candidates.
    pub fn per_class<R: Rng + ?Sized>(pool: &StagePool, support_ratio: f64, rng: &mut R) -> Result<Self> {
        if !(support_ratio > 0.0 && support_ratio <= 1.0) {
            return Err(Error::InvalidParameter(format!(
                "support_ratio must be in (0, 1], got {}",
                support_ratio
            )));
        }

        let mut support_idxs = Vec::new();
        let mut query_idxs = Vec::new();
        let mut offset = 0;

        for (_, size) in pool.class_sizes() {
            let mut idxs: Vec<usize> = (offset..offset + size).collect();
            idxs.shuffle(rng);

            let num_supports = ((support_ratio * size as f64).ceil() as usize).min(size);
            support_idxs.extend_from_slice(&idxs[..num_supports]);
            query_idxs.extend_from_slice(&idxs[num_supports..]);

            offset += size;
        }

        Ok(Self {
            support_idxs,
            query_idxs,
        })
    }

    /// Check that every index is below `num_samples` and that no index is
    /// both a support and a query candidate.
    pub fn validate(&self, num_samples: usize) -> Result<()> {
        if let Some(idx) = self
            .support_idxs
            .iter()
            .chain(&self.query_idxs)
            .find(|&&idx| idx >= num_samples)
        {
            return Err(Error::Configuration(format!(
                "query/support index {} out of range for {} samples",
                idx, num_samples
            )));
        }

        let supports: HashSet<usize> = self.support_idxs.iter().copied().collect();
        if let Some(idx) = self.query_idxs.iter().find(|idx| supports.contains(idx)) {
            return Err(Error::Configuration(format!(
                "index {} is both a support and a query candidate",
                idx
            )));
        }

        Ok(())
    }
}

/// Shuffle `samples` and split them into train and validation parts,
/// keeping `ceil(train_ratio * len)` samples for training.
pub fn split_train_val<T: Clone, R: Rng + ?Sized>(
    samples: &[T],
    train_ratio: f64,
    rng: &mut R,
) -> Result<(Vec<T>, Vec<T>)> {
    if !(train_ratio > 0.0 && train_ratio <= 1.0) {
        return Err(Error::InvalidParameter(format!(
            "train_val_split_ratio must be in (0, 1], got {}",
            train_ratio
        )));
    }

    let mut idxs: Vec<usize> = (0..samples.len()).collect();
    idxs.shuffle(rng);

    let train_upperbound = ((train_ratio * samples.len() as f64).ceil() as usize).min(samples.len());
    let train = idxs[..train_upperbound].iter().map(|&i| samples[i].clone()).collect();
    let val = idxs[train_upperbound..].iter().map(|&i| samples[i].clone()).collect();

    Ok((train, val))
}
