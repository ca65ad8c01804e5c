//! Configuration of [`Trainer`](super::Trainer).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

/// Configuration of [`Trainer`](super::Trainer).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TrainerConfig {
    /// Number of training iterations.
    pub max_iter: usize,

    /// Where model snapshots are saved. Nothing is saved if `None`.
    pub model_dir: Option<PathBuf>,

    /// Where the grasp log is saved. Nothing is saved if `None`.
    pub record_path: Option<PathBuf>,

    /// Interval of flushing records in iterations.
    pub flush_record_interval: usize,

    /// Interval of saving model snapshots in iterations, in addition to the
    /// snapshots taken at every episode end.
    pub save_interval: usize,

    /// Consecutive failed steps after which the episode is reset.
    pub max_consecutive_failures: usize,

    /// Window of the grasp success rate reported at the end of training.
    pub success_rate_interval: usize,

    /// Random seed of the environment.
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_iter: 2500,
            model_dir: None,
            record_path: None,
            flush_record_interval: 1,
            save_interval: usize::MAX,
            max_consecutive_failures: 3,
            success_rate_interval: 200,
            seed: 1234,
        }
    }
}

impl TrainerConfig {
    /// Sets the number of training iterations.
    pub fn max_iter(mut self, v: usize) -> Self {
        self.max_iter = v;
        self
    }

    /// Sets the directory of model snapshots.
    pub fn model_dir(mut self, v: impl Into<PathBuf>) -> Self {
        self.model_dir = Some(v.into());
        self
    }

    /// Sets the path of the grasp log.
    pub fn record_path(mut self, v: impl Into<PathBuf>) -> Self {
        self.record_path = Some(v.into());
        self
    }

    /// Sets the interval of flushing records in iterations.
    pub fn flush_record_interval(mut self, v: usize) -> Self {
        self.flush_record_interval = v;
        self
    }

    /// Sets the interval of saving snapshots in iterations.
    pub fn save_interval(mut self, v: usize) -> Self {
        self.save_interval = v;
        self
    }

    /// Sets the number of consecutive failed steps tolerated within an episode.
    pub fn max_consecutive_failures(mut self, v: usize) -> Self {
        self.max_consecutive_failures = v;
        self
    }

    /// Sets the random seed of the environment.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Constructs [`TrainerConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`TrainerConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
