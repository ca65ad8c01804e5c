use crate::error::PushGraspError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`CerReplayBuffer`](super::CerReplayBuffer).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct CerReplayBufferConfig {
    /// Number of slots.
    pub capacity: usize,

    /// Always include the most recent transition in a batch.
    pub use_cer: bool,

    /// Exponent of the power-law draw over priority-ranked matches.
    pub alpha: f64,

    /// Reward of a push. A push transition with a different reward is its complement.
    pub push_reward: f32,

    /// Reward of a successful grasp. Any other grasp reward is its complement.
    pub grasp_reward: f32,

    /// Priority of a newly stored transition.
    pub initial_priority: f32,

    /// Random seed of the sampler.
    pub seed: u64,
}

impl Default for CerReplayBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 5000,
            use_cer: true,
            alpha: 2.0,
            push_reward: 0.5,
            grasp_reward: 1.0,
            initial_priority: 100_000.0,
            seed: 42,
        }
    }
}

impl CerReplayBufferConfig {
    /// Sets the number of slots.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Enables or disables combined experience replay.
    pub fn use_cer(mut self, use_cer: bool) -> Self {
        self.use_cer = use_cer;
        self
    }

    /// Sets the exponent of the priority draw.
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Sets the rewards of a push and a successful grasp.
    pub fn rewards(mut self, push_reward: f32, grasp_reward: f32) -> Self {
        self.push_reward = push_reward;
        self.grasp_reward = grasp_reward;
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub(super) fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(PushGraspError::InvalidConfig("capacity must be positive".into()).into());
        }
        if !(self.alpha > 0.0) {
            return Err(PushGraspError::InvalidConfig("alpha must be positive".into()).into());
        }
        Ok(())
    }

    /// Constructs [`CerReplayBufferConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`CerReplayBufferConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn yaml_round_trip() -> Result<()> {
        let config = CerReplayBufferConfig::default().capacity(64).seed(7);
        let dir = TempDir::new("replay_buffer_config")?;
        let path = dir.path().join("replay_buffer.yaml");
        config.save(&path)?;
        assert_eq!(CerReplayBufferConfig::load(&path)?, config);
        Ok(())
    }
}
