//! Configuration of the push-grasp agent.
use super::{EpsilonGreedy, ValueModelConfig};
use crate::Device;
use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Vpg`](super::Vpg) agent.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct VpgConfig {
    /// Value model.
    pub model_config: ValueModelConfig,

    /// Transitions sampled per optimization step.
    pub batch_size: usize,

    /// Discount factor of the bootstrapped target.
    pub discount_factor: f32,

    /// Exploration schedule.
    pub explorer: EpsilonGreedy,

    /// Device. Defaults to CPU.
    pub device: Option<Device>,

    /// Seed of the exploration random source.
    pub seed: u64,

    /// Starts in training mode if `true`.
    pub train: bool,
}

impl Default for VpgConfig {
    fn default() -> Self {
        Self {
            model_config: ValueModelConfig::default(),
            batch_size: 2,
            discount_factor: 0.5,
            explorer: EpsilonGreedy::default(),
            device: None,
            seed: 42,
            train: true,
        }
    }
}

impl VpgConfig {
    /// Sets the value model configuration.
    pub fn model_config(mut self, v: ValueModelConfig) -> Self {
        self.model_config = v;
        self
    }

    /// Sets batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the discount factor.
    pub fn discount_factor(mut self, v: f32) -> Self {
        self.discount_factor = v;
        self
    }

    /// Sets the exploration schedule.
    pub fn explorer(mut self, v: EpsilonGreedy) -> Self {
        self.explorer = v;
        self
    }

    /// Sets device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = Some(v);
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Loads [`VpgConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(&path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of VPG agent from {:?}", path.as_ref());
        Ok(b)
    }

    /// Saves [`VpgConfig`] to YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(&path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of VPG agent into {:?}", path.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn yaml_round_trip() -> Result<()> {
        let dir = TempDir::new("vpg_config")?;
        let path = dir.path().join("vpg.yaml");
        let config = VpgConfig::default()
            .batch_size(4)
            .device(Device::Cpu)
            .model_config(ValueModelConfig::default().num_rotations(8));
        config.save(&path)?;
        assert_eq!(VpgConfig::load(&path)?, config);
        Ok(())
    }
}
