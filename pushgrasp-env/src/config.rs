//! Configuration of [`VpgEnv`](crate::VpgEnv).
use crate::{EnvError, EquipmentConfig};
use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Axis-aligned workspace in robot coordinates, `[lo, hi]` per axis in meters.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct WorkspaceBounds {
    /// Range along x.
    pub x: [f64; 2],

    /// Range along y.
    pub y: [f64; 2],

    /// Range along z. `z[0]` is the floor of the heightmap.
    pub z: [f64; 2],
}

impl Default for WorkspaceBounds {
    fn default() -> Self {
        Self {
            x: [-0.724, -0.224],
            y: [-0.276, 0.224],
            z: [-0.0001, 0.4],
        }
    }
}

impl WorkspaceBounds {
    /// Checks that every axis has a positive extent.
    pub fn validate(&self) -> Result<(), EnvError> {
        for (name, [lo, hi]) in [("x", self.x), ("y", self.y), ("z", self.z)] {
            if !(lo.is_finite() && hi.is_finite() && hi > lo) {
                return Err(EnvError::InvalidWorkspace(format!(
                    "{} range [{}, {}] is empty",
                    name, lo, hi
                )));
            }
        }
        Ok(())
    }

    /// `(rows, cols)` of the heightmap at `resolution`.
    ///
    /// Rows follow y and columns follow x. A tolerance of `1e-6` cells keeps
    /// extents that are multiples of the resolution from gaining a cell.
    pub fn grid_shape(&self, resolution: f64) -> (usize, usize) {
        let cells = |[lo, hi]: [f64; 2]| ((hi - lo) / resolution - 1e-6).ceil() as usize;
        (cells(self.y), cells(self.x))
    }

    /// Center of the xy range.
    pub fn center(&self) -> [f64; 2] {
        [(self.x[0] + self.x[1]) / 2.0, (self.y[0] + self.y[1]) / 2.0]
    }

    /// Clamps a point to the xy range.
    pub fn clamp_xy(&self, p: [f64; 2]) -> [f64; 2] {
        [p[0].clamp(self.x[0], self.x[1]), p[1].clamp(self.y[0], self.y[1])]
    }
}

/// Configuration of [`VpgEnv`](crate::VpgEnv).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct VpgEnvConfig {
    /// Workspace bounds.
    pub workspace: WorkspaceBounds,

    /// Side of a heightmap cell in meters.
    pub resolution: f64,

    /// Number of gripper rotations.
    pub num_rotations: usize,

    /// Reward of a successful grasp.
    pub grasp_reward: f32,

    /// Reward of an executed push.
    pub push_reward: f32,

    /// Height of the grasp approach pose above the target.
    pub grasp_loc_margin: f64,

    /// Height of the push approach pose above the target.
    pub push_margin: f64,

    /// Length of a push.
    pub push_length: f64,

    /// The gripper descends this far below the surface at the grasp point.
    pub grasp_depth_offset: f64,

    /// Lowest grasp height above the workspace floor.
    pub floor_clearance: f64,

    /// Number of changed cells above which the scene counts as changed.
    pub pixel_thresh: usize,

    /// Absolute depth differences within this open band count as changed cells.
    pub depth_thresh: [f32; 2],

    /// The episode ends once the sum of the no-change counters exceeds this.
    pub no_change_thresh: usize,

    /// The episode ends once fewer cells than this are occupied.
    pub empty_threshold: usize,

    /// Attempts to capture a frame before perception fails.
    pub capture_retries: usize,

    /// Collaborators.
    pub equipment: EquipmentConfig,
}

impl Default for VpgEnvConfig {
    fn default() -> Self {
        Self {
            workspace: WorkspaceBounds::default(),
            resolution: 0.002,
            num_rotations: 16,
            grasp_reward: 1.0,
            push_reward: 0.5,
            grasp_loc_margin: 0.15,
            push_margin: 0.1,
            push_length: 0.1,
            grasp_depth_offset: 0.04,
            floor_clearance: 0.02,
            pixel_thresh: 300,
            depth_thresh: [0.01, 0.3],
            no_change_thresh: 10,
            empty_threshold: 300,
            capture_retries: 3,
            equipment: EquipmentConfig::default(),
        }
    }
}

impl VpgEnvConfig {
    /// Sets the workspace bounds.
    pub fn workspace(mut self, v: WorkspaceBounds) -> Self {
        self.workspace = v;
        self
    }

    /// Sets the heightmap resolution.
    pub fn resolution(mut self, v: f64) -> Self {
        self.resolution = v;
        self
    }

    /// Sets the number of rotations.
    pub fn num_rotations(mut self, v: usize) -> Self {
        self.num_rotations = v;
        self
    }

    /// Sets the thresholds on changed and occupied cells.
    pub fn cell_thresholds(mut self, pixel_thresh: usize, empty_threshold: usize) -> Self {
        self.pixel_thresh = pixel_thresh;
        self.empty_threshold = empty_threshold;
        self
    }

    /// Sets the stagnation threshold.
    pub fn no_change_thresh(mut self, v: usize) -> Self {
        self.no_change_thresh = v;
        self
    }

    /// Sets the collaborators.
    pub fn equipment(mut self, v: EquipmentConfig) -> Self {
        self.equipment = v;
        self
    }

    /// Checks values that would break the state machine.
    pub fn validate(&self) -> Result<(), EnvError> {
        self.workspace.validate()?;
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(EnvError::InvalidWorkspace(format!(
                "resolution {} is not positive",
                self.resolution
            )));
        }
        if self.num_rotations == 0 {
            return Err(EnvError::InvalidWorkspace("no rotation".into()));
        }
        Ok(())
    }

    /// Constructs [`VpgEnvConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(&path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of VpgEnv from {:?}", path.as_ref());
        Ok(b)
    }

    /// Saves [`VpgEnvConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(&path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of VpgEnv into {:?}", path.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn default_grid_is_250_square() {
        assert_eq!(WorkspaceBounds::default().grid_shape(0.002), (250, 250));
        assert_eq!(WorkspaceBounds::default().grid_shape(0.003), (167, 167));
    }

    #[test]
    fn empty_ranges_are_rejected() {
        let mut ws = WorkspaceBounds::default();
        ws.z = [0.1, 0.1];
        assert!(ws.validate().is_err());
        assert!(VpgEnvConfig::default().resolution(0.0).validate().is_err());
        assert!(VpgEnvConfig::default().validate().is_ok());
    }

    #[test]
    fn yaml_round_trip() -> Result<()> {
        let dir = TempDir::new("env_config")?;
        let path = dir.path().join("env.yaml");
        let config = VpgEnvConfig::default().resolution(0.004).no_change_thresh(5);
        config.save(&path)?;
        assert_eq!(VpgEnvConfig::load(&path)?, config);
        Ok(())
    }
}
