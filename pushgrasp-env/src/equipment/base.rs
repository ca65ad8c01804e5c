use super::sim::{SimConfig, Tabletop};
use crate::WorkspaceBounds;
use anyhow::Result;
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

/// Handle of an object in the [`World`].
pub type ObjectId = usize;

/// One RGB-D capture.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// `(h, w, 3)` color image.
    pub color: Array3<u8>,

    /// `(h, w)` depth image in meters along the optical axis.
    pub depth: Array2<f32>,
}

/// RGB-D camera.
pub trait Camera {
    /// Captures a frame. Blocks until the frame is available.
    fn capture(&mut self) -> Result<Frame>;

    /// Pinhole intrinsics.
    fn intrinsics(&self) -> [[f64; 3]; 3];

    /// Camera pose in robot coordinates.
    fn extrinsics(&self) -> [[f64; 4]; 4];
}

/// Arm with a parallel-jaw gripper.
pub trait Manipulator {
    /// Moves the tool linearly to `pos` with the gripper turned by `yaw` radians.
    fn move_to(&mut self, pos: [f64; 3], yaw: f64) -> Result<()>;

    /// Opens the gripper.
    fn open(&mut self) -> Result<()>;

    /// Closes the gripper. Returns `true` if the fingers closed fully, that is,
    /// nothing is held between them.
    fn close(&mut self) -> Result<bool>;

    /// Offset from the flange to the fingertips.
    fn tcp(&self) -> [f64; 3];
}

/// Objects in the workspace.
pub trait World {
    /// Removes every object and brings the scene to its initial state.
    fn reset(&mut self) -> Result<()>;

    /// Drops a new set of objects into the workspace.
    fn add_objects(&mut self) -> Result<()>;

    /// Center of every object.
    fn object_positions(&self) -> Result<Vec<(ObjectId, [f64; 3])>>;

    /// Takes an object out of the scene.
    fn remove(&mut self, id: ObjectId) -> Result<()>;
}

/// Built collaborators.
pub struct Equipment {
    /// Camera.
    pub camera: Box<dyn Camera>,

    /// Arm and gripper.
    pub manipulator: Box<dyn Manipulator>,

    /// Objects.
    pub world: Box<dyn World>,
}

/// Selects and configures the collaborators.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum EquipmentConfig {
    /// Kinematic tabletop simulator.
    Sim(SimConfig),
}

impl Default for EquipmentConfig {
    fn default() -> Self {
        Self::Sim(SimConfig::default())
    }
}

impl EquipmentConfig {
    /// Builds the collaborators for `workspace`.
    pub fn build(&self, workspace: &WorkspaceBounds, seed: u64) -> Result<Equipment> {
        match self {
            Self::Sim(config) => Ok(Tabletop::new(config.clone(), *workspace, seed)?.equipment()),
        }
    }
}
