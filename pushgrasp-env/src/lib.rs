//! Perception, collaborators and the manipulation state machine of push-grasp learning.
//!
//! * [`HeightmapProjector`] turns RGB-D frames into top-down heightmaps.
//! * [`Camera`], [`Manipulator`] and [`World`] abstract the hardware or the simulator,
//!   and [`EquipmentConfig`] builds them from configuration.
//! * [`VpgEnv`] executes push and grasp primitives, measures their effect and
//!   implements [`pushgrasp_core::Env`].
//!
//! ```no_run
//! use anyhow::Result;
//! use pushgrasp_core::{Action, Env, Primitive};
//! use pushgrasp_env::{VpgEnv, VpgEnvConfig};
//!
//! fn main() -> Result<()> {
//!     let mut env = VpgEnv::build(&VpgEnvConfig::default(), 42)?;
//!     let state = env.reset()?;
//!     let (rows, cols) = state.grid();
//!     let (step, _record) = env.step(&Action::new(Primitive::Grasp, 0, rows / 2, cols / 2))?;
//!     println!("reward {:?}, done {}", step.reward, step.is_done());
//!     Ok(())
//! }
//! ```
mod config;
mod env;
mod equipment;
mod error;
mod heightmap;
pub use config::{VpgEnvConfig, WorkspaceBounds};
pub use env::{Phase, VpgEnv};
pub use equipment::{
    Camera, Equipment, EquipmentConfig, Frame, Manipulator, ObjectId, SimConfig, Tabletop, World,
};
pub use error::EnvError;
pub use heightmap::HeightmapProjector;
