//! Visual push-grasp agent.
//!
//! [`ValueModel`] predicts a push and a grasp value for every heightmap cell at every
//! gripper rotation. [`Vpg`] picks actions from these maps with [`EpsilonGreedy`]
//! and regresses the value of the executed action toward a one-step bootstrapped
//! target.
mod base;
mod config;
mod explorer;
mod model;
mod rotation;
pub use base::Vpg;
pub use config::VpgConfig;
pub use explorer::{EpsilonGreedy, ValueMaps};
pub use model::{Rotations, ValueModel, ValueModelConfig};
pub use rotation::{rotate, rotation_indices};
