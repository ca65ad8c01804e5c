//! Learning push and grasp synergies from top-down heightmaps.
//!
//! The system consists of the following crates:
//!
//! * Core and utility
//!   * [`pushgrasp_core`] provides the capability traits,
//!     the domain vocabulary (primitives, actions, rewards and states), the experience
//!     replay and the training loop. It does not depend on any neural network backend.
//!   * [`pushgrasp_tensorboard`] has
//!     `TensorboardRecorder` to write records which can be shown in Tensorboard.
//!     It is based on [tensorboard-rs](https://crates.io/crates/tensorboard-rs).
//! * Environment
//!   * [`pushgrasp_env`] projects RGB-D frames into heightmaps,
//!     abstracts the camera, the arm and the scene, and drives the push and grasp
//!     primitives. It ships a kinematic tabletop simulator.
//! * Agent
//!   * [`pushgrasp_candle_agent`] includes the pixel-wise
//!     value model and the VPG agent based on [candle](https://crates.io/crates/candle-core).
//!
//! `demos/train_sim.rs` trains an agent in the simulator end to end.
pub use pushgrasp_candle_agent;
pub use pushgrasp_core;
pub use pushgrasp_env;
pub use pushgrasp_tensorboard;
