//! Core functionalities.
mod action;
mod agent;
mod env;
mod policy;
mod replay_buffer;
mod step;
pub use action::{Action, Primitive};
pub use agent::Agent;
pub use env::Env;
pub use policy::{Configurable, Policy};
pub use replay_buffer::{ExperienceBufferBase, ReplayBufferBase};
use std::fmt::Debug;
pub use step::{Reward, Step, StepProcessor};

/// An observation of an environment.
pub trait Obs: Clone + Debug {}

/// An action of an environment.
pub trait Act: Clone + Debug {}
