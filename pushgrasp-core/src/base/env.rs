//! Environment.
use super::{Act, Obs, Step};
use crate::record::Record;
use anyhow::Result;

/// A manipulation environment.
///
/// Every method blocks on the collaborators behind the environment (camera,
/// manipulator, simulator). An `Err` from [`Env::step`] means the primitive could
/// not be executed or measured; callers are expected to re-perceive with
/// [`Env::observe`] rather than record a transition.
pub trait Env {
    /// Configurations.
    type Config: Clone;

    /// Observation of the environment.
    type Obs: Obs;

    /// Action of the environment.
    type Act: Act;

    /// Builds an environment with a given random seed.
    fn build(config: &Self::Config, seed: u64) -> Result<Self>
    where
        Self: Sized;

    /// Executes an action and measures its effect.
    fn step(&mut self, a: &Self::Act) -> Result<(Step<Self>, Record)>
    where
        Self: Sized;

    /// Starts a new episode and returns its first observation.
    fn reset(&mut self) -> Result<Self::Obs>;

    /// Perceives the current scene without acting on it.
    fn observe(&mut self) -> Result<Self::Obs>;
}
