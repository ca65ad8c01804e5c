//! Environment step.
use super::Env;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Outcome of a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Reward {
    /// Scalar reward.
    pub value: f32,

    /// If the scene changed enough to be informative.
    pub changed: bool,

    /// If the primitive was a grasp that held an object.
    pub grasp_success: bool,
}

impl Reward {
    /// Constructs a reward.
    pub fn new(value: f32, changed: bool, grasp_success: bool) -> Self {
        Self {
            value,
            changed,
            grasp_success,
        }
    }
}

/// Action, next observation and reward `(a_t, o_t+1, r_t)` emitted by [`Env::step`].
pub struct Step<E: Env> {
    /// Action.
    pub act: E::Act,

    /// Observation after the action.
    pub obs: E::Obs,

    /// Reward.
    pub reward: Reward,

    /// If the episode ended with this step.
    pub is_terminated: bool,
}

impl<E: Env> Step<E> {
    /// Constructs a [`Step`] object.
    pub fn new(obs: E::Obs, act: E::Act, reward: Reward, is_terminated: bool) -> Self {
        Step {
            act,
            obs,
            reward,
            is_terminated,
        }
    }

    #[inline]
    /// If the episode ended.
    pub fn is_done(&self) -> bool {
        self.is_terminated
    }
}

/// Turns [`Step`] into an item [`Self::Output`] pushed into a replay buffer.
///
/// The processor keeps the observation `o_t` preceding the step, so the output is
/// typically a transition `(o_t, a_t, o_t+1, r_t)`.
///
/// [`Self::Output`]: StepProcessor::Output
pub trait StepProcessor<E: Env> {
    /// Configuration.
    type Config: Clone;

    /// The type of transitions produced by this trait.
    type Output;

    /// Build a processor.
    fn build(config: &Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// Sets the observation an episode starts from.
    fn reset(&mut self, init_obs: E::Obs) -> Result<()>;

    /// Processes a [`Step`] object.
    fn process(&mut self, step: Step<E>) -> Result<Self::Output>;
}
