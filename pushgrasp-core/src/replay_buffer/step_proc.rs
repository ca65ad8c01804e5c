use super::Transition;
use crate::{error::PushGraspError, Action, Env, State, StateRef, StateStore, Step, StepProcessor};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{marker::PhantomData, path::PathBuf};

/// Configuration of [`VpgStepProcessor`].
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct VpgStepProcessorConfig {
    /// Directory state snapshots are written to.
    pub state_dir: PathBuf,
}

impl Default for VpgStepProcessorConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("states"),
        }
    }
}

impl VpgStepProcessorConfig {
    /// Sets the snapshot directory.
    pub fn state_dir(mut self, v: impl Into<PathBuf>) -> Self {
        self.state_dir = v.into();
        self
    }
}

/// Persists observations and turns steps into [`Transition`]s.
///
/// Every observation is written once. The reference to the last one is kept as the
/// state of the next transition.
pub struct VpgStepProcessor<E> {
    store: StateStore,
    prev_state: Option<StateRef>,
    phantom: PhantomData<E>,
}

impl<E> VpgStepProcessor<E> {
    /// Number of states written so far.
    pub fn n_states(&self) -> usize {
        self.store.len()
    }
}

impl<E> StepProcessor<E> for VpgStepProcessor<E>
where
    E: Env<Obs = State, Act = Action>,
{
    type Config = VpgStepProcessorConfig;
    type Output = Transition;

    fn build(config: &Self::Config) -> Result<Self> {
        Ok(Self {
            store: StateStore::new(&config.state_dir)?,
            prev_state: None,
            phantom: PhantomData,
        })
    }

    fn reset(&mut self, init_obs: State) -> Result<()> {
        self.prev_state = Some(self.store.save(&init_obs)?);
        Ok(())
    }

    fn process(&mut self, step: Step<E>) -> Result<Transition> {
        let state = self
            .prev_state
            .take()
            .ok_or(PushGraspError::StepBeforeReset)?;
        let next_state = self.store.save(&step.obs)?;
        self.prev_state = Some(next_state.clone());

        Ok(Transition {
            state,
            act: step.act,
            next_state,
            reward: step.reward,
            is_done: step.is_terminated,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{dummy::DummyEnv, Primitive, Reward, STATE_CHANNELS};
    use ndarray::Array3;
    use tempdir::TempDir;

    fn state(v: f32) -> State {
        State::new(Array3::from_elem((3, 3, STATE_CHANNELS), v)).unwrap()
    }

    #[test]
    fn consecutive_transitions_share_states() -> Result<()> {
        let dir = TempDir::new("step_proc")?;
        let config = VpgStepProcessorConfig::default().state_dir(dir.path());
        let mut proc = VpgStepProcessor::<DummyEnv>::build(&config)?;
        let act = Action::new(Primitive::Push, 0, 0, 0);
        let reward = Reward::new(0.5, true, false);

        assert!(proc.process(Step::new(state(1.0), act, reward, false)).is_err());
        proc.reset(state(0.0))?;
        let t0 = proc.process(Step::new(state(1.0), act, reward, false))?;
        let t1 = proc.process(Step::new(state(2.0), act, reward, false))?;

        assert_eq!(t0.next_state, t1.state);
        assert_eq!(t0.state.load()?, state(0.0));
        assert_eq!(t1.next_state.load()?, state(2.0));
        assert_eq!(proc.n_states(), 3);
        Ok(())
    }
}
