//! Scripted environment and agent used in tests.
use crate::{
    record::Record,
    replay_buffer::CerReplayBuffer,
    Action, Agent, Env, ExperienceBufferBase, Policy, Primitive, ReplayBufferBase, Reward, State,
    Step, STATE_CHANNELS,
};
use anyhow::{anyhow, Result};
use ndarray::Array3;
use std::path::Path;

#[derive(Clone, Debug)]
pub struct DummyEnvConfig {
    pub grid: usize,
    pub episode_len: usize,
    pub fail_at: Vec<usize>,
    pub observe_fail_at: Vec<usize>,
    pub reset_fail_at: Vec<usize>,
}

impl Default for DummyEnvConfig {
    fn default() -> Self {
        Self {
            grid: 4,
            episode_len: 10,
            fail_at: vec![],
            observe_fail_at: vec![],
            reset_fail_at: vec![],
        }
    }
}

impl DummyEnvConfig {
    pub fn episode_len(mut self, v: usize) -> Self {
        self.episode_len = v;
        self
    }

    /// Calls of `step` that fail.
    pub fn fail_at(mut self, v: Vec<usize>) -> Self {
        self.fail_at = v;
        self
    }

    /// Calls of `observe` that fail.
    pub fn observe_fail_at(mut self, v: Vec<usize>) -> Self {
        self.observe_fail_at = v;
        self
    }

    /// Calls of `reset` that fail.
    pub fn reset_fail_at(mut self, v: Vec<usize>) -> Self {
        self.reset_fail_at = v;
        self
    }
}

/// Every successful step fills the state with the number of steps so far.
pub struct DummyEnv {
    config: DummyEnvConfig,
    n_calls: usize,
    n_steps: usize,
    n_observes: usize,
    n_resets: usize,
}

impl DummyEnv {
    fn state(&self) -> State {
        let g = self.config.grid;
        State::new(Array3::from_elem((g, g, STATE_CHANNELS), self.n_steps as f32)).unwrap()
    }
}

impl Env for DummyEnv {
    type Config = DummyEnvConfig;
    type Obs = State;
    type Act = Action;

    fn build(config: &Self::Config, _seed: u64) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            n_calls: 0,
            n_steps: 0,
            n_observes: 0,
            n_resets: 0,
        })
    }

    fn step(&mut self, a: &Action) -> Result<(Step<Self>, Record)> {
        let call = self.n_calls;
        self.n_calls += 1;
        if self.config.fail_at.contains(&call) {
            return Err(anyhow!("scripted failure at call {}", call));
        }
        self.n_steps += 1;
        let reward = match a.primitive {
            Primitive::Push => Reward::new(0.5, true, false),
            Primitive::Grasp => Reward::new(1.0, true, true),
        };
        let done = self.n_steps % self.config.episode_len == 0;
        Ok((Step::new(self.state(), *a, reward, done), Record::empty()))
    }

    fn reset(&mut self) -> Result<State> {
        let call = self.n_resets;
        self.n_resets += 1;
        if self.config.reset_fail_at.contains(&call) {
            return Err(anyhow!("scripted reset failure at call {}", call));
        }
        Ok(self.state())
    }

    fn observe(&mut self) -> Result<State> {
        let call = self.n_observes;
        self.n_observes += 1;
        if self.config.observe_fail_at.contains(&call) {
            return Err(anyhow!("camera timeout"));
        }
        Ok(self.state())
    }
}

#[derive(Default)]
pub struct DummyAgent {
    pub n_samples: usize,
    pub n_opts: usize,
    pub max_buffer_len: usize,
    train: bool,
}

impl Policy<DummyEnv> for DummyAgent {
    fn sample(&mut self, _obs: &State) -> Result<Action> {
        self.n_samples += 1;
        let primitive = if self.n_samples % 2 == 0 {
            Primitive::Grasp
        } else {
            Primitive::Push
        };
        Ok(Action::new(primitive, 0, 1, 1))
    }
}

impl Agent<DummyEnv, CerReplayBuffer> for DummyAgent {
    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
    }

    fn is_train(&self) -> bool {
        self.train
    }

    fn opt_with_record(&mut self, buffer: &mut CerReplayBuffer) -> Result<Record> {
        let batch = buffer.batch(2)?;
        for tr in batch.iter() {
            tr.state.load()?;
            tr.next_state.load()?;
        }
        self.n_opts += 1;
        self.max_buffer_len = self.max_buffer_len.max(buffer.len());
        Ok(Record::from_scalar("loss", self.n_opts as f32))
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    fn load_params(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }
}
