//! Train [`Agent`].
mod config;
use crate::{
    record::{AggregateRecorder, GraspLog, RecordValue},
    Action, Agent, Env, ExperienceBufferBase, ReplayBufferBase, StepProcessor,
};
use anyhow::Result;
use chrono::Local;
pub use config::TrainerConfig;
use log::{info, warn};
use std::path::PathBuf;

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Runs the perceive, act, measure and learn loop.
///
/// # Training loop
///
/// 1. Build the [`Env`], the [`StepProcessor`] and the replay buffer.
///    Reset the environment and save a first snapshot of the agent.
/// 2. Let the agent select an action for the current observation and execute it
///    with [`Env::step`].
///     * If the step fails, log it and re-perceive with [`Env::observe`].
///       After `max_consecutive_failures` failures in a row, or when
///       re-perception fails as well, the episode is reset instead. No
///       transition is stored. Training stops only when the reset keeps failing.
///     * If the episode ended, reset the environment, save a snapshot and go back
///       to 2. The final step of an episode is not stored.
/// 3. Write `(is_grasp, reward)` of the current iteration to the [`GraspLog`].
/// 4. Turn the step into a transition with the [`StepProcessor`], store it and run
///    one optimization step of the agent.
/// 5. `iter += 1`. Store the merged records of the environment and the agent,
///    flush them every `flush_record_interval` iterations and save a snapshot
///    every `save_interval` iterations.
/// 6. Back to 2 until `iter == max_iter`, then save a final snapshot and the
///    grasp log.
///
/// # Interaction of objects
///
/// ```mermaid
/// graph LR
///     A[Agent]-->|Action|B[Env]
///     B -->|State|A
///     B -->|"Step&lt;E: Env&gt;"|C[StepProcessor]
///     C -->|Transition|D[ReplayBuffer]
///     D -->|TransitionBatch|A
/// ```
pub struct Trainer<E, P, R>
where
    E: Env<Act = Action>,
    P: StepProcessor<E>,
    R: ExperienceBufferBase<Item = P::Output> + ReplayBufferBase,
{
    env_config: E::Config,
    step_proc_config: P::Config,
    replay_buffer_config: R::Config,
    model_dir: Option<PathBuf>,
    record_path: Option<PathBuf>,
    max_iter: usize,
    flush_record_interval: usize,
    save_interval: usize,
    max_consecutive_failures: usize,
    success_rate_interval: usize,
    seed: u64,
}

impl<E, P, R> Trainer<E, P, R>
where
    E: Env<Act = Action>,
    P: StepProcessor<E>,
    R: ExperienceBufferBase<Item = P::Output> + ReplayBufferBase,
{
    /// Constructs a trainer.
    pub fn build(
        config: TrainerConfig,
        env_config: E::Config,
        step_proc_config: P::Config,
        replay_buffer_config: R::Config,
    ) -> Self {
        Self {
            env_config,
            step_proc_config,
            replay_buffer_config,
            model_dir: config.model_dir,
            record_path: config.record_path,
            max_iter: config.max_iter,
            flush_record_interval: config.flush_record_interval.max(1),
            save_interval: config.save_interval.max(1),
            max_consecutive_failures: config.max_consecutive_failures.max(1),
            success_rate_interval: config.success_rate_interval.max(1),
            seed: config.seed,
        }
    }

    fn save_model<A: Agent<E, R>>(&self, agent: &A, iter: usize) {
        if let Some(model_dir) = &self.model_dir {
            let path = model_dir.join(format!("snapshot-{:06}", iter));
            match agent.save_params(&path) {
                Ok(()) => info!("Saved the model in {:?}", &path),
                Err(e) => warn!("Failed to save the model in {:?}: {:#}", &path, e),
            }
        }
    }

    /// Resets the environment, trying up to `max_consecutive_failures` times.
    fn reset_env(&self, env: &mut E) -> Result<E::Obs> {
        let mut attempt = 1;
        loop {
            match env.reset() {
                Ok(obs) => return Ok(obs),
                Err(e) if attempt < self.max_consecutive_failures => {
                    warn!(
                        "Reset failed ({}/{}): {:#}",
                        attempt, self.max_consecutive_failures, e
                    );
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e.context(format!("reset failed {} times in a row", attempt)))
                }
            }
        }
    }

    /// Gets a fresh observation after a failed step.
    fn recover(&self, env: &mut E, failures: &mut usize) -> Result<E::Obs> {
        if *failures < self.max_consecutive_failures {
            match env.observe() {
                Ok(obs) => return Ok(obs),
                Err(e) => {
                    *failures += 1;
                    warn!(
                        "Re-perception failed ({}/{}), resetting: {:#}",
                        failures, self.max_consecutive_failures, e
                    );
                }
            }
        }
        *failures = 0;
        self.reset_env(env)
    }

    fn save_log(&self, log: &GraspLog) -> Result<()> {
        if let Some(path) = &self.record_path {
            log.save(path)?;
        }
        Ok(())
    }

    /// Train the agent and return the grasp log of the run.
    pub fn train<A>(&mut self, agent: &mut A, recorder: &mut dyn AggregateRecorder) -> Result<GraspLog>
    where
        A: Agent<E, R>,
    {
        let mut env = E::build(&self.env_config, self.seed)?;
        let mut step_proc = P::build(&self.step_proc_config)?;
        let mut buffer = R::build(&self.replay_buffer_config)?;
        let mut log = GraspLog::new(self.max_iter);
        let mut iter = 0;
        let mut episode = 0;
        let mut failures = 0;

        let mut obs = self.reset_env(&mut env)?;
        step_proc.reset(obs.clone())?;
        agent.train();
        self.save_model(agent, iter);

        while iter < self.max_iter {
            let act = agent.sample(&obs)?;
            let (step, mut record) = match env.step(&act) {
                Ok(step) => {
                    failures = 0;
                    step
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        "Iteration {}: {} failed ({}/{}): {:#}",
                        iter, act.primitive, failures, self.max_consecutive_failures, e
                    );
                    obs = self.recover(&mut env, &mut failures)?;
                    step_proc.reset(obs.clone())?;
                    continue;
                }
            };

            if step.is_done() {
                episode += 1;
                info!("Episode {} finished at iteration {}", episode, iter);
                obs = self.reset_env(&mut env)?;
                step_proc.reset(obs.clone())?;
                self.save_model(agent, iter);
                self.save_log(&log)?;
                continue;
            }

            log.set(iter, act.primitive.is_grasp(), step.reward.value)?;
            obs = step.obs.clone();
            let transition = step_proc.process(step)?;
            buffer.push(transition)?;
            let record_agent = agent.opt_with_record(&mut buffer)?;
            iter += 1;

            record.merge_inplace(record_agent);
            record.insert("iter", RecordValue::Scalar(iter as f32));
            record.insert("episode", RecordValue::Scalar(episode as f32));
            record.insert("datetime", RecordValue::DateTime(Local::now()));
            recorder.store(record);

            if iter % self.flush_record_interval == 0 {
                recorder.flush(iter as i64);
            }
            if iter % self.save_interval == 0 {
                self.save_model(agent, iter);
            }
        }

        self.save_model(agent, iter);
        self.save_log(&log)?;
        if let Some(rate) = log
            .grasp_success_rate(self.success_rate_interval, 1.0)
            .last()
        {
            info!("Grasp success rate over the last iterations: {:.3}", rate);
        }
        Ok(log)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        dummy::{DummyAgent, DummyEnv, DummyEnvConfig},
        record::BufferedRecorder,
        replay_buffer::{CerReplayBuffer, CerReplayBufferConfig, VpgStepProcessor, VpgStepProcessorConfig},
    };
    use tempdir::TempDir;

    type TestTrainer = Trainer<DummyEnv, VpgStepProcessor<DummyEnv>, CerReplayBuffer>;

    fn trainer(dir: &TempDir, max_iter: usize, env_config: DummyEnvConfig) -> TestTrainer {
        let config = TrainerConfig::default()
            .max_iter(max_iter)
            .model_dir(dir.path().join("model"))
            .record_path(dir.path().join("records.txt"));
        let step_proc_config = VpgStepProcessorConfig::default().state_dir(dir.path().join("states"));
        Trainer::build(
            config,
            env_config,
            step_proc_config,
            CerReplayBufferConfig::default().capacity(16),
        )
    }

    #[test]
    fn episode_end_steps_are_not_stored() -> Result<()> {
        let dir = TempDir::new("trainer")?;
        let mut trainer = trainer(&dir, 6, DummyEnvConfig::default().episode_len(3));
        let mut agent = DummyAgent::default();
        let mut recorder = BufferedRecorder::new();
        let log = trainer.train(&mut agent, &mut recorder)?;

        // every third step ends an episode and is skipped
        assert_eq!(agent.n_opts, 6);
        assert_eq!(agent.n_samples, 8);
        assert_eq!(recorder.flushed().len(), 6);
        for i in 0..6 {
            assert_ne!(log.row(i).unwrap()[0], GraspLog::UNFILLED);
        }
        assert!(dir.path().join("records.txt").exists());
        assert!(dir.path().join("model/snapshot-000000").exists());
        assert!(dir.path().join("model/snapshot-000006").exists());
        Ok(())
    }

    #[test]
    fn failed_steps_produce_no_transition() -> Result<()> {
        let dir = TempDir::new("trainer")?;
        let env_config = DummyEnvConfig::default().episode_len(100).fail_at(vec![1, 2]);
        let mut trainer = trainer(&dir, 3, env_config);
        let mut agent = DummyAgent::default();
        let log = trainer.train(&mut agent, &mut BufferedRecorder::new())?;

        assert_eq!(agent.n_opts, 3);
        assert_eq!(agent.n_samples, 5);
        assert_eq!(agent.max_buffer_len, 3);
        assert_eq!(log.len(), 3);
        Ok(())
    }

    #[test]
    fn failed_reperception_falls_back_to_reset() -> Result<()> {
        let dir = TempDir::new("trainer")?;
        // step 1 fails, the following observe fails and the first reset after it fails too
        let env_config = DummyEnvConfig::default()
            .episode_len(100)
            .fail_at(vec![1])
            .observe_fail_at(vec![0])
            .reset_fail_at(vec![1]);
        let mut trainer = trainer(&dir, 4, env_config);
        let mut agent = DummyAgent::default();
        let log = trainer.train(&mut agent, &mut BufferedRecorder::new())?;

        assert_eq!(agent.n_opts, 4);
        assert_eq!(agent.n_samples, 5);
        assert_eq!(agent.max_buffer_len, 4);
        for i in 0..4 {
            assert_ne!(log.row(i).unwrap()[0], GraspLog::UNFILLED);
        }
        Ok(())
    }

    #[test]
    fn training_stops_when_reset_keeps_failing() -> Result<()> {
        let dir = TempDir::new("trainer")?;
        let env_config = DummyEnvConfig::default()
            .episode_len(100)
            .fail_at(vec![0])
            .observe_fail_at(vec![0])
            .reset_fail_at(vec![1, 2]);
        let config = TrainerConfig::default()
            .max_iter(4)
            .max_consecutive_failures(2);
        let mut trainer: TestTrainer = Trainer::build(
            config,
            env_config,
            VpgStepProcessorConfig::default().state_dir(dir.path().join("states")),
            CerReplayBufferConfig::default().capacity(16),
        );
        let mut agent = DummyAgent::default();

        assert!(trainer.train(&mut agent, &mut BufferedRecorder::new()).is_err());
        assert_eq!(agent.n_opts, 0);
        Ok(())
    }
}
