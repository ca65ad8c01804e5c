//! Visual push-grasp agent implemented with candle.
use super::{config::VpgConfig, EpsilonGreedy, Rotations, ValueMaps, ValueModel};
use crate::util::{smooth_l1_loss, state_to_tensor, tensor_to_array3};
use anyhow::Result;
use candle_core::{IndexOp, Tensor};
use log::{debug, trace};
use pushgrasp_core::{
    record::{Record, RecordValue},
    replay_buffer::{Transition, TransitionBatch},
    Action, Agent, Configurable, Env, Policy, Primitive, ReplayBufferBase, Reward, State,
};
use rand::{rngs::StdRng, SeedableRng};
use std::{fs, marker::PhantomData, path::Path};

const MODEL_FILE: &str = "value_model.safetensors";

/// Bootstrapped target of a transition.
///
/// The reward counts only if the scene changed. The next-state value counts only if
/// the scene changed or a grasp held an object, and never after the episode ended.
pub fn td_target(reward: &Reward, is_done: bool, discount_factor: f32, max_next_q: f32) -> f32 {
    let r = if reward.changed { reward.value } else { 0.0 };
    if (reward.changed || reward.grasp_success) && !is_done {
        r + discount_factor * max_next_q
    } else {
        r
    }
}

/// Rotations regressed for an action, in the order they are processed.
///
/// A grasp is symmetric under a half turn of the gripper, so its antipodal rotation
/// is regressed too, before the executed one.
pub fn learn_rotations(act: &Action, num_rotations: usize) -> Vec<usize> {
    match act.primitive {
        Primitive::Grasp => vec![act.antipodal_rotation(num_rotations), act.rotation],
        Primitive::Push => vec![act.rotation],
    }
}

/// Visual push-grasp agent.
///
/// Actions come from [`EpsilonGreedy`] over the value maps of all rotations.
/// Each optimization step regresses the value of every sampled transition toward
/// [`td_target`] with a smooth L1 loss and one optimizer step per transition.
pub struct Vpg<E, R> {
    model: ValueModel,
    batch_size: usize,
    discount_factor: f32,
    explorer: EpsilonGreedy,
    train: bool,
    n_opts: usize,
    rng: StdRng,
    phantom: PhantomData<(E, R)>,
}

impl<E, R> Vpg<E, R>
where
    E: Env<Obs = State, Act = Action>,
    R: ReplayBufferBase<Batch = TransitionBatch>,
{
    /// Value model of the agent.
    pub fn model(&self) -> &ValueModel {
        &self.model
    }

    /// Number of optimization steps so far.
    pub fn n_opts(&self) -> usize {
        self.n_opts
    }

    /// Exploration rate used for the next action.
    pub fn epsilon(&self) -> f64 {
        if self.train {
            self.explorer.epsilon(self.n_opts)
        } else {
            0.0
        }
    }

    /// Push and grasp value maps of a state at every rotation.
    pub fn value_maps(&self, state: &State) -> Result<ValueMaps> {
        let x = state_to_tensor(state, self.model.device())?;
        let (push, grasp) = self.model.evaluate(&x, Rotations::All)?;
        Ok(ValueMaps {
            push: tensor_to_array3(&push)?,
            grasp: tensor_to_array3(&grasp)?,
        })
    }

    /// Largest value over both primitives and all rotations.
    fn max_q(&self, state: &State) -> Result<f32> {
        let x = state_to_tensor(state, self.model.device())?;
        let (push, grasp) = self.model.evaluate(&x, Rotations::All)?;
        let max = |t: Tensor| -> Result<f32> {
            Ok(t.detach().flatten_all()?.max(0)?.to_scalar::<f32>()?)
        };
        Ok(max(push)?.max(max(grasp)?))
    }

    /// Regresses one transition on the summed loss of its rotations. Returns the loss
    /// and the absolute error at the executed rotation.
    fn learn(&mut self, tr: &Transition) -> Result<(f32, f32)> {
        let state = tr.state.load()?;
        let next_state = tr.next_state.load()?;
        let max_next_q = self.max_q(&next_state)?;
        let target = td_target(&tr.reward, tr.is_done, self.discount_factor, max_next_q);

        let x = state_to_tensor(&state, self.model.device())?;
        let tgt = Tensor::new(target, self.model.device())?;
        let act = tr.act;
        let mut loss: Option<Tensor> = None;
        let mut abs_err = 0f32;
        let mut last_loss = f32::NAN;
        for rotation in learn_rotations(&act, self.model.num_rotations()) {
            let (push, grasp) = self.model.evaluate(&x, Rotations::Single(rotation))?;
            let q = match act.primitive {
                Primitive::Push => push,
                Primitive::Grasp => grasp,
            };
            let pred = q.i((0, act.row, act.col))?;
            abs_err = (target - pred.to_scalar::<f32>()?).abs();
            let l = smooth_l1_loss(&pred, &tgt)?;
            last_loss = l.to_scalar::<f32>()?;
            loss = Some(match loss {
                None => l,
                Some(acc) => (acc + l)?,
            });
        }

        match loss {
            Some(loss) => {
                self.model.backward_step(&loss)?;
                trace!(
                    "{} at {:?}: target {:.4}, loss {:.4}, error {:.4}",
                    act.primitive,
                    (act.rotation, act.row, act.col),
                    target,
                    last_loss,
                    abs_err
                );
                Ok((last_loss, abs_err))
            }
            None => Ok((f32::NAN, abs_err)),
        }
    }

    fn opt_(&mut self, buffer: &mut R) -> Result<Record> {
        let batch = buffer.batch(self.batch_size)?;
        let mut loss = f32::NAN;
        let mut errs = Vec::with_capacity(batch.len());
        for tr in batch.iter() {
            let (l, e) = self.learn(&tr)?;
            loss = l;
            errs.push(e);
        }
        buffer.update_priority(&batch.ix_sample, &errs)?;
        self.n_opts += 1;
        debug!("Optimized on slots {:?}, loss {:.4}", batch.ix_sample, loss);

        let mut record = Record::from_slice(&[
            ("loss", RecordValue::Scalar(loss)),
            ("epsilon", RecordValue::Scalar(self.epsilon() as f32)),
        ]);
        if let Some(err) = errs.last() {
            record.insert("td_error", RecordValue::Scalar(*err));
        }
        Ok(record)
    }
}

impl<E, R> Configurable for Vpg<E, R>
where
    E: Env<Obs = State, Act = Action>,
    R: ReplayBufferBase<Batch = TransitionBatch>,
{
    type Config = VpgConfig;

    /// Constructs VPG agent.
    fn build(config: Self::Config) -> Result<Self> {
        let device = config.device.unwrap_or(crate::Device::Cpu).open()?;
        let model = ValueModel::build(config.model_config, device)?;

        Ok(Self {
            model,
            batch_size: config.batch_size,
            discount_factor: config.discount_factor,
            explorer: config.explorer,
            train: config.train,
            n_opts: 0,
            rng: StdRng::seed_from_u64(config.seed),
            phantom: PhantomData,
        })
    }
}

impl<E, R> Policy<E> for Vpg<E, R>
where
    E: Env<Obs = State, Act = Action>,
    R: ReplayBufferBase<Batch = TransitionBatch>,
{
    /// In evaluation mode the action is greedy.
    fn sample(&mut self, obs: &State) -> Result<Action> {
        let maps = self.value_maps(obs)?;
        let epsilon = self.epsilon();
        let act = self.explorer.choose(&maps, epsilon, &mut self.rng);
        debug!(
            "Selected {} at rotation {}, cell ({}, {}), value {:.4}, epsilon {:.4}",
            act.primitive,
            act.rotation,
            act.row,
            act.col,
            maps.of(act.primitive)[[act.rotation, act.row, act.col]],
            epsilon
        );
        Ok(act)
    }
}

impl<E, R> Agent<E, R> for Vpg<E, R>
where
    E: Env<Obs = State, Act = Action>,
    R: ReplayBufferBase<Batch = TransitionBatch>,
{
    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
    }

    fn is_train(&self) -> bool {
        self.train
    }

    /// Does nothing in evaluation mode except reporting a NaN loss.
    fn opt_with_record(&mut self, buffer: &mut R) -> Result<Record> {
        if self.train {
            self.opt_(buffer)
        } else {
            Ok(Record::from_scalar("loss", f32::NAN))
        }
    }

    fn save_params(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        self.model.save(path.join(MODEL_FILE))
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.model.load(path.join(MODEL_FILE))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vpg::ValueModelConfig;
    use ndarray::Array3;
    use pushgrasp_core::{
        replay_buffer::{CerReplayBuffer, CerReplayBufferConfig},
        ExperienceBufferBase, Step, StateStore, STATE_CHANNELS,
    };
    use tempdir::TempDir;

    /// Only carries the types.
    struct TableEnv;

    impl Env for TableEnv {
        type Config = ();
        type Obs = State;
        type Act = Action;

        fn build(_config: &(), _seed: u64) -> Result<Self> {
            Ok(Self)
        }

        fn step(&mut self, _a: &Action) -> Result<(Step<Self>, Record)> {
            unimplemented!()
        }

        fn reset(&mut self) -> Result<State> {
            unimplemented!()
        }

        fn observe(&mut self) -> Result<State> {
            unimplemented!()
        }
    }

    type TestVpg = Vpg<TableEnv, CerReplayBuffer>;

    const GRID: usize = 16;

    fn config() -> VpgConfig {
        let model_config = ValueModelConfig::default()
            .num_rotations(4)
            .encoder_channels(vec![4, 4, 8, 8, 8])
            .head_hidden(vec![8]);
        VpgConfig::default().model_config(model_config).seed(1)
    }

    fn state(level: f32) -> Result<State> {
        let mut data = Array3::zeros((GRID, GRID, STATE_CHANNELS));
        for i in 4..8 {
            for j in 4..8 {
                for c in 0..3 {
                    data[[i, j, c]] = 200.0;
                }
                for c in 3..STATE_CHANNELS {
                    data[[i, j, c]] = level;
                }
            }
        }
        State::new(data)
    }

    /// Stores a push without reward and then a successful grasp.
    fn filled_buffer(dir: &TempDir) -> Result<CerReplayBuffer> {
        let mut store = StateStore::new(dir.path())?;
        let s0 = store.save(&state(0.05)?)?;
        let s1 = store.save(&state(0.03)?)?;
        let s2 = store.save(&state(0.0)?)?;
        let mut buffer = CerReplayBuffer::build(&CerReplayBufferConfig::default().capacity(8))?;
        buffer.push(Transition {
            state: s0,
            act: Action::new(Primitive::Grasp, 1, 5, 5),
            next_state: s1.clone(),
            reward: Reward::new(0.0, false, false),
            is_done: false,
        })?;
        buffer.push(Transition {
            state: s1,
            act: Action::new(Primitive::Grasp, 2, 6, 6),
            next_state: s2,
            reward: Reward::new(1.0, true, true),
            is_done: false,
        })?;
        Ok(buffer)
    }

    #[test]
    fn target_gates_reward_and_bootstrap() {
        let r = Reward::new(0.5, true, false);
        assert_eq!(td_target(&r, false, 0.5, 2.0), 1.5);
        assert_eq!(td_target(&r, true, 0.5, 2.0), 0.5);

        // a push without change earns nothing
        let r = Reward::new(0.5, false, false);
        assert_eq!(td_target(&r, false, 0.5, 2.0), 0.0);

        // a successful grasp bootstraps even if the scene did not change
        let r = Reward::new(1.0, false, true);
        assert_eq!(td_target(&r, false, 0.5, 2.0), 1.0);
    }

    #[test]
    fn grasp_regresses_the_antipodal_rotation_too() {
        let grasp = Action::new(Primitive::Grasp, 3, 0, 0);
        assert_eq!(learn_rotations(&grasp, 16), vec![11, 3]);
        let push = Action::new(Primitive::Push, 3, 0, 0);
        assert_eq!(learn_rotations(&push, 16), vec![3]);
    }

    #[test]
    fn sampled_action_is_on_the_grid() -> Result<()> {
        let mut agent = TestVpg::build(config())?;
        let a = agent.sample(&state(0.05)?)?;
        assert!(a.rotation < 4 && a.row < GRID && a.col < GRID);
        assert_eq!(agent.epsilon(), 0.5);

        agent.eval();
        assert_eq!(agent.epsilon(), 0.0);
        Ok(())
    }

    #[test]
    fn optimization_updates_priorities() -> Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = TempDir::new("vpg")?;
        let mut buffer = filled_buffer(&dir)?;
        let mut agent = TestVpg::build(config())?;

        let record = agent.opt_with_record(&mut buffer)?;
        assert_eq!(agent.n_opts(), 1);
        assert!(record.get_scalar("loss")?.is_finite());
        assert!(record.get_scalar("epsilon")? < 0.5);

        // the failed grasp is the only complementary match, the success is the CER slot
        let e0 = buffer.priority(0).unwrap();
        let e1 = buffer.priority(1).unwrap();
        assert!(e0 < 100000.0 && e0 >= 0.0);
        assert!(e1 < 100000.0 && e1 >= 0.0);
        assert_eq!(record.get_scalar("td_error")?, e1);
        Ok(())
    }

    #[test]
    fn evaluation_mode_does_not_learn() -> Result<()> {
        let dir = TempDir::new("vpg")?;
        let mut buffer = filled_buffer(&dir)?;
        let mut agent = TestVpg::build(config())?;
        agent.eval();

        let record = agent.opt_with_record(&mut buffer)?;
        assert!(record.get_scalar("loss")?.is_nan());
        assert_eq!(agent.n_opts(), 0);
        assert_eq!(buffer.priority(0), Some(100000.0));
        assert_eq!(buffer.priority(1), Some(100000.0));
        Ok(())
    }

    #[test]
    fn grasp_reports_the_loss_of_the_executed_rotation() -> Result<()> {
        let dir = TempDir::new("vpg")?;
        let mut store = StateStore::new(dir.path())?;
        let s = state(0.05)?;
        let next = state(0.0)?;
        let tr = Transition {
            state: store.save(&s)?,
            act: Action::new(Primitive::Grasp, 1, 5, 5),
            next_state: store.save(&next)?,
            reward: Reward::new(1.0, true, true),
            is_done: false,
        };
        let mut agent = TestVpg::build(config())?;

        let target = td_target(&tr.reward, false, agent.discount_factor, agent.max_q(&next)?);
        let tgt = Tensor::new(target, agent.model.device())?;
        let x = state_to_tensor(&s, agent.model.device())?;
        let mut losses = vec![];
        let mut preds = vec![];
        for rotation in learn_rotations(&tr.act, 4) {
            let (_, grasp) = agent.model.evaluate(&x, Rotations::Single(rotation))?;
            let pred = grasp.i((0, 5, 5))?;
            losses.push(smooth_l1_loss(&pred, &tgt)?.to_scalar::<f32>()?);
            preds.push(pred.to_scalar::<f32>()?);
        }

        // the antipodal rotation is processed first, the executed one last
        let (loss, abs_err) = agent.learn(&tr)?;
        assert!((loss - losses[1]).abs() < 1e-5);
        assert!((abs_err - (target - preds[1]).abs()).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn parameters_survive_save_and_load() -> Result<()> {
        let dir = TempDir::new("vpg")?;
        let s = state(0.05)?;
        let agent = TestVpg::build(config())?;
        agent.save_params(&dir.path().join("snapshot-000000"))?;
        assert!(dir.path().join("snapshot-000000").join(MODEL_FILE).exists());

        let mut other = TestVpg::build(config().seed(2))?;
        other.load_params(&dir.path().join("snapshot-000000"))?;
        assert_eq!(agent.value_maps(&s)?, other.value_maps(&s)?);
        Ok(())
    }
}
