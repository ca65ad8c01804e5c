use anyhow::Result;
use clap::Parser;
use log::info;
use pushgrasp::{
    pushgrasp_candle_agent::{
        vpg::{Vpg, VpgConfig},
        Device,
    },
    pushgrasp_core::{
        record::AggregateRecorder,
        replay_buffer::{CerReplayBuffer, CerReplayBufferConfig, VpgStepProcessor, VpgStepProcessorConfig},
        Agent, Configurable, Env as _, Policy, Trainer, TrainerConfig,
    },
    pushgrasp_env::{EquipmentConfig, SimConfig, VpgEnv, VpgEnvConfig},
    pushgrasp_tensorboard::TensorboardRecorder,
};
use std::path::{Path, PathBuf};

const MAX_ITER: usize = 2500;
const NUM_OBJECTS: usize = 10;
const REPLAY_BUFFER_CAPACITY: usize = 2500;
const SAVE_INTERVAL: usize = 50;
const MODEL_DIR: &str = "./pushgrasp/demos/model/train_sim";

type Env = VpgEnv;
type StepProc = VpgStepProcessor<Env>;
type ReplayBuffer = CerReplayBuffer;
type VpgAgent = Vpg<Env, ReplayBuffer>;

/// Train/eval a VPG agent in the tabletop simulator
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Evaluate the snapshot in this directory instead of training
    #[arg(short, long)]
    eval: Option<PathBuf>,

    /// Number of training iterations
    #[arg(long, default_value_t = MAX_ITER)]
    max_iter: usize,

    /// Directory of snapshots, records and tensorboard logs
    #[arg(long, default_value = MODEL_DIR)]
    model_dir: PathBuf,

    /// Environment configuration in YAML, replaces the built-in one
    #[arg(long)]
    env_config: Option<PathBuf>,

    /// Agent configuration in YAML, replaces the built-in one
    #[arg(long)]
    agent_config: Option<PathBuf>,

    /// Run the value model on this CUDA device
    #[arg(long)]
    cuda: Option<usize>,

    /// Random seed of the environment
    #[arg(long, default_value_t = 1234)]
    seed: u64,

    /// Number of evaluation episodes
    #[arg(long, default_value_t = 5)]
    episodes: usize,
}

fn env_config(args: &Args) -> Result<VpgEnvConfig> {
    match &args.env_config {
        Some(path) => VpgEnvConfig::load(path),
        None => Ok(VpgEnvConfig::default()
            .equipment(EquipmentConfig::Sim(SimConfig::default().num_objects(NUM_OBJECTS)))),
    }
}

fn agent_config(args: &Args) -> Result<VpgConfig> {
    let config = match &args.agent_config {
        Some(path) => VpgConfig::load(path)?,
        None => VpgConfig::default(),
    };
    Ok(match args.cuda {
        Some(ix) => config.device(Device::Cuda(ix)),
        None => config,
    })
}

fn train(args: &Args) -> Result<()> {
    let model_dir = &args.model_dir;
    std::fs::create_dir_all(model_dir)?;
    let env_config = env_config(args)?;
    let agent_config = agent_config(args)?;
    env_config.save(model_dir.join("env_config.yaml"))?;
    agent_config.save(model_dir.join("agent_config.yaml"))?;

    let trainer_config = TrainerConfig::default()
        .max_iter(args.max_iter)
        .model_dir(model_dir)
        .record_path(model_dir.join("records.txt"))
        .save_interval(SAVE_INTERVAL)
        .seed(args.seed);
    trainer_config.save(model_dir.join("trainer_config.yaml"))?;
    let step_proc_config = VpgStepProcessorConfig::default().state_dir(model_dir.join("states"));
    let replay_buffer_config = CerReplayBufferConfig::default().capacity(REPLAY_BUFFER_CAPACITY);

    let mut trainer = Trainer::<Env, StepProc, ReplayBuffer>::build(
        trainer_config,
        env_config,
        step_proc_config,
        replay_buffer_config,
    );
    let mut agent = VpgAgent::build(agent_config)?;
    let mut recorder: Box<dyn AggregateRecorder> =
        Box::new(TensorboardRecorder::new(model_dir.join("tb")));
    let log = trainer.train(&mut agent, recorder.as_mut())?;

    let rates = log.grasp_success_rate(200, 1.0);
    info!("Grasp success rate per window: {:?}", rates);
    Ok(())
}

fn eval(args: &Args, snapshot: &Path) -> Result<()> {
    let mut env = Env::build(&env_config(args)?, args.seed)?;
    let mut agent = VpgAgent::build(agent_config(args)?)?;
    agent.load_params(snapshot)?;
    agent.eval();

    let max_steps = 30;
    for episode in 0..args.episodes {
        let mut obs = env.reset()?;
        let (mut grasps, mut successes) = (0, 0);
        for _ in 0..max_steps {
            let act = agent.sample(&obs)?;
            let (step, _) = env.step(&act)?;
            if act.primitive.is_grasp() {
                grasps += 1;
                successes += step.reward.grasp_success as usize;
            }
            if step.is_done() {
                break;
            }
            obs = step.obs;
        }
        info!(
            "Episode {}: {}/{} successful grasps",
            episode, successes, grasps
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match &args.eval {
        Some(snapshot) => eval(&args, snapshot),
        None => train(&args),
    }
}
