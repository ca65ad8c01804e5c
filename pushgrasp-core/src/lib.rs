#![warn(missing_docs)]
//! Core of a push-grasp learning system.
//!
//! This crate is free of any neural network backend. It provides
//!
//! * capability traits for environments, policies, agents and replay buffers
//!   ([`Env`], [`Policy`], [`Agent`], [`ExperienceBufferBase`], [`ReplayBufferBase`]),
//! * the domain vocabulary shared by all crates ([`Primitive`], [`Action`], [`Reward`],
//!   [`State`]),
//! * an experience replay with combined experience replay and reward-conditioned
//!   priority resampling ([`replay_buffer::CerReplayBuffer`]),
//! * records and recorders ([`record`]),
//! * the training loop ([`Trainer`]).
pub mod error;
pub mod record;
pub mod replay_buffer;

mod base;
pub use base::{
    Act, Action, Agent, Configurable, Env, ExperienceBufferBase, Obs, Policy, Primitive,
    ReplayBufferBase, Reward, Step, StepProcessor,
};

mod state;
pub use state::{State, StateRef, StateStore, STATE_CHANNELS};

mod trainer;
#[cfg(test)]
mod dummy;
pub use trainer::{Trainer, TrainerConfig};
