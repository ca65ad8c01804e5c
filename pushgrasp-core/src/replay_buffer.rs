//! Experience replay for push-grasp learning.
//!
//! [`CerReplayBuffer`] is a fixed-capacity circular store of transitions. Each batch
//! it produces contains
//!
//! * a transition drawn from earlier transitions of the same primitive whose reward is
//!   the complement of the most recent one (a failed grasp if the latest grasp
//!   succeeded and vice versa), ranked by priority, and
//! * the most recent transition itself when combined experience replay is enabled.
//!
//! Next states are not written into slots. A slot's next state is the state of the
//! following slot, except for the most recent transition, whose next state waits in
//! a lookahead of depth one until the following transition is stored.
mod base;
mod batch;
mod config;
mod step_proc;
pub use base::CerReplayBuffer;
pub use batch::{Transition, TransitionBatch};
pub use config::CerReplayBufferConfig;
pub use step_proc::{VpgStepProcessor, VpgStepProcessorConfig};
