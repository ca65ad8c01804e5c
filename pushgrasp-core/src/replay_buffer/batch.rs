use crate::{Action, Reward, StateRef};

/// A transition `(o_t, a_t, o_t+1, r_t)` with states kept on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// State the action was selected in.
    pub state: StateRef,

    /// Action.
    pub act: Action,

    /// State after the action.
    pub next_state: StateRef,

    /// Reward.
    pub reward: Reward,

    /// If the episode ended with this transition.
    pub is_done: bool,
}

/// Transitions sampled from [`CerReplayBuffer`](super::CerReplayBuffer).
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionBatch {
    /// States.
    pub state: Vec<StateRef>,

    /// Actions.
    pub act: Vec<Action>,

    /// Next states.
    pub next_state: Vec<StateRef>,

    /// Rewards.
    pub reward: Vec<Reward>,

    /// Episode-end flags.
    pub is_done: Vec<bool>,

    /// Slots the transitions were read from.
    pub ix_sample: Vec<usize>,
}

impl TransitionBatch {
    /// Number of transitions in the batch.
    pub fn len(&self) -> usize {
        self.ix_sample.len()
    }

    /// Returns `true` if the batch has no transition.
    pub fn is_empty(&self) -> bool {
        self.ix_sample.is_empty()
    }

    /// Iterates over the transitions of the batch.
    pub fn iter(&self) -> impl Iterator<Item = Transition> + '_ {
        (0..self.len()).map(move |i| Transition {
            state: self.state[i].clone(),
            act: self.act[i],
            next_state: self.next_state[i].clone(),
            reward: self.reward[i],
            is_done: self.is_done[i],
        })
    }
}
