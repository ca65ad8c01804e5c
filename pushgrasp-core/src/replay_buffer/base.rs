use super::{CerReplayBufferConfig, Transition, TransitionBatch};
use crate::{
    error::PushGraspError, Action, ExperienceBufferBase, Primitive, ReplayBufferBase, Reward,
    StateRef,
};
use anyhow::Result;
use log::debug;
use ordered_float::OrderedFloat;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::VecDeque;

/// Circular transition store with combined experience replay and
/// reward-conditioned priority resampling.
///
/// Slots are written in order `0, 1, ..., capacity - 1, 0, 1, ...`. `head` is the most
/// recently written slot.
pub struct CerReplayBuffer {
    capacity: usize,
    head: Option<usize>,
    seen: usize,

    state: Vec<StateRef>,
    act: Vec<Action>,
    reward: Vec<Reward>,
    is_done: Vec<bool>,
    priority: Vec<f32>,

    /// Next state of `head`, which has no slot of its own yet. Depth one.
    lookahead: VecDeque<StateRef>,

    use_cer: bool,
    alpha: f64,
    push_reward: f32,
    grasp_reward: f32,
    initial_priority: f32,
    rng: StdRng,
}

impl CerReplayBuffer {
    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently written slot.
    pub fn head(&self) -> Option<usize> {
        self.head
    }

    /// Number of transitions ever stored.
    pub fn seen(&self) -> usize {
        self.seen
    }

    /// Priority of a slot.
    pub fn priority(&self, ix: usize) -> Option<f32> {
        self.priority.get(ix).copied()
    }

    /// Reward that complements `reward` for the same primitive.
    fn complementary_reward(&self, primitive: Primitive, reward: f32) -> f32 {
        let rewarded = match primitive {
            Primitive::Push => self.push_reward,
            Primitive::Grasp => self.grasp_reward,
        };
        if reward == rewarded {
            0.0
        } else {
            rewarded
        }
    }

    /// Draws a rank in `0..k` as `round(U^(1/alpha) * (k - 1))`.
    fn draw_rank(&mut self, k: usize) -> usize {
        let u: f64 = self.rng.gen();
        let x = u.powf(1.0 / self.alpha);
        (x * (k - 1) as f64).round() as usize
    }

    /// Slots of a batch of at most `batch_size` transitions.
    ///
    /// The first slot is drawn from the earlier transitions sharing the primitive of
    /// `head` and carrying the complementary reward, ranked by ascending priority.
    /// The last slot is `head` when combined experience replay is enabled. Without any
    /// matching transition the batch is one element shorter. Remaining positions hold
    /// slot 0.
    pub fn sample_ixs(&mut self, batch_size: usize) -> Result<Vec<usize>> {
        let head = self.head.ok_or(PushGraspError::EmptyReplayBuffer)?;
        let primitive = self.act[head].primitive;
        let target = self.complementary_reward(primitive, self.reward[head].value);

        // Only slots before `head` in linear order are scanned, also after wraparound.
        let mut matches: Vec<usize> = (0..head)
            .filter(|&i| self.act[i].primitive == primitive && self.reward[i].value == target)
            .collect();
        matches.sort_by_key(|&i| OrderedFloat(self.priority[i]));

        let n = if matches.is_empty() {
            batch_size.saturating_sub(1)
        } else {
            batch_size
        }
        .max(1);
        let mut ixs = vec![0; n];
        if !matches.is_empty() {
            ixs[0] = matches[self.draw_rank(matches.len())];
        }
        if self.use_cer {
            ixs[n - 1] = head;
        }

        debug!(
            "Replay: {} {} matches for reward {}, sampled {:?}",
            matches.len(),
            primitive,
            target,
            ixs
        );
        Ok(ixs)
    }

    /// Next state of slot `i`.
    ///
    /// The next slot `(i + 1) % capacity` holds it, except when that slot lies in
    /// `(head, head + 1]`, where it is still in the lookahead.
    fn next_state(&self, i: usize, head: usize) -> Result<StateRef> {
        let ns = (i + 1) % self.capacity;
        if head < ns && ns <= head + 1 {
            self.lookahead
                .get(ns - head - 1)
                .cloned()
                .ok_or_else(|| PushGraspError::UnwrittenSlot(ns).into())
        } else {
            self.state
                .get(ns)
                .cloned()
                .ok_or_else(|| PushGraspError::UnwrittenSlot(ns).into())
        }
    }
}

impl ExperienceBufferBase for CerReplayBuffer {
    type Item = Transition;

    fn push(&mut self, tr: Transition) -> Result<()> {
        let head = match self.head {
            None => 0,
            Some(h) => (h + 1) % self.capacity,
        };

        if head == self.state.len() {
            self.state.push(tr.state);
            self.act.push(tr.act);
            self.reward.push(tr.reward);
            self.is_done.push(tr.is_done);
            self.priority.push(self.initial_priority);
        } else {
            self.state[head] = tr.state;
            self.act[head] = tr.act;
            self.reward[head] = tr.reward;
            self.is_done[head] = tr.is_done;
            self.priority[head] = self.initial_priority;
        }

        self.lookahead.push_back(tr.next_state);
        while self.lookahead.len() > 1 {
            self.lookahead.pop_front();
        }

        self.head = Some(head);
        self.seen += 1;
        Ok(())
    }

    fn len(&self) -> usize {
        self.state.len()
    }
}

impl ReplayBufferBase for CerReplayBuffer {
    type Config = CerReplayBufferConfig;
    type Batch = TransitionBatch;

    fn build(config: &Self::Config) -> Result<Self> {
        config.validate()?;
        let capacity = config.capacity;

        Ok(Self {
            capacity,
            head: None,
            seen: 0,
            state: Vec::with_capacity(capacity),
            act: Vec::with_capacity(capacity),
            reward: Vec::with_capacity(capacity),
            is_done: Vec::with_capacity(capacity),
            priority: Vec::with_capacity(capacity),
            lookahead: VecDeque::with_capacity(1),
            use_cer: config.use_cer,
            alpha: config.alpha,
            push_reward: config.push_reward,
            grasp_reward: config.grasp_reward,
            initial_priority: config.initial_priority,
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    fn batch(&mut self, size: usize) -> Result<TransitionBatch> {
        let ixs = self.sample_ixs(size)?;
        let head = self.head.ok_or(PushGraspError::EmptyReplayBuffer)?;

        let next_state = ixs
            .iter()
            .map(|&i| self.next_state(i, head))
            .collect::<Result<Vec<_>>>()?;

        Ok(TransitionBatch {
            state: ixs.iter().map(|&i| self.state[i].clone()).collect(),
            act: ixs.iter().map(|&i| self.act[i]).collect(),
            next_state,
            reward: ixs.iter().map(|&i| self.reward[i]).collect(),
            is_done: ixs.iter().map(|&i| self.is_done[i]).collect(),
            ix_sample: ixs,
        })
    }

    fn update_priority(&mut self, ixs: &[usize], td_err: &[f32]) -> Result<()> {
        if ixs.len() != td_err.len() {
            return Err(PushGraspError::PriorityLengthMismatch {
                ixs: ixs.len(),
                errs: td_err.len(),
            }
            .into());
        }
        for (&ix, &err) in ixs.iter().zip(td_err.iter()) {
            let slot = self
                .priority
                .get_mut(ix)
                .ok_or(PushGraspError::UnwrittenSlot(ix))?;
            *slot = err.abs();
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn transition(k: usize, primitive: Primitive, reward: f32) -> Transition {
        Transition {
            state: StateRef::new(format!("state-{:06}.bin", k)),
            act: Action::new(primitive, k % 16, k, k),
            next_state: StateRef::new(format!("state-{:06}.bin", k + 1)),
            reward: Reward::new(reward, true, primitive.is_grasp() && reward > 0.0),
            is_done: false,
        }
    }

    fn buffer(capacity: usize) -> CerReplayBuffer {
        let config = CerReplayBufferConfig::default().capacity(capacity);
        CerReplayBuffer::build(&config).unwrap()
    }

    #[test]
    fn keeps_last_capacity_transitions() -> Result<()> {
        let mut buffer = buffer(4);
        for k in 0..6 {
            buffer.push(transition(k, Primitive::Push, 0.5))?;
            assert_eq!(buffer.head(), Some(k % 4));
        }

        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.seen(), 6);
        let present: Vec<_> = buffer.state.iter().map(|s| s.path().to_owned()).collect();
        for k in 2..6 {
            let name = format!("state-{:06}.bin", k);
            assert!(present.iter().any(|p| p.ends_with(&name)), "{} missing", name);
        }
        Ok(())
    }

    #[test]
    fn most_recent_slot_is_in_every_batch() -> Result<()> {
        let mut buffer = buffer(8);
        let mut rng = StdRng::seed_from_u64(3);
        for k in 0..40 {
            let primitive = if rng.gen_bool(0.5) {
                Primitive::Grasp
            } else {
                Primitive::Push
            };
            let reward = match primitive {
                Primitive::Grasp if rng.gen_bool(0.5) => 1.0,
                Primitive::Grasp => 0.0,
                Primitive::Push if rng.gen_bool(0.5) => 0.5,
                Primitive::Push => 0.0,
            };
            buffer.push(transition(k, primitive, reward))?;
            for size in 1..4 {
                let batch = buffer.batch(size)?;
                assert_eq!(batch.ix_sample.last().copied(), buffer.head());
                assert!(batch.ix_sample.iter().all(|&i| i < buffer.len()));
            }
        }
        Ok(())
    }

    #[test]
    fn first_element_carries_complementary_reward() -> Result<()> {
        let mut buffer = buffer(16);
        buffer.push(transition(0, Primitive::Grasp, 1.0))?;
        buffer.push(transition(1, Primitive::Push, 0.0))?;
        buffer.push(transition(2, Primitive::Grasp, 0.0))?;
        buffer.push(transition(3, Primitive::Push, 0.5))?;
        buffer.push(transition(4, Primitive::Grasp, 1.0))?;

        // latest is a successful grasp, so a failed grasp is drawn
        assert_eq!(buffer.batch(2)?.ix_sample, vec![2, 4]);

        // latest is a rewarded push, so the unrewarded push is drawn
        buffer.push(transition(5, Primitive::Push, 0.5))?;
        assert_eq!(buffer.batch(2)?.ix_sample, vec![1, 5]);
        Ok(())
    }

    #[test]
    fn batch_shrinks_without_matches() -> Result<()> {
        let mut buffer = buffer(8);
        for k in 0..3 {
            buffer.push(transition(k, Primitive::Grasp, 1.0))?;
        }
        assert_eq!(buffer.batch(2)?.ix_sample, vec![2]);
        let batch = buffer.batch(3)?;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.ix_sample, vec![0, 2]);
        Ok(())
    }

    #[test]
    fn middle_positions_hold_slot_zero() -> Result<()> {
        let mut buffer = buffer(16);
        buffer.push(transition(0, Primitive::Push, 0.5))?;
        buffer.push(transition(1, Primitive::Grasp, 1.0))?;
        buffer.push(transition(2, Primitive::Grasp, 0.0))?;
        buffer.push(transition(3, Primitive::Grasp, 1.0))?;

        assert_eq!(buffer.batch(4)?.ix_sample, vec![2, 0, 0, 3]);
        Ok(())
    }

    #[test]
    fn priority_draw_follows_power_law_over_ascending_ranks() -> Result<()> {
        let mut buffer = buffer(16);
        for k in 0..5 {
            buffer.push(transition(k, Primitive::Grasp, 0.0))?;
        }
        buffer.push(transition(5, Primitive::Grasp, 1.0))?;
        buffer.update_priority(&[0, 1, 2, 3, 4], &[5.0, 3.0, 1.0, 4.0, 2.0])?;

        // ascending priority: slot 2, 4, 1, 3, 0
        let ranked = [2usize, 4, 1, 3, 0];
        let n = 40_000;
        let mut counts = [0usize; 5];
        for _ in 0..n {
            let first = buffer.sample_ixs(2)?[0];
            let rank = ranked.iter().position(|&s| s == first).unwrap();
            counts[rank] += 1;
        }

        // P(rank r) = F((r + 0.5) / 4) - F((r - 0.5) / 4) with F(t) = t^2 clipped to [0, 1]
        let expected = [0.015625, 0.125, 0.25, 0.375, 0.234375];
        for (c, e) in counts.iter().zip(expected.iter()) {
            assert!((*c as f64 / n as f64 - e).abs() < 0.01, "{:?}", counts);
        }
        // mass grows with rank up to the last, half-width bin
        assert!(counts[0] < counts[1] && counts[1] < counts[2] && counts[2] < counts[3]);
        Ok(())
    }

    #[test]
    fn priority_scan_only_covers_slots_before_head() -> Result<()> {
        let mut buffer = buffer(4);
        for k in 0..4 {
            buffer.push(transition(k, Primitive::Grasp, 0.0))?;
        }
        // wraps to slot 0; failed grasps in slots 1..4 are not scanned
        buffer.push(transition(4, Primitive::Grasp, 1.0))?;
        assert_eq!(buffer.head(), Some(0));
        assert_eq!(buffer.batch(2)?.ix_sample, vec![0]);
        Ok(())
    }

    #[test]
    fn next_state_of_head_comes_from_lookahead() -> Result<()> {
        let mut buffer = buffer(4);
        buffer.push(transition(0, Primitive::Grasp, 0.0))?;
        buffer.push(transition(1, Primitive::Grasp, 1.0))?;

        let batch = buffer.batch(2)?;
        assert_eq!(batch.ix_sample, vec![0, 1]);
        assert!(batch.next_state[0].path().ends_with("state-000001.bin"));
        assert!(batch.next_state[1].path().ends_with("state-000002.bin"));
        Ok(())
    }

    #[test]
    fn next_state_of_last_slot_reads_wrapped_slot() -> Result<()> {
        let mut buffer = buffer(3);
        for k in 0..3 {
            buffer.push(transition(k, Primitive::Push, 0.5))?;
        }
        // head = 2, (2 + 1) % 3 = 0 is outside (head, head + 1], so slot 0 is read
        // instead of the lookahead
        assert!(buffer.next_state(2, 2)?.path().ends_with("state-000000.bin"));
        assert!(buffer.next_state(0, 2)?.path().ends_with("state-000001.bin"));
        Ok(())
    }

    #[test]
    fn update_priority_checks_lengths() -> Result<()> {
        let mut buffer = buffer(4);
        buffer.push(transition(0, Primitive::Push, 0.5))?;
        assert_eq!(buffer.priority(0), Some(100_000.0));
        buffer.update_priority(&[0], &[-0.25])?;
        assert_eq!(buffer.priority(0), Some(0.25));
        assert!(buffer.update_priority(&[0, 0], &[1.0]).is_err());
        Ok(())
    }

    #[test]
    fn empty_buffer_cannot_be_sampled() {
        let mut buffer = buffer(4);
        assert!(buffer.batch(2).is_err());
    }
}
