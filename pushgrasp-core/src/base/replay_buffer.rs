//! Replay buffer interface.
use anyhow::Result;

/// A buffer into which experiences are stored.
pub trait ExperienceBufferBase {
    /// The type of items stored in the buffer.
    type Item;

    /// Stores a new experience.
    fn push(&mut self, tr: Self::Item) -> Result<()>;

    /// Returns the current number of experiences in the buffer.
    fn len(&self) -> usize;

    /// Returns `true` if nothing has been stored yet.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A buffer that produces training batches.
pub trait ReplayBufferBase {
    /// Configuration parameters for the replay buffer.
    type Config: Clone;

    /// The type of batch generated for training.
    type Batch;

    /// Builds a new replay buffer from the given configuration.
    fn build(config: &Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// Samples a batch of at most `size` experiences.
    fn batch(&mut self, size: usize) -> Result<Self::Batch>;

    /// Overwrites the priorities of the sampled slots `ixs` with `td_err`.
    fn update_priority(&mut self, ixs: &[usize], td_err: &[f32]) -> Result<()>;
}
