//! Errors in the library.
use thiserror::Error;

/// Errors raised by the core components.
#[derive(Debug, Error)]
pub enum PushGraspError {
    /// Sampling was requested before any transition was stored.
    #[error("replay buffer is empty")]
    EmptyReplayBuffer,

    /// A slot was read before it had ever been written.
    #[error("replay slot {0} has not been written yet")]
    UnwrittenSlot(usize),

    /// Lengths of sampled indices and their errors differ.
    #[error("{ixs} indices but {errs} priority values")]
    PriorityLengthMismatch {
        /// Number of indices.
        ixs: usize,
        /// Number of errors.
        errs: usize,
    },

    /// A step was processed before the processor saw the first observation.
    #[error("step processed before reset")]
    StepBeforeReset,

    /// A configuration value violates a construction-time contract.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A state array does not have the expected layout.
    #[error("state has shape {0:?}, expected (rows, cols, {1})")]
    StateShape(Vec<usize>, usize),

    /// Iteration index outside the grasp log.
    #[error("iteration {0} is outside the grasp log of length {1}")]
    GraspLogIndex(usize, usize),

    /// A record has no value under the key.
    #[error("record key error: {0}")]
    RecordKey(String),

    /// A record value is not of the requested type.
    #[error("record value type error: expected {0}")]
    RecordValueType(String),

    /// A grasp log file has a malformed row.
    #[error("malformed grasp log row {0}")]
    GraspLogRow(usize),
}
