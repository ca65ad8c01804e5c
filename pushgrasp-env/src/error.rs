use thiserror::Error;

/// Errors raised by the manipulation environment.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The camera did not deliver a usable frame.
    #[error("perception failed: {0}")]
    Perception(String),

    /// The arm or the gripper could not execute a command.
    #[error("actuation failed: {0}")]
    Actuation(String),

    /// Workspace bounds or resolution that cannot form a grid.
    #[error("invalid workspace: {0}")]
    InvalidWorkspace(String),

    /// The action does not address the heightmap grid.
    #[error("action (rotation {rotation}, row {row}, col {col}) is outside of {rotations}x{rows}x{cols}")]
    InvalidAction {
        rotation: usize,
        row: usize,
        col: usize,
        rotations: usize,
        rows: usize,
        cols: usize,
    },

    /// An action was requested before the first heightmap.
    #[error("no heightmap has been perceived yet")]
    NotPerceived,
}
