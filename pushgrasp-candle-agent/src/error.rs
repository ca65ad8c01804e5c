use thiserror::Error;

/// Contract violations of the value model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The network geometry cannot produce maps aligned with the input grid.
    #[error("invalid model geometry: {0}")]
    Geometry(String),

    /// A state tensor is not laid out as `(rows, cols, 6)`.
    #[error("state tensor has shape {0:?}, expected (rows, cols, 6)")]
    StateShape(Vec<usize>),

    /// A rotation index outside `0..num_rotations`.
    #[error("rotation {0} is outside 0..{1}")]
    Rotation(usize, usize),
}
