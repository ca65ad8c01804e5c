//! Heightmap states and their on-disk snapshots.
use crate::{error::PushGraspError, Obs};
use anyhow::Result;
use log::trace;
use ndarray::{Array3, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

/// Number of channels of a [`State`]: red, green, blue and the depth repeated three times.
pub const STATE_CHANNELS: usize = 6;

/// A top-down heightmap of the workspace, laid out as `(rows, cols, 6)`.
///
/// Color channels hold raw intensities in `[0, 255]` and depth channels hold the
/// height above the workspace floor in meters. Cells without a measurement are 0.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct State(Array3<f32>);

impl State {
    /// Wraps a `(rows, cols, 6)` array.
    pub fn new(data: Array3<f32>) -> Result<Self> {
        if data.shape()[2] != STATE_CHANNELS {
            return Err(PushGraspError::StateShape(data.shape().to_vec(), STATE_CHANNELS).into());
        }
        Ok(Self(data))
    }

    /// Stacks a color heightmap `(rows, cols, 3)` with a depth heightmap `(rows, cols)`.
    ///
    /// Non-finite depth values are replaced with 0.
    pub fn from_heightmaps(color: ArrayView3<u8>, depth: ArrayView2<f32>) -> Result<Self> {
        let (rows, cols) = depth.dim();
        if color.dim() != (rows, cols, 3) {
            return Err(PushGraspError::StateShape(color.shape().to_vec(), 3).into());
        }
        let mut data = Array3::<f32>::zeros((rows, cols, STATE_CHANNELS));
        for (c, mut plane) in data.axis_iter_mut(Axis(2)).enumerate() {
            if c < 3 {
                plane.assign(&color.index_axis(Axis(2), c).mapv(|v| v as f32));
            } else {
                plane.assign(&depth.mapv(|v| if v.is_finite() { v } else { 0.0 }));
            }
        }
        Ok(Self(data))
    }

    /// Grid size `(rows, cols)`.
    pub fn grid(&self) -> (usize, usize) {
        let (rows, cols, _) = self.0.dim();
        (rows, cols)
    }

    /// Underlying array.
    pub fn data(&self) -> &Array3<f32> {
        &self.0
    }

    /// Consumes the state and returns the underlying array.
    pub fn into_data(self) -> Array3<f32> {
        self.0
    }
}

impl Obs for State {}

/// Location of a persisted [`State`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateRef(PathBuf);

impl StateRef {
    /// Refers to a state file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Path of the state file.
    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Reads the state back from disk.
    pub fn load(&self) -> Result<State> {
        let rdr = BufReader::new(File::open(&self.0)?);
        let data: Array3<f32> = bincode::deserialize_from(rdr)?;
        State::new(data)
    }
}

/// Writes each observed state once under a sequence-numbered file name.
pub struct StateStore {
    dir: PathBuf,
    seq: usize,
}

impl StateStore {
    /// Creates the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            seq: 0,
        })
    }

    /// Number of states written so far.
    pub fn len(&self) -> usize {
        self.seq
    }

    /// Returns `true` if no state has been written.
    pub fn is_empty(&self) -> bool {
        self.seq == 0
    }

    /// Persists a state and returns a reference to it.
    pub fn save(&mut self, state: &State) -> Result<StateRef> {
        let path = self.dir.join(format!("state-{:06}.bin", self.seq));
        let wtr = BufWriter::new(File::create(&path)?);
        bincode::serialize_into(wtr, &state.0)?;
        trace!("Saved state {:?}", path);
        self.seq += 1;
        Ok(StateRef(path))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::{Array2, Array3};
    use tempdir::TempDir;

    #[test]
    fn depth_is_triplicated_and_invalid_cells_zeroed() -> Result<()> {
        let mut color = Array3::<u8>::zeros((2, 3, 3));
        color[[1, 2, 0]] = 255;
        let mut depth = Array2::<f32>::zeros((2, 3));
        depth[[0, 0]] = 0.05;
        depth[[1, 1]] = f32::NAN;

        let state = State::from_heightmaps(color.view(), depth.view())?;
        let data = state.data();
        assert_eq!(state.grid(), (2, 3));
        assert_eq!(data[[1, 2, 0]], 255.0);
        for c in 3..STATE_CHANNELS {
            assert_eq!(data[[0, 0, c]], 0.05);
            assert_eq!(data[[1, 1, c]], 0.0);
        }
        Ok(())
    }

    #[test]
    fn rejects_wrong_channel_count() {
        assert!(State::new(Array3::zeros((4, 4, 3))).is_err());
    }

    #[test]
    fn store_writes_sequence_numbered_files() -> Result<()> {
        let dir = TempDir::new("state_store")?;
        let mut store = StateStore::new(dir.path())?;
        let s0 = State::new(Array3::from_elem((4, 5, STATE_CHANNELS), 1.5))?;
        let s1 = State::new(Array3::from_elem((4, 5, STATE_CHANNELS), 2.5))?;
        let r0 = store.save(&s0)?;
        let r1 = store.save(&s1)?;

        assert_eq!(store.len(), 2);
        assert!(r0.path().ends_with("state-000000.bin"));
        assert!(r1.path().ends_with("state-000001.bin"));
        assert_eq!(r0.load()?, s0);
        assert_eq!(r1.load()?, s1);
        Ok(())
    }
}
