//! Orthographic top-down projection of RGB-D frames.
use crate::{EnvError, WorkspaceBounds};
use anyhow::Result;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3};

/// Projects camera frames onto a fixed grid over the workspace.
///
/// Every depth pixel is back-projected with the pinhole intrinsics, moved to robot
/// coordinates with the camera pose and dropped into the cell below it. Points
/// outside `[lo, hi)` on any axis are discarded. The last point written to a cell
/// wins. Depth cells store the height above `z[0]` and cells without any point are
/// NaN.
#[derive(Debug, Clone)]
pub struct HeightmapProjector {
    bounds: WorkspaceBounds,
    resolution: f64,
    shape: (usize, usize),
}

impl HeightmapProjector {
    /// Fails if the bounds or the resolution cannot form a grid.
    pub fn new(bounds: WorkspaceBounds, resolution: f64) -> Result<Self, EnvError> {
        bounds.validate()?;
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(EnvError::InvalidWorkspace(format!(
                "resolution {} is not positive",
                resolution
            )));
        }
        Ok(Self {
            bounds,
            resolution,
            shape: bounds.grid_shape(resolution),
        })
    }

    /// `(rows, cols)` of the heightmaps.
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// Returns the color heightmap `(rows, cols, 3)` and the depth heightmap `(rows, cols)`.
    ///
    /// `extrinsics` is the camera pose in robot coordinates.
    pub fn project(
        &self,
        color: ArrayView3<u8>,
        depth: ArrayView2<f32>,
        intrinsics: &[[f64; 3]; 3],
        extrinsics: &[[f64; 4]; 4],
    ) -> Result<(Array3<u8>, Array2<f32>)> {
        let (h, w) = depth.dim();
        if color.dim() != (h, w, 3) {
            return Err(EnvError::Perception(format!(
                "color image {:?} does not match depth image {:?}",
                color.dim(),
                (h, w)
            ))
            .into());
        }

        let (rows, cols) = self.shape;
        let mut color_hm = Array3::<u8>::zeros((rows, cols, 3));
        let mut depth_hm = Array2::<f32>::from_elem((rows, cols), f32::NAN);
        let (fx, fy) = (intrinsics[0][0], intrinsics[1][1]);
        let (cx, cy) = (intrinsics[0][2], intrinsics[1][2]);
        let r = extrinsics;
        let b = &self.bounds;

        for ((v, u), &d) in depth.indexed_iter() {
            if !d.is_finite() {
                continue;
            }
            let z = d as f64;
            let pc = [(u as f64 - cx) * z / fx, (v as f64 - cy) * z / fy, z];
            let p = [0, 1, 2].map(|i| r[i][0] * pc[0] + r[i][1] * pc[1] + r[i][2] * pc[2] + r[i][3]);
            let inside = |x: f64, [lo, hi]: [f64; 2]| x >= lo && x < hi;
            if !(inside(p[0], b.x) && inside(p[1], b.y) && inside(p[2], b.z)) {
                continue;
            }

            let col = ((p[0] - b.x[0]) / self.resolution).floor() as usize;
            let row = ((p[1] - b.y[0]) / self.resolution).floor() as usize;
            if row >= rows || col >= cols {
                continue;
            }
            for c in 0..3 {
                color_hm[[row, col, c]] = color[[v, u, c]];
            }
            depth_hm[[row, col]] = (p[2] - b.z[0]) as f32;
        }

        Ok((color_hm, depth_hm))
    }
}
