//! Nearest-neighbour rotation of feature maps.
//!
//! Output cell `(i, j)` of an `h x w` map reads input cell `(round(y_s), round(x_s))`
//! where, in coordinates normalized to `[-1, 1]` at cell centers,
//!
//! ```text
//! x_s =  cos(a) * x + sin(a) * y
//! y_s = -sin(a) * x + cos(a) * y
//! ```
//!
//! Cells read from outside the map are 0. Rounding is half-to-even, and an angle of
//! 0 maps every cell onto itself.
use anyhow::Result;
use candle_core::Tensor;

/// Flat source index of every output cell. `h * w` stands for "outside".
pub fn rotation_indices(h: usize, w: usize, angle: f64) -> Vec<u32> {
    let (sin, cos) = angle.sin_cos();
    let outside = (h * w) as u32;
    let mut ixs = Vec::with_capacity(h * w);

    for i in 0..h {
        let y = (2 * i + 1) as f64 / h as f64 - 1.0;
        for j in 0..w {
            let x = (2 * j + 1) as f64 / w as f64 - 1.0;
            let xs = cos * x + sin * y;
            let ys = -sin * x + cos * y;
            let js = (((xs + 1.0) * w as f64 - 1.0) / 2.0).round_ties_even();
            let is = (((ys + 1.0) * h as f64 - 1.0) / 2.0).round_ties_even();
            let inside = js >= 0.0 && js < w as f64 && is >= 0.0 && is < h as f64;
            ixs.push(if inside {
                (is as usize * w + js as usize) as u32
            } else {
                outside
            });
        }
    }
    ixs
}

/// Rotates an `(n, c, h, w)` tensor by resampling it at the rotated cell centers.
pub fn rotate(x: &Tensor, angle: f64) -> Result<Tensor> {
    let (n, c, h, w) = x.dims4()?;
    let ixs = Tensor::from_vec(rotation_indices(h, w, angle), h * w, x.device())?;
    let flat = x.reshape((n, c, h * w))?.pad_with_zeros(2, 0, 1)?;
    Ok(flat.index_select(&ixs, 2)?.reshape((n, c, h, w))?)
}
