//! Utilities.
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use ndarray::Array3;
use pushgrasp_core::{State, STATE_CHANNELS};

/// See <https://pytorch.org/docs/stable/generated/torch.nn.SmoothL1Loss.html>.
pub fn smooth_l1_loss(x: &Tensor, y: &Tensor) -> Result<Tensor, candle_core::Error> {
    let device = x.device();
    let d = (x - y)?.abs()?;
    let m1 = d.lt(1.0)?.to_dtype(DType::F32)?;
    let m2 = Tensor::new(1f32, device)?.broadcast_sub(&m1)?;
    (((0.5 * m1)? * d.sqr())? + m2 * (d - 0.5))?.mean_all()
}

/// Copies a state into a `(rows, cols, 6)` tensor.
pub fn state_to_tensor(state: &State, device: &Device) -> Result<Tensor> {
    let (rows, cols) = state.grid();
    let v = state.data().iter().copied().collect::<Vec<f32>>();
    Ok(Tensor::from_vec(v, (rows, cols, STATE_CHANNELS), device)?)
}

/// Copies an `(n, rows, cols)` tensor into an array.
pub fn tensor_to_array3(t: &Tensor) -> Result<Array3<f32>> {
    let dims = t.dims3()?;
    let v: Vec<f32> = t.flatten_all()?.to_vec1()?;
    Ok(Array3::from_shape_vec(dims, v)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn smooth_l1_is_quadratic_then_linear() -> Result<()> {
        let dev = Device::Cpu;
        let x = Tensor::new(&[0.5f32, 3.0], &dev)?;
        let y = Tensor::new(&[0f32, 0.0], &dev)?;
        // (0.5 * 0.25 + (3 - 0.5)) / 2
        let loss = smooth_l1_loss(&x, &y)?.to_scalar::<f32>()?;
        assert!((loss - 1.3125).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn state_tensor_keeps_layout() -> Result<()> {
        let mut data = Array3::<f32>::zeros((2, 3, STATE_CHANNELS));
        data[[1, 2, 4]] = 7.0;
        let t = state_to_tensor(&State::new(data)?, &Device::Cpu)?;
        assert_eq!(t.dims(), &[2, 3, STATE_CHANNELS]);
        assert_eq!(t.to_vec3::<f32>()?[1][2][4], 7.0);
        Ok(())
    }
}
