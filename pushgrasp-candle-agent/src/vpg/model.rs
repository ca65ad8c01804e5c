//! Rotation-augmented push and grasp value model.
use super::rotation::rotate;
use crate::{
    cnn::{Encoder, EncoderConfig, Head, HeadConfig},
    model::SubModel1,
    opt::{Optimizer, OptimizerConfig},
    ModelError,
};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use pushgrasp_core::STATE_CHANNELS;
use serde::{Deserialize, Serialize};
use std::{
    f64::consts::{PI, SQRT_2},
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`ValueModel`].
pub struct ValueModelConfig {
    /// Number of rotations covering a full revolution.
    pub num_rotations: usize,

    /// Upsampling factor applied to the heightmap before evaluation.
    pub zoom: usize,

    /// The padded working size is a multiple of this value.
    pub size_divisor: usize,

    /// Per-channel mean. Color channels are scaled to `[0, 1]` beforehand.
    pub mean: [f32; STATE_CHANNELS],

    /// Per-channel standard deviation.
    pub std: [f32; STATE_CHANNELS],

    /// Encoders of the color and the depth channels.
    pub encoder: EncoderConfig,

    /// Head on the concatenated encoder features.
    pub head: HeadConfig,

    /// Optimizer.
    pub opt_config: OptimizerConfig,
}

impl Default for ValueModelConfig {
    fn default() -> Self {
        Self {
            num_rotations: 16,
            zoom: 2,
            size_divisor: 32,
            mean: [0.485, 0.456, 0.406, 0.01, 0.01, 0.01],
            std: [0.229, 0.224, 0.225, 0.03, 0.03, 0.03],
            encoder: EncoderConfig::default(),
            head: HeadConfig::default(),
            opt_config: OptimizerConfig::default(),
        }
    }
}

impl ValueModelConfig {
    /// Sets the number of rotations.
    pub fn num_rotations(mut self, v: usize) -> Self {
        self.num_rotations = v;
        self
    }

    /// Sets the encoder stages. The head input follows the encoder output.
    pub fn encoder_channels(mut self, v: Vec<usize>) -> Self {
        self.encoder.channels = v;
        self.head.in_channels = 2 * self.encoder.out_channels();
        self
    }

    /// Sets the hidden layers of the head.
    pub fn head_hidden(mut self, v: Vec<usize>) -> Self {
        self.head.hidden = v;
        self
    }

    /// Sets the padded size divisor.
    pub fn size_divisor(mut self, v: usize) -> Self {
        self.size_divisor = v;
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    fn validate(&self) -> Result<()> {
        let stride = self.encoder.stride();
        let fail = |msg: String| Err(ModelError::Geometry(msg).into());
        if self.num_rotations == 0 || self.zoom == 0 {
            return fail("num_rotations and zoom must be positive".into());
        }
        if self.encoder.in_channels != 3 {
            return fail("encoders take 3 channels each".into());
        }
        if stride % self.zoom != 0 {
            return fail(format!("encoder stride {} is not a multiple of zoom {}", stride, self.zoom));
        }
        if self.size_divisor == 0 || self.size_divisor % stride != 0 {
            return fail(format!(
                "size divisor {} is not a multiple of encoder stride {}",
                self.size_divisor, stride
            ));
        }
        if self.head.in_channels != 2 * self.encoder.out_channels() {
            return fail(format!(
                "head takes {} channels but encoders emit {}",
                self.head.in_channels,
                2 * self.encoder.out_channels()
            ));
        }
        if self.std.iter().any(|s| *s == 0.0) {
            return fail("std must be nonzero".into());
        }
        Ok(())
    }

    /// Constructs [`ValueModelConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`ValueModelConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Rotations to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotations {
    /// Every rotation, in index order.
    All,

    /// A single rotation index.
    Single(usize),
}

/// Color and depth encoders with a head, for one primitive.
struct Branch {
    color: Encoder,
    depth: Encoder,
    head: Head,
}

impl Branch {
    fn build(vb: VarBuilder, config: &ValueModelConfig) -> Result<Self> {
        Ok(Self {
            color: Encoder::build(vb.pp("color"), config.encoder.clone())?,
            depth: Encoder::build(vb.pp("depth"), config.encoder.clone())?,
            head: Head::build(vb.pp("head"), config.head.clone())?,
        })
    }

    /// `(1, 6, s, s)` to `(1, 1, s / stride, s / stride)`.
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let color = self.color.forward(&x.narrow(1, 0, 3)?.contiguous()?)?;
        let depth = self.depth.forward(&x.narrow(1, 3, 3)?.contiguous()?)?;
        self.head.forward(&Tensor::cat(&[&color, &depth], 1)?)
    }
}

/// Symmetric zero padding that makes a grid square and rotation safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Padding {
    /// Side of the padded square.
    size: usize,
    top: usize,
    left: usize,
}

/// Evaluates push and grasp value maps over a heightmap.
///
/// For every rotation index `r` with angle `θ = 2πr / R`, the normalized, padded input
/// is rotated by `-θ`, both primitive branches run on it, and their outputs are
/// rotated back by `θ`, upsampled to the zoomed resolution and cropped to the
/// heightmap grid.
pub struct ValueModel {
    device: Device,
    varmap: VarMap,
    config: ValueModelConfig,
    push: Branch,
    grasp: Branch,
    opt: Optimizer,

    /// `(1, 6, 1, 1)` factors mapping raw channels to normalized ones.
    scale: Tensor,
    shift: Tensor,
}

impl ValueModel {
    /// Constructs [`ValueModel`].
    pub fn build(config: ValueModelConfig, device: Device) -> Result<Self> {
        config.validate()?;
        let varmap = VarMap::new();
        let (push, grasp) = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
            (
                Branch::build(vb.pp("push"), &config)?,
                Branch::build(vb.pp("grasp"), &config)?,
            )
        };
        let opt = config.opt_config.build(varmap.all_vars())?;

        let (scale, shift): (Vec<f32>, Vec<f32>) = (0..STATE_CHANNELS)
            .map(|c| {
                let range = if c < 3 { 255.0 } else { 1.0 };
                let s = 1.0 / (range * config.std[c]);
                (s, -config.mean[c] / config.std[c])
            })
            .unzip();
        let scale = Tensor::from_vec(scale, (1, STATE_CHANNELS, 1, 1), &device)?;
        let shift = Tensor::from_vec(shift, (1, STATE_CHANNELS, 1, 1), &device)?;

        Ok(Self {
            device,
            varmap,
            config,
            push,
            grasp,
            opt,
            scale,
            shift,
        })
    }

    /// Number of rotations.
    pub fn num_rotations(&self) -> usize {
        self.config.num_rotations
    }

    /// Device the model runs on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Angle of a rotation index in radians.
    pub fn angle(&self, rotation: usize) -> f64 {
        rotation as f64 * 2.0 * PI / self.config.num_rotations as f64
    }

    fn padding(&self, rows: usize, cols: usize) -> Padding {
        let side = self.config.zoom * rows.max(cols);
        let div = self.config.size_divisor;
        let size = ((side as f64 * SQRT_2) / div as f64).ceil() as usize * div;
        Padding {
            size,
            top: (size - self.config.zoom * rows) / 2,
            left: (size - self.config.zoom * cols) / 2,
        }
    }

    /// `(rows, cols, 6)` raw state to a `(1, 6, size, size)` normalized, padded input.
    fn preprocess(&self, state: &Tensor, pad: Padding) -> Result<Tensor> {
        let (rows, cols, _) = state.dims3()?;
        let (zr, zc) = (self.config.zoom * rows, self.config.zoom * cols);
        let x = state
            .permute((2, 0, 1))?
            .unsqueeze(0)?
            .contiguous()?
            .upsample_nearest2d(zr, zc)?
            .broadcast_mul(&self.scale)?
            .broadcast_add(&self.shift)?;
        let x = x
            .pad_with_zeros(2, pad.top, pad.size - zr - pad.top)?
            .pad_with_zeros(3, pad.left, pad.size - zc - pad.left)?;
        Ok(x)
    }

    /// Runs both branches on a preprocessed input.
    ///
    /// With `angle = None` no resampling happens at all. Outputs are
    /// `(1, 1, size / zoom, size / zoom)`.
    fn forward_branches(&self, x: &Tensor, angle: Option<f64>) -> Result<(Tensor, Tensor)> {
        let (_, _, size, _) = x.dims4()?;
        let out = size / self.config.zoom;
        let x = match angle {
            Some(a) => rotate(x, -a)?,
            None => x.clone(),
        };
        let finish = |y: Tensor| -> Result<Tensor> {
            let y = match angle {
                Some(a) => rotate(&y, a)?,
                None => y,
            };
            Ok(y.upsample_nearest2d(out, out)?)
        };
        Ok((
            finish(self.push.forward(&x)?)?,
            finish(self.grasp.forward(&x)?)?,
        ))
    }

    fn check_state(&self, state: &Tensor) -> Result<(usize, usize)> {
        match state.dims() {
            &[rows, cols, c] if c == STATE_CHANNELS && rows > 0 && cols > 0 => Ok((rows, cols)),
            dims => Err(ModelError::StateShape(dims.to_vec()).into()),
        }
    }

    fn crop(&self, y: Tensor, pad: Padding, rows: usize, cols: usize) -> Result<Tensor> {
        let zoom = self.config.zoom;
        Ok(y
            .narrow(2, pad.top / zoom, rows)?
            .narrow(3, pad.left / zoom, cols)?
            .squeeze(0)?)
    }

    /// Push and grasp value maps of a `(rows, cols, 6)` state.
    ///
    /// Each map is `(n, rows, cols)` with `n = num_rotations` for [`Rotations::All`]
    /// and `n = 1` for [`Rotations::Single`].
    pub fn evaluate(&self, state: &Tensor, rotations: Rotations) -> Result<(Tensor, Tensor)> {
        let (rows, cols) = self.check_state(state)?;
        let rots: Vec<usize> = match rotations {
            Rotations::All => (0..self.config.num_rotations).collect(),
            Rotations::Single(r) if r < self.config.num_rotations => vec![r],
            Rotations::Single(r) => {
                return Err(ModelError::Rotation(r, self.config.num_rotations).into())
            }
        };

        let pad = self.padding(rows, cols);
        let x = self.preprocess(&state.to_device(&self.device)?, pad)?;
        let mut push = Vec::with_capacity(rots.len());
        let mut grasp = Vec::with_capacity(rots.len());
        for r in rots {
            let (p, g) = self.forward_branches(&x, Some(self.angle(r)))?;
            push.push(p);
            grasp.push(g);
        }

        Ok((
            self.crop(Tensor::cat(&push, 1)?, pad, rows, cols)?,
            self.crop(Tensor::cat(&grasp, 1)?, pad, rows, cols)?,
        ))
    }

    /// Applies a backward step pass.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.opt.backward_step(loss)
    }

    /// Variables of the model.
    pub fn get_varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Saves the variables as safetensors.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Saved value model to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads variables saved with [`ValueModel::save`].
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Loaded value model from {:?}", path.as_ref());
        Ok(())
    }
}
