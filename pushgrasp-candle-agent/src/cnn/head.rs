use super::HeadConfig;
use crate::model::SubModel1;
use anyhow::Result;
use candle_core::Tensor;
use candle_nn::{
    conv::Conv2dConfig,
    conv2d,
    sequential::{seq, Sequential},
    Module, VarBuilder,
};

/// Fully convolutional head mapping features to one value per cell.
pub struct Head {
    seq: Sequential,
}

impl SubModel1 for Head {
    type Config = HeadConfig;
    type Input = Tensor;
    type Output = Tensor;

    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self> {
        let mut seq = seq();
        let mut in_channels = config.in_channels;
        for (i, &out_channels) in config.hidden.iter().enumerate() {
            seq = seq
                .add(conv2d(
                    in_channels,
                    out_channels,
                    1,
                    Conv2dConfig::default(),
                    vb.pp(format!("h{}", i + 1)),
                )?)
                .add_fn(|xs| xs.relu());
            in_channels = out_channels;
        }
        let seq = seq.add(conv2d(
            in_channels,
            1,
            1,
            Conv2dConfig::default(),
            vb.pp("out"),
        )?);
        Ok(Self { seq })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        Ok(self.seq.forward(x)?)
    }
}
