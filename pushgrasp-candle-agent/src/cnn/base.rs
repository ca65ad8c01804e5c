use super::EncoderConfig;
use crate::model::SubModel1;
use anyhow::Result;
use candle_core::Tensor;
use candle_nn::{
    conv::Conv2dConfig,
    conv2d,
    sequential::{seq, Sequential},
    Module, VarBuilder,
};

/// Strided convolutional feature extractor.
pub struct Encoder {
    seq: Sequential,
}

impl Encoder {
    fn stage_config() -> Conv2dConfig {
        Conv2dConfig {
            stride: 2,
            padding: 1,
            ..Default::default()
        }
    }

    fn create_net(vb: &VarBuilder, config: &EncoderConfig) -> Result<Sequential> {
        let mut seq = seq();
        let mut in_channels = config.in_channels;
        for (i, &out_channels) in config.channels.iter().enumerate() {
            seq = seq
                .add(conv2d(
                    in_channels,
                    out_channels,
                    3,
                    Self::stage_config(),
                    vb.pp(format!("c{}", i + 1)),
                )?)
                .add_fn(|xs| xs.relu());
            in_channels = out_channels;
        }
        Ok(seq)
    }
}

impl SubModel1 for Encoder {
    type Config = EncoderConfig;
    type Input = Tensor;
    type Output = Tensor;

    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self> {
        Ok(Self {
            seq: Self::create_net(&vb, &config)?,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        Ok(self.seq.forward(x)?)
    }
}
