use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Encoder`](super::Encoder).
///
/// Every entry of `channels` adds a 3x3 convolution of stride 2 followed by a ReLU,
/// so the output stride is `2^channels.len()`.
pub struct EncoderConfig {
    /// Number of input channels.
    pub in_channels: usize,

    /// Output channels of the stages.
    pub channels: Vec<usize>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            channels: vec![16, 32, 64, 64, 128],
        }
    }
}

impl EncoderConfig {
    /// Sets the output channels of the stages.
    pub fn channels(mut self, v: Vec<usize>) -> Self {
        self.channels = v;
        self
    }

    /// Ratio of the input size to the output size.
    pub fn stride(&self) -> usize {
        1 << self.channels.len()
    }

    /// Number of output channels.
    pub fn out_channels(&self) -> usize {
        self.channels.last().copied().unwrap_or(self.in_channels)
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Head`](super::Head).
pub struct HeadConfig {
    /// Number of input channels, the sum of both encoders' outputs.
    pub in_channels: usize,

    /// Channels of the hidden 1x1 convolutions.
    pub hidden: Vec<usize>,
}

impl Default for HeadConfig {
    fn default() -> Self {
        Self {
            in_channels: 256,
            hidden: vec![64],
        }
    }
}

impl HeadConfig {
    /// Sets the channels of the hidden layers.
    pub fn hidden(mut self, v: Vec<usize>) -> Self {
        self.hidden = v;
        self
    }
}
