//! Convolutional building blocks of the value model.
mod base;
mod config;
mod head;
pub use base::Encoder;
pub use config::{EncoderConfig, HeadConfig};
pub use head::Head;
