//! Value model and agent for push-grasp learning, implemented with
//! [candle](https://crates.io/crates/candle-core).
//!
//! * [`vpg::ValueModel`] evaluates rotation-augmented push and grasp value maps over a
//!   heightmap.
//! * [`vpg::EpsilonGreedy`] arbitrates between the two primitives.
//! * [`vpg::Vpg`] ties both to the temporal-difference learner and implements
//!   [`pushgrasp_core::Agent`].
pub mod cnn;
mod error;
pub mod model;
pub mod opt;
pub mod util;
pub mod vpg;
pub use error::ModelError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The main GPU device.
    Cuda(usize),
}

impl Device {
    /// Opens the candle device.
    pub fn open(self) -> candle_core::Result<candle_core::Device> {
        match self {
            Self::Cpu => Ok(candle_core::Device::Cpu),
            Self::Cuda(n) => candle_core::Device::new_cuda(n),
        }
    }
}
