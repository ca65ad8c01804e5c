//! Optimizers.
use anyhow::Result;
use candle_core::{Tensor, Var};
use candle_nn::{AdamW, Optimizer as _, ParamsAdamW};
use candle_optimisers::{
    adam::{Adam, ParamsAdam},
    esgd::{ParamsSGD, SGD},
    Decay, Momentum,
};
use serde::{Deserialize, Serialize};

/// Configuration of optimizer for training the value model.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum OptimizerConfig {
    /// Stochastic gradient descent with classical momentum and weight decay.
    Sgd {
        /// Learning rate.
        lr: f64,
        /// Momentum.
        #[serde(default)]
        momentum: f64,
        /// L2 weight decay.
        #[serde(default)]
        weight_decay: f64,
    },

    /// AdamW optimizer.
    AdamW {
        /// Learning rate.
        lr: f64,
        /// Weight decay.
        #[serde(default = "default_weight_decay")]
        weight_decay: f64,
    },

    /// Adam optimizer.
    Adam {
        /// Learning rate.
        lr: f64,
    },
}

fn default_weight_decay() -> f64 {
    ParamsAdamW::default().weight_decay
}

impl OptimizerConfig {
    /// Constructs the optimizer over `vars`.
    pub fn build(&self, vars: Vec<Var>) -> Result<Optimizer> {
        match &self {
            OptimizerConfig::Sgd {
                lr,
                momentum,
                weight_decay,
            } => {
                let params = ParamsSGD {
                    lr: *lr,
                    momentum: (*momentum > 0.0).then(|| Momentum::Classical(*momentum)),
                    weight_decay: (*weight_decay > 0.0).then(|| Decay::WeightDecay(*weight_decay)),
                    ..ParamsSGD::default()
                };
                Ok(Optimizer::Sgd(SGD::new(vars, params)?))
            }
            OptimizerConfig::AdamW { lr, weight_decay } => {
                let params = ParamsAdamW {
                    lr: *lr,
                    weight_decay: *weight_decay,
                    ..ParamsAdamW::default()
                };
                Ok(Optimizer::AdamW(AdamW::new(vars, params)?))
            }
            OptimizerConfig::Adam { lr } => {
                let params = ParamsAdam {
                    lr: *lr,
                    ..ParamsAdam::default()
                };
                Ok(Optimizer::Adam(Adam::new(vars, params)?))
            }
        }
    }

    /// Override learning rate.
    pub fn learning_rate(self, lr: f64) -> Self {
        match self {
            Self::Sgd {
                momentum,
                weight_decay,
                ..
            } => Self::Sgd {
                lr,
                momentum,
                weight_decay,
            },
            Self::AdamW { weight_decay, .. } => Self::AdamW { lr, weight_decay },
            Self::Adam { .. } => Self::Adam { lr },
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::Sgd {
            lr: 1e-4,
            momentum: 0.9,
            weight_decay: 2e-5,
        }
    }
}

/// Optimizers.
pub enum Optimizer {
    /// SGD optimizer.
    Sgd(SGD),

    /// AdamW optimizer.
    AdamW(AdamW),

    /// Adam optimizer.
    Adam(Adam),
}

impl Optimizer {
    /// Applies a backward step pass.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        match self {
            Self::Sgd(opt) => Ok(opt.backward_step(loss)?),
            Self::AdamW(opt) => Ok(opt.backward_step(loss)?),
            Self::Adam(opt) => Ok(opt.backward_step(loss)?),
        }
    }
}
