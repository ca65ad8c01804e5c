//! Epsilon-greedy arbitration between push and grasp.
use ndarray::Array3;
use pushgrasp_core::{Action, Primitive};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Push and grasp value maps of one state, both `(rotations, rows, cols)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueMaps {
    /// Push values.
    pub push: Array3<f32>,

    /// Grasp values.
    pub grasp: Array3<f32>,
}

impl ValueMaps {
    /// Values of a primitive.
    pub fn of(&self, primitive: Primitive) -> &Array3<f32> {
        match primitive {
            Primitive::Push => &self.push,
            Primitive::Grasp => &self.grasp,
        }
    }

    /// Index and value of the first maximum, scanning rotations, then rows, then columns.
    ///
    /// NaN never wins.
    pub fn argmax(&self, primitive: Primitive) -> ([usize; 3], f32) {
        let mut best = ([0, 0, 0], f32::NEG_INFINITY);
        for ((r, i, j), &v) in self.of(primitive).indexed_iter() {
            if v > best.1 {
                best = ([r, i, j], v);
            }
        }
        best
    }
}

/// Epsilon-greedy explorer.
///
/// The exploration rate is a pure function of the optimization count,
/// `max(min_explore, base_explore * decay^iteration)`. With probability epsilon the
/// primitive is chosen uniformly; the rotation and the pixel always come from the
/// arg-max of the chosen primitive's map.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct EpsilonGreedy {
    /// Exploration rate at iteration 0.
    pub base_explore: f64,

    /// Lower bound of the exploration rate.
    pub min_explore: f64,

    /// Multiplicative decay per iteration.
    pub decay: f64,
}

impl Default for EpsilonGreedy {
    fn default() -> Self {
        Self {
            base_explore: 0.5,
            min_explore: 0.1,
            decay: 0.9998,
        }
    }
}

impl EpsilonGreedy {
    /// Exploration rate after `iteration` optimization steps.
    pub fn epsilon(&self, iteration: usize) -> f64 {
        let e = self.base_explore * self.decay.powi(iteration.min(i32::MAX as usize) as i32);
        e.max(self.min_explore)
    }

    /// Chooses an action from the value maps.
    ///
    /// Greedily, grasp is taken unless the push maximum is strictly larger.
    pub fn choose<R: Rng>(&self, maps: &ValueMaps, epsilon: f64, rng: &mut R) -> Action {
        let primitive = if rng.gen::<f64>() < epsilon {
            if rng.gen::<bool>() {
                Primitive::Push
            } else {
                Primitive::Grasp
            }
        } else {
            let (_, push) = maps.argmax(Primitive::Push);
            let (_, grasp) = maps.argmax(Primitive::Grasp);
            if push > grasp {
                Primitive::Push
            } else {
                Primitive::Grasp
            }
        };
        let ([rotation, row, col], _) = maps.argmax(primitive);
        Action::new(primitive, rotation, row, col)
    }
}
