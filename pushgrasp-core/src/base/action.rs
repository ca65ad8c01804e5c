//! Manipulation primitives and actions.
use super::Act;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An atomic manipulator behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Primitive {
    /// Sweep the gripper across the table.
    Push,

    /// Close the gripper around an object and lift it.
    Grasp,
}

impl Primitive {
    /// Returns `true` for [`Primitive::Grasp`].
    pub fn is_grasp(&self) -> bool {
        matches!(self, Self::Grasp)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Grasp => write!(f, "grasp"),
        }
    }
}

/// A primitive located on the heightmap grid.
///
/// `rotation` indexes `num_rotations` equally spaced angles in `[0, 2π)`,
/// `row` and `col` address a heightmap cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Action {
    /// Primitive type.
    pub primitive: Primitive,

    /// Rotation index.
    pub rotation: usize,

    /// Row of the heightmap cell.
    pub row: usize,

    /// Column of the heightmap cell.
    pub col: usize,
}

impl Action {
    /// Constructs an action.
    pub fn new(primitive: Primitive, rotation: usize, row: usize, col: usize) -> Self {
        Self {
            primitive,
            rotation,
            row,
            col,
        }
    }

    /// Angle of the rotation index in radians.
    pub fn angle(&self, num_rotations: usize) -> f64 {
        self.rotation as f64 * 2.0 * std::f64::consts::PI / num_rotations as f64
    }

    /// Rotation index of the same primitive turned by half a revolution.
    pub fn antipodal_rotation(&self, num_rotations: usize) -> usize {
        (self.rotation + num_rotations / 2) % num_rotations
    }
}

impl Act for Action {}
