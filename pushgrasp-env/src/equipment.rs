//! Collaborators of the state machine.
//!
//! The state machine talks to a [`Camera`], a [`Manipulator`] and a [`World`].
//! [`EquipmentConfig`] names an implementation and builds all three at once, so
//! an environment configuration selects its hardware or simulator by a tag.
mod base;
mod sim;
pub use base::{Camera, Equipment, EquipmentConfig, Frame, Manipulator, ObjectId, World};
pub use sim::{SimConfig, Tabletop};
