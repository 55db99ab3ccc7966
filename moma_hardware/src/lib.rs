//! Simulated backend for the mobile manipulator.
//!
//! A door-handle contact model behind the transport traits, a kinematic model
//! for model-based normalization, and reference implementations of the
//! controller and direction estimator contracts.

pub mod controller;
pub mod door;
pub mod error;
pub mod estimator;
pub mod kinematics;
pub mod model;
pub mod robot;

pub use controller::JacobianPseudoInverseController;
pub use door::DoorModel;
pub use error::HwError;
pub use estimator::ForceFollowingEstimator;
pub use model::SimArmModel;
pub use robot::{SimParams, SimulatedRobot};
