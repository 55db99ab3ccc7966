//! Kinematic/dynamic model queried by the simulated state source.

use nalgebra::Isometry3;

use crate::{Jacobian, JointVector, MassMatrix};

/// A robot model that can be re-posed and queried, e.g. a physics engine
/// loaded from a URDF. Links are addressed by the model's own indices.
pub trait KinematicModel {
    /// Re-pose the model at the given joint state.
    fn set_joint_state(
        &mut self,
        position: &JointVector,
        velocity: &JointVector,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Jacobian of `link` at the current pose (linear rows first).
    fn jacobian(&self, link: usize) -> Result<Jacobian, Box<dyn std::error::Error + Send + Sync>>;

    fn mass_matrix(&self) -> Result<MassMatrix, Box<dyn std::error::Error + Send + Sync>>;

    /// Joint torques at the current state with zero acceleration
    /// (coriolis + gravity).
    fn inverse_dynamics(&self) -> Result<JointVector, Box<dyn std::error::Error + Send + Sync>>;

    /// World pose of `link` from forward kinematics.
    fn link_world_pose(
        &self,
        link: usize,
    ) -> Result<Isometry3<f64>, Box<dyn std::error::Error + Send + Sync>>;
}
