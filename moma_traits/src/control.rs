//! Contract of the external whole-body velocity controller.

use nalgebra::{Rotation3, Vector2, Vector3, Vector6};

use crate::{Jacobian, JointVector, MassMatrix};

/// Everything the controller needs for one solve.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerInput {
    pub mass_matrix: MassMatrix,
    /// Coriolis + gravity.
    pub bias: JointVector,
    pub jacobian: Jacobian,
    pub joint_position: JointVector,
    pub joint_velocity: JointVector,
    pub rot_world_body: Rotation3<f64>,
    pub rot_world_ee: Rotation3<f64>,
    pub rot_body_ee: Rotation3<f64>,
    /// End-effector origin expressed in the body frame.
    pub body_to_ee_offset: Vector3<f64>,
    /// Scalar approach speed for this cycle.
    pub speed: f64,
    pub joint_torque: JointVector,
}

/// Solution of one controller step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerOutput {
    pub joint_velocities: JointVector,
    /// Base linear velocity in the body frame (x, y).
    pub base_linear: Vector2<f64>,
    /// Base yaw rate.
    pub base_angular: f64,
}

pub trait Controller {
    /// Solve for actuator velocities realizing `desired_ee_velocity`
    /// (linear xyz then angular xyz, end-effector frame).
    ///
    /// An infeasible or singular problem is reported as an error; the caller
    /// never receives a partial solution.
    fn step(
        &mut self,
        desired_ee_velocity: &Vector6<f64>,
        input: &ControllerInput,
    ) -> Result<ControllerOutput, Box<dyn std::error::Error + Send + Sync>>;
}
