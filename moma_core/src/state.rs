//! Per-cycle state values produced by a [`StateSource`](crate::source::StateSource).

use moma_traits::control::ControllerInput;
use moma_traits::messages::OdometrySample;
use moma_traits::{Jacobian, JointVector, MassMatrix};
use nalgebra::{Matrix4, Rotation3, Vector3};

use crate::error::MomaError;
use crate::geometry::{pose_transform, rotation_of, translation_block};

/// Arm state in the body frame, all matrices already reshaped.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotState {
    pub joint_position: JointVector,
    pub joint_velocity: JointVector,
    pub joint_effort: JointVector,
    pub mass_matrix: MassMatrix,
    /// Coriolis + gravity.
    pub bias: JointVector,
    /// Body to end-effector Jacobian, linear rows first.
    pub jacobian: Jacobian,
    pub t_body_ee: Matrix4<f64>,
    /// External force in the control frame (push direction positive).
    pub force: Vector3<f64>,
}

impl RobotState {
    pub fn rot_body_ee(&self) -> Rotation3<f64> {
        rotation_of(&self.t_body_ee)
    }

    pub fn body_to_ee_offset(&self) -> Vector3<f64> {
        translation_block(&self.t_body_ee)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaseOdometry {
    pub t_world_body: Matrix4<f64>,
    /// `(vx, vy, 0)`.
    pub linear_velocity: Vector3<f64>,
    /// `(0, 0, wz)`.
    pub angular_velocity: Vector3<f64>,
}

impl BaseOdometry {
    pub fn from_sample(sample: &OdometrySample) -> Result<Self, MomaError> {
        let t_world_body = pose_transform(&sample.position, &sample.orientation)?;
        let [vx, vy] = sample.linear_velocity;
        if !(vx.is_finite() && vy.is_finite() && sample.angular_velocity.is_finite()) {
            return Err(MomaError::Malformed("odometry twist: non-finite entry".into()));
        }
        Ok(Self {
            t_world_body,
            linear_velocity: Vector3::new(vx, vy, 0.0),
            angular_velocity: Vector3::new(0.0, 0.0, sample.angular_velocity),
        })
    }

    pub fn rot_world_body(&self) -> Rotation3<f64> {
        rotation_of(&self.t_world_body)
    }
}

/// The working value of one control cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleState {
    pub robot: RobotState,
    pub odometry: BaseOdometry,
    pub t_world_ee: Matrix4<f64>,
}

impl CycleState {
    pub fn new(robot: RobotState, odometry: BaseOdometry) -> Self {
        let t_world_ee = odometry.t_world_body * robot.t_body_ee;
        Self {
            robot,
            odometry,
            t_world_ee,
        }
    }

    pub fn rot_world_ee(&self) -> Rotation3<f64> {
        rotation_of(&self.t_world_ee)
    }

    pub fn world_ee_position(&self) -> Vector3<f64> {
        translation_block(&self.t_world_ee)
    }

    pub fn force(&self) -> &Vector3<f64> {
        &self.robot.force
    }

    /// Controller bundle for this cycle at the given scalar speed.
    pub fn controller_input(&self, speed: f64) -> ControllerInput {
        ControllerInput {
            mass_matrix: self.robot.mass_matrix,
            bias: self.robot.bias,
            jacobian: self.robot.jacobian,
            joint_position: self.robot.joint_position,
            joint_velocity: self.robot.joint_velocity,
            rot_world_body: self.odometry.rot_world_body(),
            rot_world_ee: self.rot_world_ee(),
            rot_body_ee: self.robot.rot_body_ee(),
            body_to_ee_offset: self.robot.body_to_ee_offset(),
            speed,
            joint_torque: self.robot.joint_effort,
        }
    }
}
