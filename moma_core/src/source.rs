//! Telemetry normalization.
//!
//! A [`StateSource`] turns one arm reply plus one odometry snapshot into a
//! [`CycleState`]. Two variants exist: [`LiveStateSource`] trusts the arm
//! controller's own kinematics, [`SimulatedStateSource`] recomputes them from
//! a [`KinematicModel`].

use moma_traits::messages::{ArmTelemetry, OdometrySample};
use moma_traits::model::KinematicModel;
use moma_traits::{Jacobian, JointVector, MassMatrix};
use nalgebra::{Matrix4, Vector3};

use crate::error::MomaError;
use crate::geometry::{ensure_finite, matrix_from_column_major};
use crate::hw_error::map_transport_error;
use crate::state::{BaseOdometry, CycleState, RobotState};

pub trait StateSource {
    fn normalize(
        &mut self,
        arm: &ArmTelemetry,
        odometry: &OdometrySample,
    ) -> Result<CycleState, MomaError>;

    fn name(&self) -> &'static str;
}

impl<S: StateSource + ?Sized> StateSource for Box<S> {
    fn normalize(
        &mut self,
        arm: &ArmTelemetry,
        odometry: &OdometrySample,
    ) -> Result<CycleState, MomaError> {
        (**self).normalize(arm, odometry)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// External force in the control frame: the negated force part of the
/// environment's reaction wrench.
fn push_force(arm: &ArmTelemetry) -> Result<Vector3<f64>, MomaError> {
    ensure_finite(&arm.external_wrench, "external wrench")?;
    let w = &arm.external_wrench;
    Ok(-Vector3::new(w[0], w[1], w[2]))
}

fn joints(values: &[f64], what: &str) -> Result<JointVector, MomaError> {
    ensure_finite(values, what)?;
    Ok(JointVector::from_column_slice(values))
}

/// Live normalization of one arm reply.
pub fn normalize_arm(arm: &ArmTelemetry) -> Result<RobotState, MomaError> {
    let t_body_raw: Matrix4<f64> = matrix_from_column_major(&arm.body_to_ee, "body to ee")?;
    let t_raw_stiffness: Matrix4<f64> =
        matrix_from_column_major(&arm.ee_to_stiffness, "ee to stiffness")?;
    let jacobian: Jacobian = matrix_from_column_major(&arm.jacobian, "jacobian")?;
    let mass_matrix: MassMatrix = matrix_from_column_major(&arm.mass_matrix, "mass matrix")?;
    let coriolis = joints(&arm.coriolis, "coriolis")?;
    let gravity = joints(&arm.gravity, "gravity")?;

    Ok(RobotState {
        joint_position: joints(&arm.position, "joint position")?,
        joint_velocity: joints(&arm.velocity, "joint velocity")?,
        joint_effort: joints(&arm.effort, "joint effort")?,
        mass_matrix,
        bias: coriolis + gravity,
        jacobian,
        t_body_ee: t_body_raw * t_raw_stiffness,
        force: push_force(arm)?,
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LiveStateSource;

impl StateSource for LiveStateSource {
    fn normalize(
        &mut self,
        arm: &ArmTelemetry,
        odometry: &OdometrySample,
    ) -> Result<CycleState, MomaError> {
        let robot = normalize_arm(arm)?;
        let odometry = BaseOdometry::from_sample(odometry)?;
        Ok(CycleState::new(robot, odometry))
    }

    fn name(&self) -> &'static str {
        "live"
    }
}

/// Normalization through a kinematic model posed at the measured joints.
///
/// Only joint state and the external wrench are taken from telemetry; the
/// Jacobian, inertia, bias and the body to end-effector transform come from
/// the model.
pub struct SimulatedStateSource<K> {
    model: K,
    base_link: usize,
    ee_link: usize,
}

impl<K: KinematicModel> SimulatedStateSource<K> {
    pub fn new(model: K, base_link: usize, ee_link: usize) -> Self {
        Self {
            model,
            base_link,
            ee_link,
        }
    }

    pub fn model(&self) -> &K {
        &self.model
    }
}

impl<K: KinematicModel> StateSource for SimulatedStateSource<K> {
    fn normalize(
        &mut self,
        arm: &ArmTelemetry,
        odometry: &OdometrySample,
    ) -> Result<CycleState, MomaError> {
        let joint_position = joints(&arm.position, "joint position")?;
        let joint_velocity = joints(&arm.velocity, "joint velocity")?;
        let model_err = |e: Box<dyn std::error::Error + Send + Sync>| map_transport_error(&*e);

        self.model
            .set_joint_state(&joint_position, &joint_velocity)
            .map_err(model_err)?;
        let jacobian = self.model.jacobian(self.ee_link).map_err(model_err)?;
        let mass_matrix = self.model.mass_matrix().map_err(model_err)?;
        let bias = self.model.inverse_dynamics().map_err(model_err)?;
        let world_base = self.model.link_world_pose(self.base_link).map_err(model_err)?;
        let world_ee = self.model.link_world_pose(self.ee_link).map_err(model_err)?;

        let robot = RobotState {
            joint_position,
            joint_velocity,
            joint_effort: joints(&arm.effort, "joint effort")?,
            mass_matrix,
            bias,
            jacobian,
            t_body_ee: (world_base.inverse() * world_ee).to_homogeneous(),
            force: push_force(arm)?,
        };
        let odometry = BaseOdometry::from_sample(odometry)?;
        Ok(CycleState::new(robot, odometry))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
