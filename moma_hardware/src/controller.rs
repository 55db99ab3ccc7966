//! Reference whole-body velocity controller.
//!
//! Damped least squares on the arm Jacobian: `q̇ = Jᵀ (J Jᵀ + λ² I)⁻¹ ẋ`. A
//! configurable share of the planar motion (and yaw) is handed to the base;
//! the arm only realizes what is left after the base's contribution at the
//! end-effector is removed.

use moma_traits::control::{Controller, ControllerInput, ControllerOutput};
use nalgebra::{Matrix6, Vector2, Vector3, Vector6};

use crate::error::HwError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JacobianPseudoInverseController {
    damping: f64,
    base_share: f64,
}

impl Default for JacobianPseudoInverseController {
    fn default() -> Self {
        Self::new(0.01, 0.0)
    }
}

impl JacobianPseudoInverseController {
    /// `base_share` is clamped to `[0, 1]`.
    pub fn new(damping: f64, base_share: f64) -> Self {
        Self {
            damping: damping.abs(),
            base_share: base_share.clamp(0.0, 1.0),
        }
    }

    pub fn base_share(&self) -> f64 {
        self.base_share
    }
}

impl Controller for JacobianPseudoInverseController {
    fn step(
        &mut self,
        desired_ee_velocity: &Vector6<f64>,
        input: &ControllerInput,
    ) -> Result<ControllerOutput, BoxError> {
        if desired_ee_velocity.iter().any(|v| !v.is_finite()) {
            return Err(Box::new(HwError::Infeasible("non-finite desired twist".into())));
        }

        // end-effector frame to body frame
        let linear = input.rot_body_ee * desired_ee_velocity.fixed_rows::<3>(0);
        let angular = input.rot_body_ee * desired_ee_velocity.fixed_rows::<3>(3);

        let base_linear = Vector2::new(linear.x, linear.y) * self.base_share;
        let base_angular = angular.z * self.base_share;
        let base_at_ee = Vector3::new(base_linear.x, base_linear.y, 0.0)
            + Vector3::z().cross(&input.body_to_ee_offset) * base_angular;

        let arm_linear = linear - base_at_ee;
        let arm_angular = angular - Vector3::z() * base_angular;
        let arm_twist = Vector6::new(
            arm_linear.x,
            arm_linear.y,
            arm_linear.z,
            arm_angular.x,
            arm_angular.y,
            arm_angular.z,
        );

        let j = &input.jacobian;
        let gram = j * j.transpose() + Matrix6::identity() * self.damping.powi(2);
        let inverse = gram.try_inverse().ok_or(HwError::Singular)?;
        let joint_velocities = j.transpose() * inverse * arm_twist;
        if joint_velocities.iter().any(|v| !v.is_finite()) {
            return Err(Box::new(HwError::Singular));
        }

        Ok(ControllerOutput {
            joint_velocities,
            base_linear,
            base_angular,
        })
    }
}
