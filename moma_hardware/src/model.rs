//! [`KinematicModel`] of the simulated arm, for model-based normalization.

use moma_traits::model::KinematicModel;
use moma_traits::{Jacobian, JointVector, MassMatrix};
use nalgebra::Isometry3;

use crate::error::HwError;
use crate::kinematics::ArmKinematics;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Link index of the mobile base.
pub const BASE_LINK: usize = 0;
/// Link index of the control frame at the tool tip.
pub const EE_LINK: usize = 1;

/// The arm posed at the last joint state it was given. The model's world is
/// the base frame; the base itself sits at the identity.
#[derive(Debug, Clone)]
pub struct SimArmModel {
    kinematics: ArmKinematics,
    tool: Isometry3<f64>,
    q: JointVector,
}

impl SimArmModel {
    /// `tool` maps the flange to the control frame.
    pub fn new(kinematics: ArmKinematics, tool: Isometry3<f64>) -> Self {
        Self {
            kinematics,
            tool,
            q: JointVector::zeros(),
        }
    }

    fn check_link(link: usize) -> Result<(), BoxError> {
        if link == BASE_LINK || link == EE_LINK {
            Ok(())
        } else {
            Err(Box::new(HwError::Unavailable(format!("no link with index {link}"))))
        }
    }
}

impl KinematicModel for SimArmModel {
    fn set_joint_state(
        &mut self,
        position: &JointVector,
        velocity: &JointVector,
    ) -> Result<(), BoxError> {
        if position.iter().chain(velocity.iter()).any(|v| !v.is_finite()) {
            return Err(Box::new(HwError::Refused("non-finite joint state".into())));
        }
        self.q = *position;
        Ok(())
    }

    fn jacobian(&self, link: usize) -> Result<Jacobian, BoxError> {
        Self::check_link(link)?;
        if link == BASE_LINK {
            return Ok(Jacobian::zeros());
        }
        Ok(self.kinematics.jacobian())
    }

    fn mass_matrix(&self) -> Result<MassMatrix, BoxError> {
        Ok(self.kinematics.mass_matrix())
    }

    fn inverse_dynamics(&self) -> Result<JointVector, BoxError> {
        // No coriolis term: the simulated joints are decoupled.
        Ok(self.kinematics.gravity())
    }

    fn link_world_pose(&self, link: usize) -> Result<Isometry3<f64>, BoxError> {
        Self::check_link(link)?;
        if link == BASE_LINK {
            return Ok(Isometry3::identity());
        }
        Ok(self.kinematics.body_to_ee(&self.q) * self.tool)
    }
}
