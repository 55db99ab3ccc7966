//! Kinematics of the simulated arm.
//!
//! The arm is a Cartesian stand-in for a seven-joint manipulator: joints 0..3
//! translate the end-effector along the body axes, joints 3..6 rotate it, and
//! joint 6 is redundant (a little x translation plus yaw). Its Jacobian is
//! constant, which keeps the pseudo-inverse controller exact.

use moma_traits::{ARM_DOF, Jacobian, JointVector, MassMatrix};
use nalgebra::{Isometry3, Rotation3, SMatrix, Translation3, UnitQuaternion, Vector3};

/// End-effector home position in the body frame.
pub const HOME: Vector3<f64> = Vector3::new(0.5, 0.0, 0.6);

const GRAVITY_TORQUE: [f64; ARM_DOF] = [0.0, -3.2, 0.0, 2.1, 0.0, 0.6, 0.0];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmKinematics {
    linear: SMatrix<f64, 3, ARM_DOF>,
    angular: SMatrix<f64, 3, ARM_DOF>,
}

impl Default for ArmKinematics {
    fn default() -> Self {
        let mut linear = SMatrix::<f64, 3, ARM_DOF>::zeros();
        let mut angular = SMatrix::<f64, 3, ARM_DOF>::zeros();
        for i in 0..3 {
            linear[(i, i)] = 1.0;
            angular[(i, i + 3)] = 1.0;
        }
        linear[(0, 6)] = 0.1;
        angular[(2, 6)] = 0.5;
        Self { linear, angular }
    }
}

impl ArmKinematics {
    /// Body to end-effector pose at joint position `q`.
    pub fn body_to_ee(&self, q: &JointVector) -> Isometry3<f64> {
        let p = HOME + self.linear * q;
        let r = Rotation3::new(self.angular * q);
        Isometry3::from_parts(
            Translation3::from(p),
            UnitQuaternion::from_rotation_matrix(&r),
        )
    }

    /// Body Jacobian, linear rows first. Exact for translation; for rotation
    /// it is the tangent at the home orientation.
    pub fn jacobian(&self) -> Jacobian {
        let mut j = Jacobian::zeros();
        j.fixed_view_mut::<3, ARM_DOF>(0, 0).copy_from(&self.linear);
        j.fixed_view_mut::<3, ARM_DOF>(3, 0).copy_from(&self.angular);
        j
    }

    pub fn mass_matrix(&self) -> MassMatrix {
        let mut m = MassMatrix::identity() * 1.5;
        m[(0, 1)] = 0.2;
        m[(1, 0)] = 0.2;
        m
    }

    pub fn gravity(&self) -> JointVector {
        JointVector::from_column_slice(&GRAVITY_TORQUE)
    }
}
