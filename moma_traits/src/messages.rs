//! Transport-level message shapes.
//!
//! These mirror what the robot drivers deliver and accept. Matrix payloads are
//! flattened in column-major order, exactly as the arm controller serializes
//! them; `moma_core` is responsible for reshaping them.

use crate::ARM_DOF;

/// One reply of the synchronous arm-state service.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmTelemetry {
    /// Measured joint positions (rad).
    pub position: [f64; ARM_DOF],
    /// Measured joint velocities (rad/s).
    pub velocity: [f64; ARM_DOF],
    /// Measured joint torques (Nm).
    pub effort: [f64; ARM_DOF],
    /// Arm base to raw end-effector, 4x4 column-major (16 values).
    pub body_to_ee: Vec<f64>,
    /// Raw end-effector to stiffness frame, 4x4 column-major (16 values).
    pub ee_to_stiffness: Vec<f64>,
    /// Body Jacobian of the stiffness frame, 6x7 column-major (42 values).
    pub jacobian: Vec<f64>,
    /// Joint-space inertia, 7x7 column-major (49 values).
    pub mass_matrix: Vec<f64>,
    pub coriolis: [f64; ARM_DOF],
    pub gravity: [f64; ARM_DOF],
    /// Estimated external wrench in the stiffness frame as reported by the
    /// driver (reaction of the environment): force xyz then torque xyz.
    pub external_wrench: [f64; 6],
}

/// Asynchronously pushed odometry of the mobile base.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdometrySample {
    /// World position of the base (m).
    pub position: [f64; 3],
    /// World orientation of the base as a quaternion `[x, y, z, w]`.
    pub orientation: [f64; 4],
    /// Planar linear velocity `[x, y]` (m/s).
    pub linear_velocity: [f64; 2],
    /// Yaw rate (rad/s).
    pub angular_velocity: f64,
}

impl OdometrySample {
    /// Base at `(x, y)` on the floor, rotated by `yaw` about the vertical axis, at rest.
    pub fn planar(x: f64, y: f64, yaw: f64) -> Self {
        let half = 0.5 * yaw;
        Self {
            position: [x, y, 0.0],
            orientation: [0.0, 0.0, half.sin(), half.cos()],
            linear_velocity: [0.0, 0.0],
            angular_velocity: 0.0,
        }
    }
}

/// Actuator command for one control cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VelocityCommand {
    pub joint_velocities: [f64; ARM_DOF],
    pub base_linear: [f64; 2],
    pub base_angular: f64,
}

impl VelocityCommand {
    /// The fail-safe command: no joint or base motion.
    pub const ZERO: Self = Self {
        joint_velocities: [0.0; ARM_DOF],
        base_linear: [0.0; 2],
        base_angular: 0.0,
    };

    pub fn zero() -> Self {
        Self::ZERO
    }

    pub fn is_zero(&self) -> bool {
        self.joint_velocities.iter().all(|v| *v == 0.0)
            && self.base_linear.iter().all(|v| *v == 0.0)
            && self.base_angular == 0.0
    }

    /// Same joint motion with the base held still.
    pub fn without_base(mut self) -> Self {
        self.base_linear = [0.0; 2];
        self.base_angular = 0.0;
        self
    }
}

/// Frame registration sent once before motion starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSetup {
    /// Flange to end-effector, 4x4 column-major.
    pub flange_to_ee: [f64; 16],
    /// End-effector to stiffness frame, 4x4 column-major.
    pub ee_to_stiffness: [f64; 16],
}

/// Collision reflex thresholds (nominal).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionThresholds {
    pub lower_torque: [f64; ARM_DOF],
    pub upper_torque: [f64; ARM_DOF],
    pub lower_force: [f64; 6],
    pub upper_force: [f64; 6],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GripperRequest {
    pub width: f64,
    pub speed: f64,
    pub force: f64,
    pub homing: bool,
    pub close: bool,
    pub move_fingers: bool,
}
