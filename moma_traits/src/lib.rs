pub mod clock;
pub mod control;
pub mod estimator;
pub mod messages;
pub mod model;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use control::{Controller, ControllerInput, ControllerOutput};
pub use estimator::{DirectionEstimator, DirectionSample};
pub use messages::{
    ArmTelemetry, CollisionThresholds, FrameSetup, GripperRequest, OdometrySample,
    VelocityCommand,
};
pub use model::KinematicModel;

use nalgebra::{SMatrix, SVector};

/// Number of actuated arm joints.
pub const ARM_DOF: usize = 7;

pub type JointVector = SVector<f64, ARM_DOF>;
pub type MassMatrix = SMatrix<f64, ARM_DOF, ARM_DOF>;
/// Linear rows 0..3, angular rows 3..6.
pub type Jacobian = SMatrix<f64, 6, ARM_DOF>;

/// Synchronous arm-state request/response.
pub trait ArmStateService {
    fn request(&mut self) -> Result<ArmTelemetry, Box<dyn std::error::Error + Send + Sync>>;
}

/// Fire-and-forget command outputs. Arm and base are separate channels with no
/// ordering guarantee between them.
pub trait CommandPublisher {
    fn publish_joints(
        &mut self,
        joint_velocities: &[f64; ARM_DOF],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn publish_base(
        &mut self,
        linear: &[f64; 2],
        angular: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// One-shot setup calls issued before motion starts. `Ok(false)` means the
/// robot answered but refused the request.
pub trait SetupService {
    fn set_frames(
        &mut self,
        frames: &FrameSetup,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
    fn set_collision_behavior(
        &mut self,
        thresholds: &CollisionThresholds,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
    fn gripper(
        &mut self,
        request: &GripperRequest,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}
