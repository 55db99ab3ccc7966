//! Simulated mobile manipulator.
//!
//! Implements the arm-state service, both command channels and the one-shot
//! setup calls on a shared state, so clones handed to different owners
//! (control loop, setup sequence, test) see the same robot. Every published
//! command advances the simulation by one control period. Base odometry is
//! pushed over a channel after each base command, like a driver callback.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, Sender};
use moma_traits::messages::{
    ArmTelemetry, CollisionThresholds, FrameSetup, GripperRequest, OdometrySample,
};
use moma_traits::{ARM_DOF, ArmStateService, CommandPublisher, JointVector, SetupService};
use nalgebra::{
    Isometry3, Matrix3, Matrix4, Rotation3, RowVector4, Translation3, UnitQuaternion, Vector3,
};

use crate::door::DoorModel;
use crate::error::HwError;
use crate::kinematics::ArmKinematics;
use crate::model::SimArmModel;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Widest opening of the simulated gripper (m).
pub const GRIPPER_MAX_WIDTH: f64 = 0.08;
/// Strongest grasp the simulated gripper accepts (N).
pub const GRIPPER_MAX_FORCE: f64 = 70.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimParams {
    /// Simulated time per published command (s).
    pub dt: f64,
    pub door_heading_deg: f64,
    pub resistance: f64,
    pub stiffness: f64,
    /// Contact damping against off-track motion (N·s/m).
    pub contact_damping: f64,
    /// Initial base pose `[x, y, yaw]`.
    pub base_pose: [f64; 3],
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            dt: 0.01,
            door_heading_deg: 30.0,
            resistance: 10.0,
            stiffness: 400.0,
            contact_damping: 60.0,
            base_pose: [0.0; 3],
        }
    }
}

#[derive(Debug)]
struct SimState {
    q: JointVector,
    qdot: JointVector,
    base: [f64; 3],
    base_twist: ([f64; 2], f64),
    flange_to_ee: Isometry3<f64>,
    ee_to_stiffness: Isometry3<f64>,
    door: DoorModel,
    collision: Option<CollisionThresholds>,
    gripper_closed: bool,
    pending_timeouts: u32,
    requests: u64,
}

#[derive(Debug, Clone)]
pub struct SimulatedRobot {
    state: Arc<Mutex<SimState>>,
    kinematics: ArmKinematics,
    dt: f64,
    odometry: Sender<OdometrySample>,
}

fn base_isometry(base: &[f64; 3]) -> Isometry3<f64> {
    Isometry3::new(Vector3::new(base[0], base[1], 0.0), Vector3::z() * base[2])
}

fn odometry_sample(base: &[f64; 3], twist: &([f64; 2], f64)) -> OdometrySample {
    OdometrySample {
        linear_velocity: twist.0,
        angular_velocity: twist.1,
        ..OdometrySample::planar(base[0], base[1], base[2])
    }
}

/// Column-major 4x4 as a rigid transform; `None` unless the rotation block is
/// orthonormal and right-handed and the bottom row is `[0, 0, 0, 1]`.
fn rigid_transform(values: &[f64; 16]) -> Option<Isometry3<f64>> {
    if values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let m = Matrix4::from_column_slice(values);
    let r: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
    let bottom = RowVector4::new(m[(3, 0)], m[(3, 1)], m[(3, 2)], m[(3, 3)]);
    let proper = (r * r.transpose() - Matrix3::identity()).norm() < 1e-6
        && (r.determinant() - 1.0).abs() < 1e-6
        && (bottom - RowVector4::new(0.0, 0.0, 0.0, 1.0)).norm() < 1e-9;
    if !proper {
        return None;
    }
    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
    let translation = Translation3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
    Some(Isometry3::from_parts(translation, rotation))
}

impl SimState {
    fn world_contact(&self, k: &ArmKinematics) -> Isometry3<f64> {
        base_isometry(&self.base) * k.body_to_ee(&self.q) * self.flange_to_ee * self.ee_to_stiffness
    }

    /// World velocity of the flange under the last commands.
    fn world_velocity(&self, k: &ArmKinematics) -> Vector3<f64> {
        let arm = k.jacobian().fixed_rows::<3>(0) * self.qdot;
        let (linear, yaw_rate) = self.base_twist;
        let r = k.body_to_ee(&self.q).translation.vector;
        let base = Vector3::new(linear[0], linear[1], 0.0) + Vector3::z().cross(&r) * yaw_rate;
        base_isometry(&self.base).rotation * (arm + base)
    }

    fn contact_force(&self, k: &ArmKinematics) -> (Isometry3<f64>, Vector3<f64>) {
        let contact = self.world_contact(k);
        let f = self
            .door
            .force(&contact.translation.vector, &self.world_velocity(k));
        (contact, f)
    }
}

impl SimulatedRobot {
    /// A robot at rest in contact with the handle, plus the receiving end of
    /// its odometry stream. The first odometry sample is already queued.
    pub fn new(params: SimParams) -> (Self, Receiver<OdometrySample>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let kinematics = ArmKinematics::default();
        let mut state = SimState {
            q: JointVector::zeros(),
            qdot: JointVector::zeros(),
            base: params.base_pose,
            base_twist: ([0.0; 2], 0.0),
            flange_to_ee: Isometry3::identity(),
            ee_to_stiffness: Isometry3::identity(),
            door: DoorModel::new(
                params.door_heading_deg,
                params.resistance,
                params.stiffness,
                params.contact_damping,
            ),
            collision: None,
            gripper_closed: false,
            pending_timeouts: 0,
            requests: 0,
        };
        state.door.origin = state.world_contact(&kinematics).translation.vector;
        // The receiver is alive, so this cannot fail.
        let _ = tx.send(odometry_sample(&state.base, &state.base_twist));

        let robot = Self {
            state: Arc::new(Mutex::new(state)),
            kinematics,
            dt: params.dt,
            odometry: tx,
        };
        (robot, rx)
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `n` arm-state requests with a timeout.
    pub fn inject_timeouts(&self, n: u32) {
        self.lock().pending_timeouts = n;
    }

    pub fn requests(&self) -> u64 {
        self.lock().requests
    }

    pub fn joint_position(&self) -> JointVector {
        self.lock().q
    }

    pub fn base_pose(&self) -> [f64; 3] {
        self.lock().base
    }

    /// World pose of the control (stiffness) frame.
    pub fn world_contact(&self) -> Isometry3<f64> {
        self.lock().world_contact(&self.kinematics)
    }

    /// Contact force in world coordinates.
    pub fn world_force(&self) -> Vector3<f64> {
        self.lock().contact_force(&self.kinematics).1
    }

    pub fn door(&self) -> DoorModel {
        self.lock().door
    }

    /// How far the handle has been moved along its track (m).
    pub fn door_progress(&self) -> f64 {
        let s = self.lock();
        s.door.progress(&s.world_contact(&self.kinematics).translation.vector)
    }

    pub fn gripper_closed(&self) -> bool {
        self.lock().gripper_closed
    }

    pub fn collision_thresholds(&self) -> Option<CollisionThresholds> {
        self.lock().collision
    }

    /// Kinematic model of this arm with the currently registered frames.
    pub fn model(&self) -> SimArmModel {
        let s = self.lock();
        SimArmModel::new(self.kinematics, s.flange_to_ee * s.ee_to_stiffness)
    }
}

impl ArmStateService for SimulatedRobot {
    fn request(&mut self) -> Result<ArmTelemetry, BoxError> {
        let mut s = self.lock();
        s.requests += 1;
        if s.pending_timeouts > 0 {
            s.pending_timeouts -= 1;
            return Err(Box::new(HwError::Timeout));
        }

        let (contact, f_world) = s.contact_force(&self.kinematics);
        let f = contact.rotation.inverse() * f_world;
        let body_to_ee = (self.kinematics.body_to_ee(&s.q) * s.flange_to_ee).to_homogeneous();
        let gravity = self.kinematics.gravity();

        let mut position = [0.0; ARM_DOF];
        position.copy_from_slice(s.q.as_slice());
        let mut velocity = [0.0; ARM_DOF];
        velocity.copy_from_slice(s.qdot.as_slice());
        let mut gravity_arr = [0.0; ARM_DOF];
        gravity_arr.copy_from_slice(gravity.as_slice());

        Ok(ArmTelemetry {
            position,
            velocity,
            effort: gravity_arr,
            body_to_ee: body_to_ee.as_slice().to_vec(),
            ee_to_stiffness: s.ee_to_stiffness.to_homogeneous().as_slice().to_vec(),
            jacobian: self.kinematics.jacobian().as_slice().to_vec(),
            mass_matrix: self.kinematics.mass_matrix().as_slice().to_vec(),
            coriolis: [0.0; ARM_DOF],
            gravity: gravity_arr,
            // the driver reports the reaction: negated contact force
            external_wrench: [-f.x, -f.y, -f.z, 0.0, 0.0, 0.0],
        })
    }
}

impl CommandPublisher for SimulatedRobot {
    fn publish_joints(&mut self, joint_velocities: &[f64; ARM_DOF]) -> Result<(), BoxError> {
        if joint_velocities.iter().any(|v| !v.is_finite()) {
            return Err(Box::new(HwError::Refused("non-finite joint velocity".into())));
        }
        let qdot = JointVector::from_column_slice(joint_velocities);
        let mut s = self.lock();
        s.q += qdot * self.dt;
        s.qdot = qdot;
        Ok(())
    }

    fn publish_base(&mut self, linear: &[f64; 2], angular: f64) -> Result<(), BoxError> {
        if !(linear.iter().all(|v| v.is_finite()) && angular.is_finite()) {
            return Err(Box::new(HwError::Refused("non-finite base velocity".into())));
        }
        let sample = {
            let mut s = self.lock();
            let (sin, cos) = s.base[2].sin_cos();
            s.base[0] += (cos * linear[0] - sin * linear[1]) * self.dt;
            s.base[1] += (sin * linear[0] + cos * linear[1]) * self.dt;
            s.base[2] += angular * self.dt;
            s.base_twist = (*linear, angular);
            odometry_sample(&s.base, &s.base_twist)
        };
        if self.odometry.send(sample).is_err() {
            tracing::debug!("odometry receiver dropped");
        }
        Ok(())
    }
}

impl SetupService for SimulatedRobot {
    /// Registers the tool frames. Contact is re-established at the new
    /// stiffness frame, so the resting force is unchanged.
    fn set_frames(&mut self, frames: &FrameSetup) -> Result<bool, BoxError> {
        let (Some(flange_to_ee), Some(ee_to_stiffness)) = (
            rigid_transform(&frames.flange_to_ee),
            rigid_transform(&frames.ee_to_stiffness),
        ) else {
            tracing::warn!("frame setup refused: not a rigid transform");
            return Ok(false);
        };
        let mut s = self.lock();
        s.flange_to_ee = flange_to_ee;
        s.ee_to_stiffness = ee_to_stiffness;
        s.door.origin = s.world_contact(&self.kinematics).translation.vector;
        Ok(true)
    }

    fn set_collision_behavior(&mut self, t: &CollisionThresholds) -> Result<bool, BoxError> {
        let ordered = |lower: &[f64], upper: &[f64]| {
            lower
                .iter()
                .zip(upper)
                .all(|(l, u)| l.is_finite() && u.is_finite() && *l >= 0.0 && l <= u)
        };
        if !(ordered(&t.lower_torque, &t.upper_torque) && ordered(&t.lower_force, &t.upper_force))
        {
            tracing::warn!("collision thresholds refused");
            return Ok(false);
        }
        self.lock().collision = Some(*t);
        Ok(true)
    }

    fn gripper(&mut self, request: &GripperRequest) -> Result<bool, BoxError> {
        let valid = (0.0..=GRIPPER_MAX_WIDTH).contains(&request.width)
            && request.speed > 0.0
            && request.force > 0.0
            && request.force <= GRIPPER_MAX_FORCE;
        if !valid {
            tracing::warn!(width = request.width, force = request.force, "gripper request refused");
            return Ok(false);
        }
        if request.move_fingers {
            self.lock().gripper_closed = request.close;
        }
        Ok(true)
    }
}
