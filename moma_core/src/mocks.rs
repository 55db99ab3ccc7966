//! Helper collaborators for tests and dry runs.
//!
//! Each mock hands out cheap clones sharing one inner state, so a test can
//! keep a handle for inspection or fault injection after moving the mock into
//! the control loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use moma_traits::control::{Controller, ControllerInput, ControllerOutput};
use moma_traits::estimator::{DirectionEstimator, DirectionSample};
use moma_traits::messages::{ArmTelemetry, VelocityCommand};
use moma_traits::{ARM_DOF, ArmStateService, CommandPublisher, JointVector, MassMatrix};
use nalgebra::{Matrix4, Rotation3, Vector2, Vector3, Vector6};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Arm at rest with identity frames, unit inertia and the given push force.
pub fn telemetry_with_force(force: Vector3<f64>) -> ArmTelemetry {
    let identity = Matrix4::<f64>::identity().as_slice().to_vec();
    ArmTelemetry {
        position: [0.0; ARM_DOF],
        velocity: [0.0; ARM_DOF],
        effort: [0.0; ARM_DOF],
        body_to_ee: identity.clone(),
        ee_to_stiffness: identity,
        jacobian: vec![0.0; 6 * ARM_DOF],
        mass_matrix: MassMatrix::identity().as_slice().to_vec(),
        coriolis: [0.0; ARM_DOF],
        gravity: [0.0; ARM_DOF],
        external_wrench: [-force.x, -force.y, -force.z, 0.0, 0.0, 0.0],
    }
}

// ── Publisher ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Published {
    joints: Vec<[f64; ARM_DOF]>,
    bases: Vec<([f64; 2], f64)>,
}

/// Publisher that records both output channels.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    inner: Arc<Mutex<Published>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands reassembled from the two channels, in publish order.
    pub fn commands(&self) -> Vec<VelocityCommand> {
        let p = lock(&self.inner);
        p.joints
            .iter()
            .zip(&p.bases)
            .map(|(j, (lin, ang))| VelocityCommand {
                joint_velocities: *j,
                base_linear: *lin,
                base_angular: *ang,
            })
            .collect()
    }

    pub fn last(&self) -> Option<VelocityCommand> {
        self.commands().last().copied()
    }

    pub fn joint_publishes(&self) -> usize {
        lock(&self.inner).joints.len()
    }

    pub fn base_publishes(&self) -> usize {
        lock(&self.inner).bases.len()
    }

    pub fn clear(&self) {
        let mut p = lock(&self.inner);
        p.joints.clear();
        p.bases.clear();
    }
}

impl CommandPublisher for RecordingPublisher {
    fn publish_joints(&mut self, velocities: &[f64; ARM_DOF]) -> Result<(), BoxError> {
        lock(&self.inner).joints.push(*velocities);
        Ok(())
    }

    fn publish_base(&mut self, linear: &[f64; 2], angular: f64) -> Result<(), BoxError> {
        lock(&self.inner).bases.push((*linear, angular));
        Ok(())
    }
}

// ── Arm service ──────────────────────────────────────────────────────────────

/// Arm service replying with a settable telemetry sample.
#[derive(Debug, Clone)]
pub struct ScriptedArm {
    telemetry: Arc<Mutex<ArmTelemetry>>,
    fail_next: Arc<AtomicU32>,
    requests: Arc<AtomicU64>,
}

impl ScriptedArm {
    pub fn new(telemetry: ArmTelemetry) -> Self {
        Self {
            telemetry: Arc::new(Mutex::new(telemetry)),
            fail_next: Arc::new(AtomicU32::new(0)),
            requests: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set_telemetry(&self, telemetry: ArmTelemetry) {
        *lock(&self.telemetry) = telemetry;
    }

    /// Make the next `n` requests time out.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }
}

impl ArmStateService for ScriptedArm {
    fn request(&mut self) -> Result<ArmTelemetry, BoxError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let pending = self.fail_next.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next.store(pending - 1, Ordering::SeqCst);
            return Err("arm state service timeout".into());
        }
        Ok(lock(&self.telemetry).clone())
    }
}

// ── Controller ───────────────────────────────────────────────────────────────

/// Controller that maps the desired linear velocity onto the first three
/// joints and the angular part onto the next three.
#[derive(Debug, Clone, Default)]
pub struct PassThroughController {
    fail: Arc<AtomicBool>,
    calls: Arc<AtomicU64>,
    last: Arc<Mutex<Option<(Vector6<f64>, f64)>>>,
}

impl PassThroughController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Desired twist and speed of the last solve.
    pub fn last_request(&self) -> Option<(Vector6<f64>, f64)> {
        *lock(&self.last)
    }
}

impl Controller for PassThroughController {
    fn step(
        &mut self,
        desired: &Vector6<f64>,
        input: &ControllerInput,
    ) -> Result<ControllerOutput, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last) = Some((*desired, input.speed));
        if self.fail.load(Ordering::SeqCst) {
            return Err("qp infeasible".into());
        }
        let mut joint_velocities = JointVector::zeros();
        joint_velocities
            .fixed_rows_mut::<6>(0)
            .copy_from(desired);
        Ok(ControllerOutput {
            joint_velocities,
            base_linear: Vector2::new(desired.x, desired.y) * 0.5,
            base_angular: desired[5],
        })
    }
}

// ── Estimator ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct EstimatorState {
    buffer: VecDeque<Vector3<f64>>,
    buffered: Vec<Vector3<f64>>,
    estimates: Vec<Vector3<f64>>,
    fitted: Option<Vec<DirectionSample>>,
}

/// Estimator that plans `speed` along a fixed direction and records what it
/// is fed.
#[derive(Debug, Clone)]
pub struct StubEstimator {
    state: Arc<Mutex<EstimatorState>>,
    direction: Vector3<f64>,
    candidates: Vec<Vector3<f64>>,
    window: usize,
    fail: Arc<AtomicBool>,
}

impl StubEstimator {
    pub fn new(direction: Vector3<f64>, candidates: Vec<Vector3<f64>>) -> Self {
        Self {
            state: Arc::default(),
            direction,
            candidates,
            window: 4,
            fail: Arc::default(),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Every vector passed to `update_buffers`, in order.
    pub fn buffered(&self) -> Vec<Vector3<f64>> {
        lock(&self.state).buffered.clone()
    }

    /// Every force passed to `update_estimate`, in order.
    pub fn estimates(&self) -> Vec<Vector3<f64>> {
        lock(&self.state).estimates.clone()
    }

    pub fn fitted(&self) -> Option<Vec<DirectionSample>> {
        lock(&self.state).fitted.clone()
    }
}

impl DirectionEstimator for StubEstimator {
    fn oldest_buffered_force(&self) -> Option<Vector3<f64>> {
        lock(&self.state).buffer.front().copied()
    }

    fn update_buffers(&mut self, force: &Vector3<f64>, _world_position: &Vector3<f64>) {
        let mut s = lock(&self.state);
        s.buffer.push_back(*force);
        if s.buffer.len() > self.window {
            s.buffer.pop_front();
        }
        s.buffered.push(*force);
    }

    fn update_estimate(
        &mut self,
        force: &Vector3<f64>,
        _smoothing_gain: f64,
        _rot_world_ee: &Rotation3<f64>,
        _smooth: bool,
        _mix_coeff: f64,
    ) -> Result<(), BoxError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err("estimator diverged".into());
        }
        lock(&self.state).estimates.push(*force);
        Ok(())
    }

    fn planned_velocities(
        &mut self,
        speed: f64,
        _calc_angular: bool,
        _angular_gain: f64,
    ) -> Result<Vector6<f64>, BoxError> {
        let v = self.direction * speed;
        Ok(Vector6::new(v.x, v.y, v.z, 0.0, 0.0, 0.0))
    }

    fn initial_directions(&self) -> Vec<Vector3<f64>> {
        self.candidates.clone()
    }

    fn estimate_best_initial_direction(
        &mut self,
        samples: &[DirectionSample],
        _rot_world_ee: &Rotation3<f64>,
        _rot_body_ee: &Rotation3<f64>,
    ) {
        lock(&self.state).fitted = Some(samples.to_vec());
    }
}
