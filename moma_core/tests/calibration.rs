//! Initial-direction calibration against a synthetic door: the push force is
//! `f0·d* − k·Δp`, so moving along `d*` relieves it the most.

use moma_core::calibration::true_init_direction;
use moma_core::mocks::{PassThroughController, StubEstimator, telemetry_with_force};
use moma_core::config::CalibrationCfg;
use moma_core::{ControlLoop, LiveStateSource};
use moma_traits::messages::{ArmTelemetry, OdometrySample};
use moma_traits::{ARM_DOF, ArmStateService, CommandPublisher};
use nalgebra::Vector3;
use std::f64::consts::FRAC_PI_4;
use std::sync::{Arc, Mutex};

const F0: f64 = 10.0;
const STIFFNESS: f64 = 400.0;

#[derive(Default)]
struct World {
    offset: Vector3<f64>,
    requests: u64,
    fail_at: Vec<u64>,
}

struct DoorArm {
    world: Arc<Mutex<World>>,
    easy: Vector3<f64>,
    f0: f64,
}

impl ArmStateService for DoorArm {
    fn request(&mut self) -> Result<ArmTelemetry, Box<dyn std::error::Error + Send + Sync>> {
        let mut w = self.world.lock().unwrap();
        let n = w.requests;
        w.requests += 1;
        if w.fail_at.contains(&n) {
            return Err("arm state service timeout".into());
        }
        Ok(telemetry_with_force(self.easy * self.f0 - w.offset * STIFFNESS))
    }
}

/// Integrates the first three joint velocities (the pass-through controller
/// puts the desired linear velocity there) over a unit step.
struct IntegratingPublisher {
    world: Arc<Mutex<World>>,
}

impl CommandPublisher for IntegratingPublisher {
    fn publish_joints(
        &mut self,
        v: &[f64; ARM_DOF],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.world.lock().unwrap().offset += Vector3::new(v[0], v[1], v[2]);
        Ok(())
    }

    fn publish_base(
        &mut self,
        _linear: &[f64; 2],
        _angular: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

fn ring(n: usize) -> Vec<Vector3<f64>> {
    (0..n)
        .map(|k| {
            let a = FRAC_PI_4 * k as f64;
            Vector3::new(a.cos(), a.sin(), 0.0)
        })
        .collect()
}

fn door_loop(
    easy: Vector3<f64>,
    f0: f64,
    fail_at: Vec<u64>,
) -> (ControlLoop, StubEstimator, Arc<Mutex<World>>) {
    let (control, estimator, world, _) = door_loop_with_controller(easy, f0, fail_at);
    (control, estimator, world)
}

fn door_loop_with_controller(
    easy: Vector3<f64>,
    f0: f64,
    fail_at: Vec<u64>,
) -> (ControlLoop, StubEstimator, Arc<Mutex<World>>, PassThroughController) {
    let controller = PassThroughController::new();
    let world = Arc::new(Mutex::new(World {
        fail_at,
        ..World::default()
    }));
    let estimator = StubEstimator::new(Vector3::x(), ring(8));
    let control = ControlLoop::builder()
        .with_state_source(LiveStateSource)
        .with_arm_service(DoorArm {
            world: world.clone(),
            easy,
            f0,
        })
        .with_publisher(IntegratingPublisher {
            world: world.clone(),
        })
        .with_controller(controller.clone())
        .with_estimator(estimator.clone())
        .with_calibration(CalibrationCfg::default())
        .build()
        .unwrap();
    control
        .mailbox()
        .offer(OdometrySample::planar(0.0, 0.0, 0.0));
    (control, estimator, world, controller)
}

#[test]
fn best_score_is_nearest_easy_direction() {
    let easy = ring(8)[2];
    let (mut control, estimator, world) = door_loop(easy, F0, vec![]);

    let report = control.calibrate_initial_direction().unwrap();

    let best = report.best().unwrap();
    assert!((best.direction - easy).norm() < 1e-12);
    // 3 steps of 5 mm relieve 6 N of the 10 N baseline
    assert!((best.score - 0.6).abs() < 1e-9);
    // only the candidate itself and its two neighbours relieve anything
    assert_eq!(report.samples.len(), 3);
    assert_eq!(report.rejected, 5);
    assert!(report.samples.iter().all(|s| s.score > 0.0));
    assert_eq!(report.failed_cycles, 0);
    assert!(report.max_drift() < 1e-9);
    // every probe returned to the start
    assert!(world.lock().unwrap().offset.norm() < 1e-12);
    assert_eq!(estimator.fitted(), Some(report.samples.clone()));
}

#[test]
fn probes_request_the_try_velocity_as_speed() {
    let easy = ring(8)[0];
    let (mut control, _, _, controller) = door_loop_with_controller(easy, F0, vec![]);
    let try_velocity = CalibrationCfg::default().try_velocity;

    control.calibrate_initial_direction().unwrap();

    // the last cycle is the return leg of the last candidate
    let (desired, speed) = controller.last_request().unwrap();
    assert_eq!(speed, try_velocity);
    let last = ring(8)[7];
    assert!((desired.fixed_rows::<3>(0) + last * try_velocity).norm() < 1e-12);
}

#[test]
fn zero_baseline_rejects_every_candidate() {
    let (mut control, estimator, _) = door_loop(Vector3::x(), 0.0, vec![]);
    let report = control.calibrate_initial_direction().unwrap();
    assert!(report.samples.is_empty());
    assert_eq!(report.rejected, 8);
    assert_eq!(estimator.fitted(), Some(vec![]));
}

#[test]
fn failed_probe_cycle_is_counted_and_drift_reported() {
    // request 0 is the first baseline, 1..=3 the outward probe of candidate 0
    let (mut control, _, world) = door_loop(Vector3::x(), F0, vec![2]);
    let report = control.calibrate_initial_direction().unwrap();

    assert_eq!(report.failed_cycles, 1);
    // two outward steps still relieve 4 N
    let first = report.samples.first().unwrap();
    assert!((first.direction - Vector3::x()).norm() < 1e-12);
    assert!((first.score - 0.4).abs() < 1e-9);
    // the full return overshoots by one step: 2 N more resistance from then on
    assert!((report.max_drift() - 2.0).abs() < 1e-9);
    assert!((world.lock().unwrap().offset + Vector3::x() * 0.005).norm() < 1e-12);
}

#[test]
fn failed_measurement_excludes_candidate() {
    // request 4 is the force measurement after candidate 0's outward probe
    let (mut control, _, _) = door_loop(Vector3::x(), F0, vec![4]);
    let report = control.calibrate_initial_direction().unwrap();
    assert_eq!(report.failed_cycles, 0);
    assert!(
        report
            .samples
            .iter()
            .all(|s| (s.direction - Vector3::x()).norm() > 1e-9)
    );
    assert_eq!(report.samples.len() + report.rejected, 8);
}

#[test]
fn no_odometry_means_no_state_to_fit() {
    let world = Arc::new(Mutex::new(World::default()));
    let mut control = ControlLoop::builder()
        .with_state_source(LiveStateSource)
        .with_arm_service(DoorArm {
            world: world.clone(),
            easy: Vector3::x(),
            f0: F0,
        })
        .with_publisher(IntegratingPublisher { world })
        .with_controller(PassThroughController::new())
        .with_estimator(StubEstimator::new(Vector3::x(), ring(2)))
        .build()
        .unwrap();
    let err = control.calibrate_initial_direction().unwrap_err();
    assert!(format!("{err:#}").contains("no valid state"));
}

#[test]
fn true_init_direction_is_horizontal_down_axis() {
    let (mut control, _, world) = door_loop(Vector3::x(), F0, vec![]);
    let d = control.record_true_init_direction().unwrap();
    // identity frames: ee down axis is world down, which has no horizontal part
    assert!(d.norm() < 1e-12);
    // read-only: nothing moved
    assert_eq!(world.lock().unwrap().offset, Vector3::zeros());

    let mut t = telemetry_with_force(Vector3::x());
    // ee rotated 90 degrees about y: its z axis points along world +x
    t.body_to_ee = vec![
        0.0, 0.0, -1.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        1.0, 0.0, 0.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ];
    let cycle = moma_core::source::normalize_arm(&t)
        .map(|r| {
            moma_core::CycleState::new(
                r,
                moma_core::BaseOdometry::from_sample(&OdometrySample::planar(0.0, 0.0, 0.0))
                    .unwrap(),
            )
        })
        .unwrap();
    let d = true_init_direction(&cycle);
    assert!((d - Vector3::new(-1.0, 0.0, 0.0)).norm() < 1e-12);
}
