//! Every tick publishes exactly one command on both channels; any failure
//! before the publish turns it into the all-zero command.

use moma_core::mocks::{
    PassThroughController, RecordingPublisher, ScriptedArm, StubEstimator, telemetry_with_force,
};
use moma_core::{
    ControlLoop, CycleStage, LiveStateSource, MomaError, OdometryMailbox, TickOutcome,
};
use moma_traits::messages::{OdometrySample, VelocityCommand};
use nalgebra::Vector3;
use rstest::rstest;
use std::sync::Arc;

struct Rig {
    control: ControlLoop,
    arm: ScriptedArm,
    publisher: RecordingPublisher,
    controller: PassThroughController,
    estimator: StubEstimator,
    mailbox: Arc<OdometryMailbox>,
}

fn rig() -> Rig {
    let arm = ScriptedArm::new(telemetry_with_force(Vector3::new(2.0, 0.0, 0.0)));
    let publisher = RecordingPublisher::new();
    let controller = PassThroughController::new();
    let estimator = StubEstimator::new(Vector3::x(), vec![Vector3::x()]);
    let mailbox = Arc::new(OdometryMailbox::new());
    let control = ControlLoop::builder()
        .with_state_source(LiveStateSource)
        .with_arm_service(arm.clone())
        .with_publisher(publisher.clone())
        .with_controller(controller.clone())
        .with_estimator(estimator.clone())
        .with_mailbox(mailbox.clone())
        .record_trajectory(true)
        .build()
        .expect("build control loop");
    Rig {
        control,
        arm,
        publisher,
        controller,
        estimator,
        mailbox,
    }
}

fn assert_single_zero_publish(publisher: &RecordingPublisher) {
    assert_eq!(publisher.joint_publishes(), 1);
    assert_eq!(publisher.base_publishes(), 1);
    assert_eq!(publisher.last(), Some(VelocityCommand::ZERO));
}

#[test]
fn healthy_tick_publishes_controller_solution() {
    let mut r = rig();
    r.mailbox.offer(OdometrySample::planar(0.0, 0.0, 0.0));

    let outcome = r.control.tick(3.0);
    let expected_speed = r.control.profile().speed(3.0).unwrap();

    let TickOutcome::Published(cmd) = outcome else {
        panic!("expected a published command, got {outcome:?}");
    };
    assert!((cmd.joint_velocities[0] - expected_speed).abs() < 1e-12);
    assert_eq!(r.publisher.last(), Some(cmd));
    let (_, speed) = r.controller.last_request().unwrap();
    assert_eq!(speed, expected_speed);
    assert_eq!(r.control.trajectory().len(), 1);
}

#[test]
fn tick_before_first_odometry_publishes_zero() {
    let mut r = rig();
    let outcome = r.control.tick(0.0);
    assert_eq!(
        outcome,
        TickOutcome::FailedSafe {
            stage: CycleStage::Acquiring,
            error: MomaError::NotReady
        }
    );
    assert_single_zero_publish(&r.publisher);
    // no telemetry is requested and nothing is computed
    assert_eq!(r.arm.requests(), 0);
    assert_eq!(r.controller.calls(), 0);
}

#[test]
fn transport_timeout_publishes_zero() {
    let mut r = rig();
    r.mailbox.offer(OdometrySample::planar(0.0, 0.0, 0.0));
    r.arm.fail_next(1);
    match r.control.tick(1.0) {
        TickOutcome::FailedSafe { stage, error } => {
            assert_eq!(stage, CycleStage::Acquiring);
            assert_eq!(error, MomaError::Timeout);
        }
        other => panic!("expected fail-safe, got {other:?}"),
    }
    assert_single_zero_publish(&r.publisher);
    assert_eq!(r.controller.calls(), 0);
}

#[test]
fn solver_failure_publishes_zero() {
    let mut r = rig();
    r.mailbox.offer(OdometrySample::planar(0.0, 0.0, 0.0));
    r.controller.set_failing(true);
    match r.control.tick(1.0) {
        TickOutcome::FailedSafe { stage, error } => {
            assert_eq!(stage, CycleStage::Dispatching);
            assert!(matches!(error, MomaError::Solver(_)));
        }
        other => panic!("expected fail-safe, got {other:?}"),
    }
    assert_single_zero_publish(&r.publisher);
}

#[test]
fn estimator_failure_publishes_zero() {
    let mut r = rig();
    r.mailbox.offer(OdometrySample::planar(0.0, 0.0, 0.0));
    r.control.tick(0.1); // seeds the history
    r.publisher.clear();
    r.estimator.set_failing(true);
    match r.control.tick(0.2) {
        TickOutcome::FailedSafe { stage, error } => {
            assert_eq!(stage, CycleStage::Computing);
            assert!(matches!(error, MomaError::Estimator(_)));
        }
        other => panic!("expected fail-safe, got {other:?}"),
    }
    assert_single_zero_publish(&r.publisher);
}

#[rstest]
#[case::short_transform(|t: &mut moma_traits::messages::ArmTelemetry| { t.body_to_ee.truncate(15); })]
#[case::nan_mass(|t: &mut moma_traits::messages::ArmTelemetry| { t.mass_matrix[3] = f64::NAN; })]
#[case::inf_wrench(|t: &mut moma_traits::messages::ArmTelemetry| { t.external_wrench[1] = f64::INFINITY; })]
fn malformed_telemetry_publishes_zero(
    #[case] corrupt: fn(&mut moma_traits::messages::ArmTelemetry),
) {
    let mut r = rig();
    r.mailbox.offer(OdometrySample::planar(0.0, 0.0, 0.0));
    let mut t = telemetry_with_force(Vector3::x());
    corrupt(&mut t);
    r.arm.set_telemetry(t);
    match r.control.tick(1.0) {
        TickOutcome::FailedSafe { stage, error } => {
            assert_eq!(stage, CycleStage::Computing);
            assert!(matches!(error, MomaError::Malformed(_)));
        }
        other => panic!("expected fail-safe, got {other:?}"),
    }
    assert_single_zero_publish(&r.publisher);
}

#[test]
fn non_finite_solution_publishes_zero() {
    let mut r = rig();
    r.mailbox.offer(OdometrySample::planar(0.0, 0.0, 0.0));
    // NaN time propagates through the profile into the controller's output
    match r.control.tick(f64::NAN) {
        TickOutcome::FailedSafe { stage, error } => {
            assert_eq!(stage, CycleStage::Dispatching);
            assert!(matches!(error, MomaError::Solver(_)));
        }
        other => panic!("expected fail-safe, got {other:?}"),
    }
    assert_single_zero_publish(&r.publisher);
}

#[test]
fn recovers_after_a_failed_tick() {
    let mut r = rig();
    r.mailbox.offer(OdometrySample::planar(0.0, 0.0, 0.0));
    r.arm.fail_next(1);
    assert!(!r.control.tick(1.0).is_published());
    assert!(r.control.tick(1.01).is_published());
    let stats = r.control.stats();
    assert_eq!((stats.ticks, stats.published, stats.failed_safe), (2, 1, 1));
    assert_eq!(r.publisher.commands().len(), 2);
}

#[test]
fn estimator_is_seeded_then_fed_force_differences() {
    let mut r = rig();
    r.mailbox.offer(OdometrySample::planar(0.0, 0.0, 0.0));
    r.control.tick(0.1);
    r.arm
        .set_telemetry(telemetry_with_force(Vector3::new(5.0, 0.0, 0.0)));
    r.control.tick(0.2);

    let buffered = r.estimator.buffered();
    assert_eq!(buffered[0], Vector3::new(2.0, 0.0, 0.0));
    // second entry is the difference to the oldest buffered force
    assert_eq!(buffered[1], Vector3::new(3.0, 0.0, 0.0));
    // the estimate itself always sees the raw force, and only once history exists
    assert_eq!(r.estimator.estimates(), vec![Vector3::new(5.0, 0.0, 0.0)]);
}

#[test]
fn prepare_for_stop_is_idempotent() {
    let mut r = rig();
    r.mailbox.offer(OdometrySample::planar(0.0, 0.0, 0.0));
    r.control.tick(1.0);
    let stats = r.control.stats();
    let trajectory = r.control.trajectory().to_vec();
    r.publisher.clear();

    r.control.prepare_for_stop();
    r.control.prepare_for_stop();

    assert_eq!(
        r.publisher.commands(),
        vec![VelocityCommand::ZERO, VelocityCommand::ZERO]
    );
    assert_eq!(r.control.stats(), stats);
    assert_eq!(r.control.trajectory(), trajectory.as_slice());
    assert_eq!(r.arm.requests(), 1);
}
