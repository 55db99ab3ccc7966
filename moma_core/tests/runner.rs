use moma_core::config::RunnerCfg;
use moma_core::mocks::{
    PassThroughController, RecordingPublisher, ScriptedArm, StubEstimator, telemetry_with_force,
};
use moma_core::runner::{StopReason, run, wait_ready};
use moma_core::{ControlLoop, LiveStateSource, MomaError};
use moma_traits::clock::ManualClock;
use moma_traits::messages::{OdometrySample, VelocityCommand};
use nalgebra::Vector3;
use std::sync::atomic::AtomicBool;

fn rig() -> (ControlLoop, ScriptedArm, RecordingPublisher) {
    let arm = ScriptedArm::new(telemetry_with_force(Vector3::new(1.0, 0.0, 0.0)));
    let publisher = RecordingPublisher::new();
    let control = ControlLoop::builder()
        .with_state_source(LiveStateSource)
        .with_arm_service(arm.clone())
        .with_publisher(publisher.clone())
        .with_controller(PassThroughController::new())
        .with_estimator(StubEstimator::new(
            Vector3::x(),
            vec![Vector3::x(), Vector3::y()],
        ))
        .build()
        .unwrap();
    (control, arm, publisher)
}

fn cfg() -> RunnerCfg {
    RunnerCfg {
        rate_hz: 100,
        duration_ms: Some(500),
        ready_timeout_ms: 100,
        calibrate: false,
        ..RunnerCfg::default()
    }
}

#[test]
fn runs_for_configured_duration_then_stops() {
    let (mut control, _, publisher) = rig();
    control
        .mailbox()
        .offer(OdometrySample::planar(0.0, 0.0, 0.0));
    let clock = ManualClock::new();
    let shutdown = AtomicBool::new(false);

    let summary = run(&mut control, &clock, &cfg(), &shutdown, None).unwrap();

    assert_eq!(summary.stop, StopReason::DurationElapsed);
    assert_eq!(summary.ticks, 50);
    assert_eq!(summary.published, 50);
    assert_eq!(summary.failed_safe, 0);
    assert_eq!(summary.elapsed_ms, 500);
    assert!(summary.calibration.is_none());
    // one command per tick plus the final stop command
    let cmds = publisher.commands();
    assert_eq!(cmds.len(), 51);
    assert_eq!(cmds.last(), Some(&VelocityCommand::ZERO));
    // speed follows the profile: the first tick runs at t = 0
    assert!(cmds[0].is_zero());
    assert!(cmds[10].joint_velocities[0] > 0.0);
}

#[test]
fn shutdown_flag_stops_before_first_tick() {
    let (mut control, _, publisher) = rig();
    control
        .mailbox()
        .offer(OdometrySample::planar(0.0, 0.0, 0.0));
    let shutdown = AtomicBool::new(true);
    let summary = run(&mut control, &ManualClock::new(), &cfg(), &shutdown, None).unwrap();
    assert_eq!(summary.stop, StopReason::Shutdown);
    assert_eq!(summary.ticks, 0);
    assert_eq!(publisher.commands(), vec![VelocityCommand::ZERO]);
}

#[test]
fn missing_odometry_times_out() {
    let (mut control, arm, publisher) = rig();
    let clock = ManualClock::new();
    let err = run(&mut control, &clock, &cfg(), &AtomicBool::new(false), None).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MomaError>(),
        Some(MomaError::NotReady)
    ));
    assert!(format!("{err}").contains("no base odometry within 100 ms"));
    assert_eq!(arm.requests(), 0);
    assert_eq!(publisher.joint_publishes(), 0);
}

#[test]
fn wait_ready_returns_immediately_when_ready() {
    let (control, _, _) = rig();
    control
        .mailbox()
        .offer(OdometrySample::planar(0.0, 0.0, 0.0));
    wait_ready(&control, &ManualClock::new(), &cfg()).unwrap();
}

#[test]
fn calibration_runs_before_motion() {
    let (mut control, arm, _) = rig();
    control
        .mailbox()
        .offer(OdometrySample::planar(0.0, 0.0, 0.0));
    let cfg = RunnerCfg {
        calibrate: true,
        duration_ms: Some(100),
        ..cfg()
    };
    let summary = run(&mut control, &ManualClock::new(), &cfg, &AtomicBool::new(false), None)
        .unwrap();
    let report = summary.calibration.unwrap();
    // constant force: no candidate relieves anything
    assert!(report.samples.is_empty());
    assert_eq!(report.rejected, 2);
    assert_eq!(summary.ticks, 10);
    // 1 baseline + 2 × (3 out + 1 measure + 3 back + 1 baseline) + 10 ticks
    assert_eq!(arm.requests(), 1 + 2 * 8 + 10);
}

#[test]
fn failing_ticks_are_counted() {
    let (mut control, arm, publisher) = rig();
    control
        .mailbox()
        .offer(OdometrySample::planar(0.0, 0.0, 0.0));
    arm.fail_next(3);
    let summary = run(&mut control, &ManualClock::new(), &cfg(), &AtomicBool::new(false), None)
        .unwrap();
    assert_eq!(summary.failed_safe, 3);
    assert_eq!(summary.published, 47);
    assert!(publisher.commands()[..3].iter().all(VelocityCommand::is_zero));
}
