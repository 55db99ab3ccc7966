use moma_hardware::model::{BASE_LINK, EE_LINK};
use moma_hardware::{HwError, SimParams, SimulatedRobot};
use moma_traits::messages::{CollisionThresholds, FrameSetup, GripperRequest};
use moma_traits::{
    ARM_DOF, ArmStateService, CommandPublisher, JointVector, KinematicModel, SetupService,
};
use nalgebra::{Matrix4, Translation3, Vector3};
use rstest::rstest;

fn robot() -> SimulatedRobot {
    SimulatedRobot::new(SimParams::default()).0
}

fn wrench_force(robot: &mut SimulatedRobot) -> Vector3<f64> {
    let t = robot.request().expect("telemetry");
    -Vector3::new(t.external_wrench[0], t.external_wrench[1], t.external_wrench[2])
}

fn identity16() -> [f64; 16] {
    let mut m = [0.0; 16];
    m.copy_from_slice(Matrix4::<f64>::identity().as_slice());
    m
}

fn thresholds() -> CollisionThresholds {
    CollisionThresholds {
        lower_torque: [20.0; ARM_DOF],
        upper_torque: [40.0; ARM_DOF],
        lower_force: [10.0; 6],
        upper_force: [30.0; 6],
    }
}

#[test]
fn first_odometry_sample_is_queued() {
    let params = SimParams {
        base_pose: [1.0, 2.0, 0.5],
        ..SimParams::default()
    };
    let (_robot, rx) = SimulatedRobot::new(params);
    let sample = rx.try_recv().expect("initial odometry");
    assert_eq!(sample.position, [1.0, 2.0, 0.0]);
    assert!((sample.orientation[2] - 0.25f64.sin()).abs() < 1e-12);
}

#[test]
fn resting_force_is_the_preload_along_the_track() {
    let mut robot = robot();
    let f = wrench_force(&mut robot);
    let a = 30f64.to_radians();
    assert!((f - Vector3::new(a.cos(), a.sin(), 0.0) * 10.0).norm() < 1e-9);
}

#[test]
fn joint_commands_move_the_end_effector() {
    let mut robot = robot();
    let before = robot.world_contact().translation.vector;
    let mut qdot = [0.0; ARM_DOF];
    qdot[0] = 1.0;
    robot.publish_joints(&qdot).unwrap();
    let after = robot.world_contact().translation.vector;
    assert!((after - before - Vector3::new(0.01, 0.0, 0.0)).norm() < 1e-12);
    assert_eq!(robot.request().unwrap().velocity, qdot);
}

#[rstest]
#[case(0.0, true)]
#[case(90.0, false)]
#[case(180.0, false)]
fn short_probe_relieves_only_near_the_track(#[case] heading_deg: f64, #[case] relieved: bool) {
    let mut robot = robot();
    let baseline = wrench_force(&mut robot).norm();
    // unit joint velocity along the probe heading, relative to the track
    let a = (30.0 + heading_deg).to_radians();
    let mut qdot = [0.0; ARM_DOF];
    qdot[0] = 0.005 * a.cos();
    qdot[1] = 0.005 * a.sin();
    for _ in 0..3 {
        robot.publish_joints(&qdot).unwrap();
    }
    let probed = wrench_force(&mut robot).norm();
    assert_eq!(probed < baseline, relieved, "baseline {baseline}, probed {probed}");
}

#[test]
fn base_commands_push_odometry() {
    let (mut robot, rx) = SimulatedRobot::new(SimParams::default());
    rx.try_recv().unwrap();
    robot.publish_base(&[1.0, 0.0], 0.5).unwrap();
    let sample = rx.try_recv().expect("odometry after base command");
    assert!((sample.position[0] - 0.01).abs() < 1e-12);
    assert_eq!(sample.linear_velocity, [1.0, 0.0]);
    assert_eq!(sample.angular_velocity, 0.5);
    assert!((robot.base_pose()[2] - 0.005).abs() < 1e-12);
}

#[test]
fn base_commands_survive_a_dropped_receiver() {
    let (mut robot, rx) = SimulatedRobot::new(SimParams::default());
    drop(rx);
    assert!(robot.publish_base(&[0.1, 0.0], 0.0).is_ok());
}

#[test]
fn injected_timeouts_fail_then_recover() {
    let mut robot = robot();
    robot.inject_timeouts(2);
    for _ in 0..2 {
        let err = robot.request().unwrap_err();
        assert!(matches!(err.downcast_ref::<HwError>(), Some(HwError::Timeout)));
    }
    assert!(robot.request().is_ok());
    assert_eq!(robot.requests(), 3);
}

#[test]
fn non_finite_commands_are_refused() {
    let mut robot = robot();
    let mut qdot = [0.0; ARM_DOF];
    qdot[4] = f64::INFINITY;
    assert!(robot.publish_joints(&qdot).is_err());
    assert!(robot.publish_base(&[f64::NAN, 0.0], 0.0).is_err());
    assert_eq!(robot.joint_position(), JointVector::zeros());
}

#[test]
fn frames_re_anchor_the_contact() {
    let mut robot = robot();
    let before = wrench_force(&mut robot);
    let mut tool = [0.0; 16];
    tool.copy_from_slice(Translation3::new(0.0, 0.0, 0.1034).to_homogeneous().as_slice());
    let frames = FrameSetup {
        flange_to_ee: tool,
        ee_to_stiffness: identity16(),
    };
    assert!(robot.set_frames(&frames).unwrap());
    assert!((wrench_force(&mut robot) - before).norm() < 1e-9);
    let contact = robot.world_contact().translation.vector;
    assert!((contact.z - 0.7034).abs() < 1e-12);
}

#[test]
fn non_rigid_frames_are_refused() {
    let mut robot = robot();
    let mut scaled = identity16();
    scaled[0] = 2.0;
    let frames = FrameSetup {
        flange_to_ee: scaled,
        ee_to_stiffness: identity16(),
    };
    assert!(!robot.set_frames(&frames).unwrap());
}

#[test]
fn collision_thresholds_must_be_ordered() {
    let mut robot = robot();
    let mut t = thresholds();
    assert!(robot.set_collision_behavior(&t).unwrap());
    assert_eq!(robot.collision_thresholds(), Some(t));
    t.lower_force[2] = 50.0;
    assert!(!robot.set_collision_behavior(&t).unwrap());
}

#[rstest]
#[case(0.02, 40.0, true)]
#[case(0.2, 40.0, false)]
#[case(0.02, 0.0, false)]
#[case(0.02, 100.0, false)]
fn gripper_limits(#[case] width: f64, #[case] force: f64, #[case] accepted: bool) {
    let mut robot = robot();
    let request = GripperRequest {
        width,
        speed: 0.1,
        force,
        homing: true,
        close: true,
        move_fingers: true,
    };
    assert_eq!(robot.gripper(&request).unwrap(), accepted);
    assert_eq!(robot.gripper_closed(), accepted);
}

#[test]
fn model_agrees_with_telemetry() {
    let mut robot = robot();
    let mut qdot = [0.0; ARM_DOF];
    qdot[1] = 0.3;
    qdot[5] = 0.8;
    robot.publish_joints(&qdot).unwrap();
    let t = robot.request().unwrap();
    let reported = Matrix4::from_column_slice(&t.body_to_ee)
        * Matrix4::from_column_slice(&t.ee_to_stiffness);

    let mut model = robot.model();
    let q = JointVector::from_column_slice(&t.position);
    model.set_joint_state(&q, &JointVector::zeros()).unwrap();
    let base = model.link_world_pose(BASE_LINK).unwrap();
    let ee = model.link_world_pose(EE_LINK).unwrap();
    let modelled = (base.inverse() * ee).to_homogeneous();
    assert!((reported - modelled).norm() < 1e-12);
    assert_eq!(
        model.jacobian(EE_LINK).unwrap().as_slice(),
        t.jacobian.as_slice()
    );
}
