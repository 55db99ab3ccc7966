//! `From` implementations bridging `moma_config` types to `moma_core` types,
//! plus the setup messages built from config sections.

use moma_traits::messages::{CollisionThresholds, FrameSetup, GripperRequest};

use crate::config::{AlignCfg, CalibrationCfg, EstimatorCfg, RunnerCfg};
use crate::profile::VelocityProfile;

// ── VelocityProfile ──────────────────────────────────────────────────────────

impl From<&moma_config::ProfileCfg> for VelocityProfile {
    fn from(c: &moma_config::ProfileCfg) -> Self {
        Self {
            v_init: c.v_init,
            v_final: c.v_final,
            alpha_init: c.alpha_init,
            alpha_final: c.alpha_final,
            t0: c.t0,
            t_conv: c.t_conv,
        }
    }
}

// ── EstimatorCfg ─────────────────────────────────────────────────────────────

impl From<&moma_config::EstimatorCfg> for EstimatorCfg {
    fn from(c: &moma_config::EstimatorCfg) -> Self {
        Self {
            smoothing_gain: c.smoothing_gain,
            smooth: c.smooth,
            mix_coeff: c.mix_coeff,
            angular_gain: c.angular_gain,
        }
    }
}

// ── AlignCfg ─────────────────────────────────────────────────────────────────

impl From<&moma_config::AlignmentCfg> for AlignCfg {
    fn from(c: &moma_config::AlignmentCfg) -> Self {
        Self {
            iterations: c.iterations,
            gain: c.gain,
            theta_des: c.theta_des,
        }
    }
}

// ── CalibrationCfg ───────────────────────────────────────────────────────────

impl From<&moma_config::CalibrationCfg> for CalibrationCfg {
    fn from(c: &moma_config::CalibrationCfg) -> Self {
        Self {
            try_velocity: c.try_velocity,
            steps_per_direction: c.steps_per_direction,
            min_baseline_force: c.min_baseline_force,
        }
    }
}

// ── RunnerCfg ────────────────────────────────────────────────────────────────

/// The runner draws on several sections: cadence from `[runner]`, phase
/// switches from `[alignment]`/`[calibration]`, tolerance from `[profile]`.
impl From<&moma_config::Config> for RunnerCfg {
    fn from(c: &moma_config::Config) -> Self {
        Self {
            rate_hz: c.runner.rate_hz,
            duration_ms: c.runner.duration_ms,
            ready_timeout_ms: c.runner.ready_timeout_ms,
            align: c.alignment.enabled,
            calibrate: c.calibration.enabled,
            odometry_stall_ms: c.runner.odometry_stall_ms,
            continuity_tol: c.profile.continuity_tol,
        }
    }
}

// ── Setup messages ───────────────────────────────────────────────────────────
// Both sides are foreign to this crate, so these are functions, not `From`.

pub fn frame_setup(c: &moma_config::FramesCfg) -> FrameSetup {
    FrameSetup {
        flange_to_ee: c.flange_to_ee,
        ee_to_stiffness: c.ee_to_stiffness,
    }
}

pub fn collision_thresholds(c: &moma_config::CollisionCfg) -> CollisionThresholds {
    CollisionThresholds {
        lower_torque: c.lower_torque,
        upper_torque: c.upper_torque,
        lower_force: c.lower_force,
        upper_force: c.upper_force,
    }
}

pub fn gripper_request(c: &moma_config::GripperCfg) -> GripperRequest {
    GripperRequest {
        width: c.width,
        speed: c.speed,
        force: c.force,
        homing: c.homing,
        close: c.close,
        move_fingers: c.move_fingers,
    }
}
