//! Rotating the end-effector so its z axis lies in the horizontal plane.
//!
//! With `g` the gravity direction expressed in the end-effector frame and
//! `θ = acos(g · z)`, the correction is a pure angular velocity
//! `gain · (π/2 − θ − θ_des) · n`, where `n = z × P_g z` and `P_g` projects
//! onto the plane orthogonal to `g`. It is applied only while
//! `θ ∈ (π/4, 3π/4)`; outside that band the axis is too close to vertical for
//! `n` to be meaningful and the cycle issues no command.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use nalgebra::{Rotation3, Vector3, Vector6};

use crate::geometry::{WORLD_UP, ortho_projection};
use crate::orchestrator::{ControlLoop, ControllerRole};

const BAND_LOW: f64 = FRAC_PI_4;
const BAND_HIGH: f64 = 3.0 * FRAC_PI_4;

/// Outcome counts of an alignment run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlignReport {
    /// Cycles that published a corrective command.
    pub actuated: u32,
    /// Cycles outside the band; nothing was published.
    pub skipped: u32,
    /// Cycles that failed and published zero.
    pub failed: u32,
}

/// Angle between the end-effector z axis and gravity.
pub fn gravity_angle(rot_world_ee: &Rotation3<f64>) -> f64 {
    let g_ee = rot_world_ee.inverse() * (-WORLD_UP);
    g_ee.dot(&Vector3::z()).clamp(-1.0, 1.0).acos()
}

/// Desired twist for one alignment cycle, `None` outside the actuation band.
pub fn alignment_correction(
    rot_world_ee: &Rotation3<f64>,
    gain: f64,
    theta_des: f64,
) -> Option<Vector6<f64>> {
    let theta = gravity_angle(rot_world_ee);
    if theta <= BAND_LOW || theta >= BAND_HIGH {
        return None;
    }
    let g_ee = rot_world_ee.inverse() * (-WORLD_UP);
    let z = Vector3::z();
    let n = z.cross(&(ortho_projection(&g_ee) * z));
    let w = n * (gain * (FRAC_PI_2 - theta - theta_des));
    Some(Vector6::new(0.0, 0.0, 0.0, w.x, w.y, w.z))
}

impl ControlLoop {
    /// Run the configured number of alignment cycles on the init controller
    /// with the base held still.
    pub fn align_z_axis(&mut self) -> AlignReport {
        let cfg = self.align_cfg;
        let mut report = AlignReport::default();
        tracing::info!(iterations = cfg.iterations, gain = cfg.gain, "aligning end-effector z axis");

        for _ in 0..cfg.iterations {
            let cycle = match self.acquire() {
                Ok(c) => c,
                Err(e) => {
                    self.publish(&moma_traits::messages::VelocityCommand::ZERO);
                    report.failed += 1;
                    tracing::warn!(error = %e, "alignment cycle failed");
                    continue;
                }
            };
            let Some(desired) =
                alignment_correction(&cycle.rot_world_ee(), cfg.gain, cfg.theta_des)
            else {
                report.skipped += 1;
                continue;
            };
            match self.solve(ControllerRole::Init, &desired, &cycle, 0.0) {
                Ok(cmd) => {
                    self.publish(&cmd.without_base());
                    report.actuated += 1;
                }
                Err(e) => {
                    self.publish(&moma_traits::messages::VelocityCommand::ZERO);
                    report.failed += 1;
                    tracing::warn!(error = %e, "alignment solve failed");
                }
            }
        }

        tracing::info!(?report, "alignment finished");
        report
    }
}
