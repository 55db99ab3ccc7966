//! Exploratory search for the initial push direction.
//!
//! Each candidate from the estimator is probed by moving the end-effector a
//! few cycles along it, measuring the external force, and moving back. The
//! fitness `y = 1 − |f| / |f_baseline|` is the fraction of the resting
//! resistance the motion relieved; only candidates with `y > 0` are handed to
//! the estimator's fit.
//!
//! The return motion is assumed to restore the starting configuration. When
//! it does not (compliant contact, slip), each fresh baseline differs from the
//! first one; the difference is reported as drift and not corrected.

use std::time::Instant;

use moma_traits::estimator::DirectionSample;
use moma_traits::messages::VelocityCommand;
use nalgebra::{Vector3, Vector6};

use crate::error::{MomaError, Result};
use crate::geometry::{EE_DOWN, WORLD_UP, ortho_projection};
use crate::orchestrator::{ControlLoop, ControllerRole};
use crate::state::CycleState;
use eyre::WrapErr;

/// Summary of one calibration run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationReport {
    /// Retained samples, in candidate order.
    pub samples: Vec<DirectionSample>,
    /// Candidates excluded for a non-positive or undefined fitness.
    pub rejected: usize,
    /// Probe cycles that failed and published zero.
    pub failed_cycles: usize,
    /// `| |f_baseline_i| − |f_baseline_0| |` for each candidate after the first.
    pub baseline_drift: Vec<f64>,
    pub elapsed_ms: u64,
}

impl CalibrationReport {
    pub fn best(&self) -> Option<&DirectionSample> {
        self.samples
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
    }

    pub fn max_drift(&self) -> f64 {
        self.baseline_drift.iter().copied().fold(0.0, f64::max)
    }
}

/// Fraction of the baseline resistance removed by the probe; `None` when the
/// baseline is too small for the ratio to mean anything.
pub fn fitness(baseline: &Vector3<f64>, probe: &Vector3<f64>, min_baseline: f64) -> Option<f64> {
    let b = baseline.norm();
    if !(b.is_finite() && b > min_baseline) {
        return None;
    }
    Some(1.0 - probe.norm() / b)
}

/// Horizontal component of the end-effector's down axis in world coordinates.
pub fn true_init_direction(cycle: &CycleState) -> Vector3<f64> {
    ortho_projection(&WORLD_UP) * (cycle.rot_world_ee() * EE_DOWN)
}

impl ControlLoop {
    /// Probe every candidate direction and fit the starting direction.
    pub fn calibrate_initial_direction(&mut self) -> Result<CalibrationReport> {
        let started = Instant::now();
        let cfg = self.calibration_cfg;
        let candidates = self.estimator.initial_directions();
        let mut report = CalibrationReport::default();
        let mut last_good: Option<CycleState> = None;
        tracing::info!(
            candidates = candidates.len(),
            try_velocity = cfg.try_velocity,
            steps = cfg.steps_per_direction,
            "starting initial-direction calibration"
        );

        let mut first_baseline: Option<f64> = None;
        let mut baseline = self.measure_force(&mut last_good);

        for (i, d) in candidates.iter().enumerate() {
            if let Ok(b) = &baseline {
                let magnitude = b.norm();
                match first_baseline {
                    None => first_baseline = Some(magnitude),
                    Some(first) => report.baseline_drift.push((magnitude - first).abs()),
                }
            }

            report.failed_cycles +=
                self.probe(d, cfg.try_velocity, cfg.steps_per_direction, &mut last_good);
            let probe = self.measure_force(&mut last_good);

            let score = match (&baseline, &probe) {
                (Ok(b), Ok(f)) => fitness(b, f, cfg.min_baseline_force),
                _ => None,
            };
            match score {
                Some(y) if y > 0.0 => {
                    tracing::debug!(candidate = i, score = y, "candidate kept");
                    report.samples.push(DirectionSample {
                        direction: Vector3::new(d.x, d.y, 0.0),
                        score: y,
                    });
                }
                other => {
                    tracing::debug!(candidate = i, score = ?other, "candidate rejected");
                    report.rejected += 1;
                }
            }

            report.failed_cycles +=
                self.probe(d, -cfg.try_velocity, cfg.steps_per_direction, &mut last_good);
            baseline = self.measure_force(&mut last_good);
        }

        let cycle = match last_good {
            Some(c) => c,
            None => self
                .acquire()
                .map_err(eyre::Report::new)
                .wrap_err("no valid state to fit the initial direction")?,
        };
        self.estimator.estimate_best_initial_direction(
            &report.samples,
            &cycle.rot_world_ee(),
            &cycle.robot.rot_body_ee(),
        );

        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            kept = report.samples.len(),
            rejected = report.rejected,
            failed_cycles = report.failed_cycles,
            max_drift = report.max_drift(),
            elapsed_ms = report.elapsed_ms,
            "calibration finished"
        );
        Ok(report)
    }

    /// Ground-truth reference: where the end-effector's down axis points in
    /// the horizontal plane. Issues no command.
    pub fn record_true_init_direction(&mut self) -> Result<Vector3<f64>> {
        let cycle = self
            .acquire()
            .map_err(eyre::Report::new)
            .wrap_err("reading state for the true initial direction")?;
        let d = true_init_direction(&cycle);
        tracing::info!(x = d.x, y = d.y, z = d.z, "true initial direction");
        Ok(d)
    }

    fn measure_force(
        &mut self,
        last_good: &mut Option<CycleState>,
    ) -> std::result::Result<Vector3<f64>, MomaError> {
        let cycle = self.acquire()?;
        let f = *cycle.force();
        *last_good = Some(cycle);
        Ok(f)
    }

    /// Drive `steps` cycles along `velocity · d` on the init controller with
    /// the base still; the controller sees `|velocity|` as the commanded
    /// speed. Returns the number of failed cycles.
    fn probe(
        &mut self,
        d: &Vector3<f64>,
        velocity: f64,
        steps: u32,
        last_good: &mut Option<CycleState>,
    ) -> usize {
        let desired = Vector6::new(velocity * d.x, velocity * d.y, velocity * d.z, 0.0, 0.0, 0.0);
        let speed = velocity.abs();
        let mut failed = 0;
        for _ in 0..steps {
            let result = self.acquire().and_then(|cycle| {
                let cmd = self.solve(ControllerRole::Init, &desired, &cycle, speed);
                *last_good = Some(cycle);
                cmd
            });
            match result {
                Ok(cmd) => self.publish(&cmd.without_base()),
                Err(e) => {
                    self.publish(&VelocityCommand::ZERO);
                    failed += 1;
                    tracing::warn!(error = %e, "calibration probe cycle failed");
                }
            }
        }
        failed
    }
}
