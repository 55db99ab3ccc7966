//! Session assembly for the `moma` binary.
//!
//! Maps the TOML config onto the simulated backend, runs the one-shot setup
//! sequence, wires the odometry listener into the control loop and drives it
//! with the fixed-cadence runner.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use eyre::{Result, WrapErr};
use moma_config::{Config, SimCfg, StateSourceKind};
use moma_core::config::RunnerCfg;
use moma_core::conversions::{collision_thresholds, frame_setup, gripper_request};
use moma_core::hw_error::map_transport_error;
use moma_core::listener::OdometryListener;
use moma_core::runner::{self, RunSummary, StopReason};
use moma_core::{
    AlignReport, CalibrationReport, ControlLoop, LiveStateSource, MomaError, SimulatedStateSource,
    VelocityProfile,
};
use moma_hardware::model::{BASE_LINK, EE_LINK};
use moma_hardware::{
    ForceFollowingEstimator, JacobianPseudoInverseController, SimParams, SimulatedRobot,
};
use moma_traits::SetupService;
use moma_traits::clock::MonotonicClock;
use serde::Serialize;

use crate::trajectory;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The robot answered a setup call with a refusal.
#[derive(Debug, thiserror::Error)]
#[error("robot refused {call}")]
pub struct SetupRefused {
    pub call: &'static str,
}

/// Command-line overrides for `moma run`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub duration_ms: Option<u64>,
    pub skip_calibration: bool,
    pub align: bool,
    pub trajectory: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct AlignSummary {
    pub actuated: u32,
    pub skipped: u32,
    pub failed: u32,
}

impl From<&AlignReport> for AlignSummary {
    fn from(r: &AlignReport) -> Self {
        Self {
            actuated: r.actuated,
            skipped: r.skipped,
            failed: r.failed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CalibrationSummary {
    pub kept: usize,
    pub rejected: usize,
    pub failed_cycles: usize,
    pub best_direction: Option<[f64; 3]>,
    pub best_score: Option<f64>,
    /// Largest baseline drift between candidates (N).
    pub max_drift: f64,
    pub elapsed_ms: u64,
}

impl From<&CalibrationReport> for CalibrationSummary {
    fn from(r: &CalibrationReport) -> Self {
        let best = r.best();
        Self {
            kept: r.samples.len(),
            rejected: r.rejected,
            failed_cycles: r.failed_cycles,
            best_direction: best.map(|s| [s.direction.x, s.direction.y, s.direction.z]),
            best_score: best.map(|s| s.score),
            max_drift: r.max_drift(),
            elapsed_ms: r.elapsed_ms,
        }
    }
}

/// What `moma run` reports once the session is over.
#[derive(Debug, Serialize)]
pub struct SessionReport {
    pub source: &'static str,
    pub stop: &'static str,
    pub ticks: u64,
    pub published: u64,
    pub failed_safe: u64,
    pub elapsed_ms: u64,
    pub alignment: Option<AlignSummary>,
    pub calibration: Option<CalibrationSummary>,
    /// Door travel along its track at the end of the session (m).
    pub door_progress_m: f64,
    pub trajectory_points: usize,
}

impl SessionReport {
    fn new(summary: &RunSummary, source: &'static str, door_progress_m: f64, points: usize) -> Self {
        Self {
            source,
            stop: stop_reason_name(summary.stop),
            ticks: summary.ticks,
            published: summary.published,
            failed_safe: summary.failed_safe,
            elapsed_ms: summary.elapsed_ms,
            alignment: summary.alignment.as_ref().map(AlignSummary::from),
            calibration: summary.calibration.as_ref().map(CalibrationSummary::from),
            door_progress_m,
            trajectory_points: points,
        }
    }

    pub fn render_human(&self) -> String {
        let mut out = format!(
            "session finished ({}): {} ticks, {} published, {} failed safe in {} ms\n",
            self.stop, self.ticks, self.published, self.failed_safe, self.elapsed_ms
        );
        out.push_str(&format!("state source: {}\n", self.source));
        if let Some(a) = &self.alignment {
            out.push_str(&format!(
                "alignment: {} actuated, {} skipped, {} failed\n",
                a.actuated, a.skipped, a.failed
            ));
        }
        if let Some(c) = &self.calibration {
            out.push_str(&format!(
                "calibration: {} kept, {} rejected, max drift {:.3} N\n",
                c.kept, c.rejected, c.max_drift
            ));
        }
        out.push_str(&format!("door progress: {:.3} m", self.door_progress_m));
        if self.trajectory_points > 0 {
            out.push_str(&format!("\ntrajectory: {} points", self.trajectory_points));
        }
        out
    }
}

pub fn stop_reason_name(stop: StopReason) -> &'static str {
    match stop {
        StopReason::DurationElapsed => "duration elapsed",
        StopReason::Shutdown => "shutdown",
    }
}

/// One simulated control period per published command.
pub fn sim_params(sim: &SimCfg, rate_hz: u32) -> SimParams {
    SimParams {
        dt: 1.0 / f64::from(rate_hz.max(1)),
        door_heading_deg: sim.door_direction_deg,
        resistance: sim.resistance_n,
        stiffness: sim.stiffness,
        contact_damping: sim.contact_damping,
        base_pose: sim.base_pose,
    }
}

fn accepted(call: &'static str, answer: std::result::Result<bool, BoxError>) -> Result<()> {
    match answer {
        Ok(true) => {
            tracing::info!(call, "setup accepted");
            Ok(())
        }
        Ok(false) => Err(eyre::Report::new(SetupRefused { call })),
        Err(e) => {
            Err(eyre::Report::new(map_transport_error(e.as_ref())).wrap_err(format!("{call} failed")))
        }
    }
}

/// Frames, then collision thresholds, then the gripper. Stops at the first
/// refusal.
pub fn setup_robot(robot: &mut dyn SetupService, cfg: &Config) -> Result<()> {
    accepted("set_frames", robot.set_frames(&frame_setup(&cfg.frames)))?;
    accepted(
        "set_collision_behavior",
        robot.set_collision_behavior(&collision_thresholds(&cfg.collision)),
    )?;
    accepted("gripper", robot.gripper(&gripper_request(&cfg.gripper)))?;
    Ok(())
}

pub fn run_session(cfg: &Config, opts: &RunOptions, shutdown: &AtomicBool) -> Result<SessionReport> {
    let simulated = cfg.state_source.kind == StateSourceKind::Simulated;
    if simulated && (cfg.state_source.base_link, cfg.state_source.ee_link) != (BASE_LINK, EE_LINK) {
        return Err(eyre::Report::new(MomaError::Config(format!(
            "the simulated arm model has base link {BASE_LINK} and end-effector link {EE_LINK}, got {} and {}",
            cfg.state_source.base_link, cfg.state_source.ee_link
        ))));
    }

    let (mut robot, odometry_rx) = SimulatedRobot::new(sim_params(&cfg.sim, cfg.runner.rate_hz));
    setup_robot(&mut robot, cfg).wrap_err("robot setup failed")?;

    let mailbox = Arc::new(moma_core::OdometryMailbox::new());
    let listener = OdometryListener::spawn(odometry_rx, mailbox.clone(), MonotonicClock::new());

    let record = cfg.runner.record_trajectory || opts.trajectory.is_some();
    let builder = ControlLoop::builder()
        .with_arm_service(robot.clone())
        .with_publisher(robot.clone())
        .with_controller(JacobianPseudoInverseController::new(
            cfg.sim.damping,
            cfg.sim.base_share,
        ))
        // start-up phases move the arm alone
        .with_init_controller(JacobianPseudoInverseController::new(cfg.sim.damping, 0.0))
        .with_estimator(ForceFollowingEstimator::new(
            cfg.estimator.window,
            cfg.estimator.candidates,
        ))
        .with_mailbox(mailbox)
        .with_profile(VelocityProfile::from(&cfg.profile))
        .with_estimator_cfg((&cfg.estimator).into())
        .with_align((&cfg.alignment).into())
        .with_calibration((&cfg.calibration).into())
        .record_trajectory(record);
    let builder = if simulated {
        builder.with_state_source(SimulatedStateSource::new(
            robot.model(),
            cfg.state_source.base_link,
            cfg.state_source.ee_link,
        ))
    } else {
        builder.with_state_source(LiveStateSource)
    };
    let mut control = builder.build()?;

    let mut runner_cfg = RunnerCfg::from(cfg);
    if let Some(d) = opts.duration_ms {
        runner_cfg.duration_ms = Some(d);
    }
    if opts.skip_calibration {
        runner_cfg.calibrate = false;
    }
    if opts.align {
        runner_cfg.align = true;
    }

    let summary = runner::run(
        &mut control,
        &MonotonicClock::new(),
        &runner_cfg,
        shutdown,
        Some(&listener),
    )?;

    if let Some(path) = &opts.trajectory {
        trajectory::write_csv(path, control.trajectory())
            .wrap_err_with(|| format!("writing trajectory to {}", path.display()))?;
    }

    Ok(SessionReport::new(
        &summary,
        control.source_name(),
        robot.door_progress(),
        control.trajectory().len(),
    ))
}

/// Result of `moma check`.
#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub valid: bool,
    pub state_source: &'static str,
    pub rate_hz: u32,
    /// Switch time of the velocity profile (s).
    pub switch_time: f64,
    pub continuity_gap: f64,
    pub tail_coefficients: [f64; 2],
}

impl CheckReport {
    pub fn render_human(&self) -> String {
        format!(
            "config OK: {} source at {} Hz\nprofile switches at {:.3} s, continuity gap {:.2e}",
            self.state_source, self.rate_hz, self.switch_time, self.continuity_gap
        )
    }
}

/// Validates the velocity profile on top of the config checks.
pub fn check(cfg: &Config) -> Result<CheckReport> {
    let profile = VelocityProfile::from(&cfg.profile);
    let (a1, a2) = profile.tail_coefficients()?;
    let gap = profile.continuity_gap()?;
    profile
        .check_continuity(cfg.profile.continuity_tol)
        .map_err(|e| eyre::Report::new(e).wrap_err("velocity profile check failed"))?;
    Ok(CheckReport {
        valid: true,
        state_source: match cfg.state_source.kind {
            StateSourceKind::Live => "live",
            StateSourceKind::Simulated => "simulated",
        },
        rate_hz: cfg.runner.rate_hz,
        switch_time: cfg.profile.t0,
        continuity_gap: gap,
        tail_coefficients: [a1, a2],
    })
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ProfileSample {
    pub t: f64,
    pub speed: f64,
}

const MAX_PROFILE_SAMPLES: f64 = 1e6;

/// Samples the commanded speed on `[0, until]` every `step` seconds.
pub fn profile_samples(cfg: &Config, until: f64, step: f64) -> Result<Vec<ProfileSample>> {
    if !(step.is_finite() && step > 0.0) {
        eyre::bail!("--step must be > 0");
    }
    if !(until.is_finite() && until >= 0.0) {
        eyre::bail!("--until must be >= 0");
    }
    let count = (until / step).floor();
    if count >= MAX_PROFILE_SAMPLES {
        eyre::bail!("--until/--step asks for more than {MAX_PROFILE_SAMPLES} samples");
    }

    let profile = VelocityProfile::from(&cfg.profile);
    (0..=count as usize)
        .map(|i| {
            let t = i as f64 * step;
            Ok(ProfileSample {
                t,
                speed: profile.speed(t)?,
            })
        })
        .collect()
}
