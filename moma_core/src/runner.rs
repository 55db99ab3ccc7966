//! Fixed-cadence session driver.
//!
//! Phases: wait for the first odometry sample, optionally align and
//! calibrate, then tick the force-guided loop at `rate_hz` until the duration
//! elapses or the shutdown flag is raised. The stop command is published on
//! every exit path once the loop has been entered.

use std::sync::atomic::{AtomicBool, Ordering};

use moma_traits::clock::Clock;

use crate::align::AlignReport;
use crate::calibration::CalibrationReport;
use crate::config::RunnerCfg;
use crate::error::{MomaError, Result};
use crate::listener::OdometryListener;
use crate::orchestrator::ControlLoop;
use crate::util::period;

/// Why the force-guided phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    DurationElapsed,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub published: u64,
    pub failed_safe: u64,
    pub alignment: Option<AlignReport>,
    pub calibration: Option<CalibrationReport>,
    pub stop: StopReason,
    /// Length of the force-guided phase.
    pub elapsed_ms: u64,
}

/// Block until odometry is available, polling at the tick period.
pub fn wait_ready(control: &ControlLoop, clock: &dyn Clock, cfg: &RunnerCfg) -> Result<()> {
    let start = clock.now();
    let tick = period(cfg.rate_hz);
    while !control.is_ready() {
        if clock.ms_since(start) >= cfg.ready_timeout_ms {
            return Err(eyre::Report::new(MomaError::NotReady).wrap_err(format!(
                "no base odometry within {} ms",
                cfg.ready_timeout_ms
            )));
        }
        clock.sleep(tick);
    }
    Ok(())
}

pub fn run(
    control: &mut ControlLoop,
    clock: &dyn Clock,
    cfg: &RunnerCfg,
    shutdown: &AtomicBool,
    odometry: Option<&OdometryListener>,
) -> Result<RunSummary> {
    if let Err(e) = control.profile().check_continuity(cfg.continuity_tol) {
        tracing::warn!(error = %e, "velocity profile is discontinuous at the switch time");
    }

    wait_ready(control, clock, cfg)?;
    tracing::info!(source = control.source_name(), "base odometry ready");

    let alignment = if cfg.align && !shutdown.load(Ordering::Relaxed) {
        Some(control.align_z_axis())
    } else {
        None
    };

    let calibration = if cfg.calibrate && !shutdown.load(Ordering::Relaxed) {
        match control.calibrate_initial_direction() {
            Ok(report) => Some(report),
            Err(e) => {
                control.prepare_for_stop();
                return Err(e.wrap_err("initial-direction calibration failed"));
            }
        }
    } else {
        None
    };

    let before = control.stats();
    let tick = period(cfg.rate_hz);
    let epoch = clock.now();
    let mut stall_warned = false;
    tracing::info!(
        rate_hz = cfg.rate_hz,
        duration_ms = ?cfg.duration_ms,
        "force-guided motion started"
    );

    let stop = loop {
        if shutdown.load(Ordering::Relaxed) {
            break StopReason::Shutdown;
        }
        let elapsed_ms = clock.ms_since(epoch);
        if cfg.duration_ms.is_some_and(|d| elapsed_ms >= d) {
            break StopReason::DurationElapsed;
        }

        if let Some(listener) = odometry {
            let stalled = listener.stalled_for_now();
            if stalled >= cfg.odometry_stall_ms && !stall_warned {
                tracing::warn!(stalled_ms = stalled, "base odometry stalled");
                stall_warned = true;
            } else if stalled < cfg.odometry_stall_ms {
                stall_warned = false;
            }
        }

        control.tick(clock.secs_since(epoch));
        clock.sleep(tick);
    };

    control.prepare_for_stop();
    let after = control.stats();
    let summary = RunSummary {
        ticks: after.ticks - before.ticks,
        published: after.published - before.published,
        failed_safe: after.failed_safe - before.failed_safe,
        alignment,
        calibration,
        stop,
        elapsed_ms: clock.ms_since(epoch),
    };
    tracing::info!(
        ticks = summary.ticks,
        failed_safe = summary.failed_safe,
        stop = ?summary.stop,
        "session finished"
    );
    Ok(summary)
}
