//! The per-cycle control loop.
//!
//! One [`ControlLoop::tick`] acquires telemetry, normalizes it, feeds the
//! direction estimator, evaluates the speed profile, asks the estimator for a
//! desired end-effector twist and dispatches it to the controller. Whatever
//! happens, exactly one command goes out on both output channels: the
//! controller's solution, or all zeros if any step failed.

use std::sync::Arc;

use moma_traits::control::{Controller, ControllerOutput};
use moma_traits::estimator::DirectionEstimator;
use moma_traits::messages::{ArmTelemetry, OdometrySample, VelocityCommand};
use moma_traits::{ArmStateService, CommandPublisher};
use nalgebra::{Vector3, Vector6};

use crate::config::{AlignCfg, CalibrationCfg, EstimatorCfg};
use crate::error::MomaError;
use crate::hw_error::{map_estimator_error, map_solver_error, map_transport_error};
use crate::mailbox::OdometryMailbox;
use crate::profile::VelocityProfile;
use crate::source::StateSource;
use crate::state::CycleState;
use crate::status::{CycleStage, TickOutcome};

/// Which controller instance solves a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerRole {
    /// Force-guided motion.
    Main,
    /// Alignment and calibration probes.
    Init,
}

/// Counters over the loop's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub published: u64,
    pub failed_safe: u64,
}

pub struct ControlLoop {
    pub(crate) source: Box<dyn StateSource>,
    pub(crate) arm: Box<dyn ArmStateService>,
    pub(crate) publisher: Box<dyn CommandPublisher>,
    pub(crate) controller: Box<dyn Controller>,
    pub(crate) init_controller: Option<Box<dyn Controller>>,
    pub(crate) estimator: Box<dyn DirectionEstimator>,
    pub(crate) mailbox: Arc<OdometryMailbox>,
    pub(crate) profile: VelocityProfile,
    pub(crate) estimator_cfg: EstimatorCfg,
    pub(crate) align_cfg: AlignCfg,
    pub(crate) calibration_cfg: CalibrationCfg,
    pub(crate) record_trajectory: bool,
    pub(crate) trajectory: Vec<Vector3<f64>>,
    pub(crate) stats: LoopStats,
}

impl core::fmt::Debug for ControlLoop {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ControlLoop")
            .field("source", &self.source.name())
            .field("profile", &self.profile)
            .field("ready", &self.mailbox.is_ready())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl ControlLoop {
    /// Base odometry has been received at least once.
    pub fn is_ready(&self) -> bool {
        self.mailbox.is_ready()
    }

    pub fn mailbox(&self) -> &Arc<OdometryMailbox> {
        &self.mailbox
    }

    pub fn profile(&self) -> &VelocityProfile {
        &self.profile
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// World end-effector positions of every normalized cycle, oldest first.
    /// Empty unless recording was enabled at build time.
    pub fn trajectory(&self) -> &[Vector3<f64>] {
        &self.trajectory
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Run one force-guided cycle at `t` seconds after motion start.
    pub fn tick(&mut self, t: f64) -> TickOutcome {
        self.stats.ticks += 1;
        match self.run_cycle(t) {
            Ok(cmd) => {
                self.publish(&cmd);
                self.stats.published += 1;
                tracing::trace!(t, joints = ?cmd.joint_velocities, "tick published");
                TickOutcome::Published(cmd)
            }
            Err((stage, error)) => {
                self.publish(&VelocityCommand::ZERO);
                self.stats.failed_safe += 1;
                tracing::warn!(%stage, kind = error.kind(), error = %error, "tick failed safe");
                TickOutcome::FailedSafe { stage, error }
            }
        }
    }

    fn run_cycle(&mut self, t: f64) -> Result<VelocityCommand, (CycleStage, MomaError)> {
        let (arm, odometry) = self
            .acquire_raw()
            .map_err(|e| (CycleStage::Acquiring, e))?;

        let computing = |e| (CycleStage::Computing, e);
        let cycle = self.normalize(&arm, &odometry).map_err(computing)?;
        self.feed_estimator(&cycle).map_err(computing)?;
        let speed = self.profile.speed(t).map_err(computing)?;
        let desired = self
            .estimator
            .planned_velocities(speed, true, self.estimator_cfg.angular_gain)
            .map_err(|e| computing(map_estimator_error(&*e)))?;

        self.solve(ControllerRole::Main, &desired, &cycle, speed)
            .map_err(|e| (CycleStage::Dispatching, e))
    }

    /// Snapshot odometry under the fence and request arm telemetry; the fence
    /// is lowered once both are held.
    pub(crate) fn acquire_raw(&mut self) -> Result<(ArmTelemetry, OdometrySample), MomaError> {
        let snapshot = self.mailbox.fence();
        let odometry = *snapshot.sample().ok_or(MomaError::NotReady)?;
        let arm = self.arm.request().map_err(|e| map_transport_error(&*e))?;
        drop(snapshot);
        Ok((arm, odometry))
    }

    fn normalize(
        &mut self,
        arm: &ArmTelemetry,
        odometry: &OdometrySample,
    ) -> Result<CycleState, MomaError> {
        let cycle = self.source.normalize(arm, odometry)?;
        if self.record_trajectory {
            self.trajectory.push(cycle.world_ee_position());
        }
        Ok(cycle)
    }

    /// Acquire and normalize outside of a force-guided tick.
    pub(crate) fn acquire(&mut self) -> Result<CycleState, MomaError> {
        let (arm, odometry) = self.acquire_raw()?;
        self.normalize(&arm, &odometry)
    }

    fn feed_estimator(&mut self, cycle: &CycleState) -> Result<(), MomaError> {
        let force = cycle.force();
        let position = cycle.world_ee_position();
        match self.estimator.oldest_buffered_force() {
            Some(oldest) => {
                self.estimator.update_buffers(&(force - oldest), &position);
                let cfg = self.estimator_cfg;
                self.estimator
                    .update_estimate(
                        force,
                        cfg.smoothing_gain,
                        &cycle.rot_world_ee(),
                        cfg.smooth,
                        cfg.mix_coeff,
                    )
                    .map_err(|e| map_estimator_error(&*e))
            }
            None => {
                self.estimator.update_buffers(force, &position);
                Ok(())
            }
        }
    }

    /// Solve with the controller of `role` and convert to a command.
    pub(crate) fn solve(
        &mut self,
        role: ControllerRole,
        desired: &Vector6<f64>,
        cycle: &CycleState,
        speed: f64,
    ) -> Result<VelocityCommand, MomaError> {
        let input = cycle.controller_input(speed);
        let controller = match (role, self.init_controller.as_mut()) {
            (ControllerRole::Init, Some(init)) => init,
            _ => &mut self.controller,
        };
        let out = controller
            .step(desired, &input)
            .map_err(|e| map_solver_error(&*e))?;
        to_command(&out)
    }

    /// Send `cmd` on both channels. Channel errors are logged, never retried.
    pub(crate) fn publish(&mut self, cmd: &VelocityCommand) {
        if let Err(e) = self.publisher.publish_joints(&cmd.joint_velocities) {
            tracing::warn!(error = %e, "joint command publish failed");
        }
        if let Err(e) = self.publisher.publish_base(&cmd.base_linear, cmd.base_angular) {
            tracing::warn!(error = %e, "base command publish failed");
        }
    }

    /// Publish the all-zero command. Safe to call any number of times.
    pub fn prepare_for_stop(&mut self) {
        tracing::info!("publishing stop command");
        self.publish(&VelocityCommand::ZERO);
    }
}

fn to_command(out: &ControllerOutput) -> Result<VelocityCommand, MomaError> {
    let mut joint_velocities = [0.0; moma_traits::ARM_DOF];
    joint_velocities.copy_from_slice(out.joint_velocities.as_slice());
    let cmd = VelocityCommand {
        joint_velocities,
        base_linear: [out.base_linear.x, out.base_linear.y],
        base_angular: out.base_angular,
    };
    let finite = cmd.joint_velocities.iter().all(|v| v.is_finite())
        && cmd.base_linear.iter().all(|v| v.is_finite())
        && cmd.base_angular.is_finite();
    if !finite {
        return Err(MomaError::Solver("non-finite solution".into()));
    }
    Ok(cmd)
}
