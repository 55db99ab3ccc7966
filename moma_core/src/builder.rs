//! Builder for [`ControlLoop`].
//!
//! Collaborators are boxed trait objects; missing required ones are reported
//! as typed [`BuildError`]s wrapped in an `eyre::Report`.

use std::sync::Arc;

use moma_traits::control::Controller;
use moma_traits::estimator::DirectionEstimator;
use moma_traits::{ArmStateService, CommandPublisher};

use crate::config::{AlignCfg, CalibrationCfg, EstimatorCfg};
use crate::error::{BuildError, Result};
use crate::mailbox::OdometryMailbox;
use crate::orchestrator::{ControlLoop, LoopStats};
use crate::profile::VelocityProfile;
use crate::source::StateSource;

impl ControlLoop {
    pub fn builder() -> ControlLoopBuilder {
        ControlLoopBuilder::default()
    }
}

#[derive(Default)]
pub struct ControlLoopBuilder {
    source: Option<Box<dyn StateSource>>,
    arm: Option<Box<dyn ArmStateService>>,
    publisher: Option<Box<dyn CommandPublisher>>,
    controller: Option<Box<dyn Controller>>,
    init_controller: Option<Box<dyn Controller>>,
    estimator: Option<Box<dyn DirectionEstimator>>,
    mailbox: Option<Arc<OdometryMailbox>>,
    profile: Option<VelocityProfile>,
    estimator_cfg: Option<EstimatorCfg>,
    align: Option<AlignCfg>,
    calibration: Option<CalibrationCfg>,
    record_trajectory: bool,
}

impl ControlLoopBuilder {
    pub fn with_state_source(mut self, source: impl StateSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_arm_service(mut self, arm: impl ArmStateService + 'static) -> Self {
        self.arm = Some(Box::new(arm));
        self
    }

    pub fn with_publisher(mut self, publisher: impl CommandPublisher + 'static) -> Self {
        self.publisher = Some(Box::new(publisher));
        self
    }

    pub fn with_controller(mut self, controller: impl Controller + 'static) -> Self {
        self.controller = Some(Box::new(controller));
        self
    }

    /// Controller for alignment and calibration; the main controller is used
    /// when none is given.
    pub fn with_init_controller(mut self, controller: impl Controller + 'static) -> Self {
        self.init_controller = Some(Box::new(controller));
        self
    }

    pub fn with_estimator(mut self, estimator: impl DirectionEstimator + 'static) -> Self {
        self.estimator = Some(Box::new(estimator));
        self
    }

    /// Share an odometry mailbox with a listener. A private one is created
    /// otherwise.
    pub fn with_mailbox(mut self, mailbox: Arc<OdometryMailbox>) -> Self {
        self.mailbox = Some(mailbox);
        self
    }

    pub fn with_profile(mut self, profile: VelocityProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_estimator_cfg(mut self, cfg: EstimatorCfg) -> Self {
        self.estimator_cfg = Some(cfg);
        self
    }

    pub fn with_align(mut self, cfg: AlignCfg) -> Self {
        self.align = Some(cfg);
        self
    }

    pub fn with_calibration(mut self, cfg: CalibrationCfg) -> Self {
        self.calibration = Some(cfg);
        self
    }

    pub fn record_trajectory(mut self, on: bool) -> Self {
        self.record_trajectory = on;
        self
    }

    pub fn build(self) -> Result<ControlLoop> {
        let source = self
            .source
            .ok_or_else(|| eyre::Report::new(BuildError::MissingStateSource))?;
        let arm = self
            .arm
            .ok_or_else(|| eyre::Report::new(BuildError::MissingArmService))?;
        let publisher = self
            .publisher
            .ok_or_else(|| eyre::Report::new(BuildError::MissingPublisher))?;
        let controller = self
            .controller
            .ok_or_else(|| eyre::Report::new(BuildError::MissingController))?;
        let estimator = self
            .estimator
            .ok_or_else(|| eyre::Report::new(BuildError::MissingEstimator))?;

        let profile = self.profile.unwrap_or_default();
        // The tail must be evaluable before the loop is allowed to start.
        if profile.tail_coefficients().is_err() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "degenerate velocity profile",
            )));
        }

        let estimator_cfg = self.estimator_cfg.unwrap_or_default();
        if !(estimator_cfg.smoothing_gain.is_finite()
            && estimator_cfg.mix_coeff.is_finite()
            && estimator_cfg.angular_gain.is_finite())
        {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "estimator gains must be finite",
            )));
        }

        let align = self.align.unwrap_or_default();
        if align.iterations == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "alignment iterations must be >= 1",
            )));
        }

        let calibration = self.calibration.unwrap_or_default();
        if !(calibration.try_velocity.is_finite() && calibration.try_velocity > 0.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "try_velocity must be > 0",
            )));
        }
        if calibration.steps_per_direction == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "steps_per_direction must be >= 1",
            )));
        }

        Ok(ControlLoop {
            source,
            arm,
            publisher,
            controller,
            init_controller: self.init_controller,
            estimator,
            mailbox: self.mailbox.unwrap_or_default(),
            profile,
            estimator_cfg,
            align_cfg: align,
            calibration_cfg: calibration,
            record_trajectory: self.record_trajectory,
            trajectory: Vec::new(),
            stats: LoopStats::default(),
        })
    }
}
