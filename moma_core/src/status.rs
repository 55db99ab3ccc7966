//! Outcome of a single control-loop tick.

use moma_traits::messages::VelocityCommand;

use crate::error::MomaError;

/// Stage of the cycle that was executing when a fault occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    Idle,
    /// Odometry snapshot and arm telemetry request.
    Acquiring,
    /// Normalization, estimator update, profile, planned velocities.
    Computing,
    /// Controller solve.
    Dispatching,
}

impl std::fmt::Display for CycleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CycleStage::Idle => "idle",
            CycleStage::Acquiring => "acquiring",
            CycleStage::Computing => "computing",
            CycleStage::Dispatching => "dispatching",
        };
        f.write_str(s)
    }
}

/// Public result of one tick. A command has been published in both cases.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The controller's solution was published.
    Published(VelocityCommand),
    /// A step failed; the all-zero command was published instead.
    FailedSafe { stage: CycleStage, error: MomaError },
}

impl TickOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, TickOutcome::Published(_))
    }

    /// The command that went out this tick.
    pub fn command(&self) -> VelocityCommand {
        match self {
            TickOutcome::Published(cmd) => *cmd,
            TickOutcome::FailedSafe { .. } => VelocityCommand::ZERO,
        }
    }
}
