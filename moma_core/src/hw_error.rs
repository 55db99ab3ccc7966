//! Maps `Box<dyn Error>` from trait boundaries to typed `MomaError`.
//!
//! The traits in `moma_traits` use `Box<dyn Error + Send + Sync>` so any
//! transport or solver backend can plug in; this module converts those into
//! the fault taxonomy the control loop reasons about, with an optional
//! feature-gated path for `moma_hardware::HwError` downcasting.

use crate::error::MomaError;

/// Map an error raised by a telemetry service or command channel.
pub fn map_transport_error(e: &(dyn std::error::Error + 'static)) -> MomaError {
    #[cfg(feature = "hardware-errors")]
    {
        use moma_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => MomaError::Timeout,
                other => MomaError::Transport(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        MomaError::Timeout
    } else {
        MomaError::Transport(s)
    }
}

/// Map an error raised by the controller's solve.
///
/// Transport faults surfacing through a remote solver keep their class so the
/// diagnostics point at the link rather than the optimization problem.
pub fn map_solver_error(e: &(dyn std::error::Error + 'static)) -> MomaError {
    #[cfg(feature = "hardware-errors")]
    {
        use moma_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Infeasible(_) | HwError::Singular => MomaError::Solver(hw.to_string()),
                HwError::Timeout => MomaError::Timeout,
                other => MomaError::Transport(other.to_string()),
            };
        }
    }

    MomaError::Solver(e.to_string())
}

pub fn map_estimator_error(e: &(dyn std::error::Error + 'static)) -> MomaError {
    MomaError::Estimator(e.to_string())
}
