use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MomaError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("timeout waiting for telemetry")]
    Timeout,
    #[error("solver failure: {0}")]
    Solver(String),
    #[error("estimator failure: {0}")]
    Estimator(String),
    #[error("base odometry not received yet")]
    NotReady,
    #[error("malformed telemetry: {0}")]
    Malformed(String),
    #[error("degenerate velocity profile: denominator {denominator:e} too close to zero")]
    DegenerateProfile { denominator: f64 },
    #[error("velocity profile discontinuous at switch time: gap {gap:e}")]
    DiscontinuousProfile { gap: f64 },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
}

impl MomaError {
    /// Stable short name, used in structured logs and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            MomaError::Transport(_) => "Transport",
            MomaError::Timeout => "Timeout",
            MomaError::Solver(_) => "Solver",
            MomaError::Estimator(_) => "Estimator",
            MomaError::NotReady => "NotReady",
            MomaError::Malformed(_) => "Malformed",
            MomaError::DegenerateProfile { .. } => "DegenerateProfile",
            MomaError::DiscontinuousProfile { .. } => "DiscontinuousProfile",
            MomaError::Config(_) => "Config",
            MomaError::State(_) => "State",
        }
    }

    /// Transport-class faults: the robot could not be reached or answered late.
    pub fn is_transport(&self) -> bool {
        matches!(self, MomaError::Transport(_) | MomaError::Timeout)
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing state source")]
    MissingStateSource,
    #[error("missing arm state service")]
    MissingArmService,
    #[error("missing command publisher")]
    MissingPublisher,
    #[error("missing controller")]
    MissingController,
    #[error("missing direction estimator")]
    MissingEstimator,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
