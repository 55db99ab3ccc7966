use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("service timeout")]
    Timeout,
    #[error("request refused: {0}")]
    Refused(String),
    #[error("solver infeasible: {0}")]
    Infeasible(String),
    #[error("singular configuration")]
    Singular,
    #[error("odometry channel disconnected")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, HwError>;
