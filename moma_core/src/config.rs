//! Runtime configuration of the control loop.
//!
//! These are separate from the TOML-deserialized config in `moma_config`;
//! see `conversions` for the mapping.

/// Gains of the online direction estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorCfg {
    /// Low-pass gain applied to the force estimate.
    pub smoothing_gain: f64,
    pub smooth: bool,
    /// Weight of the newest direction when mixing with the previous estimate.
    pub mix_coeff: f64,
    /// Gain of the angular part of the planned twist.
    pub angular_gain: f64,
}

impl Default for EstimatorCfg {
    fn default() -> Self {
        Self {
            smoothing_gain: 0.1,
            smooth: false,
            mix_coeff: 0.1,
            angular_gain: 0.3,
        }
    }
}

/// Z-axis alignment before the force-guided motion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignCfg {
    pub iterations: u32,
    pub gain: f64,
    /// Angle offset subtracted from the horizontal target (rad).
    pub theta_des: f64,
}

impl Default for AlignCfg {
    fn default() -> Self {
        Self {
            iterations: 1000,
            gain: 0.2,
            theta_des: 0.0,
        }
    }
}

/// Exploratory initial-direction probing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationCfg {
    /// Linear speed along each candidate (m/s).
    pub try_velocity: f64,
    /// Cycles per direction (out and back).
    pub steps_per_direction: u32,
    /// Baselines below this magnitude make the fitness undefined (N).
    pub min_baseline_force: f64,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            try_velocity: 0.005,
            steps_per_direction: 3,
            min_baseline_force: 1e-6,
        }
    }
}

/// Fixed-cadence driving of the control loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunnerCfg {
    pub rate_hz: u32,
    /// Stop after this long in the force-guided phase; `None` runs until shutdown.
    pub duration_ms: Option<u64>,
    /// Bound on the wait for the first odometry sample.
    pub ready_timeout_ms: u64,
    pub align: bool,
    pub calibrate: bool,
    /// Warn when no odometry arrived for this long.
    pub odometry_stall_ms: u64,
    /// Tolerated profile jump at the switch time.
    pub continuity_tol: f64,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self {
            rate_hz: 100,
            duration_ms: None,
            ready_timeout_ms: 5_000,
            align: false,
            calibrate: true,
            odometry_stall_ms: 500,
            continuity_tol: 1e-6,
        }
    }
}
