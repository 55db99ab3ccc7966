//! Contract of the online direction/force estimator.

use nalgebra::{Rotation3, Vector3, Vector6};

/// A probed push direction with its fitness (fraction of resistance removed).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionSample {
    pub direction: Vector3<f64>,
    pub score: f64,
}

pub trait DirectionEstimator {
    /// Oldest force still held in the measurement history, `None` while the
    /// history is empty.
    fn oldest_buffered_force(&self) -> Option<Vector3<f64>>;

    fn update_buffers(&mut self, force: &Vector3<f64>, world_position: &Vector3<f64>);

    fn update_estimate(
        &mut self,
        force: &Vector3<f64>,
        smoothing_gain: f64,
        rot_world_ee: &Rotation3<f64>,
        smooth: bool,
        mix_coeff: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Desired end-effector twist (linear xyz then angular xyz) for the given
    /// scalar speed.
    fn planned_velocities(
        &mut self,
        speed: f64,
        calc_angular: bool,
        angular_gain: f64,
    ) -> Result<Vector6<f64>, Box<dyn std::error::Error + Send + Sync>>;

    /// Ordered candidate directions for the start-up calibration.
    fn initial_directions(&self) -> Vec<Vector3<f64>>;

    /// Fit the starting direction from the retained calibration samples. The
    /// result is kept inside the estimator.
    fn estimate_best_initial_direction(
        &mut self,
        samples: &[DirectionSample],
        rot_world_ee: &Rotation3<f64>,
        rot_body_ee: &Rotation3<f64>,
    );
}
