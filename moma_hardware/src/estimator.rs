//! Reference direction estimator.
//!
//! Keeps a horizontal unit push direction in world coordinates and turns it
//! toward the contact force: each update adds `mix · f⊥ / (|f| + F_s)`, where
//! `f⊥` is the part of the horizontal force orthogonal to the current
//! direction and `F_s` softens the turn for weak contact. With smoothing on,
//! only a `smoothing_gain` fraction of that step is taken.

use std::collections::VecDeque;
use std::f64::consts::TAU;

use moma_traits::estimator::{DirectionEstimator, DirectionSample};
use nalgebra::{Rotation3, Vector3, Vector6};

use crate::error::HwError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Horizontal forces below this magnitude carry no direction (N).
pub const MIN_FORCE: f64 = 1e-3;

/// Contact forces well below this turn the direction proportionally less (N).
pub const FORCE_SOFTENING: f64 = 1.0;

const MIN_NORM: f64 = 1e-9;

fn horizontal(v: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(v.x, v.y, 0.0)
}

#[derive(Debug, Clone)]
pub struct ForceFollowingEstimator {
    window: usize,
    candidates: usize,
    forces: VecDeque<Vector3<f64>>,
    positions: VecDeque<Vector3<f64>>,
    direction: Vector3<f64>,
    rot_world_ee: Rotation3<f64>,
    initial: Option<Vector3<f64>>,
}

impl ForceFollowingEstimator {
    /// History of `window` samples, `candidates` calibration directions.
    /// Both are at least one.
    pub fn new(window: usize, candidates: usize) -> Self {
        Self {
            window: window.max(1),
            candidates: candidates.max(1),
            forces: VecDeque::with_capacity(window.max(1)),
            positions: VecDeque::with_capacity(window.max(1)),
            direction: Vector3::x(),
            rot_world_ee: Rotation3::identity(),
            initial: None,
        }
    }

    /// Current push direction, world frame.
    pub fn direction(&self) -> Vector3<f64> {
        self.direction
    }

    /// Starting direction fitted by the last calibration.
    pub fn initial_direction(&self) -> Option<Vector3<f64>> {
        self.initial
    }

    /// End-effector travel across the buffered window.
    pub fn window_displacement(&self) -> Option<Vector3<f64>> {
        match (self.positions.front(), self.positions.back()) {
            (Some(first), Some(last)) if self.positions.len() > 1 => Some(last - first),
            _ => None,
        }
    }
}

impl DirectionEstimator for ForceFollowingEstimator {
    fn oldest_buffered_force(&self) -> Option<Vector3<f64>> {
        self.forces.front().copied()
    }

    fn update_buffers(&mut self, force: &Vector3<f64>, world_position: &Vector3<f64>) {
        self.forces.push_back(*force);
        self.positions.push_back(*world_position);
        while self.forces.len() > self.window {
            self.forces.pop_front();
            self.positions.pop_front();
        }
    }

    fn update_estimate(
        &mut self,
        force: &Vector3<f64>,
        smoothing_gain: f64,
        rot_world_ee: &Rotation3<f64>,
        smooth: bool,
        mix_coeff: f64,
    ) -> Result<(), BoxError> {
        if force.iter().any(|v| !v.is_finite())
            || !smoothing_gain.is_finite()
            || !mix_coeff.is_finite()
        {
            return Err(Box::new(HwError::Refused("non-finite estimator input".into())));
        }
        self.rot_world_ee = *rot_world_ee;

        let f = horizontal(&(rot_world_ee * force));
        let magnitude = f.norm();
        if magnitude <= MIN_FORCE {
            return Ok(());
        }
        let d = self.direction;
        let across = f - d * f.dot(&d);
        let turn = across * (mix_coeff / (magnitude + FORCE_SOFTENING));
        let Some(target) = (d + turn).try_normalize(MIN_NORM) else {
            return Ok(());
        };
        let next = if smooth {
            d + (target - d) * smoothing_gain
        } else {
            target
        };
        if let Some(n) = next.try_normalize(MIN_NORM) {
            self.direction = n;
        }
        Ok(())
    }

    fn planned_velocities(
        &mut self,
        speed: f64,
        calc_angular: bool,
        angular_gain: f64,
    ) -> Result<Vector6<f64>, BoxError> {
        if !(speed.is_finite() && angular_gain.is_finite()) {
            return Err(Box::new(HwError::Infeasible("non-finite speed".into())));
        }
        let to_ee = self.rot_world_ee.inverse();
        let linear = to_ee * (self.direction * speed);

        let mut angular = Vector3::zeros();
        if calc_angular {
            // turn the end-effector x axis toward the push direction
            let heading = horizontal(&(self.rot_world_ee * Vector3::x()));
            if heading.norm() > MIN_NORM {
                let err = heading.cross(&self.direction).z.atan2(heading.dot(&self.direction));
                angular = to_ee * (Vector3::z() * (angular_gain * err));
            }
        }
        Ok(Vector6::new(
            linear.x, linear.y, linear.z, angular.x, angular.y, angular.z,
        ))
    }

    fn initial_directions(&self) -> Vec<Vector3<f64>> {
        (0..self.candidates)
            .map(|i| {
                let a = TAU * i as f64 / self.candidates as f64;
                Vector3::new(a.cos(), a.sin(), 0.0)
            })
            .collect()
    }

    /// Score-weighted mean of the retained directions, mapped to the world
    /// frame and flattened.
    fn estimate_best_initial_direction(
        &mut self,
        samples: &[DirectionSample],
        rot_world_ee: &Rotation3<f64>,
        _rot_body_ee: &Rotation3<f64>,
    ) {
        let weighted: Vector3<f64> = samples
            .iter()
            .filter(|s| s.score > 0.0)
            .map(|s| s.direction * s.score)
            .sum();
        match horizontal(&(rot_world_ee * weighted)).try_normalize(MIN_NORM) {
            Some(d) => {
                tracing::info!(x = d.x, y = d.y, "initial direction fitted");
                self.direction = d;
                self.initial = Some(d);
            }
            None => {
                tracing::warn!(
                    samples = samples.len(),
                    "no usable calibration sample, keeping the current direction"
                );
            }
        }
        self.rot_world_ee = *rot_world_ee;
    }
}
