//! Two-segment arctangent speed profile.
//!
//! Before `t0` the speed ramps from zero towards `v_init`:
//!
//! ```text
//! v(t) = v_init · s(alpha_init · t),            s(x) = (2/π)·atan(x)
//! ```
//!
//! From `t0` on it converges towards `v_final`:
//!
//! ```text
//! v(t) = a1 · s(alpha_final · (t − t_conv)) + a2
//! a1   = (v_final − v_init·s(alpha_init·t0)) / (1 − s(alpha_final·(t0 − t_conv)))
//! a2   = v_final − a1
//! ```
//!
//! The tail denominator vanishes when `alpha_final·(t0 − t_conv)` is very
//! large; such a profile is rejected instead of dividing.

use std::f64::consts::FRAC_2_PI;

use crate::error::MomaError;

/// Smallest accepted magnitude of the tail denominator.
pub const MIN_DENOMINATOR: f64 = 1e-9;

#[inline]
fn squash(x: f64) -> f64 {
    FRAC_2_PI * x.atan()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityProfile {
    pub v_init: f64,
    pub v_final: f64,
    pub alpha_init: f64,
    pub alpha_final: f64,
    /// Switch time between the ramp and the tail (s).
    pub t0: f64,
    /// Centre of the tail's arctangent (s).
    pub t_conv: f64,
}

impl Default for VelocityProfile {
    fn default() -> Self {
        Self {
            v_init: 0.1,
            v_final: 0.3,
            alpha_init: 50.0,
            alpha_final: 50.0,
            t0: 2.0,
            t_conv: 1.5,
        }
    }
}

impl VelocityProfile {
    /// Speed at `t` seconds after motion start.
    pub fn speed(&self, t: f64) -> Result<f64, MomaError> {
        if t < self.t0 {
            return Ok(self.ramp(t));
        }
        let (a1, a2) = self.tail_coefficients()?;
        Ok(a1 * squash(self.alpha_final * (t - self.t_conv)) + a2)
    }

    fn ramp(&self, t: f64) -> f64 {
        self.v_init * squash(self.alpha_init * t)
    }

    /// `(a1, a2)` of the tail segment.
    pub fn tail_coefficients(&self) -> Result<(f64, f64), MomaError> {
        let denominator = 1.0 - squash(self.alpha_final * (self.t0 - self.t_conv));
        if !denominator.is_finite() || denominator.abs() < MIN_DENOMINATOR {
            return Err(MomaError::DegenerateProfile { denominator });
        }
        let a1 = (self.v_final - self.ramp(self.t0)) / denominator;
        Ok((a1, self.v_final - a1))
    }

    /// `|v(t0⁻) − v(t0)|`: jump between the ramp's limit and the tail's value
    /// at the switch time.
    pub fn continuity_gap(&self) -> Result<f64, MomaError> {
        let (a1, a2) = self.tail_coefficients()?;
        let tail = a1 * squash(self.alpha_final * (self.t0 - self.t_conv)) + a2;
        Ok((self.ramp(self.t0) - tail).abs())
    }

    pub fn check_continuity(&self, tol: f64) -> Result<(), MomaError> {
        let gap = self.continuity_gap()?;
        if gap > tol {
            return Err(MomaError::DiscontinuousProfile { gap });
        }
        Ok(())
    }
}

/// Free-function form of [`VelocityProfile::speed`].
pub fn speed(
    t: f64,
    v_init: f64,
    v_final: f64,
    alpha_init: f64,
    alpha_final: f64,
    t0: f64,
    t_conv: f64,
) -> Result<f64, MomaError> {
    VelocityProfile {
        v_init,
        v_final,
        alpha_init,
        alpha_final,
        t0,
        t_conv,
    }
    .speed(t)
}
