//! Contact model of a handle guided along a straight track.
//!
//! The handle may only move along the track direction `d*`. Displacement off
//! the track is resisted by a spring of stiffness `k` and motion off the track
//! by a damper of coefficient `c`. At rest the arm presses
//! against the handle with `resistance` newtons along `d*`; advancing along
//! the track relieves that preload until it vanishes after
//! `resistance / k` metres.
//!
//! Forces are those the environment applies to the end-effector, in world
//! coordinates.

use nalgebra::Vector3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoorModel {
    /// Track direction, horizontal unit vector.
    pub direction: Vector3<f64>,
    pub resistance: f64,
    pub stiffness: f64,
    pub damping: f64,
    /// World position of the handle when contact was made.
    pub origin: Vector3<f64>,
}

impl DoorModel {
    /// Track at `heading_deg` from world x in the horizontal plane.
    pub fn new(heading_deg: f64, resistance: f64, stiffness: f64, damping: f64) -> Self {
        let a = heading_deg.to_radians();
        Self {
            direction: Vector3::new(a.cos(), a.sin(), 0.0),
            resistance,
            stiffness,
            damping,
            origin: Vector3::zeros(),
        }
    }

    fn off_track(&self, v: &Vector3<f64>) -> Vector3<f64> {
        v - self.direction * v.dot(&self.direction)
    }

    /// Distance travelled along the track.
    pub fn progress(&self, ee: &Vector3<f64>) -> f64 {
        (ee - self.origin).dot(&self.direction)
    }

    /// Force on an end-effector at `ee` moving with `velocity`.
    pub fn force(&self, ee: &Vector3<f64>, velocity: &Vector3<f64>) -> Vector3<f64> {
        let offset = ee - self.origin;
        let preload = (self.resistance - self.stiffness * self.progress(ee)).max(0.0);
        self.direction * preload
            - self.off_track(&offset) * self.stiffness
            - self.off_track(velocity) * self.damping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn door() -> DoorModel {
        DoorModel::new(0.0, 10.0, 400.0, 60.0)
    }

    #[test]
    fn resting_force_is_preload() {
        let f = door().force(&Vector3::zeros(), &Vector3::zeros());
        assert_eq!(f, Vector3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn advancing_relieves_preload() {
        let d = door();
        let still = Vector3::zeros();
        assert!(d.force(&Vector3::new(0.01, 0.0, 0.0), &still).norm() < 10.0);
        assert_eq!(d.force(&Vector3::new(0.1, 0.0, 0.0), &still), Vector3::zeros());
    }

    #[test]
    fn leaving_the_track_pushes_back() {
        let f = door().force(&Vector3::new(0.1, 0.01, 0.0), &Vector3::zeros());
        assert!((f.y + 4.0).abs() < 1e-12);
        assert_eq!(f.x, 0.0);
    }

    #[test]
    fn motion_along_the_track_is_free() {
        let d = door();
        let at = Vector3::new(0.1, 0.0, 0.0);
        assert_eq!(d.force(&at, &Vector3::new(0.3, 0.0, 0.0)), Vector3::zeros());
        let f = d.force(&at, &Vector3::new(0.0, 0.1, 0.0));
        assert!((f.y + 6.0).abs() < 1e-12);
    }
}
