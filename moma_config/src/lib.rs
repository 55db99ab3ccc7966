#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the mobile-manipulator control loop.
//!
//! `Config` and its sections are deserialized from TOML; every section is
//! optional and falls back to its `Default`. Call [`Config::validate`] after
//! loading to reject values the control loop cannot run with.
use serde::Deserialize;
use serde::de::Deserializer;

const IDENTITY_4X4: [f64; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Two-segment speed profile.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProfileCfg {
    pub v_init: f64,
    pub v_final: f64,
    pub alpha_init: f64,
    pub alpha_final: f64,
    pub t0: f64,
    pub t_conv: f64,
    /// Largest tolerated jump at `t0` (m/s).
    pub continuity_tol: f64,
}

impl Default for ProfileCfg {
    fn default() -> Self {
        Self {
            v_init: 0.1,
            v_final: 0.3,
            alpha_init: 50.0,
            alpha_final: 50.0,
            t0: 2.0,
            t_conv: 1.5,
            continuity_tol: 1e-6,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EstimatorCfg {
    pub smoothing_gain: f64,
    pub smooth: bool,
    pub mix_coeff: f64,
    pub angular_gain: f64,
    /// Force history length of the reference estimator.
    pub window: usize,
    /// Number of calibration candidates spread around the circle.
    pub candidates: usize,
}

impl Default for EstimatorCfg {
    fn default() -> Self {
        Self {
            smoothing_gain: 0.1,
            smooth: false,
            mix_coeff: 0.1,
            angular_gain: 0.3,
            window: 10,
            candidates: 8,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AlignmentCfg {
    pub enabled: bool,
    pub iterations: u32,
    pub gain: f64,
    pub theta_des: f64,
}

impl Default for AlignmentCfg {
    fn default() -> Self {
        Self {
            enabled: false,
            iterations: 1000,
            gain: 0.2,
            theta_des: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CalibrationCfg {
    pub enabled: bool,
    pub try_velocity: f64,
    pub steps_per_direction: u32,
    pub min_baseline_force: f64,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            try_velocity: 0.005,
            steps_per_direction: 3,
            min_baseline_force: 1e-6,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RunnerCfg {
    pub rate_hz: u32,
    /// Length of the force-guided phase; absent runs until interrupted.
    pub duration_ms: Option<u64>,
    pub ready_timeout_ms: u64,
    pub odometry_stall_ms: u64,
    pub record_trajectory: bool,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self {
            rate_hz: 100,
            duration_ms: None,
            ready_timeout_ms: 5_000,
            odometry_stall_ms: 500,
            record_trajectory: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StateSourceKind {
    #[default]
    Live,
    Simulated,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StateSourceCfg {
    pub kind: StateSourceKind,
    /// Model link index of the arm base (simulated source only).
    pub base_link: usize,
    /// Model link index of the end-effector (simulated source only).
    pub ee_link: usize,
}

impl Default for StateSourceCfg {
    fn default() -> Self {
        Self {
            kind: StateSourceKind::Live,
            base_link: 0,
            ee_link: 1,
        }
    }
}

/// End-effector and stiffness frames, 4x4 column-major.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FramesCfg {
    #[serde(deserialize_with = "de_transform")]
    pub flange_to_ee: [f64; 16],
    #[serde(deserialize_with = "de_transform")]
    pub ee_to_stiffness: [f64; 16],
}

impl Default for FramesCfg {
    fn default() -> Self {
        Self {
            flange_to_ee: IDENTITY_4X4,
            ee_to_stiffness: IDENTITY_4X4,
        }
    }
}

/// Collision reflex thresholds: torques per joint (Nm), forces/torques on the
/// end-effector (N, Nm).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CollisionCfg {
    pub lower_torque: [f64; 7],
    pub upper_torque: [f64; 7],
    pub lower_force: [f64; 6],
    pub upper_force: [f64; 6],
}

impl Default for CollisionCfg {
    fn default() -> Self {
        Self {
            lower_torque: [20.0, 20.0, 18.0, 18.0, 16.0, 14.0, 12.0],
            upper_torque: [20.0, 20.0, 18.0, 18.0, 16.0, 14.0, 12.0],
            lower_force: [20.0, 20.0, 20.0, 25.0, 25.0, 25.0],
            upper_force: [20.0, 20.0, 20.0, 25.0, 25.0, 25.0],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GripperCfg {
    pub width: f64,
    pub speed: f64,
    pub force: f64,
    pub homing: bool,
    pub close: bool,
    pub move_fingers: bool,
}

impl Default for GripperCfg {
    fn default() -> Self {
        Self {
            width: 0.04,
            speed: 0.1,
            force: 40.0,
            homing: true,
            close: true,
            move_fingers: false,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    pub rotation: Option<String>,
}

/// Parameters of the simulated robot backend.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimCfg {
    /// Resting push force against the door (N).
    pub resistance_n: f64,
    /// Contact stiffness (N/m).
    pub stiffness: f64,
    /// Contact damping against motion off the door's track (N·s/m).
    pub contact_damping: f64,
    /// Direction of least resistance, degrees from world x.
    pub door_direction_deg: f64,
    /// Damping of the reference pseudo-inverse controller.
    pub damping: f64,
    /// Fraction of planar motion handed to the base, in [0, 1].
    pub base_share: f64,
    /// Initial base pose `[x, y, yaw]`.
    pub base_pose: [f64; 3],
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            resistance_n: 10.0,
            stiffness: 400.0,
            contact_damping: 60.0,
            door_direction_deg: 30.0,
            damping: 0.01,
            base_share: 0.0,
            base_pose: [0.0, 0.0, 0.0],
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub profile: ProfileCfg,
    #[serde(default)]
    pub estimator: EstimatorCfg,
    #[serde(default)]
    pub alignment: AlignmentCfg,
    #[serde(default)]
    pub calibration: CalibrationCfg,
    #[serde(default)]
    pub runner: RunnerCfg,
    #[serde(default)]
    pub state_source: StateSourceCfg,
    #[serde(default)]
    pub frames: FramesCfg,
    #[serde(default)]
    pub collision: CollisionCfg,
    #[serde(default)]
    pub gripper: GripperCfg,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub sim: SimCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Accepts a transform either as 16 column-major values or as four rows of
/// four (row-major, as written by hand).
fn de_transform<'de, D>(deserializer: D) -> Result<[f64; 16], D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TransformToml {
        Flat(Vec<f64>),
        Rows(Vec<Vec<f64>>),
    }

    let mut out = [0.0; 16];
    match TransformToml::deserialize(deserializer)? {
        TransformToml::Flat(v) => {
            if v.len() != 16 {
                return Err(serde::de::Error::invalid_length(
                    v.len(),
                    &"16 column-major values",
                ));
            }
            out.copy_from_slice(&v);
        }
        TransformToml::Rows(rows) => {
            if rows.len() != 4 || rows.iter().any(|r| r.len() != 4) {
                return Err(serde::de::Error::custom("expected 4 rows of 4 values"));
            }
            for (r, row) in rows.iter().enumerate() {
                for (c, v) in row.iter().enumerate() {
                    out[c * 4 + r] = *v;
                }
            }
        }
    }
    Ok(out)
}

fn all_finite(v: &[f64]) -> bool {
    v.iter().all(|x| x.is_finite())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        let p = &self.profile;
        if !all_finite(&[p.v_init, p.v_final, p.alpha_init, p.alpha_final, p.t0, p.t_conv]) {
            eyre::bail!("profile values must be finite");
        }
        if p.v_init < 0.0 || p.v_final < 0.0 {
            eyre::bail!("profile.v_init and profile.v_final must be >= 0");
        }
        if p.alpha_init <= 0.0 || p.alpha_final <= 0.0 {
            eyre::bail!("profile.alpha_init and profile.alpha_final must be > 0");
        }
        if p.t0 < 0.0 {
            eyre::bail!("profile.t0 must be >= 0");
        }
        if !(p.continuity_tol.is_finite() && p.continuity_tol > 0.0) {
            eyre::bail!("profile.continuity_tol must be > 0");
        }

        let e = &self.estimator;
        if !(0.0..=1.0).contains(&e.smoothing_gain) {
            eyre::bail!("estimator.smoothing_gain must be in [0.0, 1.0]");
        }
        if !(0.0..=1.0).contains(&e.mix_coeff) {
            eyre::bail!("estimator.mix_coeff must be in [0.0, 1.0]");
        }
        if !e.angular_gain.is_finite() || e.angular_gain < 0.0 {
            eyre::bail!("estimator.angular_gain must be >= 0");
        }
        if e.window == 0 {
            eyre::bail!("estimator.window must be >= 1");
        }
        if e.candidates == 0 {
            eyre::bail!("estimator.candidates must be >= 1");
        }

        let a = &self.alignment;
        if a.iterations == 0 {
            eyre::bail!("alignment.iterations must be >= 1");
        }
        if !(a.gain.is_finite() && a.gain > 0.0) {
            eyre::bail!("alignment.gain must be > 0");
        }
        if !a.theta_des.is_finite() {
            eyre::bail!("alignment.theta_des must be finite");
        }

        let c = &self.calibration;
        if !(c.try_velocity.is_finite() && c.try_velocity > 0.0) {
            eyre::bail!("calibration.try_velocity must be > 0");
        }
        if c.try_velocity > 0.1 {
            eyre::bail!("calibration.try_velocity is unreasonably large (>0.1 m/s)");
        }
        if c.steps_per_direction == 0 {
            eyre::bail!("calibration.steps_per_direction must be >= 1");
        }
        if !(c.min_baseline_force.is_finite() && c.min_baseline_force >= 0.0) {
            eyre::bail!("calibration.min_baseline_force must be >= 0");
        }

        let r = &self.runner;
        if r.rate_hz == 0 {
            eyre::bail!("runner.rate_hz must be > 0");
        }
        if r.rate_hz > 10_000 {
            eyre::bail!("runner.rate_hz is unreasonably large (>10kHz)");
        }
        if r.ready_timeout_ms == 0 {
            eyre::bail!("runner.ready_timeout_ms must be >= 1");
        }
        if r.odometry_stall_ms == 0 {
            eyre::bail!("runner.odometry_stall_ms must be >= 1");
        }

        if self.state_source.base_link == self.state_source.ee_link {
            eyre::bail!("state_source.base_link and state_source.ee_link must differ");
        }

        if !all_finite(&self.frames.flange_to_ee) || !all_finite(&self.frames.ee_to_stiffness) {
            eyre::bail!("frames transforms must be finite");
        }

        let col = &self.collision;
        for (lo, hi) in col.lower_torque.iter().zip(&col.upper_torque) {
            if !(lo.is_finite() && hi.is_finite() && *lo >= 0.0 && lo <= hi) {
                eyre::bail!("collision torque thresholds must satisfy 0 <= lower <= upper");
            }
        }
        for (lo, hi) in col.lower_force.iter().zip(&col.upper_force) {
            if !(lo.is_finite() && hi.is_finite() && *lo >= 0.0 && lo <= hi) {
                eyre::bail!("collision force thresholds must satisfy 0 <= lower <= upper");
            }
        }

        let g = &self.gripper;
        if !(g.width.is_finite() && g.width >= 0.0) {
            eyre::bail!("gripper.width must be >= 0");
        }
        if !(g.speed.is_finite() && g.speed > 0.0) {
            eyre::bail!("gripper.speed must be > 0");
        }
        if !(g.force.is_finite() && g.force >= 0.0) {
            eyre::bail!("gripper.force must be >= 0");
        }

        let s = &self.sim;
        if !(s.resistance_n.is_finite() && s.resistance_n >= 0.0) {
            eyre::bail!("sim.resistance_n must be >= 0");
        }
        if !(s.stiffness.is_finite() && s.stiffness >= 0.0) {
            eyre::bail!("sim.stiffness must be >= 0");
        }
        if !(s.contact_damping.is_finite() && s.contact_damping >= 0.0) {
            eyre::bail!("sim.contact_damping must be >= 0");
        }
        if !(s.damping.is_finite() && s.damping >= 0.0) {
            eyre::bail!("sim.damping must be >= 0");
        }
        if !(0.0..=1.0).contains(&s.base_share) {
            eyre::bail!("sim.base_share must be in [0.0, 1.0]");
        }
        if !all_finite(&s.base_pose) || !s.door_direction_deg.is_finite() {
            eyre::bail!("sim.base_pose and sim.door_direction_deg must be finite");
        }

        if let Some(rot) = &self.logging.rotation {
            if !matches!(rot.as_str(), "never" | "daily" | "hourly") {
                eyre::bail!("logging.rotation must be one of never, daily, hourly");
            }
        }
        Ok(())
    }
}
