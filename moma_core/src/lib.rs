#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Compliant mobile-manipulator control core (hardware-agnostic).
//!
//! All robot interaction goes through the traits in `moma_traits`: telemetry
//! through `ArmStateService` and a pushed odometry stream, commands through
//! `CommandPublisher`, the whole-body solve through `Controller` and the push
//! direction through `DirectionEstimator`.
//!
//! ## Architecture
//!
//! - **Profile**: two-segment arctangent speed profile (`profile`)
//! - **Normalization**: live and model-based state sources (`source`, `state`)
//! - **Odometry**: fenced single-slot mailbox fed by a listener thread
//!   (`mailbox`, `listener`)
//! - **Control loop**: per-tick acquire/compute/dispatch with a zero-command
//!   fail-safe (`orchestrator`, `status`)
//! - **Start-up**: z-axis alignment and initial-direction calibration
//!   (`align`, `calibration`)
//! - **Runner**: fixed-cadence session driver (`runner`)
//!
//! ## Fail-safe
//!
//! Every tick publishes exactly one command on both channels. Any failure
//! between acquisition and the controller solve replaces the command with
//! all zeros; nothing is retried within a tick.

pub mod align;
pub mod builder;
pub mod calibration;
pub mod config;
pub mod conversions;
pub mod error;
pub mod geometry;
pub mod hw_error;
pub mod listener;
pub mod mailbox;
pub mod mocks;
pub mod orchestrator;
pub mod profile;
pub mod runner;
pub mod source;
pub mod state;
pub mod status;
pub mod util;

pub use align::AlignReport;
pub use builder::ControlLoopBuilder;
pub use calibration::CalibrationReport;
pub use error::{BuildError, MomaError, Report, Result};
pub use mailbox::OdometryMailbox;
pub use orchestrator::{ControlLoop, ControllerRole, LoopStats};
pub use profile::VelocityProfile;
pub use source::{LiveStateSource, SimulatedStateSource, StateSource};
pub use state::{BaseOdometry, CycleState, RobotState};
pub use status::{CycleStage, TickOutcome};
