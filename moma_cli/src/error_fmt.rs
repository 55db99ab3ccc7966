//! Human-readable error descriptions and structured JSON error formatting.

use moma_core::{BuildError, MomaError};

use crate::session::SetupRefused;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(refused) = err.downcast_ref::<SetupRefused>() {
        return match refused.call {
            "set_frames" => "What happened: The robot refused the end-effector and stiffness frames.\nLikely causes: A [frames] matrix is not a rigid transform (rotation part not orthonormal, or last row not 0 0 0 1).\nHow to fix: Fix frames.flange_to_ee / frames.ee_to_stiffness (column-major 4x4) and rerun.".to_string(),
            "set_collision_behavior" => "What happened: The robot refused the collision thresholds.\nLikely causes: A lower threshold above its upper threshold, or a negative value.\nHow to fix: Edit [collision] so that 0 <= lower <= upper for every joint and axis.".to_string(),
            "gripper" => "What happened: The robot refused the gripper command.\nLikely causes: Width beyond the finger range, non-positive speed, or a grasp force above the gripper limit.\nHow to fix: Adjust [gripper] width/speed/force, or disable move_fingers.".to_string(),
            other => format!(
                "What happened: The robot refused {other}.\nLikely causes: Out-of-range setup values.\nHow to fix: Check the corresponding config section."
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. `moma check` validates without moving the robot."
            ),
            missing => format!(
                "What happened: The control loop could not be assembled ({missing}).\nLikely causes: A collaborator was not wired into the builder.\nHow to fix: This is a bug in the session assembly; rerun with --log-level=debug and report it."
            ),
        };
    }

    if let Some(me) = err.downcast_ref::<MomaError>() {
        return match me {
            MomaError::NotReady => "What happened: No base odometry arrived before the ready timeout.\nLikely causes: Odometry driver not running, or runner.ready_timeout_ms too low.\nHow to fix: Check the odometry stream and raise runner.ready_timeout_ms if needed.".to_string(),
            MomaError::Timeout => "What happened: Arm telemetry did not arrive in time.\nLikely causes: The arm state service is overloaded or disconnected.\nHow to fix: Check the robot connection and retry.".to_string(),
            MomaError::Transport(msg) => format!(
                "What happened: Communication with the robot failed ({msg}).\nLikely causes: Robot driver not running or link dropped.\nHow to fix: Check the robot connection and retry."
            ),
            MomaError::DegenerateProfile { .. } | MomaError::DiscontinuousProfile { .. } => format!(
                "What happened: {me}.\nLikely causes: [profile] alpha_final, t0 and t_conv make the tail segment ill-defined.\nHow to fix: Move t_conv away from t0 or lower alpha_final, then run `moma check`."
            ),
            MomaError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Values that do not fit the selected backend.\nHow to fix: Edit the config file, then rerun."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from config loading
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("read config") {
        let cause = err.root_cause();
        return format!(
            "What happened: Could not read the config file ({cause}).\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass an existing TOML file with --config, or omit it to use defaults."
        );
    }

    if lower.contains("parse config") {
        let cause = err.root_cause();
        return format!(
            "What happened: The config file is not valid TOML for this tool.\nLikely causes: A syntax error, a misspelled key, or a wrong value type.\nHow to fix: Fix the reported location and rerun. Details: {cause}"
        );
    }

    if lower.contains(" must ") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable short name for the JSON `reason` field.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<SetupRefused>().is_some() {
        return "SetupRefused";
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    if let Some(me) = err.downcast_ref::<MomaError>() {
        return me.kind();
    }
    if is_config_error(err) {
        return "Config";
    }
    "Error"
}

fn is_config_error(err: &eyre::Report) -> bool {
    let lower = err.to_string().to_ascii_lowercase();
    lower.contains("config") || lower.contains(" must ")
}

/// Map errors to stable exit codes; 1 for anything unclassified.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<SetupRefused>().is_some() {
        return 5;
    }
    if let Some(BuildError::InvalidConfig(_)) = err.downcast_ref::<BuildError>() {
        return 2;
    }
    if let Some(me) = err.downcast_ref::<MomaError>() {
        return match me {
            MomaError::Config(_)
            | MomaError::DegenerateProfile { .. }
            | MomaError::DiscontinuousProfile { .. } => 2,
            MomaError::NotReady => 3,
            MomaError::Timeout | MomaError::Transport(_) => 4,
            _ => 1,
        };
    }
    if is_config_error(err) {
        return 2;
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = reason_name(err);
    if let Some(refused) = err.downcast_ref::<SetupRefused>() {
        return json!({ "reason": reason, "details": { "call": refused.call }, "message": humanize(err) })
            .to_string();
    }
    json!({ "reason": reason, "message": humanize(err) }).to_string()
}
