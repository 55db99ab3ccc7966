use assert_cmd::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_config(dir: &tempfile::TempDir, extra: &str) -> PathBuf {
    let toml = format!(
        r#"
[runner]
rate_hz = 100
duration_ms = 200

[state_source]
kind = "simulated"

[calibration]
steps_per_direction = 2
{extra}
"#
    );
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn stdout_json(cmd: &mut Command) -> serde_json::Value {
    let out = cmd.output().unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let text = String::from_utf8(out.stdout).unwrap();
    serde_json::from_str(text.trim()).unwrap()
}

/// Validate the summary schema of a successful run.
#[rstest]
fn run_summary_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");

    let v = stdout_json(
        Command::cargo_bin("moma")
            .unwrap()
            .args(["--json", "--log-level", "warn", "--config"])
            .arg(&cfg)
            .arg("run"),
    );

    assert_eq!(v["source"], "simulated");
    assert_eq!(v["stop"], "duration elapsed");
    assert!(v["ticks"].as_u64().unwrap() > 0);
    assert!(v["elapsed_ms"].as_u64().unwrap() >= 200);
    assert!(v["door_progress_m"].is_number());
    assert!(v["alignment"].is_null());

    let cal = &v["calibration"];
    assert!(cal.is_object());
    for key in ["kept", "rejected", "failed_cycles", "max_drift", "elapsed_ms"] {
        assert!(cal.get(key).is_some(), "calibration.{key} missing");
    }
    assert_eq!(cal["failed_cycles"], 0);
}

#[rstest]
fn alignment_is_reported_when_requested() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "\n[alignment]\niterations = 5\n");

    let v = stdout_json(
        Command::cargo_bin("moma")
            .unwrap()
            .args(["--json", "--log-level", "warn", "--config"])
            .arg(&cfg)
            .args(["run", "--align", "--skip-calibration", "--duration-ms", "50"]),
    );

    let a = &v["alignment"];
    let total = a["actuated"].as_u64().unwrap()
        + a["skipped"].as_u64().unwrap()
        + a["failed"].as_u64().unwrap();
    assert_eq!(total, 5);
    assert!(v["calibration"].is_null());
}

#[rstest]
fn check_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");

    let v = stdout_json(
        Command::cargo_bin("moma")
            .unwrap()
            .args(["--json", "--config"])
            .arg(&cfg)
            .arg("check"),
    );
    assert_eq!(v["valid"], true);
    assert_eq!(v["rate_hz"], 100);
    assert!(v["continuity_gap"].as_f64().unwrap() < 1e-6);
    assert_eq!(v["tail_coefficients"].as_array().unwrap().len(), 2);
}

#[rstest]
fn profile_lines_start_at_rest() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");

    let out = Command::cargo_bin("moma")
        .unwrap()
        .args(["--config"])
        .arg(&cfg)
        .args(["profile", "--until", "1.0", "--step", "0.5"])
        .output()
        .unwrap();
    assert!(out.status.success());

    let lines: Vec<serde_json::Value> = String::from_utf8(out.stdout)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["t"], 0.0);
    assert!(lines[0]["speed"].as_f64().unwrap().abs() < 1e-12);
    assert!(lines[2]["speed"].as_f64().unwrap() > 0.0);
}

/// Errors in JSON mode are one object with a stable reason.
#[rstest]
#[case("\n[gripper]\nwidth = 0.5\n", "SetupRefused", 5)]
#[case("\n[sim]\nbase_share = 3.0\n", "Config", 2)]
#[case("\n[profile]\nt0 = 2.0\nt_conv = 0.0\nalpha_final = 1e12\n", "Build", 2)]
fn error_json_schema(#[case] extra: &str, #[case] reason: &str, #[case] code: i32) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, extra);

    let out = Command::cargo_bin("moma")
        .unwrap()
        .args(["--json", "--log-level", "error", "--config"])
        .arg(&cfg)
        .arg("run")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(code));

    let stderr = String::from_utf8(out.stderr).unwrap();
    let last = stderr.lines().last().unwrap();
    let v: serde_json::Value = serde_json::from_str(last).unwrap();
    assert_eq!(v["reason"], reason);
    assert!(v["message"].as_str().unwrap().contains("What happened"));
}
