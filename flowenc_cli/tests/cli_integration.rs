use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Minimal valid config on the simulated backend: 10 px/read at 30 mm height
// is 0.51 mm per cycle, just over one 0.5 mm pulse.
fn write_sim_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[sensor]
backend = "simulated"
height_mm = 30.0
read_timeout_ms = 20

[encoder]
mm_per_rev = 150.0
pulses_per_rev = 300
projection_axis = "y"

[loop]
cycle_us = 500

[recovery]
backoff_ms = 5
max_backoff_ms = 20

[simulation]
dy_per_read = 10
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["health"], 0, "ok", "stdout")]
#[case(&["run", "--cycles", "50"], 0, "run complete", "stdout")]
#[case(&["self-check"], 0, "dy=10", "stdout")]
#[case(&["run", "--cycles", "1"], 0, "loop_hz=2000", "stderr")]
#[case(&["run", "--cycles", "abc"], 2, "invalid value", "stderr")]
#[case(&["launch"], 2, "unrecognized subcommand", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_sim_config(&dir);

    let mut cmd = Command::cargo_bin("flowenc").unwrap();
    cmd.arg("--config").arg(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn run_reports_position_from_simulated_travel() {
    let dir = tempdir().unwrap();
    let cfg = write_sim_config(&dir);

    // 100 cycles × 0.51 mm = 51 mm → 102 pulses (residual below one pulse).
    let out = Command::cargo_bin("flowenc")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--json")
        .args(["run", "--cycles", "100"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["cycles"], 100);
    let position = v["position"].as_i64().unwrap();
    assert!((101..=102).contains(&position), "position {position}");
    assert_eq!(v["faults"], 0);
    assert!(v["residual_mm"].as_f64().unwrap().abs() < 0.5);
}

#[rstest]
fn run_simulate_flag_overrides_real_backend() {
    let dir = tempdir().unwrap();
    let cfg = write_sim_config(&dir);
    let text = fs::read_to_string(&cfg)
        .unwrap()
        .replace("backend = \"simulated\"", "backend = \"real\"");
    fs::write(&cfg, text).unwrap();

    Command::cargo_bin("flowenc")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .args(["run", "--cycles", "5", "--simulate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cycles=5"));
}

#[rstest]
fn run_stats_prints_loop_timing() {
    let dir = tempdir().unwrap();
    let cfg = write_sim_config(&dir);

    Command::cargo_bin("flowenc")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .args(["run", "--cycles", "20", "--stats"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Missed deadlines"));
}

#[rstest]
fn cli_reports_bad_calibration_header() {
    let dir = tempdir().unwrap();
    let cfg = write_sim_config(&dir);

    let bad_csv = dir.path().join("pixels.csv");
    let mut f = fs::File::create(&bad_csv).unwrap();
    writeln!(f, "raw,value").unwrap();
    writeln!(f, "1000,51.0").unwrap();
    writeln!(f, "2000,102.0").unwrap();

    Command::cargo_bin("flowenc")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--calibration")
        .arg(&bad_csv)
        .arg("self-check")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid headers"));
}

#[rstest]
fn calibration_csv_overrides_pixel_scale() {
    let dir = tempdir().unwrap();
    let cfg = write_sim_config(&dir);

    // 0.1 mm/pixel: 10 px/read = 1.0 mm = exactly 2 pulses per cycle.
    let csv = dir.path().join("pixels.csv");
    fs::write(&csv, "pixels,mm\n1000,100.0\n-500,-50.0\n2000,200.0\n").unwrap();

    let out = Command::cargo_bin("flowenc")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--calibration")
        .arg(&csv)
        .arg("--json")
        .args(["run", "--cycles", "10"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let position = v["position"].as_i64().unwrap();
    assert!((19..=20).contains(&position), "position {position}");
}
