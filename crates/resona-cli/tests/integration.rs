//! Integration tests for resona-cli.
//!
//! Tests run the built `resona` binary and check its output.

use std::process::Command;

/// Helper to get the path to the `resona` binary built by cargo.
fn resona_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_resona"))
}

fn run_ok(args: &[&str]) -> String {
    let output = resona_bin()
        .args(args)
        .output()
        .expect("failed to run resona");
    assert!(
        output.status.success(),
        "resona {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

// ---------------------------------------------------------------------------
// `resona engines`
// ---------------------------------------------------------------------------

#[test]
fn cli_engines_lists_all_engines_and_presets() {
    let stdout = run_ok(&["engines"]);
    assert!(stdout.contains("Available Engines"));
    for engine in ["additive", "granular", "fm", "vector", "physical"] {
        assert!(stdout.contains(engine), "missing engine '{engine}'");
    }
    for preset in ["epiano", "acoustic-guitar", "cloud-pad", "sync-lead", "organ"] {
        assert!(stdout.contains(preset), "missing preset '{preset}'");
    }
}

#[test]
fn cli_engines_filters_by_name() {
    let stdout = run_ok(&["engines", "physical"]);
    assert!(stdout.contains("marimba"));
    assert!(stdout.contains("excitations:"));
    assert!(!stdout.contains("algorithms:"));
}

#[test]
fn cli_rejects_unknown_engine() {
    let output = resona_bin()
        .args(["engines", "theremin"])
        .output()
        .expect("failed to run resona");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("theremin"));
}

// ---------------------------------------------------------------------------
// `resona analyze`
// ---------------------------------------------------------------------------

#[test]
fn cli_analyze_json_reports_pitch() {
    let stdout = run_ok(&[
        "analyze", "--engine", "additive", "--preset", "sine", "--note", "69", "--frames",
        "8192", "--json",
    ]);
    let report: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert_eq!(report["engine"], "additive");
    assert!(report["peak"].as_f64().unwrap() > 0.01);
    let hz = report["fundamental_hz"].as_f64().expect("pitch detected");
    assert!((hz - 440.0).abs() < 5.0, "fundamental {hz}");
    assert_eq!(report["active_voices"], 1);
}

#[test]
fn cli_analyze_every_engine_renders() {
    for engine in ["additive", "granular", "fm", "vector", "physical"] {
        let stdout = run_ok(&["analyze", "--engine", engine, "--frames", "4096", "--json"]);
        let report: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
        assert!(
            report["peak"].as_f64().unwrap() > 0.0,
            "{engine} rendered silence"
        );
    }
}

#[test]
fn cli_analyze_text_output() {
    let stdout = run_ok(&["analyze", "-e", "physical", "-p", "marimba", "-n", "60"]);
    assert!(stdout.contains("Engine:        physical"));
    assert!(stdout.contains("Preset:        marimba"));
    assert!(stdout.contains("Peak:"));
}

#[test]
fn cli_analyze_rejects_wrong_preset() {
    let output = resona_bin()
        .args(["analyze", "--engine", "fm", "--preset", "marimba"])
        .output()
        .expect("failed to run resona");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown fm preset"));
}

// ---------------------------------------------------------------------------
// `resona config`
// ---------------------------------------------------------------------------

#[test]
fn cli_config_prints_parseable_toml() {
    let stdout = run_ok(&["config", "--engine", "fm"]);
    assert!(stdout.contains("engine = \"fm\""));
    assert!(stdout.contains("[fm]"));
    resona_config::EngineConfig::from_toml_str(&stdout).expect("printed config parses");
}

#[test]
fn cli_config_file_drives_analyze() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("vector.toml");
    let path_str = path.to_str().unwrap();

    run_ok(&["config", "--engine", "vector", "--output", path_str]);
    assert!(path.exists());

    let stdout = run_ok(&["analyze", "--config", path_str, "--json"]);
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["engine"], "vector");
}

// ---------------------------------------------------------------------------
// `resona bench`
// ---------------------------------------------------------------------------

#[test]
fn cli_bench_reports_real_time_factor() {
    let stdout = run_ok(&[
        "bench", "--engine", "fm", "--voices", "4", "--seconds", "0.2", "--block", "128",
    ]);
    assert!(stdout.contains("Real-time factor:"));
    assert!(stdout.contains("polyphony 8"));
}
