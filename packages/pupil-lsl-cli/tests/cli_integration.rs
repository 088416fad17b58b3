use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn pupil_lsl() -> Command {
    let mut cmd = Command::cargo_bin("pupil-lsl").unwrap();
    cmd.env_remove("PUPIL_LSL_CONFIG");
    cmd
}

const FIXATION_LINE: &str = r#"{"topic": "fixations", "id": 42, "timestamp": 15.0, "confidence": 0.7, "norm_pos": [0.3, 0.3], "dispersion": 1.2, "duration": 250.0, "method": "3d gaze"}"#;

// =============================================================================
// GENERAL
// =============================================================================

#[test]
fn test_no_args_shows_help() {
    pupil_lsl()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_flag() {
    pupil_lsl()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pupil-lsl"));
}

#[test]
fn test_help_lists_subcommands() {
    pupil_lsl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("outlets"))
        .stdout(predicate::str::contains("record"));
}

// =============================================================================
// OUTLETS / SCHEMA
// =============================================================================

#[test]
fn test_outlets_table() {
    pupil_lsl()
        .arg("outlets")
        .assert()
        .success()
        .stdout(predicate::str::contains("SceneCameraGaze"))
        .stdout(predicate::str::contains("pupil_capture_fixations"))
        .stdout(predicate::str::contains("pupil_invisible"));
}

#[test]
fn test_outlets_json() {
    let output = pupil_lsl().args(["outlets", "--json"]).assert().success();

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let counts: Vec<u64> = parsed
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["channel_count"].as_u64().unwrap())
        .collect();
    assert_eq!(counts, vec![22, 7, 7, 3]);
}

#[test]
fn test_schema_json_order() {
    let output = pupil_lsl()
        .args(["schema", "SceneCameraGaze", "--json"])
        .assert()
        .success();

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let channels = parsed.as_array().unwrap();
    assert_eq!(channels.len(), 22);
    assert_eq!(channels[0]["label"], "confidence");
    assert_eq!(channels[21]["label"], "diameter1_3d");
}

#[test]
fn test_schema_unknown_kind() {
    pupil_lsl()
        .args(["schema", "SceneCameraSurfaces"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Error:"));
}

// =============================================================================
// EXTRACT
// =============================================================================

#[test]
fn test_extract_fixations_from_file() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("events.jsonl");
    let gaze = r#"{"topic": "gaze.2d.0.", "timestamp": 1.0, "confidence": 0.5, "norm_pos": [0.1, 0.2], "base_data": []}"#;
    std::fs::write(&input, format!("{}\n{}\nnot json\n", FIXATION_LINE, gaze)).unwrap();

    pupil_lsl()
        .args(["extract", "--kind", "SceneCameraFixations", "--input"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "timestamp,id,confidence,norm_pos_x,norm_pos_y,dispersion,duration,method\n",
        ))
        .stdout(predicate::str::contains("15,42,0.7,0.3,0.3,1.2,250,1\n"))
        .stdout(predicate::str::contains("0.1,0.2").not());
}

#[test]
fn test_extract_from_stdin() {
    pupil_lsl()
        .args(["extract", "--kind", "InvisibleGaze"])
        .write_stdin("{\"x\": 512.0, \"y\": 384.0, \"timestamp\": 100.5}\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("100.5,512,384,100.5"));
}

#[test]
fn test_extract_missing_input() {
    pupil_lsl()
        .args(["extract", "--kind", "InvisibleGaze", "--input", "/nonexistent/events.jsonl"])
        .assert()
        .code(2);
}

// =============================================================================
// PREFS
// =============================================================================

#[test]
fn test_prefs_set_then_list() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("nested").join("config.json");

    pupil_lsl()
        .args(["prefs", "set", "eeg (lab-pc)", "false", "--config"])
        .arg(&config)
        .assert()
        .success();
    assert!(config.exists());

    let output = pupil_lsl()
        .args(["prefs", "list", "--json", "--config"])
        .arg(&config)
        .assert()
        .success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["eeg (lab-pc)"], false);
}

#[test]
fn test_prefs_audio_kept_separate() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.json");

    pupil_lsl()
        .args(["prefs", "set", "mic (lab-pc)", "true", "--audio", "--config"])
        .arg(&config)
        .assert()
        .success();

    pupil_lsl()
        .args(["prefs", "list", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("No stream preferences stored"));
}

#[test]
fn test_prefs_set_rejects_non_bool() {
    pupil_lsl()
        .args(["prefs", "set", "eeg (lab-pc)", "maybe"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

// =============================================================================
// NETWORK COMMANDS
// =============================================================================

#[cfg(not(feature = "lsl-support"))]
#[test]
fn test_record_without_lsl_support() {
    let dir = TempDir::new().unwrap();
    pupil_lsl()
        .args(["record", "--dir"])
        .arg(dir.path())
        .assert()
        .code(3)
        .stderr(predicate::str::contains("--features lsl-support"));
}

#[cfg(not(feature = "lsl-support"))]
#[test]
fn test_discover_and_relay_without_lsl_support() {
    pupil_lsl().arg("discover").assert().code(3);
    pupil_lsl()
        .args(["relay", "--kind", "InvisibleGaze"])
        .assert()
        .code(3);
}
