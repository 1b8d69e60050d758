use assert_cmd::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[[channel]]
stage = "ZFM2020"

[[channel]]
stage = "PLS-X"

[[channel]]
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn run_json(cfg: &PathBuf, args: &[&str]) -> (i32, serde_json::Value, serde_json::Value) {
    let out = Command::cargo_bin("mcm")
        .unwrap()
        .env_remove("RUST_LOG")
        .env_remove("MCM_SIM_STEP")
        .env_remove("MCM_SIM_STALL")
        .arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(cfg)
        .args(args)
        .output()
        .unwrap();
    let parse_last = |bytes: &[u8]| {
        String::from_utf8_lossy(bytes)
            .lines()
            .last()
            .map(|l| serde_json::from_str(l).unwrap_or(serde_json::Value::Null))
            .unwrap_or(serde_json::Value::Null)
    };
    (
        out.status.code().unwrap_or(-1),
        parse_last(&out.stdout),
        parse_last(&out.stderr),
    )
}

#[rstest]
fn move_result_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let (code, out, _) = run_json(
        &cfg,
        &["move", "--channel", "1", "--um", "10", "--timeout-ms", "1000"],
    );
    assert_eq!(code, 0);
    assert_eq!(out["channel"], 1);
    assert_eq!(out["arrived"], true);
    let um = out["commanded_um"].as_f64().unwrap();
    assert!((um - 47.0 * 0.2116667).abs() < 1e-9);
}

#[rstest]
fn self_check_lists_active_channels() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let (code, out, _) = run_json(&cfg, &["self-check"]);
    assert_eq!(code, 0);
    assert_eq!(out["ok"], true);
    let channels: Vec<u64> = out["channels"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["channel"].as_u64().unwrap())
        .collect();
    assert_eq!(channels, vec![0, 1]);
}

#[rstest]
fn stages_listing_is_complete() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let (code, out, _) = run_json(&cfg, &["stages"]);
    assert_eq!(code, 0);
    let names: Vec<&str> = out["stages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    for model in ["ZFM2020", "ZFM2030", "MMP-2XY", "PLS-X", "PLS-XY"] {
        assert!(names.contains(&model), "missing {model} in {names:?}");
    }
}

#[rstest]
#[case(&["move", "--channel", "0", "--um", "20000"], 3, "LimitExceeded")]
#[case(&["counts", "--channel", "2"], 7, "ChannelNotConfigured")]
fn error_schema(#[case] args: &[&str], #[case] code: i32, #[case] reason: &str) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let (got, _, err) = run_json(&cfg, args);
    assert_eq!(got, code);
    assert_eq!(err["reason"], reason);
    assert!(err["details"]["channel"].is_u64());
    assert!(err["message"].as_str().unwrap().starts_with("What happened"));
}
