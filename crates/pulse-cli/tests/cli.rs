use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use tempfile::tempdir;

fn pulse() -> Command {
    cargo_bin_cmd!("pulse")
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

fn synthetic_ppg(period_s: f64, duration_s: f64) -> String {
    let fs = 250.0;
    (0..(duration_s * fs) as usize)
        .map(|i| {
            let phase = (i as f64 / fs) % period_s;
            let systolic = (-0.5 * ((phase - 0.2) / 0.06f64).powi(2)).exp();
            ((30_000.0 + 9_000.0 * systolic) as u16).to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn detect_reads_a_sample_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ppg.txt");
    fs::write(&path, synthetic_ppg(0.75, 20.0)).unwrap();

    let json = stdout_json(pulse().args(["detect", "--input", path.to_str().unwrap()]));
    assert_eq!(json["fs_hz"], 250);
    assert_eq!(json["sample_count"], 5000);
    let ppi = json["ppi"].as_array().unwrap();
    assert!(ppi.len() >= 15, "{:?}", ppi);
    for v in ppi {
        let v = v.as_i64().unwrap();
        assert!((742..=758).contains(&v), "interval {v}");
    }
}

#[test]
fn detect_reads_stdin() {
    let json = stdout_json(pulse().arg("detect").write_stdin(synthetic_ppg(1.0, 12.0)));
    assert!(!json["ppi"].as_array().unwrap().is_empty());
}

#[test]
fn hrv_summary_with_preprocessing() {
    let json = stdout_json(pulse().arg("hrv").write_stdin("800\n810\n790\n805\n"));
    assert_eq!(json["n"], 4);
    assert_eq!(json["mean_ppi"], 801.25);

    let json = stdout_json(
        pulse()
            .args(["hrv", "--preprocess", "0.2"])
            .write_stdin("800, 810, 790, 805, 1150"),
    );
    assert_eq!(json["n"], 4);
}

#[test]
fn hrv_rejects_a_single_interval() {
    pulse().arg("hrv").write_stdin("800\n").assert().failure();
}

#[test]
fn history_list_show_clear() {
    let dir = tempdir().unwrap();
    let record = r#"{"id":1709629620,"timestamp":1709629620,"mean_hr":70,"mean_ppi":857,"rmssd":31,"sdnn":44}"#;
    fs::write(dir.path().join("meas_1709629620"), record).unwrap();
    fs::write(dir.path().join("meas_1709716020"), record).unwrap();
    let path = dir.path().to_str().unwrap();

    let json = stdout_json(pulse().args(["history", "list", "--dir", path]));
    assert_eq!(json, serde_json::json!(["meas_1709716020", "meas_1709629620"]));

    let json = stdout_json(pulse().args(["history", "show", "--dir", path, "meas_1709629620"]));
    assert_eq!(json["mean_hr"], 70);
    assert!(json.get("sns").is_none());

    pulse()
        .args(["history", "show", "--dir", path, "meas_1"])
        .assert()
        .failure();

    let json = stdout_json(pulse().args(["history", "clear", "--dir", path]));
    assert_eq!(json["removed"], 2);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn simulate_local_analysis_end_to_end() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("pulse.toml");
    fs::write(&config, "[device]\nanalysis_ms = 10000\n\n[sim]\nseed = 3\njitter_ms = 30.0\n").unwrap();
    let history = dir.path().join("history");

    let json = stdout_json(pulse().args([
        "simulate",
        "--config",
        config.to_str().unwrap(),
        "--history-dir",
        history.to_str().unwrap(),
        "--render",
        "--script",
        "wait:3000 cw push wait:11000 push wait:100",
    ]));
    assert_eq!(json["final_state"], "Menu");
    let kinds: Vec<&str> = json["transitions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["to"].as_str().unwrap())
        .collect();
    assert_eq!(
        kinds,
        vec!["Connect", "Menu", "HrvAnalysis", "ViewAnalysis", "UploadToLocal", "Menu"]
    );
    assert_eq!(json["history"].as_array().unwrap().len(), 1);
    assert_eq!(fs::read_dir(&history).unwrap().count(), 1);

    let topics: Vec<&str> = json["published"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["topic"].as_str().unwrap())
        .collect();
    assert_eq!(topics, vec!["pulsecheck", "hr-data"]);
    let mean_hr = json["published"][0]["payload"]["mean_hr"].as_i64().unwrap();
    assert!((70..=80).contains(&mean_hr), "mean_hr {mean_hr}");
    assert!(json["render"]["frames"].as_u64().is_some());
}

#[test]
fn simulate_offline_reports_the_error_screen() {
    let json = stdout_json(pulse().args(["simulate", "--offline", "--script", "wait:20000"]));
    assert_eq!(json["final_state"], "Error");
    assert_eq!(json["error"], serde_json::json!(["ERROR", "Wi-Fi not found"]));
    assert_eq!(json["screen"]["items"], serde_json::json!(["ERROR", "Wi-Fi not found"]));
}

#[test]
fn simulate_remote_analysis_from_the_menu() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("pulse.toml");
    fs::write(&config, "[device]\nanalysis_ms = 10000\n").unwrap();
    let json = stdout_json(pulse().args([
        "simulate",
        "--config",
        config.to_str().unwrap(),
        "--skip-boot",
        "--script",
        "cw cw push wait:11000",
    ]));
    // Never connected, so the remote analysis cannot start.
    assert_eq!(json["final_state"], "Error");
    assert_eq!(json["error"], serde_json::json!(["ERROR", "No connection"]));
}

#[test]
fn simulate_rejects_unknown_steps() {
    pulse()
        .args(["simulate", "--script", "wait:10 jump"])
        .assert()
        .failure();
}
