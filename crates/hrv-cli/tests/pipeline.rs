use assert_cmd::cargo::cargo_bin_cmd;
use hrv_lib::metrics::hrv::HrvMetrics;
use hrv_lib::signal::Events;
use serde_json::Value;
use std::{error::Error, fs, path::Path};
use tempfile::tempdir;

fn simulate(dir: &Path, fs_hz: u32, bpm: f64) -> Result<(String, Vec<usize>), Box<dyn Error>> {
    let samples = dir.join("ecg.txt");
    let beats = dir.join("beats.txt");
    let mut cmd = cargo_bin_cmd!("hrv");
    cmd.args([
        "simulate",
        "--fs",
        &fs_hz.to_string(),
        "--bpm",
        &bpm.to_string(),
        "--seed",
        "7",
        "--beats-out",
        beats.to_str().expect("utf8 path"),
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    fs::write(&samples, output)?;
    let truth = fs::read_to_string(&beats)?
        .lines()
        .map(|l| l.parse())
        .collect::<Result<Vec<usize>, _>>()?;
    Ok((samples.to_string_lossy().to_string(), truth))
}

#[test]
fn detect_raw_recording_finds_every_beat() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let (samples, truth) = simulate(dir.path(), 360, 75.0)?;

    let mut cmd = cargo_bin_cmd!("hrv");
    cmd.args(["detect", "--fs", "360", "--raw", "--input", &samples]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let events: Events = serde_json::from_slice(&output)?;

    assert_eq!(events.len(), truth.len());
    for (found, expected) in events.indices.iter().zip(&truth) {
        // within 50 ms of the R apex
        assert!(found.abs_diff(*expected) <= 18, "{found} vs {expected}");
    }
    let min_gap = events.indices.windows(2).map(|w| w[1] - w[0]).min().unwrap_or(usize::MAX);
    assert!(min_gap >= 108);
    Ok(())
}

#[test]
fn earliest_policy_is_selectable() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let (samples, truth) = simulate(dir.path(), 250, 75.0)?;
    let mut cmd = cargo_bin_cmd!("hrv");
    cmd.args([
        "detect",
        "--fs",
        "250",
        "--raw",
        "--refractory-policy",
        "earliest",
        "--input",
        &samples,
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let events: Events = serde_json::from_slice(&output)?;
    assert_eq!(events.len(), truth.len());
    Ok(())
}

#[test]
fn hrv_time_from_beat_indices() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("hrv");
    cmd.args(["hrv-time", "--fs", "250"]).write_stdin("0\n250\n");
    let output = cmd.assert().success().get_output().stdout.clone();
    let metrics: HrvMetrics = serde_json::from_slice(&output)?;
    assert_eq!(metrics.mean_rr, 1000.0);
    assert_eq!(metrics.sdnn, 0.0);
    assert_eq!(metrics.rmssd, 0.0);

    let mut cmd = cargo_bin_cmd!("hrv");
    cmd.args(["hrv-time", "--fs", "250"]).write_stdin("# no beats\n");
    let output = cmd.assert().success().get_output().stdout.clone();
    let metrics: HrvMetrics = serde_json::from_slice(&output)?;
    assert_eq!(metrics, HrvMetrics::default());
    Ok(())
}

#[test]
fn envelope_reports_threshold() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let (samples, _) = simulate(dir.path(), 250, 75.0)?;
    let mut cmd = cargo_bin_cmd!("hrv");
    cmd.args(["envelope", "--fs", "250", "--raw", "--input", &samples]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let envelope: Value = serde_json::from_slice(&output)?;
    assert_eq!(envelope["window"], 38);
    assert_eq!(envelope["values"].as_array().map(Vec::len), Some(7499));
    let mean = envelope["mean"].as_f64().unwrap_or_default();
    let sd = envelope["std_dev"].as_f64().unwrap_or_default();
    let threshold = envelope["threshold"].as_f64().unwrap_or_default();
    assert!((threshold - (mean + 2.0 * sd)).abs() < 1e-12);
    Ok(())
}

#[test]
fn condition_keeps_length() -> Result<(), Box<dyn Error>> {
    let input: String = (0..100).map(|i| format!("{}\n", (i as f64 * 0.3).sin())).collect();
    let mut cmd = cargo_bin_cmd!("hrv");
    cmd.args(["condition", "--fs", "250"]).write_stdin(input);
    let output = cmd.assert().success().get_output().stdout.clone();
    let text = String::from_utf8(output)?;
    assert_eq!(text.lines().count(), 100);
    Ok(())
}

#[test]
fn condition_rejects_short_signals_and_bad_bands() {
    let mut cmd = cargo_bin_cmd!("hrv");
    cmd.args(["condition", "--fs", "250"]).write_stdin("1\n2\n3\n");
    let output = cmd.assert().failure().get_output().stderr.clone();
    assert!(String::from_utf8_lossy(&output).contains("too short"));

    let input: String = (0..100).map(|i| format!("{i}\n")).collect();
    let mut cmd = cargo_bin_cmd!("hrv");
    cmd.args(["condition", "--fs", "64", "--high-cut", "45"]).write_stdin(input);
    let output = cmd.assert().failure().get_output().stderr.clone();
    assert!(String::from_utf8_lossy(&output).contains("invalid filter specification"));
}

#[test]
fn non_numeric_input_fails() {
    let mut cmd = cargo_bin_cmd!("hrv");
    cmd.args(["detect", "--fs", "250"]).write_stdin("1.0\nfoo\n");
    cmd.assert().failure();
}
