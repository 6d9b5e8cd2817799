use std::process::{Command, Output};

use serde_json::Value;

fn quarry_rig(args: &[&str]) -> Output {
    let output = Command::new(env!("CARGO_BIN_EXE_quarry-rig"))
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("failed to run quarry-rig");
    assert!(
        output.status.success(),
        "quarry-rig failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

const SMALL_SITE: [&str; 14] = [
    "--rigs",
    "2",
    "--width",
    "5",
    "--length",
    "5",
    "--height",
    "8",
    "--layers",
    "1",
    "--obstacle-density",
    "0",
    "--steps",
    "4000",
];

#[test]
fn report_covers_every_rig_to_completion() {
    let output = quarry_rig(&SMALL_SITE);
    let report: Value = serde_json::from_slice(&output.stdout).expect("report is json");

    assert_eq!(report["seed"], 1);
    assert!(report["rejected"].as_array().expect("rejected").is_empty());
    let rigs = report["rigs"].as_object().expect("rigs");
    assert_eq!(rigs.len(), 2);
    for tally in rigs.values() {
        assert_eq!(tally["cells_removed"], 9);
        assert_eq!(tally["layers_completed"], 1);
        assert_eq!(tally["timeouts"], 0);
        assert!(tally["finished_at"].is_u64());
    }
    assert_eq!(report["final_state"]["snapshots"].as_array().map(Vec::len), Some(2));
}

#[test]
fn snapshot_string_can_be_inspected() {
    let mut args = SMALL_SITE.to_vec();
    args.extend(["--snapshot", "2"]);
    let output = quarry_rig(&args);
    let stdout = String::from_utf8(output.stdout).expect("utf-8 output");
    let snapshot = stdout.lines().next().expect("snapshot line");
    assert!(snapshot.starts_with("rig:v1:"));

    let inspected = quarry_rig(&["--inspect", snapshot]);
    let summary = String::from_utf8(inspected.stdout).expect("utf-8 output");
    assert!(summary.starts_with("rig#2"));
    assert!(summary.contains("Finished"));
}
