//! End-to-end tests for the `dae` binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::{Value, json};
use tempfile::TempDir;

const CONFIG: &str = r#"
[assumptions]
fx_source = "ecb-daily"

[engines.claim_forensics]
enabled = true
amount_tolerance = 0.01
"#;

const STARTED_AT: &str = "2024-01-01T00:00:00Z";

fn claim(transaction_amount: f64) -> Value {
    json!({
        "claim_id": "CLM-1",
        "source_system": "claims_core",
        "claim_amount": 10_000.0,
        "currency": "USD",
        "claim_type": "collision",
        "incident_date": "2023-12-15",
        "reported_date": "2024-01-01",
        "policy": {"policy_id": "POL-9", "currency": "USD", "covered_types": ["collision"]},
        "transactions": [{"transaction_id": "T-1", "amount": transaction_amount, "currency": "USD"}]
    })
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dae.toml"), CONFIG).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write_payload(&self, name: &str, payload: &Value) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, serde_json::to_vec(payload).unwrap()).unwrap();
        path
    }

    fn run(&self, payload: &Path, out: Option<&Path>) -> Output {
        let mut command = Command::new(env!("CARGO_BIN_EXE_dae"));
        command
            .arg("run")
            .arg("--config")
            .arg(self.path("dae.toml"))
            .args(["--engine", "claim_forensics", "--dataset-version", "dv-cli"])
            .arg("--payload")
            .arg(payload)
            .args(["--started-at", STARTED_AT]);
        if let Some(out) = out {
            command.arg("--out").arg(out);
        }
        command.output().unwrap()
    }
}

fn dae(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dae"))
        .args(args)
        .output()
        .unwrap()
}

// =============================================================================
// run
// =============================================================================

#[test]
fn test_run_prints_identical_reports() {
    let ws = Workspace::new();
    let payload = ws.write_payload("claim.json", &claim(10_050.0));

    let first = ws.run(&payload, None);
    let second = ws.run(&payload, None);
    assert!(first.status.success(), "{}", String::from_utf8_lossy(&first.stderr));
    assert_eq!(first.stdout, second.stdout);

    let report: Value = serde_json::from_slice(&first.stdout).unwrap();
    assert_eq!(report["status"], "passed");
    assert_eq!(report["dataset_version_id"], "dv-cli");
    assert!(report["findings"].as_array().unwrap().is_empty());
}

#[test]
fn test_failed_assessment_exits_two() {
    let ws = Workspace::new();
    let payload = ws.write_payload("claim.json", &claim(10_200.0));

    let output = ws.run(&payload, None);
    assert_eq!(output.status.code(), Some(2));

    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "failed");
    assert_eq!(report["findings"][0]["category"], "amount_consistency");
}

#[test]
fn test_malformed_payload_is_fatal() {
    let ws = Workspace::new();
    let payload = ws.write_payload("claim.json", &json!({"claim_id": "CLM-1"}));

    let output = ws.run(&payload, None);
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
}

// =============================================================================
// verify
// =============================================================================

#[test]
fn test_written_report_verifies() {
    let ws = Workspace::new();
    let payload = ws.write_payload("claim.json", &claim(10_200.0));
    let report = ws.path("report.json");

    let output = ws.run(&payload, Some(&report));
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());

    let verify = dae(&["verify", "--report", report.to_str().unwrap()]);
    assert!(verify.status.success(), "{}", String::from_utf8_lossy(&verify.stderr));
    assert!(String::from_utf8_lossy(&verify.stdout).contains("verified"));
}

#[test]
fn test_tampered_report_rejected() {
    let ws = Workspace::new();
    let payload = ws.write_payload("claim.json", &claim(10_200.0));
    let path = ws.path("report.json");
    ws.run(&payload, Some(&path));

    let mut report: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    report["findings"][0]["detail"] = json!("nothing to see here");
    std::fs::write(&path, serde_json::to_vec(&report).unwrap()).unwrap();

    let verify = dae(&["verify", "--report", path.to_str().unwrap()]);
    assert!(!verify.status.success());
}

#[test]
fn test_flipped_verdict_rejected() {
    let ws = Workspace::new();
    let payload = ws.write_payload("claim.json", &claim(10_200.0));
    let path = ws.path("report.json");
    ws.run(&payload, Some(&path));

    let mut report: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    report["status"] = json!("passed");
    report["is_valid"] = json!(true);
    std::fs::write(&path, serde_json::to_vec(&report).unwrap()).unwrap();

    let verify = dae(&["verify", "--report", path.to_str().unwrap()]);
    assert!(!verify.status.success());
    assert!(String::from_utf8_lossy(&verify.stderr).contains("failed verification"));
}

// =============================================================================
// engines
// =============================================================================

#[test]
fn test_engines_lists_configured() {
    let ws = Workspace::new();
    let output = dae(&["engines", "--config", ws.path("dae.toml").to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("claim_forensics 1.0.0 (enabled)"));
    assert!(stdout.contains("  incident_before_report"));
}
