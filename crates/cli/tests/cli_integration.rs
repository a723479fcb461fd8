//! CLI integration tests for the `qti` binary.
//!
//! Uses `assert_cmd` to spawn the binary and verify exit codes, stdout
//! content, and stderr content. Documents come from the evaluator's
//! conformance fixtures or are written to temporary directories.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Locate the workspace root by walking up from CARGO_MANIFEST_DIR.
fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    // crates/cli -> workspace root is two levels up
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .to_path_buf()
}

/// Helper: create a Command for the `qti` binary, rooted at workspace.
fn qti() -> Command {
    let mut cmd = cargo_bin_cmd!("qti");
    cmd.current_dir(workspace_root());
    cmd
}

const FIXTURES: &str = "crates/eval/tests/fixtures";

fn fixture(name: &str) -> String {
    format!("{}/{}", FIXTURES, name)
}

/// A document whose response processing is a single template reference.
fn template_document(template: &str, location: Option<&str>) -> String {
    let location = location
        .map(|l| format!(r#", "templateLocation": "{}""#, l))
        .unwrap_or_default();
    format!(
        r#"{{
  "identifier": "templated",
  "declarations": [
    {{ "role": "outcome", "identifier": "SCORE", "cardinality": "single", "baseType": "float" }}
  ],
  "responseProcessing": {{ "template": "{}"{} }}
}}"#,
        template, location
    )
}

const FLAG_TEMPLATE: &str = r#"{
  "rules": [
    {
      "kind": "setOutcomeValue",
      "identifier": "SCORE",
      "expression": { "kind": "baseValue", "baseType": "float", "value": 0.25 }
    }
  ]
}"#;

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    qti()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("QTI response processing engine"));
}

#[test]
fn version_exits_0() {
    qti()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("qti"));
}

#[test]
fn process_help_lists_options() {
    qti()
        .args(["process", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--responses"))
        .stdout(predicate::str::contains("--seed"));
}

// ──────────────────────────────────────────────
// 2. Check subcommand
// ──────────────────────────────────────────────

#[test]
fn check_summarises_document() {
    qti()
        .args(["check", &fixture("match_correct.json")])
        .assert()
        .success()
        .stdout(predicate::str::contains("Document: choice"))
        .stdout(predicate::str::contains("response RESPONSE: single identifier"))
        .stdout(predicate::str::contains(
            "response: template http://www.imsglobal.org/question/qti_v2p1/rptemplates/match_correct (known)",
        ));
}

#[test]
fn check_counts_inline_rules() {
    qti()
        .args(["check", &fixture("numeric_tolerance.json")])
        .assert()
        .success()
        .stdout(predicate::str::contains("response: 6 rule(s)"))
        .stdout(predicate::str::contains("Rules: 6"));
}

#[test]
fn check_json_output() {
    let output = qti()
        .args(["--output", "json", "check", &fixture("outcome_lookup.json")])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["identifier"], "testSummary");
    assert_eq!(report["declarations"].as_array().unwrap().len(), 3);
    assert_eq!(report["outcomeProcessing"]["rules"], 3);
    assert!(report["responseProcessing"].is_null());
}

#[test]
fn check_missing_file_exits_1() {
    qti()
        .args(["check", "does/not/exist.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("document file not found"));
}

#[test]
fn check_invalid_document_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.json");
    fs::write(
        &path,
        r#"{ "identifier": "bad", "responseProcessing": { "rules": [{ "kind": "exitEverything" }] } }"#,
    )
    .unwrap();
    qti()
        .args(["check", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "responseProcessing.rules[0]: unknown response rule kind 'exitEverything'",
        ));
}

#[test]
fn quiet_suppresses_errors() {
    qti()
        .args(["--quiet", "check", "does/not/exist.json"])
        .assert()
        .failure()
        .stderr(predicate::str::is_empty());
}

// ──────────────────────────────────────────────
// 3. Process subcommand
// ──────────────────────────────────────────────

#[test]
fn process_scores_with_standard_template() {
    qti()
        .args([
            "process",
            &fixture("match_correct.json"),
            "--responses",
            &fixture("match_correct.responses.json"),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("response processing: completed"))
        .stdout(predicate::str::contains("SCORE (outcome single float) = 1"));
}

#[test]
fn process_without_responses_scores_zero() {
    qti()
        .args(["process", &fixture("match_correct.json")])
        .assert()
        .success()
        .stdout(predicate::str::contains("RESPONSE (response single identifier) = NULL"))
        .stdout(predicate::str::contains("SCORE (outcome single float) = 0"));
}

#[test]
fn process_json_output_carries_state() {
    let output = qti()
        .args([
            "--output",
            "json",
            "process",
            &fixture("template_variables.json"),
            "--responses",
            &fixture("template_variables.responses.json"),
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();

    let runs = report["runs"].as_array().unwrap();
    assert_eq!(runs[0]["kind"], "template processing");
    assert_eq!(runs[0]["exited"], true);
    assert_eq!(runs[1]["kind"], "response processing");

    let state = report["state"].as_array().unwrap();
    let score = state.iter().find(|v| v["identifier"] == "SCORE").unwrap();
    assert_eq!(score["value"], 1.0);
    let a = state.iter().find(|v| v["identifier"] == "A").unwrap();
    assert_eq!(a["value"], 3);
}

#[test]
fn process_trace_lists_executed_rules() {
    qti()
        .args([
            "process",
            &fixture("numeric_tolerance.json"),
            "--responses",
            &fixture("numeric_tolerance.responses.json"),
            "--trace",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("  responseCondition executed"))
        .stdout(predicate::str::contains("  setOutcomeValue executed"))
        .stdout(predicate::str::contains("FEEDBACK (outcome single identifier) = close"));
}

#[test]
fn process_reports_aggregated_failures() {
    qti()
        .args(["process", &fixture("aggregate_failure.json")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("response processing failed"))
        .stderr(predicate::str::contains("unknown variable: MISSING"));
}

#[test]
fn process_rejects_undeclared_response() {
    let dir = TempDir::new().unwrap();
    let responses = dir.path().join("responses.json");
    fs::write(&responses, r#"{ "NOPE": "x" }"#).unwrap();
    qti()
        .args([
            "process",
            &fixture("match_correct.json"),
            "--responses",
            responses.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no variable declared with this identifier"));
}

// ──────────────────────────────────────────────
// 4. Templates and configuration
// ──────────────────────────────────────────────

#[test]
fn process_loads_template_next_to_document() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("flag.json"), FLAG_TEMPLATE).unwrap();
    let doc = dir.path().join("item.json");
    fs::write(
        &doc,
        template_document("https://example.org/rp/flag", Some("flag.json")),
    )
    .unwrap();

    qti()
        .args(["process", doc.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("SCORE (outcome single float) = 0.25"));
}

#[test]
fn process_uses_config_template_mapping() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("flag.json"), FLAG_TEMPLATE).unwrap();
    let doc = dir.path().join("item.json");
    fs::write(&doc, template_document("https://example.org/rp/flag", None)).unwrap();
    let config = dir.path().join("qti.toml");
    fs::write(
        &config,
        "max_template_attempts = 10\n\n[templates]\n\"https://example.org/rp/flag\" = \"flag.json\"\n",
    )
    .unwrap();

    qti()
        .args([
            "process",
            doc.to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("SCORE (outcome single float) = 0.25"));
}

#[test]
fn process_unresolvable_template_exits_1() {
    let dir = TempDir::new().unwrap();
    let doc = dir.path().join("item.json");
    fs::write(&doc, template_document("https://example.org/rp/none", None)).unwrap();

    qti()
        .args(["process", doc.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "template not found: https://example.org/rp/none",
        ));
}

#[test]
fn process_invalid_config_exits_1() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("qti.toml");
    fs::write(&config, "max_template_attempts = \"many\"\n").unwrap();

    qti()
        .args([
            "process",
            &fixture("match_correct.json"),
            "--config",
            config.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid config"));
}

#[test]
fn seeded_runs_are_repeatable() {
    let dir = TempDir::new().unwrap();
    let doc = dir.path().join("random.json");
    fs::write(
        &doc,
        r#"{
  "identifier": "random",
  "declarations": [
    { "role": "template", "identifier": "X", "cardinality": "single", "baseType": "integer" }
  ],
  "templateProcessing": {
    "rules": [
      {
        "kind": "setTemplateValue",
        "identifier": "X",
        "expression": { "kind": "randomInteger", "min": 1, "max": 1000000 }
      }
    ]
  }
}"#,
    )
    .unwrap();

    let run = || {
        let output = qti()
            .args(["process", doc.to_str().unwrap(), "--seed", "1234"])
            .output()
            .unwrap();
        assert!(output.status.success());
        String::from_utf8(output.stdout).unwrap()
    };
    let first = run();
    assert!(first.contains("X (template single integer) = "));
    assert_eq!(first, run());
}
