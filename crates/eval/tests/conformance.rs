//! Processing conformance test suite.
//!
//! Each test case is a fixture set:
//! - `<name>.json`           -- interchange document (declarations + processing)
//! - `<name>.responses.json` -- candidate responses (optional)
//! - `<name>.expected.json`  -- expected values of selected variables
//!
//! The runner parses the document, runs template processing, binds the
//! responses, runs response and outcome processing, and compares the
//! listed variables against the expected values.

use std::path::{Path, PathBuf};

use qti_core::State;
use qti_eval::{Engine, EngineConfig, ProcessingError};
use qti_interchange::{from_str, parse_bindings, value_to_json, Document};

fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn read_json(path: &Path, name: &str) -> serde_json::Value {
    let text = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read {} for {}: {}", path.display(), name, e));
    serde_json::from_str(&text)
        .unwrap_or_else(|e| panic!("Invalid JSON in {} for {}: {}", path.display(), name, e))
}

fn load_document(name: &str) -> Document {
    let path = fixture_dir().join(format!("{}.json", name));
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read document for {}: {}", name, e));
    from_str(&text).unwrap_or_else(|e| panic!("Failed to parse document {}: {}", name, e))
}

/// Run every processing block of the document in order. Returns the final
/// state and the first processing error, if any.
fn process(name: &str) -> (State, Option<ProcessingError>) {
    let doc = load_document(name);
    let engine = Engine::new(EngineConfig::default().with_seed(7));
    let mut state = doc.new_state();

    if let Some(tp) = &doc.template_processing {
        if let Err(e) = engine.template_processing(tp).run(&mut state) {
            return (state, Some(e));
        }
    }

    let responses_path = fixture_dir().join(format!("{}.responses.json", name));
    if responses_path.exists() {
        let responses = read_json(&responses_path, name);
        let bindings = parse_bindings(&responses, &state)
            .unwrap_or_else(|e| panic!("Invalid responses for {}: {}", name, e));
        for (identifier, value) in bindings {
            state
                .set_value(&identifier, value)
                .unwrap_or_else(|e| panic!("Failed to bind {} for {}: {}", identifier, name, e));
        }
    }

    if let Some(rp) = &doc.response_processing {
        if let Err(e) = engine.response_processing(rp).run(&mut state) {
            return (state, Some(e));
        }
    }
    if let Some(op) = &doc.outcome_processing {
        if let Err(e) = engine.outcome_processing(op).run(&mut state) {
            return (state, Some(e));
        }
    }
    (state, None)
}

fn assert_expected(name: &str, state: &State) {
    let expected = read_json(&fixture_dir().join(format!("{}.expected.json", name)), name);
    let expected = expected
        .as_object()
        .unwrap_or_else(|| panic!("Expected values for {} must be an object", name));
    for (identifier, want) in expected {
        let value = state
            .value(identifier)
            .unwrap_or_else(|| panic!("{}: no variable '{}' in state", name, identifier));
        let actual = value_to_json(value);
        assert_eq!(
            &actual, want,
            "Value mismatch for {} in {}\n\nActual: {}\nExpected: {}",
            identifier, name, actual, want,
        );
    }
}

/// Run a fixture that is expected to process cleanly.
fn run_fixture(name: &str) {
    let (state, error) = process(name);
    if let Some(e) = error {
        panic!("Processing failed for {}: {}", name, e);
    }
    assert_expected(name, &state);
}

/// Run a fixture whose processing fails; the state it leaves behind is
/// still compared against the expected values.
fn run_fixture_error(name: &str) -> ProcessingError {
    let (state, error) = process(name);
    let error = error.unwrap_or_else(|| panic!("Expected a processing error for {}, but got success", name));
    assert_expected(name, &state);
    error
}

// ──────────────────────────────────────────────
// Standard templates
// ──────────────────────────────────────────────

#[test]
fn match_correct() {
    run_fixture("match_correct");
}

#[test]
fn map_response() {
    run_fixture("map_response");
}

#[test]
fn map_response_point() {
    run_fixture("map_response_point");
}

// ──────────────────────────────────────────────
// Inline processing
// ──────────────────────────────────────────────

#[test]
fn numeric_tolerance() {
    run_fixture("numeric_tolerance");
}

#[test]
fn template_variables() {
    run_fixture("template_variables");
}

#[test]
fn outcome_lookup() {
    run_fixture("outcome_lookup");
}

#[test]
fn custom_operators() {
    run_fixture("custom_operators");
}

#[test]
fn durations_and_strings() {
    run_fixture("durations_and_strings");
}

// ──────────────────────────────────────────────
// Failures
// ──────────────────────────────────────────────

#[test]
fn aggregate_failure() {
    let error = run_fixture_error("aggregate_failure");
    assert!(matches!(error, ProcessingError::Aggregate(_)));
    assert_eq!(error.failures().len(), 1);
}
