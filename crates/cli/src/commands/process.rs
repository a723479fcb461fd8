use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use qti_core::{Processing, State};
use qti_eval::{Engine, EngineConfig, ProcessingKind, ProcessingReport};
use serde_json::json;
use tracing::info;

use super::load_document;
use crate::loader::FileTemplateLoader;
use crate::{report_error, OutputFormat};

pub(crate) struct ProcessOptions {
    pub(crate) responses: Option<PathBuf>,
    pub(crate) config: Option<PathBuf>,
    pub(crate) seed: Option<u64>,
    pub(crate) trace: bool,
}

/// One completed processing run, kept for the final report.
struct Run {
    kind: ProcessingKind,
    report: ProcessingReport,
    trace: Vec<String>,
}

fn load_config(path: Option<&Path>, output: OutputFormat, quiet: bool) -> EngineConfig {
    let Some(path) = path else {
        return EngineConfig::default();
    };
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => {
            let msg = format!("error: config file not found: {}", path.display());
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    match toml::from_str(&text) {
        Ok(config) => config,
        Err(e) => {
            let msg = format!("error: invalid config {}: {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

fn bind_responses(path: &Path, state: &mut State, output: OutputFormat, quiet: bool) {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => {
            let msg = format!("error: responses file not found: {}", path.display());
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    let json: serde_json::Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => {
            let msg = format!("error: invalid JSON in {}: {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    let bindings = match qti_interchange::parse_bindings(&json, state) {
        Ok(b) => b,
        Err(e) => {
            let msg = format!("error: invalid responses {}: {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    for (identifier, value) in bindings {
        if let Err(e) = state.set_value(&identifier, value) {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

fn run(
    engine: &Engine,
    kind: ProcessingKind,
    processing: &Processing,
    state: &mut State,
    output: OutputFormat,
    quiet: bool,
) -> Run {
    let mut processor = match kind {
        ProcessingKind::Template => engine.template_processing(processing),
        ProcessingKind::Response => engine.response_processing(processing),
        ProcessingKind::Outcome => engine.outcome_processing(processing),
    };
    match processor.run(state) {
        Ok(report) => Run {
            kind,
            report,
            trace: processor.trace().lines().to_vec(),
        },
        Err(e) => {
            let mut msg = format!("error: {} failed", kind);
            for failure in e.failures() {
                msg.push_str(&format!("\n  {}", failure));
            }
            if e.failures().is_empty() {
                msg.push_str(&format!(": {}", e));
            }
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

pub(crate) fn cmd_process(file: &Path, options: &ProcessOptions, output: OutputFormat, quiet: bool) {
    let doc = load_document(file, output, quiet);

    let mut config = load_config(options.config.as_deref(), output, quiet);
    if let Some(seed) = options.seed {
        config.seed = Some(seed);
    }
    // Template files are looked up next to the document
    let base = file.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    let engine = Engine::new(config).with_template_loader(Arc::new(FileTemplateLoader::new(base)));

    let mut state = doc.new_state();
    let mut runs = Vec::new();

    if let Some(tp) = &doc.template_processing {
        runs.push(run(&engine, ProcessingKind::Template, tp, &mut state, output, quiet));
    }
    if let Some(path) = &options.responses {
        bind_responses(path, &mut state, output, quiet);
    }
    if let Some(rp) = &doc.response_processing {
        runs.push(run(&engine, ProcessingKind::Response, rp, &mut state, output, quiet));
    }
    if let Some(op) = &doc.outcome_processing {
        runs.push(run(&engine, ProcessingKind::Outcome, op, &mut state, output, quiet));
    }
    info!(document = %doc.identifier, runs = runs.len(), "document processed");

    if quiet {
        return;
    }
    match output {
        OutputFormat::Json => {
            let runs: Vec<serde_json::Value> = runs
                .iter()
                .map(|r| {
                    let mut entry = json!({
                        "kind": r.kind.name(),
                        "exited": r.report.exited,
                        "attempts": r.report.attempts,
                        "constraintSatisfied": r.report.constraint_satisfied,
                    });
                    if options.trace {
                        entry["trace"] = json!(r.trace);
                    }
                    entry
                })
                .collect();
            let report = json!({
                "identifier": doc.identifier,
                "runs": runs,
                "state": qti_interchange::state_to_json(&state),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&report)
                    .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e))
            );
        }
        OutputFormat::Text => {
            for r in &runs {
                let mut line = format!("{}: completed", r.kind);
                if r.report.exited {
                    line.push_str(" (exited early)");
                }
                if r.report.attempts > 1 {
                    line.push_str(&format!(" after {} attempts", r.report.attempts));
                }
                if !r.report.constraint_satisfied {
                    line.push_str(", template constraints unsatisfied");
                }
                println!("{}", line);
                if options.trace {
                    for entry in &r.trace {
                        println!("  {}", entry);
                    }
                }
            }
            println!("Variables:");
            for v in state.iter() {
                println!("  {} ({} {}) = {}", v.identifier, v.role.name(), v.declared_type(), v.value);
            }
        }
    }
}
