use std::path::Path;

use qti_core::Processing;
use qti_eval::Engine;
use serde_json::json;

use super::load_document;
use crate::OutputFormat;

fn processing_json(processing: Option<&Processing>, engine: &Engine) -> serde_json::Value {
    match processing {
        None => serde_json::Value::Null,
        Some(p) => json!({
            "rules": p.rules.iter().map(|r| r.count()).sum::<usize>(),
            "template": p.template,
            "templateLocation": p.template_location,
            "templateKnown": p.template.as_deref().map(|uri| engine.templates().location(uri).is_some()),
        }),
    }
}

fn processing_text(name: &str, processing: Option<&Processing>, engine: &Engine) {
    let Some(p) = processing else {
        println!("  {}: none", name);
        return;
    };
    if !p.rules.is_empty() {
        let count: usize = p.rules.iter().map(|r| r.count()).sum();
        println!("  {}: {} rule(s)", name, count);
        return;
    }
    match (&p.template, &p.template_location) {
        (Some(uri), _) => {
            let known = if engine.templates().location(uri).is_some() {
                "known"
            } else {
                "unmapped"
            };
            println!("  {}: template {} ({})", name, uri, known);
        }
        (None, Some(location)) => println!("  {}: template at {}", name, location),
        (None, None) => println!("  {}: empty", name),
    }
}

pub(crate) fn cmd_check(file: &Path, output: OutputFormat, quiet: bool) {
    let doc = load_document(file, output, quiet);
    if quiet {
        return;
    }
    let engine = Engine::default();

    match output {
        OutputFormat::Json => {
            let declarations: Vec<serde_json::Value> = doc
                .declarations
                .iter()
                .map(|v| {
                    json!({
                        "identifier": v.identifier,
                        "role": v.role.name(),
                        "type": v.declared_type(),
                    })
                })
                .collect();
            let report = json!({
                "identifier": doc.identifier,
                "declarations": declarations,
                "templateProcessing": processing_json(doc.template_processing.as_ref(), &engine),
                "responseProcessing": processing_json(doc.response_processing.as_ref(), &engine),
                "outcomeProcessing": processing_json(doc.outcome_processing.as_ref(), &engine),
                "rules": doc.rule_count(),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&report)
                    .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e))
            );
        }
        OutputFormat::Text => {
            println!("Document: {}", doc.identifier);
            println!("Declarations: {}", doc.declarations.len());
            for v in &doc.declarations {
                println!("  {} {}: {}", v.role.name(), v.identifier, v.declared_type());
            }
            println!("Processing:");
            processing_text("template", doc.template_processing.as_ref(), &engine);
            processing_text("response", doc.response_processing.as_ref(), &engine);
            processing_text("outcome", doc.outcome_processing.as_ref(), &engine);
            println!("Rules: {}", doc.rule_count());
        }
    }
}
