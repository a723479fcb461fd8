pub(crate) mod check;
pub(crate) mod process;

use std::path::Path;

use qti_interchange::Document;

use crate::{report_error, OutputFormat};

/// Read and parse an interchange document, exiting on failure.
pub(crate) fn load_document(path: &Path, output: OutputFormat, quiet: bool) -> Document {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => {
            let msg = format!("error: document file not found: {}", path.display());
            report_error(&msg, output, quiet);
            std::process::exit(1);
        }
    };
    match qti_interchange::from_str(&text) {
        Ok(doc) => doc,
        Err(e) => {
            let msg = format!("error: invalid document {}: {}", path.display(), e);
            report_error(&msg, output, quiet);
            std::process::exit(1);
        }
    }
}
