//! Response processing: every top-level rule runs, failures are collected.

use qti_core::{ExitKind, Rule, State};
use tracing::{info, warn};

use super::{ProcessingKind, ProcessingReport};
use crate::error::{ProcessingError, ProcessingFailure, RuleError, RuleSignal};
use crate::rules::{is_exit, Executor};

/// A failing top-level rule does not stop the rules after it; the run
/// fails at the end with every failure. `exitResponse` stops the loop and
/// the run succeeds unless earlier rules failed.
pub(super) fn run(
    executor: &mut Executor<'_>,
    rules: &[Rule],
    state: &mut State,
) -> Result<ProcessingReport, ProcessingError> {
    let mut failures = Vec::new();
    let mut exited = false;

    for rule in rules {
        match executor.execute(rule, state) {
            Ok(()) => {}
            Err(signal) if is_exit(&signal, ExitKind::Response) => {
                info!("exitResponse reached, skipping remaining rules");
                exited = true;
                break;
            }
            Err(RuleSignal::Failure(e)) => {
                warn!(rule = rule.class_name(), error = %e, "response rule failed");
                failures.push(e);
            }
            Err(other) => {
                let e = RuleError::UnexpectedSignal {
                    signal: other.to_string(),
                    context: ProcessingKind::Response.to_string(),
                };
                warn!(rule = rule.class_name(), error = %e, "response rule failed");
                failures.push(e);
            }
        }
    }

    if failures.is_empty() {
        Ok(ProcessingReport::completed(exited))
    } else {
        Err(ProcessingFailure { failures }.into())
    }
}
