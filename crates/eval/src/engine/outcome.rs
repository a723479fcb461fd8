//! Outcome processing: the first failure stops the run.

use qti_core::{ExitKind, Rule, State};
use tracing::info;

use super::{ProcessingKind, ProcessingReport};
use crate::error::{ProcessingError, RuleError, RuleSignal};
use crate::rules::{is_exit, Executor};

pub(super) fn run(
    executor: &mut Executor<'_>,
    rules: &[Rule],
    state: &mut State,
) -> Result<ProcessingReport, ProcessingError> {
    match executor.execute_all(rules, state) {
        Ok(()) => Ok(ProcessingReport::completed(false)),
        Err(signal) if is_exit(&signal, ExitKind::Test) => {
            info!("exitTest reached, skipping remaining rules");
            Ok(ProcessingReport::completed(true))
        }
        Err(RuleSignal::Failure(e)) => Err(e.into()),
        Err(other) => Err(RuleError::UnexpectedSignal {
            signal: other.to_string(),
            context: ProcessingKind::Outcome.to_string(),
        }
        .into()),
    }
}
