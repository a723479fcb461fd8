//! Template processing, restarted while `templateConstraint`s fail.

use qti_core::{ExitKind, Rule, State};
use tracing::{debug, info, warn};

use super::{ProcessingKind, ProcessingReport};
use crate::error::{ProcessingError, RuleError, RuleSignal};
use crate::rules::{is_exit, Executor};

/// Each attempt starts from the template variables' defaults. After
/// `max_attempts` unsatisfied attempts the variables are reset once more
/// and the run still succeeds, reporting `constraint_satisfied: false`.
pub(super) fn run(
    executor: &mut Executor<'_>,
    rules: &[Rule],
    state: &mut State,
    max_attempts: usize,
) -> Result<ProcessingReport, ProcessingError> {
    let max_attempts = max_attempts.max(1);

    for attempt in 1..=max_attempts {
        state.reset_templates();
        let exited = match executor.execute_all(rules, state) {
            Ok(()) => false,
            Err(signal) if is_exit(&signal, ExitKind::Template) => {
                info!(attempt, "exitTemplate reached, skipping remaining rules");
                true
            }
            Err(RuleSignal::ConstraintUnsatisfied) => {
                debug!(attempt, "template constraint unsatisfied, retrying");
                continue;
            }
            Err(RuleSignal::Failure(e)) => return Err(e.into()),
            Err(other) => {
                return Err(RuleError::UnexpectedSignal {
                    signal: other.to_string(),
                    context: ProcessingKind::Template.to_string(),
                }
                .into())
            }
        };
        return Ok(ProcessingReport {
            exited,
            attempts: attempt,
            constraint_satisfied: true,
        });
    }

    warn!(attempts = max_attempts, "template constraints never satisfied, using defaults");
    state.reset_templates();
    Ok(ProcessingReport {
        exited: false,
        attempts: max_attempts,
        constraint_satisfied: false,
    })
}
