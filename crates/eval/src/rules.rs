//! Rule execution.
//!
//! Rules run in document order against a mutable [`State`]. A rule either
//! completes, fails with a [`RuleError`], or raises a signal (an exit or an
//! unsatisfied `templateConstraint`) that unwinds through enclosing
//! conditionals and fragments until a processing engine handles it.

use qti_core::{
    Assignment, AssignmentKind, BranchRule, ConditionRule, ExitKind, Rule, Scalar, State,
    StateError, Value, VariableRole,
};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::custom::OperatorRegistry;
use crate::error::{ExpressionError, RuleError, RuleSignal};
use crate::evaluator::Evaluator;
use crate::trace::Trace;

pub struct Executor<'e> {
    evaluator: Evaluator<'e>,
    max_depth: usize,
    trace: Trace,
}

impl<'e> Executor<'e> {
    pub fn new(config: &'e EngineConfig, operators: &'e OperatorRegistry) -> Self {
        Executor {
            evaluator: Evaluator::new(config, operators),
            max_depth: config.max_rule_depth,
            trace: Trace::new(),
        }
    }

    pub fn evaluator(&mut self) -> &mut Evaluator<'e> {
        &mut self.evaluator
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn take_trace(&mut self) -> Trace {
        std::mem::take(&mut self.trace)
    }

    /// Execute one rule, including everything nested inside it.
    pub fn execute(&mut self, rule: &Rule, state: &mut State) -> Result<(), RuleSignal> {
        self.exec_at(rule, state, 1)
    }

    /// Execute rules in order, stopping at the first failure or signal.
    pub fn execute_all(&mut self, rules: &[Rule], state: &mut State) -> Result<(), RuleSignal> {
        self.exec_block(rules, state, 1)
    }

    fn exec_block(&mut self, rules: &[Rule], state: &mut State, depth: usize) -> Result<(), RuleSignal> {
        for rule in rules {
            self.exec_at(rule, state, depth)?;
        }
        Ok(())
    }

    fn exec_at(&mut self, rule: &Rule, state: &mut State, depth: usize) -> Result<(), RuleSignal> {
        if depth > self.max_depth {
            return Err(RuleError::DepthExceeded {
                limit: self.max_depth,
            }
            .into());
        }

        let class = rule.class_name();
        self.trace.record_rule(class);
        debug!(rule = class, depth, "executing rule");

        match rule {
            Rule::Assign(assignment) => Ok(self.assign(assignment, state)?),
            Rule::Condition(condition) => self.condition(class, condition, state, depth),
            Rule::Exit(kind) => {
                info!(signal = %kind, "exit raised");
                Err(RuleSignal::Exit(*kind))
            }
            Rule::TemplateConstraint(expression) => {
                let verdict = self
                    .evaluator
                    .evaluate(expression, state)
                    .map_err(|source| RuleError::Expression {
                        rule: class.to_string(),
                        source,
                    })?;
                if verdict.is_true() {
                    Ok(())
                } else {
                    debug!(result = %verdict, "template constraint not satisfied");
                    Err(RuleSignal::ConstraintUnsatisfied)
                }
            }
            Rule::Branch(_) => Err(RuleError::Unsupported {
                rule: class.to_string(),
                context: "item processing".to_string(),
            }
            .into()),
            Rule::Fragment { rules, .. } => self.exec_block(rules, state, depth + 1),
        }
    }

    /// Run the first branch whose guard is `true`, else the `else` block.
    /// NULL and non-boolean guards do not match.
    fn condition(
        &mut self,
        class: &str,
        condition: &ConditionRule,
        state: &mut State,
        depth: usize,
    ) -> Result<(), RuleSignal> {
        for branch in &condition.branches {
            let guard = self
                .evaluator
                .evaluate(&branch.guard, state)
                .map_err(|source| RuleError::Expression {
                    rule: class.to_string(),
                    source,
                })?;
            if guard.is_true() {
                return self.exec_block(&branch.rules, state, depth + 1);
            }
        }
        match &condition.otherwise {
            Some(rules) => self.exec_block(rules, state, depth + 1),
            None => Ok(()),
        }
    }

    // ── Assignments ──────────────────────────────────────────────────

    fn assign(&mut self, assignment: &Assignment, state: &mut State) -> Result<(), RuleError> {
        let rule = assignment.kind.class_name();
        let id = assignment.identifier.as_str();
        let state_error = |source: StateError| RuleError::State {
            rule: rule.to_string(),
            source,
        };

        let target = state.variable(id).map_err(state_error)?;
        let expected_role = match assignment.kind {
            AssignmentKind::SetOutcomeValue | AssignmentKind::LookupOutcomeValue => Some("outcome"),
            AssignmentKind::SetTemplateValue => Some("template"),
            AssignmentKind::SetCorrectResponse => Some("response"),
            AssignmentKind::SetDefaultValue => None,
        };
        if let Some(role) = expected_role {
            if target.role.name() != role {
                return Err(RuleError::InvalidTarget {
                    rule: rule.to_string(),
                    identifier: id.to_string(),
                    message: format!("expected a {} variable, found a {} variable", role, target.role.name()),
                });
            }
        }

        let value = self
            .evaluator
            .evaluate(&assignment.expression, state)
            .map_err(|source| RuleError::Expression {
                rule: rule.to_string(),
                source,
            })?;

        match assignment.kind {
            AssignmentKind::SetOutcomeValue | AssignmentKind::SetTemplateValue => {
                state.set_value(id, value).map_err(state_error)?;
            }
            AssignmentKind::LookupOutcomeValue => {
                let looked_up = lookup_outcome(state, id, &value)?;
                state.set_value(id, looked_up).map_err(state_error)?;
            }
            AssignmentKind::SetCorrectResponse => {
                let variable = state.variable_mut(id).map_err(state_error)?;
                let value = variable.coerce(value).map_err(state_error)?;
                if let VariableRole::Response(info) = &mut variable.role {
                    info.correct_response = value;
                }
            }
            AssignmentKind::SetDefaultValue => {
                let variable = state.variable_mut(id).map_err(state_error)?;
                variable.default_value = variable.coerce(value).map_err(state_error)?;
            }
        }
        debug!(rule, identifier = id, "variable assigned");
        Ok(())
    }
}

/// Map `source` through the lookup table of outcome `id`. NULL looks up
/// the table's default.
fn lookup_outcome(state: &State, id: &str, source: &Value) -> Result<Value, RuleError> {
    let rule = "lookupOutcomeValue";
    let table = state
        .get(id)
        .and_then(|v| v.outcome_info())
        .and_then(|info| info.lookup_table.as_ref())
        .ok_or_else(|| RuleError::InvalidTarget {
            rule: rule.to_string(),
            identifier: id.to_string(),
            message: "no lookup table declared".to_string(),
        })?;

    let target: Option<&Scalar> = match source {
        Value::Null => table.default_value(),
        Value::Single(scalar) => table.lookup(scalar).ok_or_else(|| RuleError::Expression {
            rule: rule.to_string(),
            source: ExpressionError::WrongBaseType {
                operator: rule.to_string(),
                position: 0,
                expected: "integer or float".to_string(),
                got: source.type_name(),
            },
        })?,
        other => {
            return Err(RuleError::Expression {
                rule: rule.to_string(),
                source: ExpressionError::WrongCardinality {
                    operator: rule.to_string(),
                    position: 0,
                    expected: "single".to_string(),
                    got: other.type_name(),
                },
            })
        }
    };
    Ok(target.cloned().map(Value::Single).unwrap_or(Value::Null))
}

/// Evaluate a `branchRule` guard for the session runtime. Returns the
/// target when the guard is `true`.
pub fn evaluate_branch<'r>(
    evaluator: &mut Evaluator<'_>,
    branch: &'r BranchRule,
    state: &State,
) -> Result<Option<&'r str>, ExpressionError> {
    let guard = evaluator.evaluate(&branch.guard, state)?;
    Ok(guard.is_true().then_some(branch.target.as_str()))
}

/// Whether a signal is the exit the given engine stops on.
pub(crate) fn is_exit(signal: &RuleSignal, kind: ExitKind) -> bool {
    matches!(signal, RuleSignal::Exit(k) if *k == kind)
}
