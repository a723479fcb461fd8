//! qti-eval: runs QTI processing against a variable [`State`].
//!
//! Evaluation happens in three layers:
//!
//! 1. [`Evaluator`] turns an [`Expression`] into a [`Value`], dispatching
//!    built-in operators and looking up `customOperator`s in an
//!    [`OperatorRegistry`].
//! 2. [`Executor`] runs [`Rule`]s: assignments, conditionals, exits and
//!    template constraints.
//! 3. [`Engine`] ties a processing block (inline rules or a resolved
//!    template) to the rule executor with the behaviour of template,
//!    response or outcome processing.
//!
//! The caller owns the state. Engines share their configuration, operator
//! registry and template mapping read-only, so one engine can serve many
//! independent states.

pub mod config;
pub mod custom;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod operators;
pub mod rules;
pub mod template;
pub mod trace;

pub use config::EngineConfig;
pub use custom::{ExtensionOperator, OperatorRegistry};
pub use engine::{Engine, EngineStatus, ProcessingKind, ProcessingReport, Processor};
pub use error::{ExpressionError, ProcessingError, ProcessingFailure, RuleError, RuleSignal};
pub use evaluator::Evaluator;
pub use rules::{evaluate_branch, Executor};
pub use template::{StaticTemplateLoader, TemplateLoader, TemplateResolver};
pub use trace::Trace;

use qti_core::{Expression, Rule, State, Value};

/// Evaluate one expression with the default configuration and the
/// standard custom operators.
pub fn evaluate(expression: &Expression, state: &State) -> Result<Value, ExpressionError> {
    let config = EngineConfig::default();
    let operators = OperatorRegistry::standard();
    Evaluator::new(&config, &operators).evaluate(expression, state)
}

/// Execute one rule with the default configuration and the standard
/// custom operators.
pub fn execute(rule: &Rule, state: &mut State) -> Result<(), RuleSignal> {
    let config = EngineConfig::default();
    let operators = OperatorRegistry::standard();
    Executor::new(&config, &operators).execute(rule, state)
}
