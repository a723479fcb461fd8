//! Error and signal types for evaluation, rule execution and processing.

use std::fmt;

use qti_core::{ExitKind, StateError};

use crate::engine::EngineStatus;

// ──────────────────────────────────────────────
// Expressions
// ──────────────────────────────────────────────

/// Evaluation failures. Any of these aborts the enclosing rule.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    #[error("{operator}: expected at least {min} operand(s), got {got}")]
    NotEnoughOperands {
        operator: String,
        min: usize,
        got: usize,
    },

    #[error("{operator}: expected at most {max} operand(s), got {got}")]
    TooManyOperands {
        operator: String,
        max: usize,
        got: usize,
    },

    #[error("{operator}: operand {position} has cardinality {got}, expected {expected}")]
    WrongCardinality {
        operator: String,
        position: usize,
        expected: String,
        got: String,
    },

    #[error("{operator}: operand {position} has base type {got}, expected {expected}")]
    WrongBaseType {
        operator: String,
        position: usize,
        expected: String,
        got: String,
    },

    #[error("no custom operator registered for class '{class}'")]
    UnknownCustomOperator { class: String },

    #[error("unknown variable: {identifier}")]
    UnknownVariable { identifier: String },

    /// A `correct`, `default`, `mapResponse` or similar reference to a
    /// variable that lacks what the expression needs.
    #[error("{expression} '{identifier}': {message}")]
    InvalidVariable {
        expression: String,
        identifier: String,
        message: String,
    },

    /// An attribute (or the variable it refers to) is unusable.
    #[error("{operator}: invalid {attribute}: {message}")]
    InvalidAttribute {
        operator: String,
        attribute: String,
        message: String,
    },

    /// Operator-specific semantic failures, including malformed custom
    /// operator payloads.
    #[error("{operator}: {message}")]
    InvalidOperand { operator: String, message: String },

    #[error("{operator}: integer overflow")]
    Overflow { operator: String },

    #[error("{operator}: result would hold {requested} values, over the limit of {limit}")]
    ContainerTooLarge {
        operator: String,
        requested: usize,
        limit: usize,
    },

    #[error("expression nesting exceeds the limit of {limit}")]
    DepthExceeded { limit: usize },
}

// ──────────────────────────────────────────────
// Rules
// ──────────────────────────────────────────────

/// Rule execution failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleError {
    #[error("{rule}: {source}")]
    Expression {
        rule: String,
        source: ExpressionError,
    },

    #[error("{rule}: {source}")]
    State { rule: String, source: StateError },

    /// The rule's target exists but cannot be written by this rule.
    #[error("{rule} '{identifier}': {message}")]
    InvalidTarget {
        rule: String,
        identifier: String,
        message: String,
    },

    #[error("{rule} is not supported in {context}")]
    Unsupported { rule: String, context: String },

    /// An exit or constraint signal reached an engine that does not handle it.
    #[error("{signal} raised during {context}")]
    UnexpectedSignal { signal: String, context: String },

    #[error("rule nesting exceeds the limit of {limit}")]
    DepthExceeded { limit: usize },

    #[error("template not found: {uri}")]
    TemplateNotFound { uri: String },

    #[error("template '{uri}' could not be loaded: {message}")]
    TemplateError { uri: String, message: String },
}

/// Everything that can stop a rule short of completing normally.
///
/// Exits and unsatisfied constraints are successful terminations that
/// unwind through nested conditionals until an engine handles them.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleSignal {
    Exit(ExitKind),
    ConstraintUnsatisfied,
    Failure(RuleError),
}

impl From<RuleError> for RuleSignal {
    fn from(e: RuleError) -> Self {
        RuleSignal::Failure(e)
    }
}

impl fmt::Display for RuleSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleSignal::Exit(kind) => write!(f, "{}", kind),
            RuleSignal::ConstraintUnsatisfied => f.write_str("templateConstraint"),
            RuleSignal::Failure(e) => write!(f, "{}", e),
        }
    }
}

// ──────────────────────────────────────────────
// Processing
// ──────────────────────────────────────────────

/// Failures collected across top-level rules by response processing.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingFailure {
    pub failures: Vec<RuleError>,
}

impl fmt::Display for ProcessingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rule(s) failed", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProcessingFailure {}

/// Why a processing run did not complete.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProcessingError {
    /// Template and outcome processing stop at the first failure.
    #[error(transparent)]
    Rule(#[from] RuleError),

    /// Response processing keeps going and reports everything at the end.
    #[error(transparent)]
    Aggregate(#[from] ProcessingFailure),

    #[error("processor cannot run from status {status}")]
    NotIdle { status: EngineStatus },
}

impl ProcessingError {
    /// All underlying rule failures, in the order they happened.
    pub fn failures(&self) -> Vec<&RuleError> {
        match self {
            ProcessingError::Rule(e) => vec![e],
            ProcessingError::Aggregate(agg) => agg.failures.iter().collect(),
            ProcessingError::NotIdle { .. } => Vec::new(),
        }
    }
}
