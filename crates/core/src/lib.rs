//! qti-core: the data side of the QTI processing model.
//!
//! Provides the typed value model, variable declarations, the per-attempt
//! [`State`], and the expression and rule trees that `qti-eval` runs.
//!
//! # Public API
//!
//! - Values: [`Value`], [`Scalar`], [`Container`], [`Record`], [`BaseType`],
//!   [`Cardinality`], plus [`Duration`] and [`Coords`] for the types with
//!   their own arithmetic and geometry
//! - Variables: [`Variable`], [`VariableRole`], [`Mapping`], [`AreaMapping`],
//!   [`LookupTable`]
//! - Trees: [`Expression`], [`OperatorKind`], [`Rule`]
//! - Errors: [`ModelError`], [`StateError`]

pub mod error;
pub mod expression;
pub mod rule;
pub mod state;
pub mod types;
pub mod variable;

// ── Convenience re-exports ───────────────────────────────────────────

pub use error::{ModelError, StateError};
pub use expression::{
    CustomOperator, Equality, Expression, FloatOrVariableRef, IntegerOrVariableRef, MathConstant,
    MathFunction, Operator, OperatorKind, OrVariableRef, RoundingMode, StatsFunction,
    StringOrVariableRef, ToleranceMode,
};
pub use rule::{
    Assignment, AssignmentKind, BranchRule, ConditionBranch, ConditionRule, ExitKind, Processing,
    Rule, RuleFamily,
};
pub use state::State;
pub use types::{
    BaseType, Cardinality, Container, Coords, DirectedPair, Duration, FileValue, IntOrIdentifier,
    Pair, Point, Record, Scalar, Shape, Value,
};
pub use variable::{
    AreaMapEntry, AreaMapping, InterpolationEntry, LookupTable, MapEntry, Mapping, MatchEntry,
    OutcomeInfo, ResponseInfo, TemplateInfo, Variable, VariableRole,
};
