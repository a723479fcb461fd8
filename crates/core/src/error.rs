//! Errors raised while building values, trees and variable state.

use crate::types::{BaseType, Cardinality};

/// Construction-time errors for the value model and the expression tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Text could not be read as a value of the requested base type.
    #[error("cannot parse '{text}' as {base_type}")]
    InvalidLiteral { base_type: BaseType, text: String },

    /// A container element does not share the container's base type.
    #[error("container of {expected} cannot hold a {got} value")]
    ContainerTypeMismatch { expected: BaseType, got: BaseType },

    /// Coordinates do not describe the declared shape.
    #[error("invalid coords for {shape}: {message}")]
    InvalidCoords { shape: String, message: String },

    /// `absolute` and `relative` tolerance modes need an explicit tolerance.
    #[error("tolerance mode '{mode}' requires a tolerance")]
    MissingTolerance { mode: String },

    /// A duration literal outside the supported ISO 8601 subset.
    #[error("invalid duration '{0}'")]
    InvalidDuration(String),

    /// An operator attribute outside its allowed range.
    #[error("invalid {attribute}: {message}")]
    InvalidAttribute { attribute: String, message: String },

    /// A cardinality/base-type pair that cannot be declared.
    #[error("cardinality {cardinality} cannot be combined with base type {base_type:?}")]
    InvalidDeclaration {
        cardinality: Cardinality,
        base_type: Option<BaseType>,
    },
}

/// Errors raised by [`crate::State`] lookups and assignments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// No variable with this identifier was declared.
    #[error("unknown variable: {identifier}")]
    UnknownVariable { identifier: String },

    /// The value cannot be coerced into the variable's declaration.
    #[error("variable '{identifier}' ({expected}) cannot hold a {got} value")]
    IncompatibleValue {
        identifier: String,
        expected: String,
        got: String,
    },
}
