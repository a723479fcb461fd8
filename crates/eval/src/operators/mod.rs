//! Built-in operators.
//!
//! Every operator declares a [`Signature`]: how many operands it takes and
//! which cardinalities and base types each position accepts. Operands are
//! checked against it before the operator runs, so the implementations in
//! the submodules can assume well-typed input.
//!
//! Unless a signature opts out, a `NULL` operand (including an empty
//! container or empty string) makes the whole operator `NULL`.

mod arith;
mod compare;
mod container;
mod logic;

pub use compare::PatternCache;

use qti_core::{BaseType, Cardinality, OperatorKind, OrVariableRef, Scalar, State, Value};
use rand::rngs::StdRng;

use crate::error::ExpressionError;

// ──────────────────────────────────────────────
// Signatures
// ──────────────────────────────────────────────

/// What one operand position accepts. An empty `base_types` accepts any.
#[derive(Debug, Clone, Copy)]
pub struct Accepts {
    pub cardinalities: &'static [Cardinality],
    pub base_types: &'static [BaseType],
}

/// Operand constraints for an operator. The last entry of `operands`
/// covers every position past the end of the list.
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    pub min: usize,
    /// `None` for unbounded.
    pub max: Option<usize>,
    pub operands: &'static [Accepts],
    pub propagate_null: bool,
}

pub const SINGLE: &[Cardinality] = &[Cardinality::Single];
pub const CONTAINERS: &[Cardinality] = &[Cardinality::Multiple, Cardinality::Ordered];
pub const NOT_RECORD: &[Cardinality] = &[
    Cardinality::Single,
    Cardinality::Multiple,
    Cardinality::Ordered,
];
pub const ANY_CARDINALITY: &[Cardinality] = &[
    Cardinality::Single,
    Cardinality::Multiple,
    Cardinality::Ordered,
    Cardinality::Record,
];

pub const ANY: &[BaseType] = &[];
pub const BOOLEAN: &[BaseType] = &[BaseType::Boolean];
pub const INTEGER: &[BaseType] = &[BaseType::Integer];
pub const NUMERIC: &[BaseType] = &[BaseType::Integer, BaseType::Float];
pub const STRING: &[BaseType] = &[BaseType::String];
pub const DURATION: &[BaseType] = &[BaseType::Duration];
pub const POINT: &[BaseType] = &[BaseType::Point];
/// Base types with a usable exact equality (`match`, `member`, ...).
pub const MATCHABLE: &[BaseType] = &[
    BaseType::Boolean,
    BaseType::Integer,
    BaseType::String,
    BaseType::Identifier,
    BaseType::Uri,
    BaseType::IntOrIdentifier,
    BaseType::Point,
    BaseType::Pair,
    BaseType::DirectedPair,
    BaseType::File,
];

const fn accepts(cardinalities: &'static [Cardinality], base_types: &'static [BaseType]) -> Accepts {
    Accepts {
        cardinalities,
        base_types,
    }
}

const fn fixed(n: usize, operands: &'static [Accepts]) -> Signature {
    Signature {
        min: n,
        max: Some(n),
        operands,
        propagate_null: true,
    }
}

const fn at_least(n: usize, operands: &'static [Accepts]) -> Signature {
    Signature {
        min: n,
        max: None,
        operands,
        propagate_null: true,
    }
}

const fn handles_null(sig: Signature) -> Signature {
    Signature {
        propagate_null: false,
        ..sig
    }
}

const SINGLE_BOOLEAN: &[Accepts] = &[accepts(SINGLE, BOOLEAN)];
const SINGLE_NUMERIC: &[Accepts] = &[accepts(SINGLE, NUMERIC)];
const SINGLE_INTEGER: &[Accepts] = &[accepts(SINGLE, INTEGER)];
const SINGLE_STRING: &[Accepts] = &[accepts(SINGLE, STRING)];
const SINGLE_DURATION: &[Accepts] = &[accepts(SINGLE, DURATION)];
const ANY_POINTS: &[Accepts] = &[accepts(NOT_RECORD, POINT)];
const ANY_INTEGERS: &[Accepts] = &[accepts(NOT_RECORD, INTEGER)];
const ANY_NUMBERS: &[Accepts] = &[accepts(NOT_RECORD, NUMERIC)];
const MATCHABLE_VALUES: &[Accepts] = &[accepts(NOT_RECORD, MATCHABLE)];
const NUMERIC_CONTAINER: &[Accepts] = &[accepts(CONTAINERS, NUMERIC)];
const ANY_CONTAINER: &[Accepts] = &[accepts(CONTAINERS, ANY)];
const ANYTHING: &[Accepts] = &[accepts(ANY_CARDINALITY, ANY)];
const ORDERED_CONTAINER: &[Accepts] = &[accepts(&[Cardinality::Ordered], ANY)];
const RECORD: &[Accepts] = &[accepts(&[Cardinality::Record], ANY)];
const SINGLE_OR_MULTIPLE: &[Accepts] = &[accepts(&[Cardinality::Single, Cardinality::Multiple], ANY)];
const SINGLE_OR_ORDERED: &[Accepts] = &[accepts(&[Cardinality::Single, Cardinality::Ordered], ANY)];
const VALUE_THEN_CONTAINER: &[Accepts] = &[accepts(SINGLE, MATCHABLE), accepts(CONTAINERS, MATCHABLE)];
const MATCHABLE_CONTAINERS: &[Accepts] = &[accepts(CONTAINERS, MATCHABLE)];

pub fn signature(kind: &OperatorKind) -> Signature {
    use OperatorKind::*;
    match kind {
        And | Or | AnyN { .. } => handles_null(at_least(1, SINGLE_BOOLEAN)),
        Not => fixed(1, SINGLE_BOOLEAN),

        Match => fixed(2, MATCHABLE_VALUES),
        StringMatch { .. } | Substring { .. } => fixed(2, SINGLE_STRING),
        PatternMatch { .. } => fixed(1, SINGLE_STRING),
        Equal(_) | EqualRounded { .. } | Lt | Gt | Lte | Gte => fixed(2, SINGLE_NUMERIC),
        DurationLt | DurationGte => fixed(2, SINGLE_DURATION),
        Inside { .. } => fixed(1, ANY_POINTS),

        Sum | Product => at_least(1, SINGLE_NUMERIC),
        Subtract | Divide | Power => fixed(2, SINGLE_NUMERIC),
        IntegerDivide | IntegerModulus => fixed(2, SINGLE_INTEGER),
        Truncate | Round | RoundTo { .. } => fixed(1, SINGLE_NUMERIC),
        IntegerToFloat => fixed(1, SINGLE_INTEGER),
        Gcd | Lcm => at_least(1, ANY_INTEGERS),
        Min | Max => at_least(1, ANY_NUMBERS),
        Math(f) => fixed(f.arity(), SINGLE_NUMERIC),
        Stats(_) => fixed(1, NUMERIC_CONTAINER),

        Multiple => handles_null(at_least(0, SINGLE_OR_MULTIPLE)),
        Ordered => handles_null(at_least(0, SINGLE_OR_ORDERED)),
        ContainerSize => handles_null(fixed(1, ANY_CONTAINER)),
        IsNull => handles_null(fixed(1, ANYTHING)),
        Index { .. } => fixed(1, ORDERED_CONTAINER),
        FieldValue { .. } => fixed(1, RECORD),
        Random => fixed(1, ANY_CONTAINER),
        Member | Delete => fixed(2, VALUE_THEN_CONTAINER),
        Contains => fixed(2, MATCHABLE_CONTAINERS),
        Repeat { .. } => handles_null(at_least(1, SINGLE_OR_ORDERED)),
    }
}

fn describe_cardinalities(cards: &[Cardinality]) -> String {
    cards.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(" or ")
}

fn describe_base_types(types: &[BaseType]) -> String {
    types.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(" or ")
}

/// Validate operand count, cardinalities and base types.
///
/// Returns whether any operand is `NULL` in the QTI sense. `Value::Null`
/// operands are not type-checked; empty containers are.
pub fn check_operands(
    operator: &str,
    signature: &Signature,
    operands: &[Value],
) -> Result<bool, ExpressionError> {
    if operands.len() < signature.min {
        return Err(ExpressionError::NotEnoughOperands {
            operator: operator.to_string(),
            min: signature.min,
            got: operands.len(),
        });
    }
    if let Some(max) = signature.max {
        if operands.len() > max {
            return Err(ExpressionError::TooManyOperands {
                operator: operator.to_string(),
                max,
                got: operands.len(),
            });
        }
    }

    let mut any_null = false;
    for (position, value) in operands.iter().enumerate() {
        any_null |= value.is_null();
        let Some(cardinality) = value.cardinality() else {
            continue;
        };
        let Some(accepts) = signature
            .operands
            .get(position)
            .or_else(|| signature.operands.last())
        else {
            continue;
        };
        if !accepts.cardinalities.contains(&cardinality) {
            return Err(ExpressionError::WrongCardinality {
                operator: operator.to_string(),
                position,
                expected: describe_cardinalities(accepts.cardinalities),
                got: cardinality.to_string(),
            });
        }
        if accepts.base_types.is_empty() {
            continue;
        }
        match value.base_type() {
            Some(bt) if accepts.base_types.contains(&bt) => {}
            other => {
                return Err(ExpressionError::WrongBaseType {
                    operator: operator.to_string(),
                    position,
                    expected: describe_base_types(accepts.base_types),
                    got: other.map(|bt| bt.to_string()).unwrap_or_else(|| "record".to_string()),
                })
            }
        }
    }
    Ok(any_null)
}

// ──────────────────────────────────────────────
// Dispatch
// ──────────────────────────────────────────────

/// What operators may read besides their operands.
pub struct OperatorContext<'a> {
    pub state: &'a State,
    pub rng: &'a mut StdRng,
    pub patterns: &'a mut PatternCache,
    pub max_container_size: usize,
}

impl OperatorContext<'_> {
    pub fn resolve_integer(
        &self,
        operator: &str,
        attribute: &str,
        value: &OrVariableRef<i64>,
    ) -> Result<i64, ExpressionError> {
        match value {
            OrVariableRef::Value(v) => Ok(*v),
            OrVariableRef::Variable(id) => match self.lookup(operator, attribute, id)? {
                Value::Single(Scalar::Integer(i)) => Ok(*i),
                other => Err(attribute_error(operator, attribute, id, other, "integer")),
            },
        }
    }

    pub fn resolve_float(
        &self,
        operator: &str,
        attribute: &str,
        value: &OrVariableRef<f64>,
    ) -> Result<f64, ExpressionError> {
        match value {
            OrVariableRef::Value(v) => Ok(*v),
            OrVariableRef::Variable(id) => {
                let found = self.lookup(operator, attribute, id)?;
                found
                    .as_single()
                    .and_then(Scalar::as_f64)
                    .ok_or_else(|| attribute_error(operator, attribute, id, found, "numeric"))
            }
        }
    }

    pub fn resolve_string(
        &self,
        operator: &str,
        attribute: &str,
        value: &OrVariableRef<String>,
    ) -> Result<String, ExpressionError> {
        match value {
            OrVariableRef::Value(v) => Ok(v.clone()),
            OrVariableRef::Variable(id) => match self.lookup(operator, attribute, id)? {
                Value::Single(Scalar::String(s)) | Value::Single(Scalar::Identifier(s)) => {
                    Ok(s.clone())
                }
                other => Err(attribute_error(operator, attribute, id, other, "string")),
            },
        }
    }

    fn lookup(&self, operator: &str, attribute: &str, id: &str) -> Result<&Value, ExpressionError> {
        self.state
            .value(id)
            .ok_or_else(|| ExpressionError::InvalidAttribute {
                operator: operator.to_string(),
                attribute: attribute.to_string(),
                message: format!("refers to undeclared variable '{}'", id),
            })
    }
}

fn attribute_error(operator: &str, attribute: &str, id: &str, got: &Value, wanted: &str) -> ExpressionError {
    ExpressionError::InvalidAttribute {
        operator: operator.to_string(),
        attribute: attribute.to_string(),
        message: format!(
            "variable '{}' holds a {} value, expected a single {}",
            id,
            got.type_name(),
            wanted
        ),
    }
}

pub(crate) fn invalid_operand(operator: &str, message: impl Into<String>) -> ExpressionError {
    ExpressionError::InvalidOperand {
        operator: operator.to_string(),
        message: message.into(),
    }
}

/// Apply a built-in operator to already evaluated operands.
pub fn apply(
    kind: &OperatorKind,
    operands: Vec<Value>,
    ctx: &mut OperatorContext<'_>,
) -> Result<Value, ExpressionError> {
    let name = kind.name();
    let any_null = check_operands(name, &signature(kind), &operands)?;
    if any_null && signature(kind).propagate_null {
        return Ok(Value::Null);
    }

    use OperatorKind::*;
    match kind {
        And => Ok(logic::and(&operands)),
        Or => Ok(logic::or(&operands)),
        Not => Ok(logic::not(&operands)),
        AnyN { min, max } => {
            let min = ctx.resolve_integer(name, "min", min)?;
            let max = ctx.resolve_integer(name, "max", max)?;
            Ok(logic::any_n(&operands, min, max))
        }

        Match => compare::match_values(&operands),
        StringMatch {
            case_sensitive,
            substring,
        } => Ok(compare::string_match(&operands, *case_sensitive, *substring)),
        PatternMatch { pattern } => {
            let pattern = ctx.resolve_string(name, "pattern", pattern)?;
            compare::pattern_match(&operands, &pattern, ctx.patterns)
        }
        Substring { case_sensitive } => Ok(compare::substring(&operands, *case_sensitive)),
        Equal(equality) => compare::equal(&operands, equality, ctx),
        EqualRounded { mode, figures } => {
            let figures = ctx.resolve_integer(name, "figures", figures)?;
            compare::equal_rounded(&operands, *mode, figures)
        }
        Lt | Gt | Lte | Gte => Ok(compare::numeric_order(kind, &operands)),
        DurationLt | DurationGte => Ok(compare::duration_order(kind, &operands)),
        Inside { coords } => Ok(compare::inside(&operands, coords)),

        Sum => arith::sum(&operands),
        Product => arith::product(&operands),
        Subtract => arith::subtract(&operands),
        Divide => Ok(arith::divide(&operands)),
        Power => Ok(arith::power(&operands)),
        IntegerDivide => arith::integer_divide(&operands),
        IntegerModulus => arith::integer_modulus(&operands),
        Truncate => Ok(arith::truncate(&operands)),
        Round => Ok(arith::round(&operands)),
        RoundTo { mode, figures } => {
            let figures = ctx.resolve_integer(name, "figures", figures)?;
            arith::round_to(&operands, *mode, figures)
        }
        IntegerToFloat => Ok(arith::integer_to_float(&operands)),
        Gcd => arith::gcd(&operands),
        Lcm => arith::lcm(&operands),
        Min => Ok(arith::extremum(&operands, false)),
        Max => Ok(arith::extremum(&operands, true)),
        Math(function) => Ok(arith::math(*function, &operands)),
        Stats(function) => Ok(arith::stats(*function, &operands)),

        Multiple => container::collect(name, operands, false),
        Ordered => container::collect(name, operands, true),
        ContainerSize => Ok(container::size(&operands)),
        IsNull => Ok(Value::boolean(operands[0].is_null())),
        Index { n } => {
            let n = ctx.resolve_integer(name, "n", n)?;
            container::index(&operands, n)
        }
        FieldValue { field } => Ok(container::field_value(&operands, field)),
        Random => Ok(container::random(&operands, ctx.rng)),
        Member => container::member(&operands),
        Delete => container::delete(&operands),
        Contains => container::contains(&operands),
        Repeat { number_repeats } => {
            let repeats = ctx.resolve_integer(name, "numberRepeats", number_repeats)?;
            container::repeat(name, operands, repeats, ctx.max_container_size)
        }
    }
}

/// Numeric view of a single operand. Only valid after signature checks.
pub(crate) fn number(value: &Value) -> f64 {
    value.as_single().and_then(Scalar::as_f64).unwrap_or(f64::NAN)
}

pub(crate) fn integer(value: &Value) -> i64 {
    value.as_single().and_then(Scalar::as_integer).unwrap_or(0)
}

/// `NULL` for results that are not finite numbers.
pub(crate) fn float_result(v: f64) -> Value {
    if v.is_finite() {
        Value::float(v)
    } else {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_checked_first() {
        let err = check_operands("subtract", &signature(&OperatorKind::Subtract), &[Value::integer(1)])
            .unwrap_err();
        assert!(matches!(err, ExpressionError::NotEnoughOperands { min: 2, got: 1, .. }));

        let three = vec![Value::integer(1); 3];
        let err = check_operands("subtract", &signature(&OperatorKind::Subtract), &three).unwrap_err();
        assert!(matches!(err, ExpressionError::TooManyOperands { max: 2, got: 3, .. }));
    }

    #[test]
    fn cardinality_then_base_type() {
        let container = Value::multiple(BaseType::Integer, vec![Scalar::Integer(1)]).unwrap();
        let err = check_operands("not", &signature(&OperatorKind::Not), &[container]).unwrap_err();
        assert!(matches!(err, ExpressionError::WrongCardinality { position: 0, .. }));

        let err = check_operands("not", &signature(&OperatorKind::Not), &[Value::integer(1)]).unwrap_err();
        assert!(matches!(err, ExpressionError::WrongBaseType { position: 0, .. }));
    }

    #[test]
    fn null_operands_skip_type_checks() {
        let any_null = check_operands(
            "sum",
            &signature(&OperatorKind::Sum),
            &[Value::integer(1), Value::Null],
        )
        .unwrap();
        assert!(any_null);
    }

    #[test]
    fn per_position_rules() {
        let sig = signature(&OperatorKind::Member);
        let bag = Value::multiple(BaseType::Identifier, vec![Scalar::Identifier("A".into())]).unwrap();
        assert!(check_operands("member", &sig, &[Value::identifier("A"), bag.clone()]).is_ok());
        assert!(matches!(
            check_operands("member", &sig, &[bag.clone(), bag]),
            Err(ExpressionError::WrongCardinality { position: 0, .. })
        ));
    }
}
