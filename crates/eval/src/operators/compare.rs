//! Comparison operators.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use qti_core::{Coords, Equality, OperatorKind, RoundingMode, Scalar, ToleranceMode, Value};
use regex::Regex;

use super::arith::round_number;
use super::{invalid_operand, number, OperatorContext};
use crate::error::ExpressionError;

/// `match`: identical cardinality, base type and content.
pub fn match_values(operands: &[Value]) -> Result<Value, ExpressionError> {
    let (a, b) = (&operands[0], &operands[1]);
    if a.cardinality() != b.cardinality() || a.base_type() != b.base_type() {
        return Err(invalid_operand(
            "match",
            format!("cannot compare {} with {}", a.type_name(), b.type_name()),
        ));
    }
    Ok(Value::boolean(a == b))
}

fn text(value: &Value) -> &str {
    value.as_single().and_then(Scalar::as_str).unwrap_or("")
}

pub fn string_match(operands: &[Value], case_sensitive: bool, substring: bool) -> Value {
    let (a, b) = (text(&operands[0]), text(&operands[1]));
    let (a, b) = if case_sensitive {
        (a.to_string(), b.to_string())
    } else {
        (a.to_lowercase(), b.to_lowercase())
    };
    let matched = if substring { a.contains(&b) } else { a == b };
    Value::boolean(matched)
}

/// Compiled `patternMatch` expressions, keyed by their source pattern.
/// Patterns may come from variables, so they are compiled on first use.
#[derive(Debug, Default)]
pub struct PatternCache {
    compiled: HashMap<String, Regex>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&mut self, pattern: &str) -> Result<&Regex, ExpressionError> {
        match self.compiled.entry(pattern.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let anchored = format!("^(?:{})$", pattern);
                let re = Regex::new(&anchored).map_err(|e| ExpressionError::InvalidAttribute {
                    operator: "patternMatch".to_string(),
                    attribute: "pattern".to_string(),
                    message: e.to_string(),
                })?;
                Ok(entry.insert(re))
            }
        }
    }
}

/// The whole string must match `pattern`.
pub fn pattern_match(
    operands: &[Value],
    pattern: &str,
    cache: &mut PatternCache,
) -> Result<Value, ExpressionError> {
    let re = cache.get(pattern)?;
    Ok(Value::boolean(re.is_match(text(&operands[0]))))
}

/// True when the first string occurs inside the second.
pub fn substring(operands: &[Value], case_sensitive: bool) -> Value {
    let (needle, haystack) = (text(&operands[0]), text(&operands[1]));
    if case_sensitive {
        Value::boolean(haystack.contains(needle))
    } else {
        Value::boolean(haystack.to_lowercase().contains(&needle.to_lowercase()))
    }
}

pub fn equal(
    operands: &[Value],
    equality: &Equality,
    ctx: &OperatorContext<'_>,
) -> Result<Value, ExpressionError> {
    let (a, b) = (number(&operands[0]), number(&operands[1]));
    let Some((t0, t1)) = equality.tolerance() else {
        return Ok(Value::boolean(a == b));
    };
    let t0 = ctx.resolve_float("equal", "tolerance", t0)?;
    let t1 = ctx.resolve_float("equal", "tolerance", t1)?;

    let (lower, upper) = match equality.mode() {
        ToleranceMode::Exact => return Ok(Value::boolean(a == b)),
        ToleranceMode::Absolute => (b - t0, b + t1),
        ToleranceMode::Relative => (b - t0 * b.abs(), b + t1 * b.abs()),
    };
    let above = if equality.include_lower_bound {
        a >= lower
    } else {
        a > lower
    };
    let below = if equality.include_upper_bound {
        a <= upper
    } else {
        a < upper
    };
    Ok(Value::boolean(above && below))
}

pub fn equal_rounded(
    operands: &[Value],
    mode: RoundingMode,
    figures: i64,
) -> Result<Value, ExpressionError> {
    let a = round_number("equalRounded", number(&operands[0]), mode, figures)?;
    let b = round_number("equalRounded", number(&operands[1]), mode, figures)?;
    match (a, b) {
        (Some(a), Some(b)) => Ok(Value::boolean(a == b)),
        _ => Ok(Value::Null),
    }
}

pub fn numeric_order(kind: &OperatorKind, operands: &[Value]) -> Value {
    let (a, b) = (number(&operands[0]), number(&operands[1]));
    let result = match kind {
        OperatorKind::Lt => a < b,
        OperatorKind::Gt => a > b,
        OperatorKind::Lte => a <= b,
        OperatorKind::Gte => a >= b,
        _ => return Value::Null,
    };
    Value::boolean(result)
}

pub fn duration_order(kind: &OperatorKind, operands: &[Value]) -> Value {
    let durations = (
        operands[0].as_single().and_then(Scalar::as_duration),
        operands[1].as_single().and_then(Scalar::as_duration),
    );
    let (Some(a), Some(b)) = durations else {
        return Value::Null;
    };
    match kind {
        OperatorKind::DurationLt => Value::boolean(a < b),
        OperatorKind::DurationGte => Value::boolean(a >= b),
        _ => Value::Null,
    }
}

/// True when any of the given points lies in the area.
pub fn inside(operands: &[Value], coords: &Coords) -> Value {
    let hit = match &operands[0] {
        Value::Single(s) => s.as_point().is_some_and(|p| coords.inside(&p)),
        Value::Multiple(c) | Value::Ordered(c) => c
            .iter()
            .filter_map(Scalar::as_point)
            .any(|p| coords.inside(&p)),
        _ => false,
    };
    Value::boolean(hit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qti_core::{BaseType, Duration, FloatOrVariableRef, Point, Shape, State, Variable};
    use rand::SeedableRng;

    fn with_ctx<T>(state: &State, f: impl FnOnce(&OperatorContext<'_>) -> T) -> T {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let mut patterns = PatternCache::new();
        let ctx = OperatorContext {
            state,
            rng: &mut rng,
            patterns: &mut patterns,
            max_container_size: 100,
        };
        f(&ctx)
    }

    #[test]
    fn test_match_requires_same_type() {
        let ok = match_values(&[Value::identifier("A"), Value::identifier("A")]).unwrap();
        assert_eq!(ok, Value::boolean(true));
        assert!(match_values(&[Value::identifier("A"), Value::string("A")]).is_err());
    }

    #[test]
    fn test_match_multiple_ignores_order() {
        let ids = |v: &[&str]| {
            Value::multiple(
                BaseType::Identifier,
                v.iter().map(|s| Scalar::Identifier(s.to_string())).collect(),
            )
            .unwrap()
        };
        let result = match_values(&[ids(&["A", "B"]), ids(&["B", "A"])]).unwrap();
        assert_eq!(result, Value::boolean(true));
    }

    #[test]
    fn test_string_match_modes() {
        let ops = [Value::string("Hello World"), Value::string("hello world")];
        assert_eq!(string_match(&ops, true, false), Value::boolean(false));
        assert_eq!(string_match(&ops, false, false), Value::boolean(true));
        let ops = [Value::string("Hello World"), Value::string("World")];
        assert_eq!(string_match(&ops, true, true), Value::boolean(true));
    }

    #[test]
    fn test_pattern_match_is_anchored() {
        let ops = [Value::string("abc123")];
        let mut cache = PatternCache::new();
        assert_eq!(
            pattern_match(&ops, "[a-z]+[0-9]+", &mut cache).unwrap(),
            Value::boolean(true)
        );
        assert_eq!(pattern_match(&ops, "[0-9]+", &mut cache).unwrap(), Value::boolean(false));
        assert!(matches!(
            pattern_match(&ops, "(unclosed", &mut cache),
            Err(ExpressionError::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn test_pattern_compiled_once() {
        let mut cache = PatternCache::new();
        for input in ["a1", "b2", "zz"] {
            pattern_match(&[Value::string(input)], "[a-z][0-9]", &mut cache).unwrap();
        }
        assert_eq!(cache.compiled.len(), 1);

        // Failed compilations are not cached
        assert!(pattern_match(&[Value::string("x")], "(", &mut cache).is_err());
        assert_eq!(cache.compiled.len(), 1);
    }

    #[test]
    fn test_substring() {
        let ops = [Value::string("ell"), Value::string("Hello")];
        assert_eq!(substring(&ops, true), Value::boolean(true));
        let ops = [Value::string("ELL"), Value::string("Hello")];
        assert_eq!(substring(&ops, true), Value::boolean(false));
        assert_eq!(substring(&ops, false), Value::boolean(true));
    }

    #[test]
    fn test_equal_absolute_tolerance() {
        let state = State::new();
        let eq = Equality::new(ToleranceMode::Absolute, vec![FloatOrVariableRef::Value(0.5)]).unwrap();
        with_ctx(&state, |ctx| {
            let near = equal(&[Value::float(10.0), Value::float(10.4)], &eq, ctx).unwrap();
            let far = equal(&[Value::float(10.0), Value::float(10.6)], &eq, ctx).unwrap();
            assert_eq!(near, Value::boolean(true));
            assert_eq!(far, Value::boolean(false));
        });
    }

    #[test]
    fn test_equal_exclusive_bounds() {
        let state = State::new();
        let eq = Equality::new(ToleranceMode::Absolute, vec![FloatOrVariableRef::Value(1.0)])
            .unwrap()
            .with_bounds(false, true);
        with_ctx(&state, |ctx| {
            assert_eq!(
                equal(&[Value::integer(9), Value::integer(10)], &eq, ctx).unwrap(),
                Value::boolean(false)
            );
            assert_eq!(
                equal(&[Value::integer(11), Value::integer(10)], &eq, ctx).unwrap(),
                Value::boolean(true)
            );
        });
    }

    #[test]
    fn test_equal_relative_tolerance_from_variable() {
        let mut state = State::new();
        state.declare(
            Variable::template("TOL", qti_core::Cardinality::Single, BaseType::Float)
                .unwrap()
                .with_value(Value::float(0.1)),
        );
        let eq = Equality::new(
            ToleranceMode::Relative,
            vec![FloatOrVariableRef::Variable("TOL".into())],
        )
        .unwrap();
        with_ctx(&state, |ctx| {
            let r = equal(&[Value::float(105.0), Value::float(100.0)], &eq, ctx).unwrap();
            assert_eq!(r, Value::boolean(true));
            let r = equal(&[Value::float(111.0), Value::float(100.0)], &eq, ctx).unwrap();
            assert_eq!(r, Value::boolean(false));
        });
    }

    #[test]
    fn test_equal_rounded() {
        let ops = [Value::float(3.175), Value::float(3.18)];
        assert_eq!(
            equal_rounded(&ops, RoundingMode::SignificantFigures, 3).unwrap(),
            Value::boolean(true)
        );
        assert_eq!(
            equal_rounded(&ops, RoundingMode::DecimalPlaces, 3).unwrap(),
            Value::boolean(false)
        );
    }

    #[test]
    fn test_orderings() {
        let ops = [Value::integer(1), Value::float(1.5)];
        assert_eq!(numeric_order(&OperatorKind::Lt, &ops), Value::boolean(true));
        assert_eq!(numeric_order(&OperatorKind::Gte, &ops), Value::boolean(false));

        let d = |s: &str| Value::Single(Scalar::Duration(Duration::parse(s).unwrap()));
        let ops = [d("PT30S"), d("PT1M")];
        assert_eq!(duration_order(&OperatorKind::DurationLt, &ops), Value::boolean(true));
        assert_eq!(duration_order(&OperatorKind::DurationGte, &ops), Value::boolean(false));
    }

    #[test]
    fn test_inside_any_point() {
        let coords = Coords::new(Shape::Rect, vec![0, 0, 5, 3]).unwrap();
        let p = |x, y| Scalar::Point(Point { x, y });
        assert_eq!(inside(&[Value::Single(p(5, 3))], &coords), Value::boolean(true));
        assert_eq!(inside(&[Value::Single(p(5, 4))], &coords), Value::boolean(false));
        let many = Value::multiple(BaseType::Point, vec![p(9, 9), p(1, 1)]).unwrap();
        assert_eq!(inside(&[many], &coords), Value::boolean(true));
    }
}
