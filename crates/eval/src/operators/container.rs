//! Operators that build, inspect and search containers.

use qti_core::{BaseType, Container, Scalar, Value};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::invalid_operand;
use crate::error::ExpressionError;

/// Concatenate the non-NULL operands into one container. All operands
/// must share a base type; only NULLs gives NULL.
fn gather(operator: &str, operands: Vec<Value>) -> Result<Option<Container>, ExpressionError> {
    let mut gathered: Option<Container> = None;
    for value in operands.into_iter().filter(|v| !v.is_null()) {
        let Some(base_type) = value.base_type() else {
            continue;
        };
        let container = gathered.get_or_insert_with(|| Container::new(base_type));
        if container.base_type() != base_type {
            return Err(invalid_operand(
                operator,
                format!(
                    "operands mix base types {} and {}",
                    container.base_type(),
                    base_type
                ),
            ));
        }
        let scalars = match value {
            Value::Single(s) => vec![s],
            Value::Multiple(c) | Value::Ordered(c) => c.into_values(),
            _ => Vec::new(),
        };
        for s in scalars {
            container
                .push(s)
                .map_err(|e| invalid_operand(operator, e.to_string()))?;
        }
    }
    Ok(gathered)
}

pub fn collect(operator: &str, operands: Vec<Value>, ordered: bool) -> Result<Value, ExpressionError> {
    Ok(match gather(operator, operands)? {
        Some(c) if ordered => Value::Ordered(c),
        Some(c) => Value::Multiple(c),
        None => Value::Null,
    })
}

pub fn size(operands: &[Value]) -> Value {
    let len = operands[0].as_container().map(Container::len).unwrap_or(0);
    Value::integer(len as i64)
}

/// 1-based element access; past the end is NULL.
pub fn index(operands: &[Value], n: i64) -> Result<Value, ExpressionError> {
    if n < 1 {
        return Err(ExpressionError::InvalidAttribute {
            operator: "index".to_string(),
            attribute: "n".to_string(),
            message: format!("must be at least 1, got {}", n),
        });
    }
    let element = operands[0]
        .as_container()
        .and_then(|c| c.values().get((n - 1) as usize));
    Ok(element.cloned().map(Value::Single).unwrap_or(Value::Null))
}

pub fn field_value(operands: &[Value], field: &str) -> Value {
    operands[0]
        .as_record()
        .and_then(|r| r.get(field))
        .cloned()
        .map(Value::Single)
        .unwrap_or(Value::Null)
}

pub fn random(operands: &[Value], rng: &mut StdRng) -> Value {
    operands[0]
        .as_container()
        .and_then(|c| c.values().choose(rng))
        .cloned()
        .map(Value::Single)
        .unwrap_or(Value::Null)
}

fn same_base_type(operator: &str, a: &Value, b: &Value) -> Result<BaseType, ExpressionError> {
    match (a.base_type(), b.base_type()) {
        (Some(x), Some(y)) if x == y => Ok(x),
        _ => Err(invalid_operand(
            operator,
            format!("cannot compare {} with {}", a.type_name(), b.type_name()),
        )),
    }
}

pub fn member(operands: &[Value]) -> Result<Value, ExpressionError> {
    same_base_type("member", &operands[0], &operands[1])?;
    let found = match (operands[0].as_single(), operands[1].as_container()) {
        (Some(s), Some(c)) => c.contains(s),
        _ => false,
    };
    Ok(Value::boolean(found))
}

/// The container without any element equal to the first operand.
pub fn delete(operands: &[Value]) -> Result<Value, ExpressionError> {
    let base_type = same_base_type("delete", &operands[0], &operands[1])?;
    let Some(target) = operands[0].as_single() else {
        return Ok(Value::Null);
    };
    let kept: Vec<Scalar> = operands[1]
        .as_container()
        .map(|c| c.iter().filter(|s| *s != target).cloned().collect())
        .unwrap_or_default();
    let container =
        Container::from_values(base_type, kept).map_err(|e| invalid_operand("delete", e.to_string()))?;
    Ok(match &operands[1] {
        Value::Ordered(_) => Value::Ordered(container),
        _ => Value::Multiple(container),
    })
}

/// Multiset inclusion for `multiple`, a contiguous run for `ordered`.
pub fn contains(operands: &[Value]) -> Result<Value, ExpressionError> {
    same_base_type("contains", &operands[0], &operands[1])?;
    let found = match (&operands[0], &operands[1]) {
        (Value::Multiple(hay), Value::Multiple(needle)) => needle
            .iter()
            .all(|s| hay.count_of(s) >= needle.count_of(s)),
        (Value::Ordered(hay), Value::Ordered(needle)) => {
            needle.is_empty()
                || hay
                    .values()
                    .windows(needle.len())
                    .any(|w| w == needle.values())
        }
        (a, b) => {
            return Err(invalid_operand(
                "contains",
                format!("cannot compare {} with {}", a.type_name(), b.type_name()),
            ))
        }
    };
    Ok(Value::boolean(found))
}

/// The operands concatenated `repeats` times into an ordered container of
/// at most `limit` values.
pub fn repeat(
    operator: &str,
    operands: Vec<Value>,
    repeats: i64,
    limit: usize,
) -> Result<Value, ExpressionError> {
    if repeats < 1 {
        return Ok(Value::Null);
    }
    let Some(once) = gather(operator, operands)? else {
        return Ok(Value::Null);
    };
    let requested = usize::try_from(repeats)
        .unwrap_or(usize::MAX)
        .saturating_mul(once.len());
    if requested > limit {
        return Err(ExpressionError::ContainerTooLarge {
            operator: operator.to_string(),
            requested,
            limit,
        });
    }
    let mut result = Container::new(once.base_type());
    for _ in 0..repeats {
        for s in once.iter() {
            result
                .push(s.clone())
                .map_err(|e| invalid_operand(operator, e.to_string()))?;
        }
    }
    Ok(Value::Ordered(result))
}
