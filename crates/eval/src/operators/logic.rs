//! Boolean operators with three-valued (true/false/NULL) logic.

use qti_core::Value;

/// `Some(b)` for a boolean operand, `None` for NULL.
fn truth(value: &Value) -> Option<bool> {
    value.as_single().and_then(|s| s.as_bool())
}

/// False dominates, then NULL.
pub fn and(operands: &[Value]) -> Value {
    let mut saw_null = false;
    for v in operands {
        match truth(v) {
            Some(false) => return Value::boolean(false),
            None => saw_null = true,
            Some(true) => {}
        }
    }
    if saw_null {
        Value::Null
    } else {
        Value::boolean(true)
    }
}

/// True dominates, then NULL.
pub fn or(operands: &[Value]) -> Value {
    let mut saw_null = false;
    for v in operands {
        match truth(v) {
            Some(true) => return Value::boolean(true),
            None => saw_null = true,
            Some(false) => {}
        }
    }
    if saw_null {
        Value::Null
    } else {
        Value::boolean(false)
    }
}

pub fn not(operands: &[Value]) -> Value {
    match truth(&operands[0]) {
        Some(b) => Value::boolean(!b),
        None => Value::Null,
    }
}

/// True when between `min` and `max` operands are true. NULL operands
/// could go either way, so the result is NULL when they decide it.
pub fn any_n(operands: &[Value], min: i64, max: i64) -> Value {
    let trues = operands.iter().filter(|v| truth(v) == Some(true)).count() as i64;
    let nulls = operands.iter().filter(|v| truth(v).is_none()).count() as i64;

    if trues > max || trues + nulls < min {
        Value::boolean(false)
    } else if trues >= min && trues + nulls <= max {
        Value::boolean(true)
    } else {
        Value::Null
    }
}
