//! Arithmetic, rounding, math functions and statistics.
//!
//! Integer inputs stay integers where the operator allows it; any float
//! input makes the result a float. Results that are not real numbers
//! (division by zero, `sqrt(-1)`-like domains) are `NULL`.

use std::f64::consts::FRAC_PI_2;

use qti_core::{MathFunction, RoundingMode, Scalar, StatsFunction, Value};
use rust_decimal::{Decimal, RoundingStrategy};

use super::{float_result, integer, number};
use crate::error::ExpressionError;

fn overflow(operator: &str) -> ExpressionError {
    ExpressionError::Overflow {
        operator: operator.to_string(),
    }
}

fn all_integers(operands: &[Value]) -> bool {
    operands
        .iter()
        .all(|v| matches!(v.as_single(), Some(Scalar::Integer(_))))
}

/// Every scalar of single and container operands, flattened.
fn flatten(operands: &[Value]) -> Vec<&Scalar> {
    let mut scalars = Vec::new();
    for value in operands {
        match value {
            Value::Single(s) => scalars.push(s),
            Value::Multiple(c) | Value::Ordered(c) => scalars.extend(c.iter()),
            _ => {}
        }
    }
    scalars
}

/// Integer when finite and representable, otherwise `NULL`.
fn integral(x: f64) -> Value {
    if x.is_finite() && x >= i64::MIN as f64 && x < i64::MAX as f64 {
        Value::integer(x as i64)
    } else {
        Value::Null
    }
}

// ── Basic arithmetic ─────────────────────────────────────────────────

pub fn sum(operands: &[Value]) -> Result<Value, ExpressionError> {
    if all_integers(operands) {
        let total = operands
            .iter()
            .try_fold(0i64, |acc, v| acc.checked_add(integer(v)))
            .ok_or_else(|| overflow("sum"))?;
        return Ok(Value::integer(total));
    }
    Ok(float_result(operands.iter().map(number).sum()))
}

pub fn product(operands: &[Value]) -> Result<Value, ExpressionError> {
    if all_integers(operands) {
        let total = operands
            .iter()
            .try_fold(1i64, |acc, v| acc.checked_mul(integer(v)))
            .ok_or_else(|| overflow("product"))?;
        return Ok(Value::integer(total));
    }
    Ok(float_result(operands.iter().map(number).product()))
}

pub fn subtract(operands: &[Value]) -> Result<Value, ExpressionError> {
    if all_integers(operands) {
        let diff = integer(&operands[0])
            .checked_sub(integer(&operands[1]))
            .ok_or_else(|| overflow("subtract"))?;
        return Ok(Value::integer(diff));
    }
    Ok(float_result(number(&operands[0]) - number(&operands[1])))
}

pub fn divide(operands: &[Value]) -> Value {
    let (a, b) = (number(&operands[0]), number(&operands[1]));
    if b == 0.0 {
        return Value::Null;
    }
    float_result(a / b)
}

pub fn power(operands: &[Value]) -> Value {
    float_result(number(&operands[0]).powf(number(&operands[1])))
}

/// Floor division: the quotient rounds towards negative infinity.
pub fn integer_divide(operands: &[Value]) -> Result<Value, ExpressionError> {
    let (a, b) = (integer(&operands[0]), integer(&operands[1]));
    if b == 0 {
        return Ok(Value::Null);
    }
    let q = a.checked_div(b).ok_or_else(|| overflow("integerDivide"))?;
    let adjust = a % b != 0 && ((a < 0) != (b < 0));
    Ok(Value::integer(if adjust { q - 1 } else { q }))
}

/// Remainder consistent with [`integer_divide`]; takes the sign of the divisor.
pub fn integer_modulus(operands: &[Value]) -> Result<Value, ExpressionError> {
    let (a, b) = (integer(&operands[0]), integer(&operands[1]));
    if b == 0 {
        return Ok(Value::Null);
    }
    let r = a.checked_rem(b).ok_or_else(|| overflow("integerModulus"))?;
    let adjust = r != 0 && ((r < 0) != (b < 0));
    Ok(Value::integer(if adjust { r + b } else { r }))
}

pub fn truncate(operands: &[Value]) -> Value {
    integral(number(&operands[0]).trunc())
}

/// Nearest integer; halves round up (`-2.5` becomes `-2`).
pub fn round(operands: &[Value]) -> Value {
    integral((number(&operands[0]) + 0.5).floor())
}

pub fn integer_to_float(operands: &[Value]) -> Value {
    Value::float(integer(&operands[0]) as f64)
}

// ── Rounding to figures ──────────────────────────────────────────────

/// Round half away from zero to `figures` significant figures or decimal
/// places. `Ok(None)` for non-finite input.
pub(crate) fn round_number(
    operator: &str,
    x: f64,
    mode: RoundingMode,
    figures: i64,
) -> Result<Option<f64>, ExpressionError> {
    let minimum = match mode {
        RoundingMode::SignificantFigures => 1,
        RoundingMode::DecimalPlaces => 0,
    };
    if figures < minimum {
        return Err(ExpressionError::InvalidAttribute {
            operator: operator.to_string(),
            attribute: "figures".to_string(),
            message: format!("{} requires at least {}, got {}", mode, minimum, figures),
        });
    }
    if !x.is_finite() {
        return Ok(None);
    }
    let digits = u32::try_from(figures).unwrap_or(u32::MAX);
    Ok(Some(
        round_decimal(x, mode, digits).unwrap_or_else(|| round_formatted(x, mode, digits as usize)),
    ))
}

/// Exact decimal rounding of the shortest decimal form of `x`. `None` when
/// `x` is outside the range `Decimal` represents without loss.
fn round_decimal(x: f64, mode: RoundingMode, digits: u32) -> Option<f64> {
    if x != 0.0 && !(1e-20..1e20).contains(&x.abs()) {
        return None;
    }
    let d: Decimal = x.to_string().parse().ok()?;
    let rounded = match mode {
        RoundingMode::DecimalPlaces => {
            d.round_dp_with_strategy(digits.min(28), RoundingStrategy::MidpointAwayFromZero)
        }
        RoundingMode::SignificantFigures => {
            d.round_sf_with_strategy(digits.min(28), RoundingStrategy::MidpointAwayFromZero)?
        }
    };
    rounded.to_string().parse().ok()
}

fn round_formatted(x: f64, mode: RoundingMode, digits: usize) -> f64 {
    let text = match mode {
        RoundingMode::DecimalPlaces => format!("{:.*}", digits.min(300), x),
        RoundingMode::SignificantFigures => format!("{:.*e}", digits.saturating_sub(1).min(300), x),
    };
    text.parse().unwrap_or(x)
}

pub fn round_to(operands: &[Value], mode: RoundingMode, figures: i64) -> Result<Value, ExpressionError> {
    Ok(round_number("roundTo", number(&operands[0]), mode, figures)?
        .map(Value::float)
        .unwrap_or(Value::Null))
}

// ── gcd, lcm, min, max ───────────────────────────────────────────────

fn gcd_u64(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn integers(operands: &[Value]) -> Vec<u64> {
    flatten(operands)
        .into_iter()
        .filter_map(Scalar::as_integer)
        .map(i64::unsigned_abs)
        .collect()
}

pub fn gcd(operands: &[Value]) -> Result<Value, ExpressionError> {
    let g = integers(operands).into_iter().fold(0, gcd_u64);
    i64::try_from(g)
        .map(Value::integer)
        .map_err(|_| overflow("gcd"))
}

pub fn lcm(operands: &[Value]) -> Result<Value, ExpressionError> {
    let values = integers(operands);
    if values.contains(&0) {
        return Ok(Value::integer(0));
    }
    let l = values.into_iter().try_fold(1u64, |acc, v| {
        (acc / gcd_u64(acc, v)).checked_mul(v)
    });
    l.and_then(|l| i64::try_from(l).ok())
        .map(Value::integer)
        .ok_or_else(|| overflow("lcm"))
}

pub fn extremum(operands: &[Value], is_max: bool) -> Value {
    let scalars = flatten(operands);
    if scalars.iter().all(|s| matches!(s, Scalar::Integer(_))) {
        let ints = scalars.iter().filter_map(|s| s.as_integer());
        let picked = if is_max { ints.max() } else { ints.min() };
        return picked.map(Value::integer).unwrap_or(Value::Null);
    }
    let floats = scalars.iter().filter_map(|s| s.as_f64());
    let picked = if is_max {
        floats.fold(f64::NEG_INFINITY, f64::max)
    } else {
        floats.fold(f64::INFINITY, f64::min)
    };
    float_result(picked)
}

// ── mathOperator ─────────────────────────────────────────────────────

pub fn math(function: MathFunction, operands: &[Value]) -> Value {
    use MathFunction::*;

    let x = number(&operands[0]);
    let is_integer = matches!(operands[0].as_single(), Some(Scalar::Integer(_)));
    let result = match function {
        Sin => x.sin(),
        Cos => x.cos(),
        Tan => x.tan(),
        Sec => 1.0 / x.cos(),
        Csc => 1.0 / x.sin(),
        Cot => 1.0 / x.tan(),
        Asin => x.asin(),
        Acos => x.acos(),
        Atan => x.atan(),
        Atan2 => x.atan2(number(&operands[1])),
        Asec => (1.0 / x).acos(),
        Acsc => (1.0 / x).asin(),
        Acot => {
            if x == 0.0 {
                FRAC_PI_2
            } else {
                (1.0 / x).atan()
            }
        }
        Sinh => x.sinh(),
        Cosh => x.cosh(),
        Tanh => x.tanh(),
        Sech => 1.0 / x.cosh(),
        Csch => 1.0 / x.sinh(),
        Coth => 1.0 / x.tanh(),
        Log => x.log10(),
        Ln => x.ln(),
        Exp => x.exp(),
        Abs if is_integer => {
            return integer(&operands[0])
                .checked_abs()
                .map(Value::integer)
                .unwrap_or(Value::Null)
        }
        Abs => x.abs(),
        Signum => {
            if x.is_nan() {
                return Value::Null;
            }
            return Value::integer(if x > 0.0 { 1 } else if x < 0.0 { -1 } else { 0 });
        }
        Floor => return integral(x.floor()),
        Ceil => return integral(x.ceil()),
        ToDegrees => x.to_degrees(),
        ToRadians => x.to_radians(),
    };
    float_result(result)
}

// ── statsOperator ────────────────────────────────────────────────────

pub fn stats(function: StatsFunction, operands: &[Value]) -> Value {
    let values: Vec<f64> = flatten(operands).into_iter().filter_map(Scalar::as_f64).collect();
    let n = values.len() as f64;
    if values.is_empty() {
        return Value::Null;
    }
    let mean = values.iter().sum::<f64>() / n;
    let squares: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();

    let result = match function {
        StatsFunction::Mean => mean,
        StatsFunction::PopVariance => squares / n,
        StatsFunction::PopSd => (squares / n).sqrt(),
        StatsFunction::SampleVariance | StatsFunction::SampleSd if values.len() < 2 => {
            return Value::Null
        }
        StatsFunction::SampleVariance => squares / (n - 1.0),
        StatsFunction::SampleSd => (squares / (n - 1.0)).sqrt(),
    };
    float_result(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qti_core::BaseType;

    fn ints(values: &[i64]) -> Value {
        Value::multiple(BaseType::Integer, values.iter().map(|v| Scalar::Integer(*v)).collect())
            .unwrap()
    }

    #[test]
    fn test_sum_keeps_integers() {
        assert_eq!(sum(&[Value::integer(2), Value::integer(3)]).unwrap(), Value::integer(5));
        assert_eq!(sum(&[Value::integer(2), Value::float(0.5)]).unwrap(), Value::float(2.5));
        assert!(matches!(
            sum(&[Value::integer(i64::MAX), Value::integer(1)]),
            Err(ExpressionError::Overflow { .. })
        ));
    }

    #[test]
    fn test_divide_by_zero_is_null() {
        assert_eq!(divide(&[Value::integer(1), Value::integer(0)]), Value::Null);
        assert_eq!(divide(&[Value::integer(1), Value::integer(4)]), Value::float(0.25));
    }

    #[test]
    fn test_integer_division_floors() {
        let div = |a, b| integer_divide(&[Value::integer(a), Value::integer(b)]).unwrap();
        let rem = |a, b| integer_modulus(&[Value::integer(a), Value::integer(b)]).unwrap();
        assert_eq!(div(7, 2), Value::integer(3));
        assert_eq!(div(-7, 2), Value::integer(-4));
        assert_eq!(rem(-7, 2), Value::integer(1));
        assert_eq!(rem(7, -2), Value::integer(-1));
        assert_eq!(div(1, 0), Value::Null);
    }

    #[test]
    fn test_round_and_truncate() {
        assert_eq!(round(&[Value::float(2.5)]), Value::integer(3));
        assert_eq!(round(&[Value::float(-2.5)]), Value::integer(-2));
        assert_eq!(truncate(&[Value::float(-2.7)]), Value::integer(-2));
        assert_eq!(truncate(&[Value::float(f64::INFINITY)]), Value::Null);
    }

    #[test]
    fn test_round_to() {
        let r = |x, mode, n| round_to(&[Value::float(x)], mode, n).unwrap();
        assert_eq!(r(3.14159, RoundingMode::DecimalPlaces, 2), Value::float(3.14));
        assert_eq!(r(2.5, RoundingMode::DecimalPlaces, 0), Value::float(3.0));
        assert_eq!(r(1234.5, RoundingMode::SignificantFigures, 2), Value::float(1200.0));
        assert_eq!(r(0.000_123_45, RoundingMode::SignificantFigures, 3), Value::float(0.000_123));
        assert!(round_to(&[Value::float(1.0)], RoundingMode::SignificantFigures, 0).is_err());
    }

    #[test]
    fn test_gcd_lcm_flatten_containers() {
        assert_eq!(gcd(&[ints(&[12, 18]), Value::integer(-8)]).unwrap(), Value::integer(2));
        assert_eq!(lcm(&[ints(&[4, 6])]).unwrap(), Value::integer(12));
        assert_eq!(lcm(&[Value::integer(4), Value::integer(0)]).unwrap(), Value::integer(0));
    }

    #[test]
    fn test_min_max() {
        assert_eq!(extremum(&[ints(&[3, 9, -1])], true), Value::integer(9));
        assert_eq!(extremum(&[ints(&[3]), Value::float(0.5)], false), Value::float(0.5));
    }

    #[test]
    fn test_math_functions() {
        assert_eq!(math(MathFunction::Abs, &[Value::integer(-4)]), Value::integer(4));
        assert_eq!(math(MathFunction::Signum, &[Value::float(-0.1)]), Value::integer(-1));
        assert_eq!(math(MathFunction::Ceil, &[Value::float(1.2)]), Value::integer(2));
        assert_eq!(math(MathFunction::Ln, &[Value::integer(-1)]), Value::Null);
        assert_eq!(math(MathFunction::Log, &[Value::integer(100)]), Value::float(2.0));
        assert_eq!(
            math(MathFunction::Atan2, &[Value::integer(1), Value::integer(0)]),
            Value::float(FRAC_PI_2)
        );
    }

    #[test]
    fn test_stats() {
        let data = ints(&[2, 4, 4, 4, 5, 5, 7, 9]);
        assert_eq!(stats(StatsFunction::Mean, &[data.clone()]), Value::float(5.0));
        assert_eq!(stats(StatsFunction::PopSd, &[data.clone()]), Value::float(2.0));
        assert_eq!(stats(StatsFunction::SampleVariance, &[ints(&[1])]), Value::Null);
    }
}
