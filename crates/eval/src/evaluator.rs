//! Expression evaluation.
//!
//! A recursive walk over [`Expression`] trees. Operands are evaluated left
//! to right before their operator runs; operators then see plain values
//! and never touch the tree. Only `random`, `randomInteger` and
//! `randomFloat` draw from the evaluator's random source.

use std::f64::consts::{E, PI};

use qti_core::{
    CustomOperator, Expression, MathConstant, Operator, Scalar, State, Value, Variable,
};
use rand::rngs::StdRng;
use rand::Rng;
use tracing::trace;

use crate::config::EngineConfig;
use crate::custom::OperatorRegistry;
use crate::error::ExpressionError;
use crate::operators::{self, OperatorContext, PatternCache};

pub struct Evaluator<'e> {
    config: &'e EngineConfig,
    operators: &'e OperatorRegistry,
    rng: StdRng,
    patterns: PatternCache,
}

impl<'e> Evaluator<'e> {
    pub fn new(config: &'e EngineConfig, operators: &'e OperatorRegistry) -> Self {
        Evaluator {
            config,
            operators,
            rng: config.rng(),
            patterns: PatternCache::new(),
        }
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        self.config
    }

    /// Evaluate `expression` against `state`.
    pub fn evaluate(&mut self, expression: &Expression, state: &State) -> Result<Value, ExpressionError> {
        self.eval_at(expression, state, 1)
    }

    fn eval_at(
        &mut self,
        expression: &Expression,
        state: &State,
        depth: usize,
    ) -> Result<Value, ExpressionError> {
        if depth > self.config.max_expression_depth {
            return Err(ExpressionError::DepthExceeded {
                limit: self.config.max_expression_depth,
            });
        }

        match expression {
            Expression::BaseValue(scalar) => Ok(Value::Single(scalar.clone())),
            Expression::Null => Ok(Value::Null),
            Expression::Variable(id) => state
                .value(id)
                .cloned()
                .ok_or_else(|| ExpressionError::UnknownVariable {
                    identifier: id.clone(),
                }),
            Expression::Correct(id) => {
                let variable = lookup(state, id)?;
                variable
                    .response_info()
                    .map(|info| info.correct_response.clone())
                    .ok_or_else(|| invalid_variable("correct", variable, "not a response variable"))
            }
            Expression::Default(id) => Ok(lookup(state, id)?.default_value.clone()),
            Expression::MapResponse(id) => map_response(lookup(state, id)?),
            Expression::MapResponsePoint(id) => map_response_point(lookup(state, id)?),
            Expression::MathConstant(constant) => Ok(Value::float(match constant {
                MathConstant::Pi => PI,
                MathConstant::E => E,
            })),
            Expression::RandomInteger { min, max, step } => {
                let ctx = self.context(state);
                let min = ctx.resolve_integer("randomInteger", "min", min)?;
                let max = ctx.resolve_integer("randomInteger", "max", max)?;
                let step = ctx.resolve_integer("randomInteger", "step", step)?;
                random_integer(&mut self.rng, min, max, step)
            }
            Expression::RandomFloat { min, max } => {
                let ctx = self.context(state);
                let min = ctx.resolve_float("randomFloat", "min", min)?;
                let max = ctx.resolve_float("randomFloat", "max", max)?;
                random_float(&mut self.rng, min, max)
            }
            Expression::Operator(operator) => self.eval_operator(operator, state, depth),
            Expression::Custom(custom) => self.eval_custom(custom, state, depth),
        }
    }

    fn context<'s>(&'s mut self, state: &'s State) -> OperatorContext<'s> {
        OperatorContext {
            state,
            rng: &mut self.rng,
            patterns: &mut self.patterns,
            max_container_size: self.config.max_container_size,
        }
    }

    fn eval_operands(
        &mut self,
        operands: &[Expression],
        state: &State,
        depth: usize,
    ) -> Result<Vec<Value>, ExpressionError> {
        operands
            .iter()
            .map(|operand| self.eval_at(operand, state, depth + 1))
            .collect()
    }

    fn eval_operator(
        &mut self,
        operator: &Operator,
        state: &State,
        depth: usize,
    ) -> Result<Value, ExpressionError> {
        let values = self.eval_operands(&operator.operands, state, depth)?;
        let mut ctx = self.context(state);
        let result = operators::apply(&operator.kind, values, &mut ctx)?;
        trace!(operator = operator.kind.name(), result = %result, "operator evaluated");
        Ok(result)
    }

    fn eval_custom(
        &mut self,
        custom: &CustomOperator,
        state: &State,
        depth: usize,
    ) -> Result<Value, ExpressionError> {
        let values = self.eval_operands(&custom.operands, state, depth)?;
        let class = custom.class.as_deref();
        let definition = custom.definition.as_deref();
        let Some(extension) = self.operators.resolve(class, definition) else {
            return Err(ExpressionError::UnknownCustomOperator {
                class: class.or(definition).unwrap_or("").to_string(),
            });
        };
        let result = extension.evaluate(&values, &custom.markup)?;
        trace!(class = class.unwrap_or(""), result = %result, "custom operator evaluated");
        Ok(result)
    }
}

fn lookup<'s>(state: &'s State, id: &str) -> Result<&'s Variable, ExpressionError> {
    state.get(id).ok_or_else(|| ExpressionError::UnknownVariable {
        identifier: id.to_string(),
    })
}

fn invalid_variable(expression: &str, variable: &Variable, message: &str) -> ExpressionError {
    ExpressionError::InvalidVariable {
        expression: expression.to_string(),
        identifier: variable.identifier.clone(),
        message: message.to_string(),
    }
}

/// The scalars of a single or container response; `None` for records.
fn response_scalars(value: &Value) -> Option<Vec<&Scalar>> {
    match value {
        Value::Null => Some(Vec::new()),
        Value::Single(s) => Some(vec![s]),
        Value::Multiple(c) | Value::Ordered(c) => Some(c.iter().collect()),
        Value::Record(_) => None,
    }
}

// ── mapResponse / mapResponsePoint ───────────────────────────────────

/// Sum of mapped values over the distinct response values. Each map entry
/// scores at most once; values without an entry score the default.
fn map_response(variable: &Variable) -> Result<Value, ExpressionError> {
    let mapping = variable
        .response_info()
        .and_then(|info| info.mapping.as_ref())
        .ok_or_else(|| invalid_variable("mapResponse", variable, "no mapping declared"))?;
    let values = response_scalars(&variable.value)
        .ok_or_else(|| invalid_variable("mapResponse", variable, "records cannot be mapped"))?;
    if values.is_empty() {
        return Ok(Value::float(mapping.default_value));
    }

    let mut seen: Vec<&Scalar> = Vec::new();
    let mut used = Vec::new();
    let mut total = 0.0;
    for value in values {
        if seen.contains(&value) {
            continue;
        }
        seen.push(value);
        match mapping.entry_for(value) {
            Some(entry) if used.iter().any(|u| std::ptr::eq(*u, entry)) => {}
            Some(entry) => {
                used.push(entry);
                total += entry.mapped_value;
            }
            None => total += mapping.default_value,
        }
    }
    Ok(Value::float(mapping.clamp(total)))
}

/// Sum of mapped values over the areas hit by at least one point, or the
/// default when no area is hit.
fn map_response_point(variable: &Variable) -> Result<Value, ExpressionError> {
    let mapping = variable
        .response_info()
        .and_then(|info| info.area_mapping.as_ref())
        .ok_or_else(|| invalid_variable("mapResponsePoint", variable, "no area mapping declared"))?;
    let points: Vec<_> = response_scalars(&variable.value)
        .ok_or_else(|| invalid_variable("mapResponsePoint", variable, "records cannot be mapped"))?
        .into_iter()
        .filter_map(Scalar::as_point)
        .collect();

    let hits: Vec<f64> = mapping
        .entries
        .iter()
        .filter(|entry| points.iter().any(|p| entry.coords.inside(p)))
        .map(|entry| entry.mapped_value)
        .collect();
    let total = if hits.is_empty() {
        mapping.default_value
    } else {
        hits.iter().sum()
    };
    Ok(Value::float(mapping.clamp(total)))
}

// ── Random values ────────────────────────────────────────────────────

fn random_integer(rng: &mut StdRng, min: i64, max: i64, step: i64) -> Result<Value, ExpressionError> {
    let invalid = |attribute: &str, message: String| ExpressionError::InvalidAttribute {
        operator: "randomInteger".to_string(),
        attribute: attribute.to_string(),
        message,
    };
    if step < 1 {
        return Err(invalid("step", format!("must be positive, got {}", step)));
    }
    if max < min {
        return Err(invalid("max", format!("{} is below min {}", max, min)));
    }
    // The span of two i64 values always fits in i128, and so does every
    // `min + k * step` that stays within [min, max].
    let steps = (max as i128 - min as i128) / step as i128;
    let k = rng.gen_range(0..=steps);
    let drawn = min as i128 + k * step as i128;
    i64::try_from(drawn)
        .map(Value::integer)
        .map_err(|_| ExpressionError::Overflow {
            operator: "randomInteger".to_string(),
        })
}

fn random_float(rng: &mut StdRng, min: f64, max: f64) -> Result<Value, ExpressionError> {
    let invalid = |attribute: &str, message: String| ExpressionError::InvalidAttribute {
        operator: "randomFloat".to_string(),
        attribute: attribute.to_string(),
        message,
    };
    if !min.is_finite() {
        return Err(invalid("min", format!("must be finite, got {}", min)));
    }
    if !max.is_finite() {
        return Err(invalid("max", format!("must be finite, got {}", max)));
    }
    if max < min {
        return Err(invalid("max", format!("{} is below min {}", max, min)));
    }
    if !(max - min).is_finite() {
        return Err(invalid("max", format!("range {}..{} is too wide", min, max)));
    }
    if min == max {
        return Ok(Value::float(min));
    }
    Ok(Value::float(rng.gen_range(min..=max)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use qti_core::{
        AreaMapEntry, AreaMapping, BaseType, Cardinality, Coords, MapEntry, Mapping, OperatorKind,
        OrVariableRef, Point, Shape,
    };

    fn int(i: i64) -> Expression {
        Expression::BaseValue(Scalar::Integer(i))
    }

    fn eval(expression: &Expression, state: &State) -> Result<Value, ExpressionError> {
        let config = EngineConfig::default().with_seed(1);
        let registry = OperatorRegistry::standard();
        Evaluator::new(&config, &registry).evaluate(expression, state)
    }

    // ── Operators ────────────────────────────────────

    #[test]
    fn test_nested_operators() {
        let expr = Expression::operator(
            OperatorKind::Sum,
            vec![
                int(1),
                Expression::operator(OperatorKind::Product, vec![int(2), int(3)]),
            ],
        );
        assert_eq!(eval(&expr, &State::new()).unwrap(), Value::integer(7));
    }

    #[test]
    fn test_null_propagates() {
        let expr = Expression::operator(OperatorKind::Sum, vec![int(1), Expression::Null]);
        assert_eq!(eval(&expr, &State::new()).unwrap(), Value::Null);
    }

    #[test]
    fn test_unknown_variable() {
        let err = eval(&Expression::variable("MISSING"), &State::new()).unwrap_err();
        assert_eq!(
            err,
            ExpressionError::UnknownVariable {
                identifier: "MISSING".into()
            }
        );
    }

    #[test]
    fn test_depth_limit() {
        let mut expr = int(1);
        for _ in 0..10 {
            expr = Expression::operator(OperatorKind::Sum, vec![expr]);
        }
        let mut config = EngineConfig::default();
        config.max_expression_depth = 5;
        let registry = OperatorRegistry::new();
        let err = Evaluator::new(&config, &registry)
            .evaluate(&expr, &State::new())
            .unwrap_err();
        assert_eq!(err, ExpressionError::DepthExceeded { limit: 5 });
    }

    #[test]
    fn test_unknown_custom_operator() {
        let expr = Expression::Custom(CustomOperator {
            class: Some("com.example.Missing".into()),
            definition: None,
            markup: String::new(),
            operands: vec![],
        });
        let err = eval(&expr, &State::new()).unwrap_err();
        assert!(matches!(err, ExpressionError::UnknownCustomOperator { class } if class == "com.example.Missing"));
    }

    // ── Variables ────────────────────────────────────

    fn response_state(value: Value) -> State {
        let mapping = Mapping {
            lower_bound: Some(0.0),
            upper_bound: Some(3.0),
            default_value: -0.5,
            entries: vec![
                MapEntry {
                    map_key: Scalar::Identifier("A".into()),
                    mapped_value: 1.0,
                    case_sensitive: true,
                },
                MapEntry {
                    map_key: Scalar::Identifier("B".into()),
                    mapped_value: 2.0,
                    case_sensitive: true,
                },
            ],
        };
        let response = Variable::response("RESPONSE", Cardinality::Multiple, BaseType::Identifier)
            .unwrap()
            .with_mapping(mapping)
            .with_correct_response(
                Value::multiple(BaseType::Identifier, vec![Scalar::Identifier("A".into())]).unwrap(),
            )
            .with_value(value);
        [response].into_iter().collect()
    }

    fn ids(values: &[&str]) -> Value {
        Value::multiple(
            BaseType::Identifier,
            values.iter().map(|v| Scalar::Identifier(v.to_string())).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_map_response_counts_each_key_once() {
        let state = response_state(ids(&["A", "A", "B"]));
        let score = eval(&Expression::MapResponse("RESPONSE".into()), &state).unwrap();
        assert_eq!(score, Value::float(3.0));
    }

    #[test]
    fn test_map_response_default_and_bounds() {
        let state = response_state(ids(&["C", "D"]));
        let score = eval(&Expression::MapResponse("RESPONSE".into()), &state).unwrap();
        assert_eq!(score, Value::float(0.0));

        let state = response_state(Value::Null);
        let score = eval(&Expression::MapResponse("RESPONSE".into()), &state).unwrap();
        assert_eq!(score, Value::float(-0.5));
    }

    #[test]
    fn test_correct_requires_response() {
        let state = response_state(Value::Null);
        assert_eq!(
            eval(&Expression::Correct("RESPONSE".into()), &state).unwrap(),
            ids(&["A"])
        );

        let mut state = state;
        state.declare(Variable::outcome("SCORE", Cardinality::Single, BaseType::Float).unwrap());
        assert!(matches!(
            eval(&Expression::Correct("SCORE".into()), &state),
            Err(ExpressionError::InvalidVariable { .. })
        ));
    }

    #[test]
    fn test_map_response_point() {
        let area = |coords: Vec<i64>, value: f64| AreaMapEntry {
            coords: Coords::new(Shape::Circle, coords).unwrap(),
            mapped_value: value,
        };
        let mapping = AreaMapping {
            lower_bound: None,
            upper_bound: None,
            default_value: 0.0,
            entries: vec![area(vec![5, 5, 5], 1.0), area(vec![50, 50, 5], 2.0)],
        };
        let points = Value::multiple(
            BaseType::Point,
            vec![
                Scalar::Point(Point { x: 5, y: 5 }),
                Scalar::Point(Point { x: 6, y: 6 }),
            ],
        )
        .unwrap();
        let response = Variable::response("POINTS", Cardinality::Multiple, BaseType::Point)
            .unwrap()
            .with_area_mapping(mapping)
            .with_value(points);
        let state: State = [response].into_iter().collect();
        let score = eval(&Expression::MapResponsePoint("POINTS".into()), &state).unwrap();
        assert_eq!(score, Value::float(1.0));
    }

    // ── Randomness ───────────────────────────────────

    #[test]
    fn test_random_integer_respects_step() {
        let expr = Expression::RandomInteger {
            min: 2.into(),
            max: 10.into(),
            step: 4.into(),
        };
        for seed in 0..20 {
            let config = EngineConfig::default().with_seed(seed);
            let registry = OperatorRegistry::new();
            let v = Evaluator::new(&config, &registry)
                .evaluate(&expr, &State::new())
                .unwrap();
            assert!([2, 6, 10].iter().any(|i| v == Value::integer(*i)), "{}", v);
        }
    }

    #[test]
    fn test_random_integer_full_i64_range() {
        let expr = Expression::RandomInteger {
            min: i64::MIN.into(),
            max: i64::MAX.into(),
            step: 1.into(),
        };
        let state = State::new();
        assert!(matches!(eval(&expr, &state), Ok(Value::Single(Scalar::Integer(_)))));

        let wide_step = Expression::RandomInteger {
            min: i64::MIN.into(),
            max: i64::MAX.into(),
            step: i64::MAX.into(),
        };
        let v = eval(&wide_step, &state).unwrap();
        assert!(
            [i64::MIN, -1, i64::MAX - 1]
                .iter()
                .any(|i| v == Value::integer(*i)),
            "{}",
            v
        );
    }

    #[test]
    fn test_random_integer_rejects_bad_bounds() {
        let state = State::new();
        let reversed = Expression::RandomInteger {
            min: 5.into(),
            max: 1.into(),
            step: 1.into(),
        };
        assert!(matches!(
            eval(&reversed, &state),
            Err(ExpressionError::InvalidAttribute { attribute, .. }) if attribute == "max"
        ));
        let zero_step = Expression::RandomInteger {
            min: 1.into(),
            max: 5.into(),
            step: 0.into(),
        };
        assert!(matches!(
            eval(&zero_step, &state),
            Err(ExpressionError::InvalidAttribute { attribute, .. }) if attribute == "step"
        ));
    }

    #[test]
    fn test_random_float_rejects_non_finite_ranges() {
        let state = State::new();
        let cases = [
            (0.0, f64::INFINITY, "max"),
            (f64::NEG_INFINITY, 0.0, "min"),
            (f64::NAN, 1.0, "min"),
            (-1e308, 1e308, "max"),
            (2.0, 1.0, "max"),
        ];
        for (min, max, attr) in cases {
            let expr = Expression::RandomFloat {
                min: min.into(),
                max: max.into(),
            };
            match eval(&expr, &state) {
                Err(ExpressionError::InvalidAttribute { attribute, .. }) => {
                    assert_eq!(attribute, attr, "{}..{}", min, max)
                }
                other => panic!("{}..{}: {:?}", min, max, other),
            }
        }
    }

    #[test]
    fn test_random_float_infinite_bound_from_variable() {
        let high = Variable::template("HIGH", Cardinality::Single, BaseType::Float)
            .unwrap()
            .with_value(Value::float(f64::INFINITY));
        let state: State = [high].into_iter().collect();
        let expr = Expression::RandomFloat {
            min: 0.0.into(),
            max: OrVariableRef::Variable("HIGH".to_string()),
        };
        assert!(matches!(
            eval(&expr, &state),
            Err(ExpressionError::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn test_seeded_evaluation_repeats() {
        let expr = Expression::RandomFloat {
            min: 0.0.into(),
            max: 1.0.into(),
        };
        let state = State::new();
        assert_eq!(eval(&expr, &state).unwrap(), eval(&expr, &state).unwrap());
    }
}
