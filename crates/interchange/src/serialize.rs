//! Serialization of values and state back to interchange JSON.
//!
//! The output uses the same value shapes [`crate::parse_value`] accepts,
//! so a serialized state can be fed back in as bindings.

use qti_core::{Scalar, State, Value};
use serde_json::{json, Map, Value as Json};

fn scalar_to_json(scalar: &Scalar) -> Json {
    match scalar {
        Scalar::Boolean(b) => Json::Bool(*b),
        Scalar::Integer(i) => json!(i),
        Scalar::Float(f) if f.is_finite() => json!(f),
        other => Json::String(other.to_string()),
    }
}

/// Convert a value; `Null` becomes JSON `null`.
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Single(s) => scalar_to_json(s),
        Value::Multiple(c) | Value::Ordered(c) => Json::Array(c.iter().map(scalar_to_json).collect()),
        Value::Record(r) => {
            let fields: Map<String, Json> = r
                .iter()
                .map(|(name, s)| {
                    (
                        name.clone(),
                        json!({ "baseType": s.base_type().as_str(), "value": scalar_to_json(s) }),
                    )
                })
                .collect();
            Json::Object(fields)
        }
    }
}

/// Every variable in declaration order.
pub fn state_to_json(state: &State) -> Json {
    let variables: Vec<Json> = state
        .iter()
        .map(|v| {
            json!({
                "identifier": v.identifier,
                "role": v.role.name(),
                "cardinality": v.cardinality.as_str(),
                "baseType": v.base_type.map(|bt| bt.as_str()),
                "value": value_to_json(&v.value),
            })
        })
        .collect();
    Json::Array(variables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deserialize::parse_value;
    use qti_core::{BaseType, Cardinality, Variable};

    #[test]
    fn test_values_round_trip_through_bindings_shape() {
        let original = Value::ordered(
            BaseType::Point,
            vec![
                Scalar::Point(qti_core::Point { x: 1, y: 2 }),
                Scalar::Point(qti_core::Point { x: 3, y: 4 }),
            ],
        )
        .unwrap();
        let json = value_to_json(&original);
        assert_eq!(json, json!(["1 2", "3 4"]));
        let back = parse_value(Cardinality::Ordered, Some(BaseType::Point), &json, "v").unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_non_finite_floats_use_text_form() {
        assert_eq!(value_to_json(&Value::float(f64::INFINITY)), json!("INF"));
        assert_eq!(value_to_json(&Value::float(1.5)), json!(1.5));
        assert_eq!(value_to_json(&Value::Null), Json::Null);
    }

    #[test]
    fn test_state_to_json_keeps_declaration_order() {
        let state: State = [
            Variable::outcome("B", Cardinality::Single, BaseType::Integer)
                .unwrap()
                .with_value(Value::integer(2)),
            Variable::outcome("A", Cardinality::Single, BaseType::Integer).unwrap(),
        ]
        .into_iter()
        .collect();
        let json = state_to_json(&state);
        assert_eq!(json[0]["identifier"], "B");
        assert_eq!(json[0]["value"], 2);
        assert_eq!(json[1]["value"], Json::Null);
        assert_eq!(json[1]["role"], "outcome");
    }
}
