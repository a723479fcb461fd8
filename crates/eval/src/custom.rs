//! `customOperator` extensions and the registry they are looked up in.
//!
//! Registries are assembled before processing starts and then shared
//! read-only (`Arc<OperatorRegistry>`) between engines.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use qti_core::{BaseType, Cardinality, Container, Scalar, Value};
use regex::Regex;

use crate::error::ExpressionError;

// ──────────────────────────────────────────────
// Trait
// ──────────────────────────────────────────────

/// Implementation of one `customOperator` class.
///
/// Receives the already evaluated operands and the operator's raw markup,
/// from which it may read extra attributes.
pub trait ExtensionOperator: Send + Sync {
    fn evaluate(&self, operands: &[Value], markup: &str) -> Result<Value, ExpressionError>;
}

impl<F> ExtensionOperator for F
where
    F: Fn(&[Value], &str) -> Result<Value, ExpressionError> + Send + Sync,
{
    fn evaluate(&self, operands: &[Value], markup: &str) -> Result<Value, ExpressionError> {
        self(operands, markup)
    }
}

// ──────────────────────────────────────────────
// Registry
// ──────────────────────────────────────────────

/// Operator classes by name.
#[derive(Clone, Default)]
pub struct OperatorRegistry {
    operators: BTreeMap<String, Arc<dyn ExtensionOperator>>,
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorRegistry")
            .field("classes", &self.operators.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl OperatorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundled text operators: `Implode`, `Explode`, `CsvToMultiple`
    /// and `CsvToOrdered`.
    pub fn standard() -> Self {
        OperatorRegistry::new()
            .with("Implode", Implode)
            .with("Explode", Explode)
            .with("CsvToMultiple", CsvSplit { ordered: false })
            .with("CsvToOrdered", CsvSplit { ordered: true })
    }

    pub fn register(&mut self, class: impl Into<String>, operator: impl ExtensionOperator + 'static) {
        self.operators.insert(class.into(), Arc::new(operator));
    }

    pub fn with(mut self, class: impl Into<String>, operator: impl ExtensionOperator + 'static) -> Self {
        self.register(class, operator);
        self
    }

    /// Look an operator up by its class, then by its definition URI. A
    /// qualified class such as `org.example.Implode` also finds `Implode`.
    pub fn resolve(&self, class: Option<&str>, definition: Option<&str>) -> Option<&dyn ExtensionOperator> {
        let by_class = class.and_then(|c| {
            self.operators.get(c).or_else(|| {
                c.rsplit_once('.')
                    .and_then(|(_, short)| self.operators.get(short))
            })
        });
        by_class
            .or_else(|| definition.and_then(|d| self.operators.get(d)))
            .map(|op| op.as_ref())
    }

    pub fn contains(&self, class: &str) -> bool {
        self.operators.contains_key(class)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.operators.keys().map(String::as_str)
    }
}

// ──────────────────────────────────────────────
// Standard operators
// ──────────────────────────────────────────────

fn malformed(class: &str, message: impl Into<String>) -> ExpressionError {
    ExpressionError::InvalidOperand {
        operator: class.to_string(),
        message: message.into(),
    }
}

fn wrong_cardinality(class: &str, position: usize, expected: &str, got: &Value) -> ExpressionError {
    ExpressionError::WrongCardinality {
        operator: class.to_string(),
        position,
        expected: expected.to_string(),
        got: got.type_name(),
    }
}

fn wrong_base_type(class: &str, position: usize, got: &Value) -> ExpressionError {
    ExpressionError::WrongBaseType {
        operator: class.to_string(),
        position,
        expected: "string".to_string(),
        got: got.type_name(),
    }
}

fn single_string<'v>(class: &str, value: &'v Value, position: usize) -> Result<&'v str, ExpressionError> {
    match value {
        Value::Single(Scalar::String(s)) => Ok(s),
        Value::Single(_) => Err(wrong_base_type(class, position, value)),
        other => Err(wrong_cardinality(class, position, "single", other)),
    }
}

fn strings(values: Vec<&str>, cardinality: Cardinality) -> Value {
    let scalars: Vec<Scalar> = values.into_iter().map(|s| Scalar::String(s.to_string())).collect();
    let container = Container::from_values(BaseType::String, scalars)
        .unwrap_or_else(|_| Container::new(BaseType::String));
    match cardinality {
        Cardinality::Ordered => Value::Ordered(container),
        _ => Value::Multiple(container),
    }
}

fn expect_operands(class: &str, operands: &[Value], n: usize) -> Result<(), ExpressionError> {
    if operands.len() < n {
        return Err(ExpressionError::NotEnoughOperands {
            operator: class.to_string(),
            min: n,
            got: operands.len(),
        });
    }
    if operands.len() > n {
        return Err(ExpressionError::TooManyOperands {
            operator: class.to_string(),
            max: n,
            got: operands.len(),
        });
    }
    Ok(())
}

/// Joins a string container with a delimiter: `(container, delimiter)`.
struct Implode;

impl ExtensionOperator for Implode {
    fn evaluate(&self, operands: &[Value], _markup: &str) -> Result<Value, ExpressionError> {
        expect_operands("Implode", operands, 2)?;
        if operands[0].is_null() || matches!(operands[1], Value::Null) {
            return Ok(Value::Null);
        }
        let container = match &operands[0] {
            Value::Multiple(c) | Value::Ordered(c) => c,
            other => return Err(wrong_cardinality("Implode", 0, "multiple or ordered", other)),
        };
        if container.base_type() != BaseType::String {
            return Err(wrong_base_type("Implode", 0, &operands[0]));
        }
        let delimiter = single_string("Implode", &operands[1], 1)?;
        let parts: Vec<&str> = container.iter().filter_map(Scalar::as_str).collect();
        Ok(Value::string(parts.join(delimiter)))
    }
}

/// Splits a string on a delimiter: `(delimiter, string)`.
struct Explode;

impl ExtensionOperator for Explode {
    fn evaluate(&self, operands: &[Value], _markup: &str) -> Result<Value, ExpressionError> {
        expect_operands("Explode", operands, 2)?;
        if operands.iter().any(Value::is_null) {
            return Ok(Value::Null);
        }
        let delimiter = single_string("Explode", &operands[0], 0)?;
        let text = single_string("Explode", &operands[1], 1)?;
        Ok(strings(text.split(delimiter).collect(), Cardinality::Ordered))
    }
}

/// Splits one string on the markup's `delimiter` attribute (default `,`),
/// trimming items and dropping empty ones.
struct CsvSplit {
    ordered: bool,
}

impl CsvSplit {
    fn class(&self) -> &'static str {
        if self.ordered {
            "CsvToOrdered"
        } else {
            "CsvToMultiple"
        }
    }
}

static DELIMITER_ATTRIBUTE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

/// The `delimiter="..."` attribute of the markup, ignoring attributes that
/// merely end in `delimiter` (`data-delimiter`, `x:delimiter`).
fn markup_delimiter(class: &str, markup: &str) -> Result<String, ExpressionError> {
    let re = DELIMITER_ATTRIBUTE
        .get_or_init(|| Regex::new(r#"(?:^|\s)delimiter\s*=\s*["']([^"']*)["']"#))
        .as_ref()
        .map_err(|e| malformed(class, e.to_string()))?;
    Ok(re
        .captures(markup)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| ",".to_string()))
}

impl ExtensionOperator for CsvSplit {
    fn evaluate(&self, operands: &[Value], markup: &str) -> Result<Value, ExpressionError> {
        let class = self.class();
        expect_operands(class, operands, 1)?;
        if operands[0].is_null() {
            return Ok(Value::Null);
        }
        let text = single_string(class, &operands[0], 0)?;
        let delimiter = markup_delimiter(class, markup)?;
        let items: Vec<&str> = text
            .split(delimiter.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let cardinality = if self.ordered {
            Cardinality::Ordered
        } else {
            Cardinality::Multiple
        };
        Ok(strings(items, cardinality))
    }
}
