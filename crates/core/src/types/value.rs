//! Runtime values: `Null`, single scalars, containers and records.

use std::collections::BTreeMap;
use std::fmt;

use super::{BaseType, Cardinality, Scalar};
use crate::error::ModelError;

// ──────────────────────────────────────────────
// Containers
// ──────────────────────────────────────────────

/// Homogeneous list of scalars backing both `multiple` and `ordered`
/// values. Duplicates are allowed; whether order matters is decided by
/// the [`Value`] variant wrapping it.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    base_type: BaseType,
    values: Vec<Scalar>,
}

impl Container {
    /// An empty container. Empty is not the same thing as `Null`.
    pub fn new(base_type: BaseType) -> Self {
        Container {
            base_type,
            values: Vec::new(),
        }
    }

    pub fn from_values(base_type: BaseType, values: Vec<Scalar>) -> Result<Self, ModelError> {
        let mut container = Container::new(base_type);
        for v in values {
            container.push(v)?;
        }
        Ok(container)
    }

    /// Append an element, rejecting it if its base type differs.
    pub fn push(&mut self, value: Scalar) -> Result<(), ModelError> {
        if value.base_type() != self.base_type {
            return Err(ModelError::ContainerTypeMismatch {
                expected: self.base_type,
                got: value.base_type(),
            });
        }
        self.values.push(value);
        Ok(())
    }

    pub fn base_type(&self) -> BaseType {
        self.base_type
    }

    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Scalar> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Scalar> {
        self.values.iter()
    }

    pub fn contains(&self, value: &Scalar) -> bool {
        self.values.iter().any(|v| v == value)
    }

    pub fn count_of(&self, value: &Scalar) -> usize {
        self.values.iter().filter(|v| *v == value).count()
    }

    /// Multiset equality: same elements with the same multiplicities.
    pub fn bag_eq(&self, other: &Container) -> bool {
        self.base_type == other.base_type
            && self.len() == other.len()
            && self
                .values
                .iter()
                .all(|v| self.count_of(v) == other.count_of(v))
    }
}

// ──────────────────────────────────────────────
// Records
// ──────────────────────────────────────────────

/// Heterogeneous keyed fields. A missing field reads as `Null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, Scalar>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&Scalar> {
        self.fields.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Scalar) -> Option<Scalar> {
        self.fields.insert(field.into(), value)
    }

    pub fn remove(&mut self, field: &str) -> Option<Scalar> {
        self.fields.remove(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Scalar)> {
        self.fields.iter()
    }
}

impl FromIterator<(String, Scalar)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Scalar)>>(iter: T) -> Self {
        Record {
            fields: iter.into_iter().collect(),
        }
    }
}

// ──────────────────────────────────────────────
// Values
// ──────────────────────────────────────────────

/// A QTI runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Single(Scalar),
    Multiple(Container),
    Ordered(Container),
    Record(Record),
}

impl Value {
    pub fn boolean(b: bool) -> Self {
        Value::Single(Scalar::Boolean(b))
    }

    pub fn integer(i: i64) -> Self {
        Value::Single(Scalar::Integer(i))
    }

    pub fn float(f: f64) -> Self {
        Value::Single(Scalar::Float(f))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::Single(Scalar::String(s.into()))
    }

    pub fn identifier(s: impl Into<String>) -> Self {
        Value::Single(Scalar::Identifier(s.into()))
    }

    pub fn multiple(base_type: BaseType, values: Vec<Scalar>) -> Result<Self, ModelError> {
        Ok(Value::Multiple(Container::from_values(base_type, values)?))
    }

    pub fn ordered(base_type: BaseType, values: Vec<Scalar>) -> Result<Self, ModelError> {
        Ok(Value::Ordered(Container::from_values(base_type, values)?))
    }

    /// Cardinality of a non-null value.
    pub fn cardinality(&self) -> Option<Cardinality> {
        match self {
            Value::Null => None,
            Value::Single(_) => Some(Cardinality::Single),
            Value::Multiple(_) => Some(Cardinality::Multiple),
            Value::Ordered(_) => Some(Cardinality::Ordered),
            Value::Record(_) => Some(Cardinality::Record),
        }
    }

    /// Base type of single values and containers. Records and `Null` have none.
    pub fn base_type(&self) -> Option<BaseType> {
        match self {
            Value::Single(s) => Some(s.base_type()),
            Value::Multiple(c) | Value::Ordered(c) => Some(c.base_type()),
            Value::Null | Value::Record(_) => None,
        }
    }

    /// QTI's notion of NULL: the `Null` value, empty containers, empty
    /// records and empty strings.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Single(Scalar::String(s)) => s.is_empty(),
            Value::Single(_) => false,
            Value::Multiple(c) | Value::Ordered(c) => c.is_empty(),
            Value::Record(r) => r.is_empty(),
        }
    }

    /// Whether this is the single boolean `true`.
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Single(Scalar::Boolean(true)))
    }

    pub fn as_single(&self) -> Option<&Scalar> {
        match self {
            Value::Single(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&Container> {
        match self {
            Value::Multiple(c) | Value::Ordered(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Human readable shape for error messages, e.g. `"multiple identifier"`.
    pub fn type_name(&self) -> String {
        match (self.cardinality(), self.base_type()) {
            (None, _) => "NULL".to_string(),
            (Some(card), Some(bt)) => format!("{} {}", card, bt),
            (Some(card), None) => card.to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Single(a), Value::Single(b)) => a == b,
            (Value::Multiple(a), Value::Multiple(b)) => a.bag_eq(b),
            (Value::Ordered(a), Value::Ordered(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Single(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Single(s) => write!(f, "{}", s),
            Value::Multiple(c) | Value::Ordered(c) => {
                let items: Vec<String> = c.iter().map(|s| s.to_string()).collect();
                write!(f, "[{}]", items.join("; "))
            }
            Value::Record(r) => {
                let items: Vec<String> = r.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{{{}}}", items.join("; "))
            }
        }
    }
}
