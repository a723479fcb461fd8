//! Variable declarations and the role-specific data hanging off them.

use crate::error::{ModelError, StateError};
use crate::types::{BaseType, Cardinality, Container, Coords, IntOrIdentifier, Scalar, Value};

// ──────────────────────────────────────────────
// Role extensions
// ──────────────────────────────────────────────

/// One `mapEntry`: a key scored at `mapped_value`.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    pub map_key: Scalar,
    pub mapped_value: f64,
    pub case_sensitive: bool,
}

/// Response-to-score mapping used by `mapResponse`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mapping {
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    pub default_value: f64,
    pub entries: Vec<MapEntry>,
}

impl Mapping {
    pub fn new(default_value: f64, entries: Vec<MapEntry>) -> Self {
        Mapping {
            lower_bound: None,
            upper_bound: None,
            default_value,
            entries,
        }
    }

    /// First entry whose key matches. String-like keys honour the entry's
    /// `case_sensitive` flag.
    pub fn entry_for(&self, value: &Scalar) -> Option<&MapEntry> {
        self.entries.iter().find(|entry| {
            if entry.case_sensitive {
                return entry.map_key == *value;
            }
            match (entry.map_key.as_str(), value.as_str()) {
                (Some(key), Some(v)) if entry.map_key.base_type() == value.base_type() => {
                    key.to_lowercase() == v.to_lowercase()
                }
                _ => entry.map_key == *value,
            }
        })
    }

    pub fn clamp(&self, score: f64) -> f64 {
        clamp(score, self.lower_bound, self.upper_bound)
    }
}

/// One `areaMapEntry`.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaMapEntry {
    pub coords: Coords,
    pub mapped_value: f64,
}

/// Point-to-score mapping used by `mapResponsePoint`.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaMapping {
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    pub default_value: f64,
    pub entries: Vec<AreaMapEntry>,
}

impl AreaMapping {
    pub fn clamp(&self, score: f64) -> f64 {
        clamp(score, self.lower_bound, self.upper_bound)
    }
}

fn clamp(score: f64, lower: Option<f64>, upper: Option<f64>) -> f64 {
    let mut score = score;
    if let Some(lo) = lower {
        score = score.max(lo);
    }
    if let Some(hi) = upper {
        score = score.min(hi);
    }
    score
}

/// `matchTableEntry`: exact integer source.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchEntry {
    pub source: i64,
    pub target: Scalar,
}

/// `interpolationTableEntry`: lower bound of a numeric band.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolationEntry {
    pub source: f64,
    pub include_boundary: bool,
    pub target: Scalar,
}

/// Table used by `lookupOutcomeValue` to turn a number into an outcome value.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupTable {
    Match {
        default_value: Option<Scalar>,
        entries: Vec<MatchEntry>,
    },
    Interpolation {
        default_value: Option<Scalar>,
        entries: Vec<InterpolationEntry>,
    },
}

impl LookupTable {
    pub fn default_value(&self) -> Option<&Scalar> {
        match self {
            LookupTable::Match { default_value, .. }
            | LookupTable::Interpolation { default_value, .. } => default_value.as_ref(),
        }
    }

    /// Match tables only accept integers; interpolation tables walk their
    /// entries in order and take the first band the value falls into.
    /// Returns `None` when the source has the wrong type.
    pub fn lookup(&self, source: &Scalar) -> Option<Option<&Scalar>> {
        match self {
            LookupTable::Match {
                default_value,
                entries,
            } => {
                let key = source.as_integer()?;
                let hit = entries.iter().find(|e| e.source == key).map(|e| &e.target);
                Some(hit.or(default_value.as_ref()))
            }
            LookupTable::Interpolation {
                default_value,
                entries,
            } => {
                let key = source.as_f64()?;
                let hit = entries
                    .iter()
                    .find(|e| {
                        if e.include_boundary {
                            key >= e.source
                        } else {
                            key > e.source
                        }
                    })
                    .map(|e| &e.target);
                Some(hit.or(default_value.as_ref()))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseInfo {
    pub correct_response: Value,
    pub mapping: Option<Mapping>,
    pub area_mapping: Option<AreaMapping>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutcomeInfo {
    pub normal_maximum: Option<f64>,
    pub normal_minimum: Option<f64>,
    pub mastery_value: Option<f64>,
    pub lookup_table: Option<LookupTable>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateInfo {
    pub param_variable: bool,
    pub math_variable: bool,
}

/// What part a variable plays in an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableRole {
    Response(ResponseInfo),
    Outcome(OutcomeInfo),
    Template(TemplateInfo),
}

impl VariableRole {
    pub fn name(&self) -> &'static str {
        match self {
            VariableRole::Response(_) => "response",
            VariableRole::Outcome(_) => "outcome",
            VariableRole::Template(_) => "template",
        }
    }
}

// ──────────────────────────────────────────────
// Variables
// ──────────────────────────────────────────────

/// A declared variable and its current value.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub identifier: String,
    pub cardinality: Cardinality,
    /// `None` only for record cardinality.
    pub base_type: Option<BaseType>,
    pub value: Value,
    pub default_value: Value,
    pub role: VariableRole,
}

impl Variable {
    pub fn new(
        identifier: impl Into<String>,
        cardinality: Cardinality,
        base_type: Option<BaseType>,
        role: VariableRole,
    ) -> Result<Self, ModelError> {
        if (cardinality == Cardinality::Record) != base_type.is_none() {
            return Err(ModelError::InvalidDeclaration {
                cardinality,
                base_type,
            });
        }
        Ok(Variable {
            identifier: identifier.into(),
            cardinality,
            base_type,
            value: Value::Null,
            default_value: Value::Null,
            role,
        })
    }

    pub fn response(
        identifier: impl Into<String>,
        cardinality: Cardinality,
        base_type: BaseType,
    ) -> Result<Self, ModelError> {
        Variable::new(
            identifier,
            cardinality,
            Some(base_type),
            VariableRole::Response(ResponseInfo::default()),
        )
    }

    pub fn outcome(
        identifier: impl Into<String>,
        cardinality: Cardinality,
        base_type: BaseType,
    ) -> Result<Self, ModelError> {
        Variable::new(
            identifier,
            cardinality,
            Some(base_type),
            VariableRole::Outcome(OutcomeInfo::default()),
        )
    }

    pub fn template(
        identifier: impl Into<String>,
        cardinality: Cardinality,
        base_type: BaseType,
    ) -> Result<Self, ModelError> {
        Variable::new(
            identifier,
            cardinality,
            Some(base_type),
            VariableRole::Template(TemplateInfo::default()),
        )
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = value;
        self
    }

    /// Sets the correct response; ignored unless this is a response variable.
    pub fn with_correct_response(mut self, value: Value) -> Self {
        if let VariableRole::Response(info) = &mut self.role {
            info.correct_response = value;
        }
        self
    }

    pub fn with_mapping(mut self, mapping: Mapping) -> Self {
        if let VariableRole::Response(info) = &mut self.role {
            info.mapping = Some(mapping);
        }
        self
    }

    pub fn with_area_mapping(mut self, mapping: AreaMapping) -> Self {
        if let VariableRole::Response(info) = &mut self.role {
            info.area_mapping = Some(mapping);
        }
        self
    }

    pub fn with_lookup_table(mut self, table: LookupTable) -> Self {
        if let VariableRole::Outcome(info) = &mut self.role {
            info.lookup_table = Some(table);
        }
        self
    }

    pub fn response_info(&self) -> Option<&ResponseInfo> {
        match &self.role {
            VariableRole::Response(info) => Some(info),
            _ => None,
        }
    }

    pub fn outcome_info(&self) -> Option<&OutcomeInfo> {
        match &self.role {
            VariableRole::Outcome(info) => Some(info),
            _ => None,
        }
    }

    pub fn template_info(&self) -> Option<&TemplateInfo> {
        match &self.role {
            VariableRole::Template(info) => Some(info),
            _ => None,
        }
    }

    /// Declared shape for error messages, e.g. `"single float"`.
    pub fn declared_type(&self) -> String {
        match self.base_type {
            Some(bt) => format!("{} {}", self.cardinality, bt),
            None => self.cardinality.to_string(),
        }
    }

    /// Reset the value to the declared default. Single numeric outcomes
    /// without a default start at zero.
    pub fn reset(&mut self) {
        self.value = if !self.default_value.is_null() {
            self.default_value.clone()
        } else {
            match (&self.role, self.cardinality, self.base_type) {
                (VariableRole::Outcome(_), Cardinality::Single, Some(BaseType::Integer)) => {
                    Value::integer(0)
                }
                (VariableRole::Outcome(_), Cardinality::Single, Some(BaseType::Float)) => {
                    Value::float(0.0)
                }
                _ => self.default_value.clone(),
            }
        };
    }

    /// Convert `value` so it fits this declaration.
    ///
    /// Accepted conversions: integer ⇄ float (floats truncate toward zero),
    /// identifier ⇄ string, integer/identifier → intOrIdentifier, and a
    /// single value into a one-element container. `Null` is always accepted.
    pub fn coerce(&self, value: Value) -> Result<Value, StateError> {
        let incompatible = |got: &Value| StateError::IncompatibleValue {
            identifier: self.identifier.clone(),
            expected: self.declared_type(),
            got: got.type_name(),
        };

        if matches!(value, Value::Null) {
            return Ok(Value::Null);
        }

        let Some(base_type) = self.base_type else {
            return match value {
                Value::Record(_) => Ok(value),
                other => Err(incompatible(&other)),
            };
        };

        match (self.cardinality, &value) {
            (Cardinality::Single, Value::Single(s)) => coerce_scalar(s, base_type)
                .map(Value::Single)
                .ok_or_else(|| incompatible(&value)),
            (Cardinality::Multiple | Cardinality::Ordered, Value::Single(s)) => {
                let element = coerce_scalar(s, base_type).ok_or_else(|| incompatible(&value))?;
                let container = Container::from_values(base_type, vec![element])
                    .map_err(|_| incompatible(&value))?;
                Ok(wrap(self.cardinality, container))
            }
            (Cardinality::Multiple, Value::Multiple(c)) | (Cardinality::Ordered, Value::Ordered(c)) => {
                let elements = c
                    .iter()
                    .map(|s| coerce_scalar(s, base_type))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| incompatible(&value))?;
                let container =
                    Container::from_values(base_type, elements).map_err(|_| incompatible(&value))?;
                Ok(wrap(self.cardinality, container))
            }
            _ => Err(incompatible(&value)),
        }
    }
}

fn wrap(cardinality: Cardinality, container: Container) -> Value {
    match cardinality {
        Cardinality::Ordered => Value::Ordered(container),
        _ => Value::Multiple(container),
    }
}

fn coerce_scalar(value: &Scalar, target: BaseType) -> Option<Scalar> {
    if value.base_type() == target {
        return Some(value.clone());
    }
    match (value, target) {
        (Scalar::Integer(i), BaseType::Float) => Some(Scalar::Float(*i as f64)),
        (Scalar::Float(f), BaseType::Integer) if f.is_finite() => Some(Scalar::Integer(f.trunc() as i64)),
        (Scalar::Identifier(s), BaseType::String) => Some(Scalar::String(s.clone())),
        (Scalar::String(s), BaseType::Identifier) if !s.is_empty() && !s.contains(char::is_whitespace) => {
            Some(Scalar::Identifier(s.clone()))
        }
        (Scalar::Integer(i), BaseType::IntOrIdentifier) => {
            Some(Scalar::IntOrIdentifier(IntOrIdentifier::Int(*i)))
        }
        (Scalar::Identifier(s), BaseType::IntOrIdentifier) => {
            Some(Scalar::IntOrIdentifier(IntOrIdentifier::Identifier(s.clone())))
        }
        _ => None,
    }
}
