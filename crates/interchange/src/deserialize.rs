//! Deserialization from interchange JSON into `qti-core` trees.
//!
//! The main entry point is [`from_interchange`], which takes a
//! `&serde_json::Value` and produces a [`Document`]. Errors carry the
//! JSON path of the offending node, e.g.
//! `responseProcessing.rules[0].if.expression.operands[1]`.

use std::str::FromStr;

use qti_core::{
    AreaMapEntry, AreaMapping, AssignmentKind, BaseType, BranchRule, Cardinality, ConditionBranch,
    ConditionRule, Container, Coords, CustomOperator, Equality, ExitKind, Expression,
    FloatOrVariableRef, InterpolationEntry, LookupTable, MapEntry, Mapping, MatchEntry, ModelError,
    OperatorKind, OrVariableRef, OutcomeInfo, Processing, Record, ResponseInfo, Rule, RuleFamily,
    Scalar, Shape, State, TemplateInfo, ToleranceMode, Value, Variable, VariableRole,
};
use serde_json::Value as Json;

use crate::types::Document;

/// Errors during interchange JSON deserialization.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterchangeError {
    /// A node is missing a required field.
    #[error("{path}: missing required field '{field}'")]
    MissingField { path: String, field: String },

    /// A field is present but has the wrong shape.
    #[error("{path}: {message}")]
    InvalidValue { path: String, message: String },

    /// The `kind` of an expression or rule is not recognised.
    #[error("{path}: unknown {category} kind '{kind}'")]
    UnknownKind {
        path: String,
        category: String,
        kind: String,
    },

    /// The value model rejected a literal, coordinate list or tolerance.
    #[error("{path}: {source}")]
    Model { path: String, source: ModelError },

    /// The input is not JSON at all.
    #[error("invalid JSON: {0}")]
    Json(String),
}

/// Parse a JSON string into a [`Document`].
pub fn from_str(text: &str) -> Result<Document, InterchangeError> {
    let json: Json =
        serde_json::from_str(text).map_err(|e| InterchangeError::Json(e.to_string()))?;
    from_interchange(&json)
}

/// Deserialize an interchange document.
pub fn from_interchange(doc: &Json) -> Result<Document, InterchangeError> {
    let identifier = required_str(doc, "identifier", "")?;

    let declarations = match doc.get("declarations") {
        Some(decls) => array(decls, "declarations")?
            .iter()
            .enumerate()
            .map(|(i, d)| parse_declaration(d, &index("declarations", i)))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    let processing = |field: &str, family: RuleFamily| {
        doc.get(field)
            .map(|p| parse_processing(p, family, field))
            .transpose()
    };

    Ok(Document {
        identifier,
        declarations,
        template_processing: processing("templateProcessing", RuleFamily::Template)?,
        response_processing: processing("responseProcessing", RuleFamily::Response)?,
        outcome_processing: processing("outcomeProcessing", RuleFamily::Outcome)?,
    })
}

/// Parse a standalone template file: `{ "rules": [...] }`.
pub fn parse_template(json: &Json, family: RuleFamily) -> Result<Vec<Rule>, InterchangeError> {
    let rules = json.get("rules").ok_or_else(|| missing("", "rules"))?;
    parse_rules(rules, family, "rules")
}

/// Read candidate responses (or any other bindings) given as a JSON
/// object of identifier to value, typed by the declarations in `state`.
pub fn parse_bindings(json: &Json, state: &State) -> Result<Vec<(String, Value)>, InterchangeError> {
    let obj = json.as_object().ok_or_else(|| invalid("", "expected an object of bindings"))?;
    obj.iter()
        .map(|(identifier, raw)| {
            let variable = state
                .get(identifier)
                .ok_or_else(|| invalid(identifier, "no variable declared with this identifier"))?;
            let value = parse_value(variable.cardinality, variable.base_type, raw, identifier)?;
            Ok((identifier.clone(), value))
        })
        .collect()
}

// ── Parsing helpers ─────────────────────────────────────────────────

fn child(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", path, segment)
    }
}

fn index(path: &str, i: usize) -> String {
    format!("{}[{}]", path, i)
}

fn missing(path: &str, field: &str) -> InterchangeError {
    InterchangeError::MissingField {
        path: if path.is_empty() { "document".to_string() } else { path.to_string() },
        field: field.to_string(),
    }
}

fn invalid(path: &str, message: impl Into<String>) -> InterchangeError {
    InterchangeError::InvalidValue {
        path: path.to_string(),
        message: message.into(),
    }
}

fn model(path: &str) -> impl FnOnce(ModelError) -> InterchangeError + '_ {
    move |source| InterchangeError::Model {
        path: path.to_string(),
        source,
    }
}

fn array<'a>(json: &'a Json, path: &str) -> Result<&'a Vec<Json>, InterchangeError> {
    json.as_array().ok_or_else(|| invalid(path, "expected an array"))
}

fn required_str(obj: &Json, field: &str, path: &str) -> Result<String, InterchangeError> {
    match obj.get(field) {
        Some(Json::String(s)) => Ok(s.clone()),
        Some(_) => Err(invalid(&child(path, field), "expected a string")),
        None => Err(missing(path, field)),
    }
}

fn optional_str(obj: &Json, field: &str, path: &str) -> Result<Option<String>, InterchangeError> {
    match obj.get(field) {
        None | Some(Json::Null) => Ok(None),
        Some(Json::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(invalid(&child(path, field), "expected a string")),
    }
}

fn optional_bool(obj: &Json, field: &str, path: &str, default: bool) -> Result<bool, InterchangeError> {
    match obj.get(field) {
        None | Some(Json::Null) => Ok(default),
        Some(Json::Bool(b)) => Ok(*b),
        Some(_) => Err(invalid(&child(path, field), "expected a boolean")),
    }
}

fn optional_f64(obj: &Json, field: &str, path: &str) -> Result<Option<f64>, InterchangeError> {
    match obj.get(field) {
        None | Some(Json::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| invalid(&child(path, field), "expected a number")),
    }
}

/// Parse a closed vocabulary (`baseType`, `shape`, `toleranceMode`, ...).
fn vocabulary<T: FromStr<Err = String>>(
    obj: &Json,
    field: &str,
    path: &str,
    default: Option<T>,
) -> Result<T, InterchangeError> {
    match (obj.get(field), default) {
        (None, Some(d)) => Ok(d),
        (None, None) => Err(missing(path, field)),
        (Some(Json::String(s)), _) => s.parse::<T>().map_err(|e| invalid(&child(path, field), e)),
        (Some(_), _) => Err(invalid(&child(path, field), "expected a string")),
    }
}

/// Attribute that may be a literal or a variable reference.
fn attr_ref<T: FromStr>(
    obj: &Json,
    field: &str,
    path: &str,
    default: Option<T>,
    from_number: impl Fn(&serde_json::Number) -> Option<T>,
) -> Result<OrVariableRef<T>, InterchangeError> {
    let at = child(path, field);
    match (obj.get(field), default) {
        (None, Some(d)) => Ok(OrVariableRef::Value(d)),
        (None, None) => Err(missing(path, field)),
        (Some(Json::Number(n)), _) => from_number(n)
            .map(OrVariableRef::Value)
            .ok_or_else(|| invalid(&at, format!("{} is out of range", n))),
        (Some(Json::String(s)), _) => OrVariableRef::parse(s)
            .ok_or_else(|| invalid(&at, format!("'{}' is neither a literal nor a variable reference", s))),
        (Some(_), _) => Err(invalid(&at, "expected a number or a variable reference")),
    }
}

fn int_ref(
    obj: &Json,
    field: &str,
    path: &str,
    default: Option<i64>,
) -> Result<OrVariableRef<i64>, InterchangeError> {
    attr_ref(obj, field, path, default, |n| n.as_i64())
}

fn float_ref(
    obj: &Json,
    field: &str,
    path: &str,
    default: Option<f64>,
) -> Result<OrVariableRef<f64>, InterchangeError> {
    attr_ref(obj, field, path, default, |n| n.as_f64())
}

// ── Values ──────────────────────────────────────────────────────────

/// Parse one scalar. Strings use the QTI text form; JSON numbers and
/// booleans are accepted where they fit the base type.
pub fn parse_scalar(base_type: BaseType, json: &Json, path: &str) -> Result<Scalar, InterchangeError> {
    match json {
        Json::String(s) => Scalar::parse(base_type, s).map_err(model(path)),
        Json::Bool(b) if base_type == BaseType::Boolean => Ok(Scalar::Boolean(*b)),
        Json::Number(n) => match base_type {
            BaseType::Integer | BaseType::IntOrIdentifier => n
                .as_i64()
                .map(|i| match base_type {
                    BaseType::Integer => Scalar::Integer(i),
                    _ => Scalar::IntOrIdentifier(qti_core::IntOrIdentifier::Int(i)),
                })
                .ok_or_else(|| invalid(path, format!("{} is not an integer", n))),
            BaseType::Float => n
                .as_f64()
                .map(Scalar::Float)
                .ok_or_else(|| invalid(path, format!("{} is not a float", n))),
            _ => Scalar::parse(base_type, &n.to_string()).map_err(model(path)),
        },
        other => Err(invalid(
            path,
            format!("cannot read {} as a {} value", json_type(other), base_type),
        )),
    }
}

fn json_type(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

/// Parse a value of the given shape. `null` is always `Value::Null`; a
/// single item given for a container becomes a one-element container.
pub fn parse_value(
    cardinality: Cardinality,
    base_type: Option<BaseType>,
    json: &Json,
    path: &str,
) -> Result<Value, InterchangeError> {
    if json.is_null() {
        return Ok(Value::Null);
    }
    if cardinality == Cardinality::Record {
        return parse_record(json, path).map(Value::Record);
    }
    let base_type = base_type.ok_or_else(|| missing(path, "baseType"))?;
    match cardinality {
        Cardinality::Single => parse_scalar(base_type, json, path).map(Value::Single),
        _ => {
            let scalars = match json {
                Json::Array(items) => items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| parse_scalar(base_type, item, &index(path, i)))
                    .collect::<Result<Vec<_>, _>>()?,
                single => vec![parse_scalar(base_type, single, path)?],
            };
            let container = Container::from_values(base_type, scalars).map_err(model(path))?;
            Ok(if cardinality == Cardinality::Ordered {
                Value::Ordered(container)
            } else {
                Value::Multiple(container)
            })
        }
    }
}

/// Records are objects of `{ "baseType": ..., "value": ... }` fields.
fn parse_record(json: &Json, path: &str) -> Result<Record, InterchangeError> {
    let obj = json
        .as_object()
        .ok_or_else(|| invalid(path, "expected an object of record fields"))?;
    let mut record = Record::new();
    for (name, field) in obj {
        let at = child(path, name);
        let base_type: BaseType = vocabulary(field, "baseType", &at, None)?;
        match field.get("value") {
            None | Some(Json::Null) => {}
            Some(raw) => {
                record.insert(name.clone(), parse_scalar(base_type, raw, &child(&at, "value"))?);
            }
        }
    }
    Ok(record)
}

// ── Declarations ────────────────────────────────────────────────────

fn parse_declaration(obj: &Json, path: &str) -> Result<Variable, InterchangeError> {
    let identifier = required_str(obj, "identifier", path)?;
    let role = match required_str(obj, "role", path)?.as_str() {
        "response" => VariableRole::Response(ResponseInfo::default()),
        "outcome" => VariableRole::Outcome(OutcomeInfo::default()),
        "template" => VariableRole::Template(TemplateInfo::default()),
        other => {
            return Err(invalid(
                &child(path, "role"),
                format!("expected response, outcome or template, got '{}'", other),
            ))
        }
    };
    let cardinality: Cardinality = vocabulary(obj, "cardinality", path, None)?;
    let base_type: Option<BaseType> = match obj.get("baseType") {
        None | Some(Json::Null) => None,
        Some(_) => Some(vocabulary(obj, "baseType", path, None)?),
    };

    let mut variable =
        Variable::new(identifier, cardinality, base_type, role).map_err(model(path))?;

    if let Some(raw) = obj.get("defaultValue") {
        variable.default_value =
            parse_value(cardinality, base_type, raw, &child(path, "defaultValue"))?;
    }

    match &mut variable.role {
        VariableRole::Response(info) => {
            if let Some(raw) = obj.get("correctResponse") {
                info.correct_response =
                    parse_value(cardinality, base_type, raw, &child(path, "correctResponse"))?;
            }
            if let Some(raw) = obj.get("mapping") {
                let at = child(path, "mapping");
                let bt = base_type.ok_or_else(|| invalid(&at, "record variables cannot be mapped"))?;
                info.mapping = Some(parse_mapping(raw, bt, &at)?);
            }
            if let Some(raw) = obj.get("areaMapping") {
                info.area_mapping = Some(parse_area_mapping(raw, &child(path, "areaMapping"))?);
            }
        }
        VariableRole::Outcome(info) => {
            info.normal_maximum = optional_f64(obj, "normalMaximum", path)?;
            info.normal_minimum = optional_f64(obj, "normalMinimum", path)?;
            info.mastery_value = optional_f64(obj, "masteryValue", path)?;
            if let Some(raw) = obj.get("lookupTable") {
                let at = child(path, "lookupTable");
                let bt = base_type
                    .ok_or_else(|| invalid(&at, "record variables cannot use a lookup table"))?;
                info.lookup_table = Some(parse_lookup_table(raw, bt, &at)?);
            }
        }
        VariableRole::Template(info) => {
            info.param_variable = optional_bool(obj, "paramVariable", path, false)?;
            info.math_variable = optional_bool(obj, "mathVariable", path, false)?;
        }
    }

    Ok(variable)
}

fn parse_mapping(obj: &Json, base_type: BaseType, path: &str) -> Result<Mapping, InterchangeError> {
    let entries = match obj.get("entries") {
        Some(raw) => array(raw, &child(path, "entries"))?
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let at = index(&child(path, "entries"), i);
                let key = e.get("mapKey").ok_or_else(|| missing(&at, "mapKey"))?;
                Ok(MapEntry {
                    map_key: parse_scalar(base_type, key, &child(&at, "mapKey"))?,
                    mapped_value: optional_f64(e, "mappedValue", &at)?
                        .ok_or_else(|| missing(&at, "mappedValue"))?,
                    case_sensitive: optional_bool(e, "caseSensitive", &at, true)?,
                })
            })
            .collect::<Result<Vec<_>, InterchangeError>>()?,
        None => Vec::new(),
    };
    Ok(Mapping {
        lower_bound: optional_f64(obj, "lowerBound", path)?,
        upper_bound: optional_f64(obj, "upperBound", path)?,
        default_value: optional_f64(obj, "defaultValue", path)?.unwrap_or(0.0),
        entries,
    })
}

fn parse_coords(obj: &Json, path: &str) -> Result<Coords, InterchangeError> {
    let shape: Shape = vocabulary(obj, "shape", path, None)?;
    let at = child(path, "coords");
    match obj.get("coords") {
        None if shape == Shape::Default => Coords::new(shape, Vec::new()).map_err(model(path)),
        None => Err(missing(path, "coords")),
        Some(Json::String(s)) => Coords::parse(shape, s).map_err(model(&at)),
        Some(Json::Array(items)) => {
            let values = items
                .iter()
                .map(|v| v.as_i64())
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| invalid(&at, "coordinates must be integers"))?;
            Coords::new(shape, values).map_err(model(&at))
        }
        Some(_) => Err(invalid(&at, "expected a coordinate string or array")),
    }
}

fn parse_area_mapping(obj: &Json, path: &str) -> Result<AreaMapping, InterchangeError> {
    let entries = match obj.get("entries") {
        Some(raw) => array(raw, &child(path, "entries"))?
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let at = index(&child(path, "entries"), i);
                Ok(AreaMapEntry {
                    coords: parse_coords(e, &at)?,
                    mapped_value: optional_f64(e, "mappedValue", &at)?
                        .ok_or_else(|| missing(&at, "mappedValue"))?,
                })
            })
            .collect::<Result<Vec<_>, InterchangeError>>()?,
        None => Vec::new(),
    };
    Ok(AreaMapping {
        lower_bound: optional_f64(obj, "lowerBound", path)?,
        upper_bound: optional_f64(obj, "upperBound", path)?,
        default_value: optional_f64(obj, "defaultValue", path)?.unwrap_or(0.0),
        entries,
    })
}

fn parse_lookup_table(obj: &Json, base_type: BaseType, path: &str) -> Result<LookupTable, InterchangeError> {
    let default_value = match obj.get("defaultValue") {
        None | Some(Json::Null) => None,
        Some(raw) => Some(parse_scalar(base_type, raw, &child(path, "defaultValue"))?),
    };
    let entries_path = child(path, "entries");
    let raw_entries: &[Json] = match obj.get("entries") {
        Some(raw) => array(raw, &entries_path)?.as_slice(),
        None => &[],
    };
    let target = |e: &Json, at: &str| -> Result<Scalar, InterchangeError> {
        let raw = e.get("target").ok_or_else(|| missing(at, "target"))?;
        parse_scalar(base_type, raw, &child(at, "target"))
    };

    match required_str(obj, "type", path)?.as_str() {
        "match" => {
            let entries = raw_entries
                .iter()
                .enumerate()
                .map(|(i, e)| {
                    let at = index(&entries_path, i);
                    let source = e
                        .get("source")
                        .and_then(Json::as_i64)
                        .ok_or_else(|| invalid(&child(&at, "source"), "expected an integer"))?;
                    Ok(MatchEntry {
                        source,
                        target: target(e, &at)?,
                    })
                })
                .collect::<Result<Vec<_>, InterchangeError>>()?;
            Ok(LookupTable::Match {
                default_value,
                entries,
            })
        }
        "interpolation" => {
            let entries = raw_entries
                .iter()
                .enumerate()
                .map(|(i, e)| {
                    let at = index(&entries_path, i);
                    Ok(InterpolationEntry {
                        source: optional_f64(e, "source", &at)?
                            .ok_or_else(|| missing(&at, "source"))?,
                        include_boundary: optional_bool(e, "includeBoundary", &at, true)?,
                        target: target(e, &at)?,
                    })
                })
                .collect::<Result<Vec<_>, InterchangeError>>()?;
            Ok(LookupTable::Interpolation {
                default_value,
                entries,
            })
        }
        other => Err(invalid(
            &child(path, "type"),
            format!("expected match or interpolation, got '{}'", other),
        )),
    }
}

// ── Rules ───────────────────────────────────────────────────────────

fn parse_processing(obj: &Json, family: RuleFamily, path: &str) -> Result<Processing, InterchangeError> {
    let rules = match obj.get("rules") {
        Some(raw) => parse_rules(raw, family, &child(path, "rules"))?,
        None => Vec::new(),
    };
    Ok(Processing {
        rules,
        template: optional_str(obj, "template", path)?,
        template_location: optional_str(obj, "templateLocation", path)?,
    })
}

/// Parse a JSON array of rules.
pub fn parse_rules(json: &Json, family: RuleFamily, path: &str) -> Result<Vec<Rule>, InterchangeError> {
    array(json, path)?
        .iter()
        .enumerate()
        .map(|(i, r)| parse_rule(r, family, &index(path, i)))
        .collect()
}

fn parse_rule(obj: &Json, family: RuleFamily, path: &str) -> Result<Rule, InterchangeError> {
    let kind = required_str(obj, "kind", path)?;
    let expression = || -> Result<Expression, InterchangeError> {
        let raw = obj.get("expression").ok_or_else(|| missing(path, "expression"))?;
        parse_expression(raw, &child(path, "expression"))
    };

    let assignment = match kind.as_str() {
        "setOutcomeValue" => Some(AssignmentKind::SetOutcomeValue),
        "setTemplateValue" => Some(AssignmentKind::SetTemplateValue),
        "setCorrectResponse" => Some(AssignmentKind::SetCorrectResponse),
        "setDefaultValue" => Some(AssignmentKind::SetDefaultValue),
        "lookupOutcomeValue" => Some(AssignmentKind::LookupOutcomeValue),
        _ => None,
    };
    if let Some(assignment) = assignment {
        let identifier = required_str(obj, "identifier", path)?;
        return Ok(Rule::assign(assignment, identifier, expression()?));
    }

    let rule = match kind.as_str() {
        "responseCondition" => parse_condition(obj, RuleFamily::Response, path)?,
        "outcomeCondition" => parse_condition(obj, RuleFamily::Outcome, path)?,
        "templateCondition" => parse_condition(obj, RuleFamily::Template, path)?,
        "exitResponse" => Rule::Exit(ExitKind::Response),
        "exitTemplate" => Rule::Exit(ExitKind::Template),
        "exitTest" => Rule::Exit(ExitKind::Test),
        "templateConstraint" => Rule::TemplateConstraint(expression()?),
        "branchRule" => Rule::Branch(BranchRule {
            target: required_str(obj, "target", path)?,
            guard: expression()?,
        }),
        "responseProcessingFragment" | "outcomeProcessingFragment" => {
            let fragment_family = if kind == "outcomeProcessingFragment" {
                RuleFamily::Outcome
            } else {
                RuleFamily::Response
            };
            let rules = match obj.get("rules") {
                Some(raw) => parse_rules(raw, fragment_family, &child(path, "rules"))?,
                None => Vec::new(),
            };
            Rule::Fragment {
                family: fragment_family,
                rules,
            }
        }
        _ => {
            return Err(InterchangeError::UnknownKind {
                path: path.to_string(),
                category: format!("{} rule", family_name(family)),
                kind: kind.clone(),
            })
        }
    };
    Ok(rule)
}

fn family_name(family: RuleFamily) -> &'static str {
    match family {
        RuleFamily::Response => "response",
        RuleFamily::Outcome => "outcome",
        RuleFamily::Template => "template",
    }
}

fn parse_branch(obj: &Json, family: RuleFamily, path: &str) -> Result<ConditionBranch, InterchangeError> {
    let guard = obj.get("expression").ok_or_else(|| missing(path, "expression"))?;
    let rules = match obj.get("rules") {
        Some(raw) => parse_rules(raw, family, &child(path, "rules"))?,
        None => Vec::new(),
    };
    Ok(ConditionBranch {
        guard: parse_expression(guard, &child(path, "expression"))?,
        rules,
    })
}

fn parse_condition(obj: &Json, family: RuleFamily, path: &str) -> Result<Rule, InterchangeError> {
    let first = obj.get("if").ok_or_else(|| missing(path, "if"))?;
    let mut branches = vec![parse_branch(first, family, &child(path, "if"))?];

    if let Some(raw) = obj.get("elseIf") {
        let at = child(path, "elseIf");
        for (i, branch) in array(raw, &at)?.iter().enumerate() {
            branches.push(parse_branch(branch, family, &index(&at, i))?);
        }
    }

    let otherwise = obj
        .get("else")
        .map(|raw| parse_rules(raw, family, &child(path, "else")))
        .transpose()?;

    Ok(Rule::Condition(ConditionRule {
        family,
        branches,
        otherwise,
    }))
}

// ── Expressions ─────────────────────────────────────────────────────

/// Parse an expression node: `{ "kind": ..., "operands": [...], ...attributes }`.
pub fn parse_expression(obj: &Json, path: &str) -> Result<Expression, InterchangeError> {
    let kind = required_str(obj, "kind", path)?;
    let operands = match obj.get("operands") {
        Some(raw) => {
            let at = child(path, "operands");
            array(raw, &at)?
                .iter()
                .enumerate()
                .map(|(i, e)| parse_expression(e, &index(&at, i)))
                .collect::<Result<Vec<_>, _>>()?
        }
        None => Vec::new(),
    };
    let identifier = || required_str(obj, "identifier", path);

    let expression = match kind.as_str() {
        "baseValue" => {
            let base_type: BaseType = vocabulary(obj, "baseType", path, None)?;
            let raw = obj.get("value").ok_or_else(|| missing(path, "value"))?;
            Expression::BaseValue(parse_scalar(base_type, raw, &child(path, "value"))?)
        }
        "variable" => Expression::Variable(identifier()?),
        "correct" => Expression::Correct(identifier()?),
        "default" => Expression::Default(identifier()?),
        "null" => Expression::Null,
        "mapResponse" => Expression::MapResponse(identifier()?),
        "mapResponsePoint" => Expression::MapResponsePoint(identifier()?),
        "mathConstant" => Expression::MathConstant(vocabulary(obj, "name", path, None)?),
        "randomInteger" => Expression::RandomInteger {
            min: int_ref(obj, "min", path, Some(0))?,
            max: int_ref(obj, "max", path, None)?,
            step: int_ref(obj, "step", path, Some(1))?,
        },
        "randomFloat" => Expression::RandomFloat {
            min: float_ref(obj, "min", path, Some(0.0))?,
            max: float_ref(obj, "max", path, None)?,
        },
        "customOperator" => Expression::Custom(CustomOperator {
            class: optional_str(obj, "class", path)?,
            definition: optional_str(obj, "definition", path)?,
            markup: optional_str(obj, "markup", path)?.unwrap_or_default(),
            operands,
        }),
        _ => {
            let op = operator_kind(&kind, obj, path)?.ok_or_else(|| InterchangeError::UnknownKind {
                path: path.to_string(),
                category: "expression".to_string(),
                kind: kind.clone(),
            })?;
            Expression::operator(op, operands)
        }
    };
    Ok(expression)
}

fn parse_tolerance(obj: &Json, path: &str) -> Result<Vec<FloatOrVariableRef>, InterchangeError> {
    let at = child(path, "tolerance");
    let one = |raw: &Json| -> Result<FloatOrVariableRef, InterchangeError> {
        match raw {
            Json::Number(n) => n
                .as_f64()
                .map(OrVariableRef::Value)
                .ok_or_else(|| invalid(&at, "tolerance out of range")),
            Json::String(s) => OrVariableRef::parse(s)
                .ok_or_else(|| invalid(&at, format!("invalid tolerance '{}'", s))),
            _ => Err(invalid(&at, "expected a number or a variable reference")),
        }
    };
    match obj.get("tolerance") {
        None | Some(Json::Null) => Ok(Vec::new()),
        Some(Json::Array(items)) => items.iter().map(one).collect(),
        // QTI writes asymmetric tolerances as "t0 t1"
        Some(Json::String(s)) => s
            .split_whitespace()
            .map(|part| one(&Json::String(part.to_string())))
            .collect(),
        Some(other) => Ok(vec![one(other)?]),
    }
}

fn operator_kind(kind: &str, obj: &Json, path: &str) -> Result<Option<OperatorKind>, InterchangeError> {
    let figures = || int_ref(obj, "figures", path, None);
    let rounding = || vocabulary(obj, "roundingMode", path, Some(qti_core::RoundingMode::SignificantFigures));

    let op = match kind {
        "and" => OperatorKind::And,
        "or" => OperatorKind::Or,
        "not" => OperatorKind::Not,
        "anyN" => OperatorKind::AnyN {
            min: int_ref(obj, "min", path, None)?,
            max: int_ref(obj, "max", path, None)?,
        },
        "match" => OperatorKind::Match,
        "stringMatch" => OperatorKind::StringMatch {
            case_sensitive: optional_bool(obj, "caseSensitive", path, true)?,
            substring: optional_bool(obj, "substring", path, false)?,
        },
        "patternMatch" => OperatorKind::PatternMatch {
            pattern: attr_ref(obj, "pattern", path, None, |_| None)?,
        },
        "substring" => OperatorKind::Substring {
            case_sensitive: optional_bool(obj, "caseSensitive", path, true)?,
        },
        "equal" => {
            let mode: ToleranceMode = vocabulary(obj, "toleranceMode", path, Some(ToleranceMode::Exact))?;
            let equality = Equality::new(mode, parse_tolerance(obj, path)?)
                .map_err(model(path))?
                .with_bounds(
                    optional_bool(obj, "includeLowerBound", path, true)?,
                    optional_bool(obj, "includeUpperBound", path, true)?,
                );
            OperatorKind::Equal(equality)
        }
        "equalRounded" => OperatorKind::EqualRounded {
            mode: rounding()?,
            figures: figures()?,
        },
        "lt" => OperatorKind::Lt,
        "gt" => OperatorKind::Gt,
        "lte" => OperatorKind::Lte,
        "gte" => OperatorKind::Gte,
        "durationLT" => OperatorKind::DurationLt,
        "durationGTE" => OperatorKind::DurationGte,
        "inside" => OperatorKind::Inside {
            coords: parse_coords(obj, path)?,
        },
        "sum" => OperatorKind::Sum,
        "product" => OperatorKind::Product,
        "subtract" => OperatorKind::Subtract,
        "divide" => OperatorKind::Divide,
        "power" => OperatorKind::Power,
        "integerDivide" => OperatorKind::IntegerDivide,
        "integerModulus" => OperatorKind::IntegerModulus,
        "truncate" => OperatorKind::Truncate,
        "round" => OperatorKind::Round,
        "roundTo" => OperatorKind::RoundTo {
            mode: rounding()?,
            figures: figures()?,
        },
        "integerToFloat" => OperatorKind::IntegerToFloat,
        "gcd" => OperatorKind::Gcd,
        "lcm" => OperatorKind::Lcm,
        "min" => OperatorKind::Min,
        "max" => OperatorKind::Max,
        "mathOperator" => OperatorKind::Math(vocabulary(obj, "name", path, None)?),
        "statsOperator" => OperatorKind::Stats(vocabulary(obj, "name", path, None)?),
        "multiple" => OperatorKind::Multiple,
        "ordered" => OperatorKind::Ordered,
        "containerSize" => OperatorKind::ContainerSize,
        "isNull" => OperatorKind::IsNull,
        "index" => OperatorKind::Index {
            n: int_ref(obj, "n", path, None)?,
        },
        "fieldValue" => OperatorKind::FieldValue {
            field: required_str(obj, "fieldIdentifier", path)?,
        },
        "random" => OperatorKind::Random,
        "member" => OperatorKind::Member,
        "delete" => OperatorKind::Delete,
        "contains" => OperatorKind::Contains,
        "repeat" => OperatorKind::Repeat {
            number_repeats: int_ref(obj, "numberRepeats", path, None)?,
        },
        _ => return Ok(None),
    };
    Ok(Some(op))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_item() -> Json {
        json!({
            "identifier": "choice",
            "declarations": [
                {
                    "role": "response",
                    "identifier": "RESPONSE",
                    "cardinality": "single",
                    "baseType": "identifier",
                    "correctResponse": "ChoiceA"
                },
                {
                    "role": "outcome",
                    "identifier": "SCORE",
                    "cardinality": "single",
                    "baseType": "float",
                    "defaultValue": 0
                }
            ],
            "responseProcessing": {
                "rules": [
                    {
                        "kind": "responseCondition",
                        "if": {
                            "expression": {
                                "kind": "match",
                                "operands": [
                                    { "kind": "variable", "identifier": "RESPONSE" },
                                    { "kind": "correct", "identifier": "RESPONSE" }
                                ]
                            },
                            "rules": [
                                {
                                    "kind": "setOutcomeValue",
                                    "identifier": "SCORE",
                                    "expression": { "kind": "baseValue", "baseType": "float", "value": 1 }
                                }
                            ]
                        },
                        "else": [
                            {
                                "kind": "setOutcomeValue",
                                "identifier": "SCORE",
                                "expression": { "kind": "baseValue", "baseType": "float", "value": "0" }
                            }
                        ]
                    }
                ]
            }
        })
    }

    #[test]
    fn test_parse_minimal_item() {
        let doc = from_interchange(&minimal_item()).unwrap();
        assert_eq!(doc.identifier, "choice");
        assert_eq!(doc.declarations.len(), 2);
        assert_eq!(
            doc.declarations[0].response_info().unwrap().correct_response,
            Value::identifier("ChoiceA")
        );
        assert_eq!(doc.declarations[1].default_value, Value::float(0.0));

        let rp = doc.response_processing.unwrap();
        assert_eq!(rp.rules.len(), 1);
        match &rp.rules[0] {
            Rule::Condition(c) => {
                assert_eq!(c.family, RuleFamily::Response);
                assert_eq!(c.branches.len(), 1);
                assert!(c.otherwise.is_some());
            }
            other => panic!("expected a condition, got {:?}", other),
        }
        assert!(doc.template_processing.is_none());
    }

    #[test]
    fn test_missing_identifier() {
        let err = from_interchange(&json!({ "declarations": [] })).unwrap_err();
        assert_eq!(
            err,
            InterchangeError::MissingField {
                path: "document".into(),
                field: "identifier".into()
            }
        );
    }

    #[test]
    fn test_unknown_expression_kind_reports_path() {
        let doc = json!({
            "identifier": "x",
            "responseProcessing": {
                "rules": [{
                    "kind": "setOutcomeValue",
                    "identifier": "SCORE",
                    "expression": { "kind": "sum", "operands": [{ "kind": "median" }] }
                }]
            }
        });
        let err = from_interchange(&doc).unwrap_err();
        assert_eq!(
            err.to_string(),
            "responseProcessing.rules[0].expression.operands[0]: unknown expression kind 'median'"
        );
    }

    #[test]
    fn test_equal_without_tolerance_is_rejected() {
        let expr = json!({
            "kind": "equal",
            "toleranceMode": "absolute",
            "operands": [
                { "kind": "baseValue", "baseType": "float", "value": 1.0 },
                { "kind": "baseValue", "baseType": "float", "value": 1.0 }
            ]
        });
        let err = parse_expression(&expr, "e").unwrap_err();
        assert!(matches!(
            err,
            InterchangeError::Model {
                source: ModelError::MissingTolerance { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_parse_tolerance_forms() {
        let asymmetric = json!({ "kind": "equal", "toleranceMode": "relative", "tolerance": "0.1 0.2" });
        match parse_expression(&asymmetric, "e").unwrap() {
            Expression::Operator(op) => match op.kind {
                OperatorKind::Equal(eq) => {
                    let (t0, t1) = eq.tolerance().unwrap();
                    assert_eq!(t0, &OrVariableRef::Value(0.1));
                    assert_eq!(t1, &OrVariableRef::Value(0.2));
                }
                other => panic!("unexpected operator {:?}", other),
            },
            other => panic!("unexpected expression {:?}", other),
        }

        let by_ref = json!({ "kind": "equal", "toleranceMode": "absolute", "tolerance": ["{TOL}"] });
        assert!(parse_expression(&by_ref, "e").is_ok());
    }

    #[test]
    fn test_parse_variable_reference_attributes() {
        let expr = json!({ "kind": "randomInteger", "max": "{MAX}", "step": 2 });
        assert_eq!(
            parse_expression(&expr, "e").unwrap(),
            Expression::RandomInteger {
                min: OrVariableRef::Value(0),
                max: OrVariableRef::Variable("MAX".into()),
                step: OrVariableRef::Value(2),
            }
        );
    }

    #[test]
    fn test_parse_inside_coords() {
        let expr = json!({ "kind": "inside", "shape": "rect", "coords": "0,0,5,3", "operands": [] });
        assert!(parse_expression(&expr, "e").is_ok());
        let bad = json!({ "kind": "inside", "shape": "circle", "coords": [1, 2] });
        assert!(matches!(
            parse_expression(&bad, "e"),
            Err(InterchangeError::Model { .. })
        ));
    }

    #[test]
    fn test_parse_values() {
        let multiple = parse_value(
            Cardinality::Multiple,
            Some(BaseType::Identifier),
            &json!(["A", "B"]),
            "v",
        )
        .unwrap();
        assert_eq!(multiple.as_container().unwrap().len(), 2);

        let wrapped = parse_value(Cardinality::Ordered, Some(BaseType::Integer), &json!(3), "v").unwrap();
        assert_eq!(wrapped.as_container().unwrap().len(), 1);

        let record = parse_value(
            Cardinality::Record,
            None,
            &json!({ "x": { "baseType": "integer", "value": 1 }, "y": { "baseType": "string", "value": null } }),
            "v",
        )
        .unwrap();
        assert_eq!(record.as_record().unwrap().len(), 1);

        assert_eq!(
            parse_value(Cardinality::Single, Some(BaseType::Float), &Json::Null, "v").unwrap(),
            Value::Null
        );
        assert!(parse_value(Cardinality::Single, Some(BaseType::Integer), &json!(1.5), "v").is_err());
    }

    #[test]
    fn test_parse_mapping_and_lookup_table() {
        let doc = json!({
            "identifier": "x",
            "declarations": [
                {
                    "role": "response",
                    "identifier": "RESPONSE",
                    "cardinality": "multiple",
                    "baseType": "identifier",
                    "mapping": {
                        "lowerBound": 0,
                        "defaultValue": -1,
                        "entries": [{ "mapKey": "A", "mappedValue": 2 }]
                    }
                },
                {
                    "role": "outcome",
                    "identifier": "GRADE",
                    "cardinality": "single",
                    "baseType": "identifier",
                    "lookupTable": {
                        "type": "interpolation",
                        "defaultValue": "F",
                        "entries": [{ "source": 50, "target": "P" }]
                    }
                }
            ]
        });
        let parsed = from_interchange(&doc).unwrap();
        let mapping = parsed.declarations[0]
            .response_info()
            .and_then(|i| i.mapping.clone())
            .unwrap();
        assert_eq!(mapping.default_value, -1.0);
        assert_eq!(mapping.lower_bound, Some(0.0));
        assert!(mapping.entries[0].case_sensitive);
        assert!(parsed.declarations[1]
            .outcome_info()
            .unwrap()
            .lookup_table
            .is_some());
    }

    #[test]
    fn test_record_declaration_with_base_type_is_rejected() {
        let doc = json!({
            "identifier": "x",
            "declarations": [{
                "role": "outcome",
                "identifier": "R",
                "cardinality": "record",
                "baseType": "integer"
            }]
        });
        assert!(matches!(
            from_interchange(&doc),
            Err(InterchangeError::Model {
                source: ModelError::InvalidDeclaration { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_parse_bindings() {
        let doc = from_interchange(&minimal_item()).unwrap();
        let state = doc.new_state();
        let bindings = parse_bindings(&json!({ "RESPONSE": "ChoiceB" }), &state).unwrap();
        assert_eq!(bindings, vec![("RESPONSE".to_string(), Value::identifier("ChoiceB"))]);
        assert!(parse_bindings(&json!({ "NOPE": "x" }), &state).is_err());
    }

    #[test]
    fn test_parse_template_file() {
        let template = json!({ "rules": [{ "kind": "exitResponse" }] });
        let rules = parse_template(&template, RuleFamily::Response).unwrap();
        assert_eq!(rules, vec![Rule::Exit(ExitKind::Response)]);
        assert!(parse_template(&json!({}), RuleFamily::Response).is_err());
    }

    #[test]
    fn test_from_str_rejects_non_json() {
        assert!(matches!(from_str("{not json"), Err(InterchangeError::Json(_))));
    }
}
