//! Single typed datums and their QTI text representation.

use std::fmt;

use super::{BaseType, Duration};
use crate::error::ModelError;

/// An `x y` screen coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

/// An unordered pair of identifiers: `A B` equals `B A`.
#[derive(Debug, Clone)]
pub struct Pair {
    pub first: String,
    pub second: String,
}

impl Pair {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Pair {
            first: first.into(),
            second: second.into(),
        }
    }
}

impl PartialEq for Pair {
    fn eq(&self, other: &Self) -> bool {
        (self.first == other.first && self.second == other.second)
            || (self.first == other.second && self.second == other.first)
    }
}

impl Eq for Pair {}

/// An ordered pair of identifiers: source then destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirectedPair {
    pub source: String,
    pub destination: String,
}

impl DirectedPair {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        DirectedPair {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Either an integer or an identifier, decided by the literal's shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IntOrIdentifier {
    Int(i64),
    Identifier(String),
}

/// Uploaded file content. Two files are equal when their content,
/// MIME type and name are equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileValue {
    pub filename: Option<String>,
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// A single typed datum.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Identifier(String),
    Uri(String),
    IntOrIdentifier(IntOrIdentifier),
    Point(Point),
    Pair(Pair),
    DirectedPair(DirectedPair),
    Duration(Duration),
    File(FileValue),
}

impl Scalar {
    pub fn base_type(&self) -> BaseType {
        match self {
            Scalar::Boolean(_) => BaseType::Boolean,
            Scalar::Integer(_) => BaseType::Integer,
            Scalar::Float(_) => BaseType::Float,
            Scalar::String(_) => BaseType::String,
            Scalar::Identifier(_) => BaseType::Identifier,
            Scalar::Uri(_) => BaseType::Uri,
            Scalar::IntOrIdentifier(_) => BaseType::IntOrIdentifier,
            Scalar::Point(_) => BaseType::Point,
            Scalar::Pair(_) => BaseType::Pair,
            Scalar::DirectedPair(_) => BaseType::DirectedPair,
            Scalar::Duration(_) => BaseType::Duration,
            Scalar::File(_) => BaseType::File,
        }
    }

    /// Read a value from its QTI text form (the content of `baseValue`,
    /// `value` and similar elements).
    pub fn parse(base_type: BaseType, text: &str) -> Result<Scalar, ModelError> {
        let invalid = || ModelError::InvalidLiteral {
            base_type,
            text: text.to_string(),
        };
        let trimmed = text.trim();
        let scalar = match base_type {
            BaseType::Boolean => match trimmed {
                "true" | "1" => Scalar::Boolean(true),
                "false" | "0" => Scalar::Boolean(false),
                _ => return Err(invalid()),
            },
            BaseType::Integer => Scalar::Integer(parse_integer(trimmed).ok_or_else(invalid)?),
            BaseType::Float => Scalar::Float(parse_float(trimmed).ok_or_else(invalid)?),
            BaseType::String => Scalar::String(text.to_string()),
            BaseType::Identifier => Scalar::Identifier(parse_identifier(trimmed).ok_or_else(invalid)?),
            BaseType::Uri => Scalar::Uri(trimmed.to_string()),
            BaseType::IntOrIdentifier => match parse_integer(trimmed) {
                Some(i) => Scalar::IntOrIdentifier(IntOrIdentifier::Int(i)),
                None => Scalar::IntOrIdentifier(IntOrIdentifier::Identifier(
                    parse_identifier(trimmed).ok_or_else(invalid)?,
                )),
            },
            BaseType::Point => {
                let (x, y) = split_two(trimmed).ok_or_else(invalid)?;
                Scalar::Point(Point {
                    x: parse_integer(x).ok_or_else(invalid)?,
                    y: parse_integer(y).ok_or_else(invalid)?,
                })
            }
            BaseType::Pair => {
                let (a, b) = split_two(trimmed).ok_or_else(invalid)?;
                Scalar::Pair(Pair::new(
                    parse_identifier(a).ok_or_else(invalid)?,
                    parse_identifier(b).ok_or_else(invalid)?,
                ))
            }
            BaseType::DirectedPair => {
                let (a, b) = split_two(trimmed).ok_or_else(invalid)?;
                Scalar::DirectedPair(DirectedPair::new(
                    parse_identifier(a).ok_or_else(invalid)?,
                    parse_identifier(b).ok_or_else(invalid)?,
                ))
            }
            BaseType::Duration => Scalar::Duration(Duration::parse(trimmed)?),
            BaseType::File => Scalar::File(FileValue {
                filename: None,
                mime_type: "text/plain".to_string(),
                data: text.as_bytes().to_vec(),
            }),
        };
        Ok(scalar)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Scalar::Integer(i) => Some(*i),
            Scalar::IntOrIdentifier(IntOrIdentifier::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of integers and floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Integer(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Text of string-like scalars (string, identifier, uri, intOrIdentifier identifiers).
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) | Scalar::Identifier(s) | Scalar::Uri(s) => Some(s),
            Scalar::IntOrIdentifier(IntOrIdentifier::Identifier(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_point(&self) -> Option<Point> {
        match self {
            Scalar::Point(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Scalar::Duration(d) => Some(*d),
            _ => None,
        }
    }
}

fn parse_integer(text: &str) -> Option<i64> {
    let digits = text.strip_prefix('+').unwrap_or(text);
    digits.parse::<i64>().ok()
}

/// XML Schema `double` lexical space, including `INF`, `-INF` and `NaN`.
fn parse_float(text: &str) -> Option<f64> {
    match text {
        "INF" | "+INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ if text.eq_ignore_ascii_case("inf")
            || text.eq_ignore_ascii_case("infinity")
            || text.eq_ignore_ascii_case("nan") =>
        {
            None
        }
        _ => text.parse::<f64>().ok(),
    }
}

fn parse_identifier(text: &str) -> Option<String> {
    if text.is_empty() || text.chars().any(char::is_whitespace) {
        return None;
    }
    Some(text.to_string())
}

fn split_two(text: &str) -> Option<(&str, &str)> {
    let mut parts = text.split_whitespace();
    let first = parts.next()?;
    let second = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((first, second))
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Boolean(b) => write!(f, "{}", b),
            Scalar::Integer(i) => write!(f, "{}", i),
            Scalar::Float(v) => {
                if v.is_nan() {
                    f.write_str("NaN")
                } else if v.is_infinite() {
                    f.write_str(if *v > 0.0 { "INF" } else { "-INF" })
                } else {
                    write!(f, "{}", v)
                }
            }
            Scalar::String(s) | Scalar::Identifier(s) | Scalar::Uri(s) => f.write_str(s),
            Scalar::IntOrIdentifier(IntOrIdentifier::Int(i)) => write!(f, "{}", i),
            Scalar::IntOrIdentifier(IntOrIdentifier::Identifier(s)) => f.write_str(s),
            Scalar::Point(p) => write!(f, "{} {}", p.x, p.y),
            Scalar::Pair(p) => write!(f, "{} {}", p.first, p.second),
            Scalar::DirectedPair(p) => write!(f, "{} {}", p.source, p.destination),
            Scalar::Duration(d) => write!(f, "{}", d),
            Scalar::File(file) => match &file.filename {
                Some(name) => write!(f, "{} ({} bytes)", name, file.data.len()),
                None => write!(f, "{} bytes of {}", file.data.len(), file.mime_type),
            },
        }
    }
}
