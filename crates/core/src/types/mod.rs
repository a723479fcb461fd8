//! The QTI value model.
//!
//! A [`Value`] is either `Null`, a single [`Scalar`], a homogeneous
//! [`Container`] (multiple or ordered), or a heterogeneous [`Record`].
//! Every scalar knows its own [`BaseType`]; containers enforce that all
//! of their elements share the declared one.

pub mod duration;
pub mod geometry;
pub mod scalar;
pub mod value;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use duration::Duration;
pub use geometry::{Coords, Shape};
pub use scalar::{DirectedPair, FileValue, IntOrIdentifier, Pair, Point, Scalar};
pub use value::{Container, Record, Value};

// ──────────────────────────────────────────────
// Base types
// ──────────────────────────────────────────────

/// The scalar datatype of a variable's value(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BaseType {
    Boolean,
    Integer,
    Float,
    String,
    Identifier,
    Uri,
    IntOrIdentifier,
    Point,
    Pair,
    DirectedPair,
    Duration,
    File,
}

impl BaseType {
    pub const ALL: [BaseType; 12] = [
        BaseType::Boolean,
        BaseType::Integer,
        BaseType::Float,
        BaseType::String,
        BaseType::Identifier,
        BaseType::Uri,
        BaseType::IntOrIdentifier,
        BaseType::Point,
        BaseType::Pair,
        BaseType::DirectedPair,
        BaseType::Duration,
        BaseType::File,
    ];

    /// The QTI attribute spelling (`directedPair`, `intOrIdentifier`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            BaseType::Boolean => "boolean",
            BaseType::Integer => "integer",
            BaseType::Float => "float",
            BaseType::String => "string",
            BaseType::Identifier => "identifier",
            BaseType::Uri => "uri",
            BaseType::IntOrIdentifier => "intOrIdentifier",
            BaseType::Point => "point",
            BaseType::Pair => "pair",
            BaseType::DirectedPair => "directedPair",
            BaseType::Duration => "duration",
            BaseType::File => "file",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, BaseType::Integer | BaseType::Float)
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BaseType::ALL
            .iter()
            .copied()
            .find(|bt| bt.as_str() == s)
            .ok_or_else(|| format!("unknown base type '{}'", s))
    }
}

// ──────────────────────────────────────────────
// Cardinality
// ──────────────────────────────────────────────

/// Whether a variable holds one value, a bag, a sequence, or a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Cardinality {
    Single,
    Multiple,
    Ordered,
    Record,
}

impl Cardinality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinality::Single => "single",
            Cardinality::Multiple => "multiple",
            Cardinality::Ordered => "ordered",
            Cardinality::Record => "record",
        }
    }

    /// `multiple` and `ordered` are the two container cardinalities.
    pub fn is_container(&self) -> bool {
        matches!(self, Cardinality::Multiple | Cardinality::Ordered)
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cardinality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Cardinality::Single),
            "multiple" => Ok(Cardinality::Multiple),
            "ordered" => Ok(Cardinality::Ordered),
            "record" => Ok(Cardinality::Record),
            other => Err(format!("unknown cardinality '{}'", other)),
        }
    }
}
