//! Expression trees.
//!
//! Trees are built by the document layer and evaluated by `qti-eval`.
//! Operator nodes carry their attributes inline; anything that may be a
//! variable reference in QTI markup is an [`OrVariableRef`].

use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;
use crate::types::{Coords, Scalar};

// ──────────────────────────────────────────────
// Attribute values
// ──────────────────────────────────────────────

/// An attribute that is either a literal or the identifier of a variable
/// whose value is read at evaluation time (`{MAX}` or `MAX`).
#[derive(Debug, Clone, PartialEq)]
pub enum OrVariableRef<T> {
    Value(T),
    Variable(String),
}

pub type IntegerOrVariableRef = OrVariableRef<i64>;
pub type FloatOrVariableRef = OrVariableRef<f64>;
pub type StringOrVariableRef = OrVariableRef<String>;

impl<T: FromStr> OrVariableRef<T> {
    /// Braced text is always a reference. Otherwise the literal wins, and
    /// a bare identifier that is not a literal becomes a reference.
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if let Some(inner) = trimmed.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
            return is_identifier(inner).then(|| OrVariableRef::Variable(inner.to_string()));
        }
        if let Ok(value) = text.parse::<T>() {
            return Some(OrVariableRef::Value(value));
        }
        is_identifier(trimmed).then(|| OrVariableRef::Variable(trimmed.to_string()))
    }
}

impl<T> From<T> for OrVariableRef<T> {
    fn from(value: T) -> Self {
        OrVariableRef::Value(value)
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Declares a closed QTI vocabulary with its attribute spellings.
macro_rules! vocabulary {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }
    };
}

vocabulary!(
    /// `mathOperator` functions.
    MathFunction {
        Sin => "sin",
        Cos => "cos",
        Tan => "tan",
        Sec => "sec",
        Csc => "csc",
        Cot => "cot",
        Asin => "asin",
        Acos => "acos",
        Atan => "atan",
        Atan2 => "atan2",
        Asec => "asec",
        Acsc => "acsc",
        Acot => "acot",
        Sinh => "sinh",
        Cosh => "cosh",
        Tanh => "tanh",
        Sech => "sech",
        Csch => "csch",
        Coth => "coth",
        Log => "log",
        Ln => "ln",
        Exp => "exp",
        Abs => "abs",
        Signum => "signum",
        Floor => "floor",
        Ceil => "ceil",
        ToDegrees => "toDegrees",
        ToRadians => "toRadians",
    }
);

impl MathFunction {
    /// Number of operands the function takes.
    pub fn arity(&self) -> usize {
        match self {
            MathFunction::Atan2 => 2,
            _ => 1,
        }
    }
}

vocabulary!(
    /// `statsOperator` functions.
    StatsFunction {
        Mean => "mean",
        SampleVariance => "sampleVariance",
        SampleSd => "sampleSD",
        PopVariance => "popVariance",
        PopSd => "popSD",
    }
);

vocabulary!(
    /// `mathConstant` names.
    MathConstant {
        Pi => "pi",
        E => "e",
    }
);

vocabulary!(
    /// Rounding strategy for `roundTo` and `equalRounded`.
    RoundingMode {
        SignificantFigures => "significantFigures",
        DecimalPlaces => "decimalPlaces",
    }
);

vocabulary!(
    /// How `equal` treats small differences.
    ToleranceMode {
        Exact => "exact",
        Absolute => "absolute",
        Relative => "relative",
    }
);

// ──────────────────────────────────────────────
// Equality tolerance
// ──────────────────────────────────────────────

/// Attributes of the `equal` operator.
///
/// `absolute`: `b - t0 <= a <= b + t1`.
/// `relative`: `b - t0*|b| <= a <= b + t1*|b|`, tolerances being fractions.
/// With a single tolerance value `t1 = t0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Equality {
    mode: ToleranceMode,
    tolerance: Vec<FloatOrVariableRef>,
    pub include_lower_bound: bool,
    pub include_upper_bound: bool,
}

impl Equality {
    pub fn exact() -> Self {
        Equality {
            mode: ToleranceMode::Exact,
            tolerance: Vec::new(),
            include_lower_bound: true,
            include_upper_bound: true,
        }
    }

    /// Fails when a non-exact mode has no tolerance, or more than two
    /// tolerance values are given.
    pub fn new(mode: ToleranceMode, tolerance: Vec<FloatOrVariableRef>) -> Result<Self, ModelError> {
        if mode != ToleranceMode::Exact && tolerance.is_empty() {
            return Err(ModelError::MissingTolerance {
                mode: mode.to_string(),
            });
        }
        if tolerance.len() > 2 {
            return Err(ModelError::InvalidAttribute {
                attribute: "tolerance".to_string(),
                message: format!("expected one or two values, got {}", tolerance.len()),
            });
        }
        Ok(Equality {
            mode,
            tolerance,
            include_lower_bound: true,
            include_upper_bound: true,
        })
    }

    pub fn with_bounds(mut self, include_lower: bool, include_upper: bool) -> Self {
        self.include_lower_bound = include_lower;
        self.include_upper_bound = include_upper;
        self
    }

    pub fn mode(&self) -> ToleranceMode {
        self.mode
    }

    /// `(t0, t1)`; `t1` repeats `t0` when only one value was given.
    pub fn tolerance(&self) -> Option<(&FloatOrVariableRef, &FloatOrVariableRef)> {
        let t0 = self.tolerance.first()?;
        Some((t0, self.tolerance.get(1).unwrap_or(t0)))
    }
}

impl Default for Equality {
    fn default() -> Self {
        Self::exact()
    }
}

// ──────────────────────────────────────────────
// Operators
// ──────────────────────────────────────────────

/// Built-in operators and their attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorKind {
    // logic
    And,
    Or,
    Not,
    AnyN {
        min: IntegerOrVariableRef,
        max: IntegerOrVariableRef,
    },

    // comparison
    Match,
    StringMatch {
        case_sensitive: bool,
        substring: bool,
    },
    PatternMatch {
        pattern: StringOrVariableRef,
    },
    Substring {
        case_sensitive: bool,
    },
    Equal(Equality),
    EqualRounded {
        mode: RoundingMode,
        figures: IntegerOrVariableRef,
    },
    Lt,
    Gt,
    Lte,
    Gte,
    DurationLt,
    DurationGte,
    Inside {
        coords: Coords,
    },

    // arithmetic
    Sum,
    Product,
    Subtract,
    Divide,
    Power,
    IntegerDivide,
    IntegerModulus,
    Truncate,
    Round,
    RoundTo {
        mode: RoundingMode,
        figures: IntegerOrVariableRef,
    },
    IntegerToFloat,
    Gcd,
    Lcm,
    Min,
    Max,
    Math(MathFunction),
    Stats(StatsFunction),

    // containers
    Multiple,
    Ordered,
    ContainerSize,
    IsNull,
    Index {
        n: IntegerOrVariableRef,
    },
    FieldValue {
        field: String,
    },
    Random,
    Member,
    Delete,
    Contains,
    Repeat {
        number_repeats: IntegerOrVariableRef,
    },
}

impl OperatorKind {
    /// QTI element name.
    pub fn name(&self) -> &'static str {
        match self {
            OperatorKind::And => "and",
            OperatorKind::Or => "or",
            OperatorKind::Not => "not",
            OperatorKind::AnyN { .. } => "anyN",
            OperatorKind::Match => "match",
            OperatorKind::StringMatch { .. } => "stringMatch",
            OperatorKind::PatternMatch { .. } => "patternMatch",
            OperatorKind::Substring { .. } => "substring",
            OperatorKind::Equal(_) => "equal",
            OperatorKind::EqualRounded { .. } => "equalRounded",
            OperatorKind::Lt => "lt",
            OperatorKind::Gt => "gt",
            OperatorKind::Lte => "lte",
            OperatorKind::Gte => "gte",
            OperatorKind::DurationLt => "durationLT",
            OperatorKind::DurationGte => "durationGTE",
            OperatorKind::Inside { .. } => "inside",
            OperatorKind::Sum => "sum",
            OperatorKind::Product => "product",
            OperatorKind::Subtract => "subtract",
            OperatorKind::Divide => "divide",
            OperatorKind::Power => "power",
            OperatorKind::IntegerDivide => "integerDivide",
            OperatorKind::IntegerModulus => "integerModulus",
            OperatorKind::Truncate => "truncate",
            OperatorKind::Round => "round",
            OperatorKind::RoundTo { .. } => "roundTo",
            OperatorKind::IntegerToFloat => "integerToFloat",
            OperatorKind::Gcd => "gcd",
            OperatorKind::Lcm => "lcm",
            OperatorKind::Min => "min",
            OperatorKind::Max => "max",
            OperatorKind::Math(_) => "mathOperator",
            OperatorKind::Stats(_) => "statsOperator",
            OperatorKind::Multiple => "multiple",
            OperatorKind::Ordered => "ordered",
            OperatorKind::ContainerSize => "containerSize",
            OperatorKind::IsNull => "isNull",
            OperatorKind::Index { .. } => "index",
            OperatorKind::FieldValue { .. } => "fieldValue",
            OperatorKind::Random => "random",
            OperatorKind::Member => "member",
            OperatorKind::Delete => "delete",
            OperatorKind::Contains => "contains",
            OperatorKind::Repeat { .. } => "repeat",
        }
    }
}

/// A built-in operator applied to its child expressions, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    pub kind: OperatorKind,
    pub operands: Vec<Expression>,
}

impl Operator {
    pub fn new(kind: OperatorKind, operands: Vec<Expression>) -> Self {
        Operator { kind, operands }
    }
}

/// A `customOperator` node. The implementation is looked up by `class`
/// when the node is evaluated and may re-read attributes from `markup`.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomOperator {
    pub class: Option<String>,
    pub definition: Option<String>,
    pub markup: String,
    pub operands: Vec<Expression>,
}

// ──────────────────────────────────────────────
// Expressions
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `baseValue`
    BaseValue(Scalar),
    /// `variable`
    Variable(String),
    /// `correct`
    Correct(String),
    /// `default`
    Default(String),
    /// `null`
    Null,
    /// `mapResponse`
    MapResponse(String),
    /// `mapResponsePoint`
    MapResponsePoint(String),
    /// `mathConstant`
    MathConstant(MathConstant),
    /// `randomInteger`; draws a multiple of `step` above `min`.
    RandomInteger {
        min: IntegerOrVariableRef,
        max: IntegerOrVariableRef,
        step: IntegerOrVariableRef,
    },
    /// `randomFloat`
    RandomFloat {
        min: FloatOrVariableRef,
        max: FloatOrVariableRef,
    },
    Operator(Operator),
    Custom(CustomOperator),
}

impl Expression {
    pub fn operator(kind: OperatorKind, operands: Vec<Expression>) -> Self {
        Expression::Operator(Operator::new(kind, operands))
    }

    pub fn variable(identifier: impl Into<String>) -> Self {
        Expression::Variable(identifier.into())
    }

    /// QTI element name.
    pub fn name(&self) -> &'static str {
        match self {
            Expression::BaseValue(_) => "baseValue",
            Expression::Variable(_) => "variable",
            Expression::Correct(_) => "correct",
            Expression::Default(_) => "default",
            Expression::Null => "null",
            Expression::MapResponse(_) => "mapResponse",
            Expression::MapResponsePoint(_) => "mapResponsePoint",
            Expression::MathConstant(_) => "mathConstant",
            Expression::RandomInteger { .. } => "randomInteger",
            Expression::RandomFloat { .. } => "randomFloat",
            Expression::Operator(op) => op.kind.name(),
            Expression::Custom(_) => "customOperator",
        }
    }

    pub fn children(&self) -> &[Expression] {
        match self {
            Expression::Operator(op) => &op.operands,
            Expression::Custom(custom) => &custom.operands,
            _ => &[],
        }
    }

    /// Whether evaluating this node can give different results for the
    /// same state.
    pub fn is_random(&self) -> bool {
        matches!(
            self,
            Expression::RandomInteger { .. } | Expression::RandomFloat { .. }
        ) || matches!(
            self,
            Expression::Operator(Operator {
                kind: OperatorKind::Random,
                ..
            })
        ) || self.children().iter().any(Expression::is_random)
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        1 + self.children().iter().map(Expression::depth).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_refs() {
        assert_eq!(
            IntegerOrVariableRef::parse("12"),
            Some(OrVariableRef::Value(12))
        );
        assert_eq!(
            IntegerOrVariableRef::parse("{MAX}"),
            Some(OrVariableRef::Variable("MAX".into()))
        );
        assert_eq!(
            FloatOrVariableRef::parse("TOL"),
            Some(OrVariableRef::Variable("TOL".into()))
        );
        assert_eq!(
            StringOrVariableRef::parse("[a-z]+"),
            Some(OrVariableRef::Value("[a-z]+".to_string()))
        );
        assert_eq!(IntegerOrVariableRef::parse("1.5"), None);
    }

    #[test]
    fn non_exact_tolerance_requires_values() {
        assert_eq!(
            Equality::new(ToleranceMode::Absolute, vec![]),
            Err(ModelError::MissingTolerance {
                mode: "absolute".into()
            })
        );
        assert!(Equality::new(ToleranceMode::Relative, vec![]).is_err());
        assert!(Equality::new(ToleranceMode::Exact, vec![]).is_ok());

        let eq = Equality::new(ToleranceMode::Absolute, vec![0.5.into()]).unwrap();
        let (t0, t1) = eq.tolerance().unwrap();
        assert_eq!(t0, t1);
    }

    #[test]
    fn vocabularies_round_trip() {
        for f in MathFunction::ALL {
            assert_eq!(f.as_str().parse::<MathFunction>().unwrap(), *f);
        }
        assert_eq!("sampleSD".parse::<StatsFunction>(), Ok(StatsFunction::SampleSd));
        assert!("median".parse::<StatsFunction>().is_err());
    }

    #[test]
    fn depth_and_randomness() {
        let leaf = Expression::BaseValue(Scalar::Integer(1));
        let tree = Expression::operator(
            OperatorKind::Sum,
            vec![
                leaf.clone(),
                Expression::operator(OperatorKind::Random, vec![Expression::variable("C")]),
            ],
        );
        assert_eq!(tree.depth(), 3);
        assert!(tree.is_random());
        assert!(!leaf.is_random());
        assert_eq!(tree.name(), "sum");
    }
}
