//! qti-interchange: JSON interchange documents for the QTI processing engine.
//!
//! A document carries variable declarations and up to three processing
//! blocks (template, response, outcome). [`from_interchange`] turns a
//! `serde_json::Value` into a [`Document`] of `qti-core` trees; the
//! [`serialize`] module writes values and state back out.
//!
//! The engine never sees JSON: this crate is the boundary where markup
//! becomes expression and rule trees.

pub mod deserialize;
pub mod serialize;
pub mod types;

pub use deserialize::{
    from_interchange, from_str, parse_bindings, parse_expression, parse_rules, parse_template,
    parse_value, InterchangeError,
};
pub use serialize::{state_to_json, value_to_json};
pub use types::*;
