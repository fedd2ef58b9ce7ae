use std::collections::BTreeMap;
use std::fmt;

use rhai::{Dynamic, FLOAT, INT};

/// Names the evaluator binds for every pixel; parameters may not shadow them.
pub const RESERVED_BINDINGS: [&str; 3] = ["x", "y", "pixel"];

pub type Params = BTreeMap<String, ParamValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl ParamValue {
    /// Reads an unquoted literal: booleans, then integers, then floats, and
    /// anything else as a string.
    pub fn parse_literal(raw: &str) -> Self {
        match raw {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(value) = raw.parse::<i64>() {
            return Self::Int(value);
        }
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => Self::Float(value),
            _ => Self::Str(raw.to_string()),
        }
    }

    pub(crate) fn to_dynamic(&self) -> Dynamic {
        match self {
            Self::Int(value) => Dynamic::from(*value as INT),
            Self::Float(value) => Dynamic::from(*value as FLOAT),
            Self::Bool(value) => Dynamic::from(*value),
            Self::Str(value) => Dynamic::from(value.clone()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "{value:?}"),
        }
    }
}
