//! The scalar value sum type (§3.1) plus the in-memory 2-D range value it
//! can carry.

use std::fmt;

use crate::error::CellError;
use crate::number::RichNumber;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A materialised rectangle of values (§3.1, §3.4 `Range` vertex), either
/// backed by a live graph range or built ad-hoc by a function (e.g. an
/// array literal or `FILTER`-style result).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimpleRangeValue {
    width: usize,
    height: usize,
    data: Vec<Value>,
}

impl SimpleRangeValue {
    pub fn new(width: usize, height: usize, data: Vec<Value>) -> Self {
        assert_eq!(data.len(), width * height, "range data must be width*height long");
        SimpleRangeValue { width, height, data }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, col: usize, row: usize) -> Option<&Value> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.data.get(row * self.width + col)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.data.iter()
    }

    /// Collapses a 1x1 range to its sole scalar, used when a formula in
    /// scalar position receives a range result it must narrow.
    pub fn as_scalar(&self) -> Option<&Value> {
        if self.width == 1 && self.height == 1 {
            self.data.first()
        } else {
            None
        }
    }
}

/// The scalar sum type every cell, literal, and evaluated expression
/// produces (§3.1).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Value {
    /// Absence of a value, distinct from zero, empty string, or false.
    Empty,
    Number(RichNumber),
    String(String),
    Bool(bool),
    Error(CellError),
    Range(SimpleRangeValue),
}

impl Value {
    pub fn number(n: impl Into<RichNumber>) -> Self {
        Value::Number(n.into())
    }

    /// Builds a plain scalar. `Raw(NaN)`/`Raw(±∞)` must never be stored as
    /// a cell value (§3.2); a non-finite input becomes `#NUM!` here rather
    /// than resting on every call site to pre-check.
    pub fn raw(v: f64) -> Self {
        if v.is_finite() {
            Value::Number(RichNumber::Raw(v))
        } else {
            Value::error(crate::error::ErrorKind::Num)
        }
    }

    pub fn error(kind: crate::error::ErrorKind) -> Self {
        Value::Error(CellError::new(kind))
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Empty => "Empty",
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::Bool(_) => "Bool",
            Value::Error(_) => "Error",
            Value::Range(_) => "Range",
        }
    }

    pub fn detailed_type_of(&self) -> &'static str {
        match self {
            Value::Number(n) => n.detailed_type_name(),
            other => other.type_of(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Narrows a 1x1 range to its scalar, leaving everything else
    /// untouched (§4.4 step 2: a `CellReference` that resolves to a range
    /// is a `Value` error, but functions receiving range arguments often
    /// want this narrowing instead).
    pub fn narrow_scalar(self) -> Value {
        match &self {
            Value::Range(r) => r.as_scalar().cloned().unwrap_or(self),
            _ => self,
        }
    }
}

impl From<f64> for RichNumber {
    fn from(v: f64) -> Self {
        RichNumber::Raw(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => write!(f, ""),
            Value::Number(n) => write!(f, "{}", n.representative()),
            Value::String(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Value::Error(e) => write!(f, "{e}"),
            Value::Range(_) => write!(f, "#RANGE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn empty_is_distinct_from_zero_and_false() {
        assert_ne!(Value::Empty, Value::raw(0.0));
        assert_ne!(Value::Empty, Value::Bool(false));
        assert_ne!(Value::Empty, Value::String(String::new()));
    }

    #[test]
    fn narrow_scalar_unwraps_single_cell_range() {
        let r = Value::Range(SimpleRangeValue::new(1, 1, vec![Value::raw(42.0)]));
        assert_eq!(r.narrow_scalar(), Value::raw(42.0));
    }

    #[test]
    fn error_display_matches_excel_code() {
        let v = Value::error(ErrorKind::DivByZero);
        assert_eq!(v.to_string(), "#DIV/0!");
    }
}
