//! Column types and typed values
//!
//! Widths are fixed per type so that a schema has a fixed tuple size and a
//! page holds a fixed number of tuples.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::{RecordError, RecordResult};

/// Width in bytes of an `Int` column
pub const INT_WIDTH: usize = 4;
/// Width in bytes of a `Real` column
pub const REAL_WIDTH: usize = 8;

/// Column data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 32-bit signed integer
    Int,
    /// 64-bit float
    Real,
    /// Fixed-width text column; the width is the declared byte size
    Text(usize),
}

impl DataType {
    /// Returns the fixed byte width used for page capacity accounting
    pub fn width(&self) -> usize {
        match self {
            DataType::Int => INT_WIDTH,
            DataType::Real => REAL_WIDTH,
            DataType::Text(width) => *width,
        }
    }

    /// Returns whether `value` can be stored in a column of this type
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (DataType::Int, Value::Int(_))
                | (DataType::Real, Value::Real(_))
                | (DataType::Text(_), Value::Text(_))
        )
    }

    /// Returns whether values of the two types can compare equal.
    ///
    /// Text widths may differ; int and real never match.
    pub fn comparable_with(&self, other: &DataType) -> bool {
        matches!(
            (self, other),
            (DataType::Int, DataType::Int)
                | (DataType::Real, DataType::Real)
                | (DataType::Text(_), DataType::Text(_))
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "int"),
            DataType::Real => write!(f, "real"),
            DataType::Text(width) => write!(f, "text({})", width),
        }
    }
}

impl FromStr for DataType {
    type Err = RecordError;

    /// Parses `int`, `real` or `text(<width>)`
    fn from_str(s: &str) -> RecordResult<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "int" | "integer" => return Ok(DataType::Int),
            "real" | "float" => return Ok(DataType::Real),
            _ => {}
        }

        let width = lowered
            .strip_prefix("text(")
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(|w| w.trim().parse::<usize>().ok())
            .filter(|w| *w > 0)
            .ok_or_else(|| RecordError::UnknownType(s.to_string()))?;

        Ok(DataType::Text(width))
    }
}

/// A single typed value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Int(i32),
    Real(f64),
    Text(String),
}

impl Value {
    /// Total order over values.
    ///
    /// Values of different types order by type rank (int < real < text);
    /// reals use IEEE total ordering so every pair is comparable.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Real(a), Value::Real(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Int(_) => 0,
            Value::Real(_) => 1,
            Value::Text(_) => 2,
        }
    }

    /// Converts a JSON literal into a value of the given column type
    pub fn from_json(json: &serde_json::Value, data_type: DataType) -> RecordResult<Value> {
        let mismatch = || RecordError::TypeMismatch {
            expected: data_type.to_string(),
            value: json.to_string(),
        };

        match data_type {
            DataType::Int => json
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .map(Value::Int)
                .ok_or_else(mismatch),
            DataType::Real => json.as_f64().map(Value::Real).ok_or_else(mismatch),
            DataType::Text(width) => match json.as_str() {
                Some(s) if s.len() <= width => Ok(Value::Text(s.to_string())),
                _ => Err(mismatch()),
            },
        }
    }

    /// Converts the value into a JSON literal
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Real(f) => serde_json::Value::from(*f),
            Value::Text(s) => serde_json::Value::from(s.as_str()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Int(n) => n.hash(state),
            Value::Real(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Real(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}
