//! Loosely typed cell values and result rows.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Single cell value as reported by the source database.
///
/// Serializes as a plain JSON scalar, so a row renders as `{"id": 1, "name": "a"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    /// Parse a text-format cell into the narrowest scalar the type tag allows.
    ///
    /// Falls back to `String` when the text does not parse, so no value is ever dropped.
    pub fn parse_as(text: &str, kind: ScalarKind) -> Self {
        match kind {
            ScalarKind::Bool => match text {
                "t" | "true" | "TRUE" | "True" => Self::Bool(true),
                "f" | "false" | "FALSE" | "False" => Self::Bool(false),
                _ => Self::String(text.to_string()),
            },
            ScalarKind::Int => text
                .parse::<i64>()
                .map(Self::Int)
                .unwrap_or_else(|_| Self::String(text.to_string())),
            ScalarKind::Float => match text.parse::<f64>() {
                Ok(v) if v.is_finite() => Self::Float(v),
                _ => Self::String(text.to_string()),
            },
            // exact numerics only become floats when no digit is lost
            ScalarKind::Decimal => match text.parse::<f64>() {
                Ok(v) if v.is_finite() && v.to_string() == normalize_decimal(text) => {
                    Self::Float(v)
                }
                _ => Self::String(text.to_string()),
            },
            ScalarKind::Text => Self::String(text.to_string()),
        }
    }

    /// Check for SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Canonical spelling of a plain decimal literal, comparable with `f64`'s `Display`.
fn normalize_decimal(text: &str) -> &str {
    let text = text.strip_prefix('+').unwrap_or(text);
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::String(v) => f.write_str(v),
        }
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Decoding hint derived from a provider column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    /// Exact numeric (NUMERIC, DECIMAL, BIGNUMERIC)
    Decimal,
    Text,
}

/// One result row: ordered `(column, value)` pairs.
///
/// Order follows the statement's result metadata. Serialized as a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, Scalar)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: Vec::with_capacity(capacity),
        }
    }

    /// Append a cell.
    pub fn push(&mut self, column: impl Into<String>, value: Scalar) {
        self.cells.push((column.into(), value));
    }

    /// Get the first cell with this column name.
    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl FromIterator<(String, Scalar)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Scalar)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, value) in &self.cells {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Rows plus column names as returned by one database round trip.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    /// Column names from the result metadata
    pub columns: Vec<String>,

    /// Decoded rows, at most the requested cap
    pub rows: Vec<Row>,

    /// Whether the source had more rows than were fetched
    pub truncated: bool,
}
