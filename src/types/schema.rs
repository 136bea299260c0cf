//! Normalized table metadata.

use crate::types::value::{Row, ScalarKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider-agnostic column type vocabulary.
///
/// Prompt text only ever uses these tags, so the same question produces the same prompt
/// shape for Postgres and BigQuery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Date,
    Other,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::Boolean => "BOOLEAN",
            Self::Timestamp => "TIMESTAMP",
            Self::Date => "DATE",
            Self::Other => "OTHER",
        }
    }

    /// Map a Postgres type name (`information_schema.data_type` or `pg_type.typname`).
    pub fn from_postgres(type_name: &str) -> Self {
        let normalized = type_name.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "bool" | "boolean" => Self::Boolean,
            "int2" | "int4" | "int8" | "smallint" | "integer" | "bigint" | "oid" => Self::Integer,
            "float4" | "float8" | "real" | "double precision" | "numeric" | "decimal"
            | "money" => Self::Float,
            "text" | "varchar" | "bpchar" | "char" | "name" | "character varying"
            | "character" | "citext" | "uuid" => Self::String,
            "date" => Self::Date,
            _ => {
                if normalized.starts_with("timestamp") || normalized.starts_with("time") {
                    Self::Timestamp
                } else if normalized.starts_with("int") || normalized.contains("serial") {
                    Self::Integer
                } else if normalized.starts_with("float") || normalized.starts_with("numeric") {
                    Self::Float
                } else if normalized.starts_with("varchar") || normalized.starts_with("character") {
                    Self::String
                } else {
                    Self::Other
                }
            }
        }
    }

    /// Map a BigQuery field type (legacy or standard SQL spelling).
    pub fn from_bigquery(type_name: &str) -> Self {
        match type_name.trim().to_ascii_uppercase().as_str() {
            "STRING" => Self::String,
            "INTEGER" | "INT64" => Self::Integer,
            "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" | "DECIMAL" | "BIGDECIMAL" => {
                Self::Float
            }
            "BOOLEAN" | "BOOL" => Self::Boolean,
            "TIMESTAMP" | "DATETIME" | "TIME" => Self::Timestamp,
            "DATE" => Self::Date,
            _ => Self::Other,
        }
    }

    /// Decoding hint for text-format cells of this type.
    pub fn scalar_kind(&self) -> ScalarKind {
        match self {
            Self::Integer => ScalarKind::Int,
            Self::Float => ScalarKind::Float,
            Self::Boolean => ScalarKind::Bool,
            _ => ScalarKind::Text,
        }
    }
}

impl ScalarKind {
    /// Decoding hint for a Postgres type name, keeping exact numerics apart from floats.
    pub fn for_postgres(type_name: &str) -> Self {
        let normalized = type_name.trim().to_ascii_lowercase();
        if normalized.starts_with("numeric") || normalized.starts_with("decimal") {
            Self::Decimal
        } else {
            ColumnType::from_postgres(&normalized).scalar_kind()
        }
    }

    /// Decoding hint for a BigQuery field type.
    pub fn for_bigquery(type_name: &str) -> Self {
        match type_name.trim().to_ascii_uppercase().as_str() {
            "NUMERIC" | "BIGNUMERIC" | "DECIMAL" | "BIGDECIMAL" => Self::Decimal,
            other => ColumnType::from_bigquery(other).scalar_kind(),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single column of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,

    #[serde(rename = "type")]
    pub column_type: ColumnType,

    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable,
        }
    }
}

/// Table metadata discovered from the live database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Qualified name (`schema.table` or `project.dataset.table`)
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Columns in ordinal order
    pub columns: Vec<Column>,
}

/// Schema plus a few sample rows, as served by the schema endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaOverview {
    pub schema: TableSchema,
    pub sample_data: Vec<Row>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_type_mapping() {
        assert_eq!(ColumnType::from_postgres("integer"), ColumnType::Integer);
        assert_eq!(ColumnType::from_postgres("INT8"), ColumnType::Integer);
        assert_eq!(ColumnType::from_postgres("character varying"), ColumnType::String);
        assert_eq!(ColumnType::from_postgres("numeric"), ColumnType::Float);
        assert_eq!(
            ColumnType::from_postgres("timestamp with time zone"),
            ColumnType::Timestamp
        );
        assert_eq!(ColumnType::from_postgres("date"), ColumnType::Date);
        assert_eq!(ColumnType::from_postgres("jsonb"), ColumnType::Other);
    }

    #[test]
    fn test_bigquery_type_mapping() {
        assert_eq!(ColumnType::from_bigquery("INT64"), ColumnType::Integer);
        assert_eq!(ColumnType::from_bigquery("float"), ColumnType::Float);
        assert_eq!(ColumnType::from_bigquery("DATETIME"), ColumnType::Timestamp);
        assert_eq!(ColumnType::from_bigquery("RECORD"), ColumnType::Other);
    }

    #[test]
    fn test_exact_numerics_decode_as_decimal() {
        assert_eq!(ScalarKind::for_postgres("NUMERIC"), ScalarKind::Decimal);
        assert_eq!(ScalarKind::for_postgres("numeric(12,2)"), ScalarKind::Decimal);
        assert_eq!(ScalarKind::for_postgres("FLOAT8"), ScalarKind::Float);
        assert_eq!(ScalarKind::for_postgres("INT4"), ScalarKind::Int);
        assert_eq!(ScalarKind::for_bigquery("BIGNUMERIC"), ScalarKind::Decimal);
        assert_eq!(ScalarKind::for_bigquery("FLOAT64"), ScalarKind::Float);
        assert_eq!(ScalarKind::for_bigquery("STRING"), ScalarKind::Text);
    }

    #[test]
    fn test_column_serializes_type_tag() {
        let col = Column::new("id", ColumnType::Integer, false);
        let value = serde_json::to_value(&col).unwrap();
        assert_eq!(value["type"], "INTEGER");
        assert_eq!(value["nullable"], false);
    }
}
