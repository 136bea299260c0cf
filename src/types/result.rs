//! Pipeline outputs.

use crate::types::value::Row;
use serde::Serialize;

/// SQL produced by the generator for one question. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedQuery {
    pub sql: String,
    pub source_question: String,
}

/// Executed query with normalized rows.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// Statement that was run
    pub sql: String,

    /// Column names from the statement's result metadata
    pub column_names: Vec<String>,

    pub rows: Vec<Row>,

    /// Always `rows.len()`
    pub row_count: usize,

    /// Database round trip only
    pub execution_time_seconds: f64,

    /// Whether rows beyond the cap were dropped
    pub truncated: bool,
}
