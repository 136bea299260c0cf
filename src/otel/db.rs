//! Database operation instrumentation.
//!
//! Implements OpenTelemetry semantic conventions for client database calls against
//! PostgreSQL and BigQuery.

use tracing::{field, span, Level, Span};

/// Database operation types (maps to `db.operation.name`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbOperation {
    /// Column metadata lookup
    Describe,
    /// Bounded `SELECT *` for sample rows
    Sample,
    /// Validated caller-facing query
    Query,
}

impl DbOperation {
    /// Get operation name as string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Describe => "describe",
            Self::Sample => "sample",
            Self::Query => "query",
        }
    }
}

/// Create database operation span with semantic conventions.
///
/// # Arguments
///
/// * `system` - `db.system.name` (`postgresql` or `bigquery`)
/// * `operation` - Database operation type
/// * `collection` - Qualified table name
///
/// # Returns
///
/// Tracing span with OpenTelemetry semantic attributes
///
/// # Example
///
/// ```rust,ignore
/// let span = db_span("postgresql", DbOperation::Describe, "public.orders");
/// let schema = session.table_schema().instrument(span).await?;
/// ```
pub fn db_span(system: &'static str, operation: DbOperation, collection: &str) -> Span {
    span!(
        Level::INFO,
        "db",
        otel.name = %format!("{} {}", operation.as_str(), collection),
        otel.kind = "client",
        db.system.name = system,
        db.operation.name = operation.as_str(),
        db.collection.name = collection,
        db.response.returned_rows = field::Empty,
    )
}

/// Create database query span for caller SQL.
///
/// # Arguments
///
/// * `system` - `db.system.name`
/// * `query_text` - SQL text that passed the guard
/// * `collection` - Qualified table name
pub fn db_query_span(system: &'static str, query_text: &str, collection: &str) -> Span {
    let operation = DbOperation::Query;
    span!(
        Level::INFO,
        "db.query",
        otel.name = %format!("{} {}", operation.as_str(), collection),
        otel.kind = "client",
        db.system.name = system,
        db.operation.name = operation.as_str(),
        db.collection.name = collection,
        db.query.text = query_text,
        db.response.returned_rows = field::Empty,
    )
}

/// Record row count on the current span.
pub fn record_db_metrics(rows_returned: usize) {
    Span::current().record("db.response.returned_rows", rows_returned);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_operation_names() {
        assert_eq!(DbOperation::Describe.as_str(), "describe");
        assert_eq!(DbOperation::Sample.as_str(), "sample");
        assert_eq!(DbOperation::Query.as_str(), "query");
    }

    #[test]
    fn test_query_span_uses_query_operation() {
        let subscriber = tracing_subscriber::registry();
        tracing::subscriber::with_default(subscriber, || {
            let span = db_query_span("postgresql", "SELECT 1", "public.t");
            let fields = span.metadata().expect("span enabled").fields();
            assert!(fields.field("db.operation.name").is_some());
            assert!(fields.field("db.query.text").is_some());
        });
    }
}
