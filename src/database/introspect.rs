//! Instrumented schema and sample-row discovery.

use crate::config::ConnectionConfig;
use crate::database::Session;
use crate::otel::{db_span, record_db_metrics, DbOperation};
use crate::types::{Result, Row, TableSchema};
use tracing::Instrument;

/// Sample size when the caller does not ask for one.
pub const DEFAULT_SAMPLE_ROWS: usize = 5;

/// Largest sample a caller may request.
pub const MAX_SAMPLE_ROWS: usize = 100;

/// Sample size shown next to the schema overview.
pub const OVERVIEW_SAMPLE_ROWS: usize = 3;

/// Clamp a requested sample size to `[1, MAX_SAMPLE_ROWS]`.
pub fn clamp_sample_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_SAMPLE_ROWS).clamp(1, MAX_SAMPLE_ROWS)
}

/// Describe the configured table.
pub async fn describe_table(
    session: &mut dyn Session,
    config: &ConnectionConfig,
) -> Result<TableSchema> {
    let span = db_span(
        config.dialect().system_name(),
        DbOperation::Describe,
        &config.table_name(),
    );

    async move {
        let schema = session.table_schema().await?;
        tracing::debug!(columns = schema.columns.len(), "table described");
        Ok(schema)
    }
    .instrument(span)
    .await
}

/// Fetch a clamped number of sample rows.
pub async fn sample_table(
    session: &mut dyn Session,
    config: &ConnectionConfig,
    limit: Option<usize>,
) -> Result<Vec<Row>> {
    let limit = clamp_sample_limit(limit);
    let span = db_span(config.dialect().system_name(), DbOperation::Sample, &config.table_name());

    async move {
        let rows = session.sample_rows(limit).await?;
        record_db_metrics(rows.len());
        Ok(rows)
    }
    .instrument(span)
    .await
}
