//! Runs validated SQL and shapes the result.

use crate::config::ConnectionConfig;
use crate::database::Session;
use crate::otel::{db_query_span, record_db_metrics};
use crate::types::{QueryResult, Result};
use std::time::Instant;
use tracing::Instrument;

/// Row cap used when none is given.
pub const DEFAULT_MAX_RESULTS: usize = 100;

/// Hard ceiling for any row cap.
pub const MAX_RESULTS_LIMIT: usize = 10_000;

/// Clamp a requested row cap to `[1, MAX_RESULTS_LIMIT]`.
pub fn clamp_max_results(max_results: Option<usize>) -> usize {
    max_results
        .unwrap_or(DEFAULT_MAX_RESULTS)
        .clamp(1, MAX_RESULTS_LIMIT)
}

/// Execute `sql` on an open session.
///
/// `sql` must already have passed [`crate::query::validate`]. The timer covers the
/// database round trip only. Provider messages are scrubbed of the config's secrets.
///
/// # Errors
///
/// Returns `ChatError::Execution` if the database rejects the statement
pub async fn execute(
    session: &mut dyn Session,
    config: &ConnectionConfig,
    sql: &str,
    max_results: usize,
) -> Result<QueryResult> {
    let span = db_query_span(config.dialect().system_name(), sql, &config.table_name());

    async move {
        let started = Instant::now();
        let set = session
            .run_query(sql, max_results)
            .await
            .map_err(|e| e.redacted(&config.secrets()))?;
        let elapsed = started.elapsed();

        record_db_metrics(set.rows.len());
        tracing::info!(
            rows = set.rows.len(),
            truncated = set.truncated,
            elapsed_ms = elapsed.as_millis() as u64,
            "query executed"
        );

        Ok(QueryResult {
            sql: sql.to_string(),
            column_names: set.columns,
            row_count: set.rows.len(),
            rows: set.rows,
            execution_time_seconds: elapsed.as_secs_f64(),
            truncated: set.truncated,
        })
    }
    .instrument(span)
    .await
}
