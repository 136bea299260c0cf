//! Database access behind two small async traits.
//!
//! A [`Connector`] opens one [`Session`] per pipeline call. The session owns the live
//! connection (Postgres) or bearer token (BigQuery) and is released when dropped, so every
//! exit path frees it. [`NativeConnector`] dispatches on the `db_type` of the config.
//!
//! # Example
//!
//! ```rust,ignore
//! let connector = NativeConnector::new(Duration::from_secs(30))?;
//! let mut session = connector.connect(&config).await?;
//! let schema = session.table_schema().await?;
//! let rows = session.run_query("SELECT COUNT(*) FROM \"public\".\"orders\"", 100).await?;
//! session.close().await?;
//! ```

pub mod bigquery;
pub mod introspect;
pub mod postgres;

pub use bigquery::{BigQuerySession, BIGQUERY_BASE_URL, GCE_METADATA_TOKEN_URL};
pub use introspect::{clamp_sample_limit, DEFAULT_SAMPLE_ROWS, MAX_SAMPLE_ROWS, OVERVIEW_SAMPLE_ROWS};
pub use postgres::PostgresSession;

use crate::config::ConnectionConfig;
use crate::types::{ChatError, Result, Row, RowSet, TableSchema};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Scoped connection to one table.
#[async_trait]
pub trait Session: Send {
    /// Describe the configured table from live metadata.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Connection` if the table is missing or metadata cannot be read
    async fn table_schema(&mut self) -> Result<TableSchema>;

    /// Fetch up to `limit` rows of the configured table.
    async fn sample_rows(&mut self, limit: usize) -> Result<Vec<Row>>;

    /// Run a validated statement and keep at most `max_rows` rows.
    ///
    /// `truncated` is set when the source produced more rows than `max_rows`.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Execution` if the database rejects the statement
    async fn run_query(&mut self, sql: &str, max_rows: usize) -> Result<RowSet>;

    /// Release the session explicitly.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Opens sessions from connection parameters.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Session>>;
}

/// Connector for real PostgreSQL servers and the BigQuery REST API.
#[derive(Debug, Clone)]
pub struct NativeConnector {
    http: Client,
    statement_timeout: Duration,
    bigquery_base_url: String,
    metadata_token_url: String,
}

impl NativeConnector {
    /// Create a connector.
    ///
    /// # Arguments
    ///
    /// * `statement_timeout` - Server-side statement timeout for Postgres and the BigQuery
    ///   job wait per poll
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Config` if the HTTP client cannot be built
    pub fn new(statement_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(statement_timeout + Duration::from_secs(5))
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            statement_timeout,
            bigquery_base_url: BIGQUERY_BASE_URL.to_string(),
            metadata_token_url: GCE_METADATA_TOKEN_URL.to_string(),
        })
    }

    /// Point BigQuery calls at another base URL (emulators, tests).
    pub fn with_bigquery_base_url(mut self, url: impl Into<String>) -> Self {
        self.bigquery_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Point metadata-server token lookups at another URL.
    pub fn with_metadata_token_url(mut self, url: impl Into<String>) -> Self {
        self.metadata_token_url = url.into();
        self
    }
}

#[async_trait]
impl Connector for NativeConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Session>> {
        match config {
            ConnectionConfig::Postgres(pg) => {
                let session = PostgresSession::connect(pg, self.statement_timeout).await?;
                Ok(Box::new(session))
            }
            ConnectionConfig::Bigquery(bq) => {
                let session = BigQuerySession::connect(
                    self.http.clone(),
                    &self.bigquery_base_url,
                    &self.metadata_token_url,
                    bq,
                    self.statement_timeout,
                )
                .await?;
                Ok(Box::new(session))
            }
        }
    }
}
