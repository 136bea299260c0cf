//! PostgreSQL session over a single `sqlx` connection.

use crate::config::{quote_pg_ident, PostgresConfig};
use crate::database::Session;
use crate::types::{
    ChatError, Column, ColumnType, Result, Row, RowSet, Scalar, ScalarKind, Stage, TableSchema,
};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow, PgSslMode};
use sqlx::{Column as _, Connection, Executor, Row as _, TypeInfo};
use std::time::Duration;

const COLUMNS_SQL: &str = "SELECT column_name::text, data_type::text, (is_nullable = 'YES') \
     FROM information_schema.columns \
     WHERE table_schema = $1 AND table_name = $2 \
     ORDER BY ordinal_position";

const DESCRIPTION_SQL: &str = "SELECT obj_description(to_regclass($1)::oid, 'pg_class')";

/// Map a driver error to the pipeline taxonomy.
///
/// Server-side rejections are query errors; transport failures are connection errors.
fn map_sqlx_error(err: sqlx::Error, stage: Stage) -> ChatError {
    match err {
        sqlx::Error::Database(db) if stage == Stage::Execution => {
            ChatError::Execution(db.message().to_string())
        }
        sqlx::Error::Database(db) => ChatError::connection(stage, db.message().to_string()),
        sqlx::Error::ColumnDecode { index, source } => {
            ChatError::Execution(format!("failed to decode column {}: {}", index, source))
        }
        other => ChatError::connection(stage, other.to_string()),
    }
}

/// Closing belongs to the session lifecycle, not to the statement that ran last.
fn close_error(err: sqlx::Error) -> ChatError {
    map_sqlx_error(err, Stage::Introspection)
}

fn ssl_mode(mode: Option<&str>) -> PgSslMode {
    match mode {
        Some("disable") => PgSslMode::Disable,
        Some("require") => PgSslMode::Require,
        _ => PgSslMode::Prefer,
    }
}

/// Open connection to one Postgres table.
pub struct PostgresSession {
    conn: PgConnection,
    schema: String,
    table: String,
}

impl PostgresSession {
    /// Connect and pin the session read-only.
    ///
    /// `default_transaction_read_only` makes the server refuse writes even if a statement
    /// slips past the guard. `statement_timeout` bounds each statement server-side.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Connection` if the server is unreachable or rejects the login
    pub async fn connect(config: &PostgresConfig, statement_timeout: Duration) -> Result<Self> {
        let opts = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(ssl_mode(config.ssl_mode.as_deref()))
            .application_name("sqlchat");

        let mut conn = PgConnection::connect_with(&opts)
            .await
            .map_err(|e| map_sqlx_error(e, Stage::Introspection))?;

        let setup = format!(
            "SET default_transaction_read_only = on; SET statement_timeout = {}",
            statement_timeout.as_millis()
        );
        conn.execute(setup.as_str())
            .await
            .map_err(|e| map_sqlx_error(e, Stage::Introspection))?;

        tracing::debug!(host = %config.host, database = %config.database, "postgres session opened");

        Ok(Self {
            conn,
            schema: config.schema.clone(),
            table: config.table.clone(),
        })
    }

    fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    fn table_ref(&self) -> String {
        format!("{}.{}", quote_pg_ident(&self.schema), quote_pg_ident(&self.table))
    }

    /// Run a statement over the simple protocol and decode text-format cells.
    ///
    /// Column metadata comes from a describe round trip so an empty result still
    /// reports its columns.
    async fn fetch_rows(&mut self, sql: &str, max_rows: usize, stage: Stage) -> Result<RowSet> {
        let describe = self
            .conn
            .describe(sql)
            .await
            .map_err(|e| map_sqlx_error(e, stage))?;

        let columns: Vec<String> = describe.columns().iter().map(|c| c.name().to_string()).collect();
        let kinds: Vec<_> = describe
            .columns()
            .iter()
            .map(|c| ScalarKind::for_postgres(c.type_info().name()))
            .collect();

        // a &str without arguments runs over the simple protocol, so cells arrive as text
        let stream = self.conn.fetch(sql).map_err(|e| map_sqlx_error(e, stage));
        let (rows, truncated) =
            take_capped(stream, max_rows, |row| decode_row(&row, &columns, &kinds)).await?;

        Ok(RowSet {
            columns,
            rows,
            truncated,
        })
    }
}

/// Pull rows until the stream ends or one row past `max_rows` shows there are more.
///
/// Returns the decoded rows (at most `max_rows`) and whether the result was cut short.
/// The stream is dropped at that point, so no more than `max_rows + 1` rows are read.
async fn take_capped<S, T, F>(
    mut stream: S,
    max_rows: usize,
    mut decode: F,
) -> Result<(Vec<Row>, bool)>
where
    S: Stream<Item = Result<T>> + Unpin,
    F: FnMut(T) -> Result<Row>,
{
    let mut rows = Vec::new();
    while let Some(item) = stream.try_next().await? {
        if rows.len() == max_rows {
            return Ok((rows, true));
        }
        rows.push(decode(item)?);
    }
    Ok((rows, false))
}

/// Decode one text-format cell; `None` is SQL NULL.
fn decode_text_cell(text: Option<String>, kind: Option<ScalarKind>) -> Scalar {
    match (text, kind) {
        (None, _) => Scalar::Null,
        (Some(t), Some(kind)) => Scalar::parse_as(&t, kind),
        (Some(t), None) => Scalar::String(t),
    }
}

fn decode_row(row: &PgRow, columns: &[String], kinds: &[ScalarKind]) -> Result<Row> {
    let mut out = Row::with_capacity(columns.len());
    for (idx, name) in columns.iter().enumerate() {
        let text: Option<String> = row
            .try_get_unchecked(idx)
            .map_err(|e| map_sqlx_error(e, Stage::Execution))?;
        out.push(name.clone(), decode_text_cell(text, kinds.get(idx).copied()));
    }
    Ok(out)
}

#[async_trait]
impl Session for PostgresSession {
    async fn table_schema(&mut self) -> Result<TableSchema> {
        let rows: Vec<(String, String, bool)> = sqlx::query_as(COLUMNS_SQL)
            .bind(&self.schema)
            .bind(&self.table)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| map_sqlx_error(e, Stage::Introspection))?;

        if rows.is_empty() {
            return Err(ChatError::connection(
                Stage::Introspection,
                format!("table {} not found or has no visible columns", self.qualified_name()),
            ));
        }

        let description: Option<String> = sqlx::query_scalar(DESCRIPTION_SQL)
            .bind(self.table_ref())
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| map_sqlx_error(e, Stage::Introspection))?;

        let columns = rows
            .into_iter()
            .map(|(name, data_type, nullable)| {
                Column::new(name, ColumnType::from_postgres(&data_type), nullable)
            })
            .collect();

        Ok(TableSchema {
            name: self.qualified_name(),
            description,
            columns,
        })
    }

    async fn sample_rows(&mut self, limit: usize) -> Result<Vec<Row>> {
        let sql = format!("SELECT * FROM {} LIMIT {}", self.table_ref(), limit);
        Ok(self.fetch_rows(&sql, limit, Stage::Introspection).await?.rows)
    }

    async fn run_query(&mut self, sql: &str, max_rows: usize) -> Result<RowSet> {
        self.fetch_rows(sql, max_rows, Stage::Execution).await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.conn.close().await.map_err(close_error)
    }
}
