//! OpenTelemetry instrumentation.
//!
//! Follows OpenTelemetry semantic conventions:
//! - https://opentelemetry.io/docs/specs/semconv/database/database-spans/
//! - https://opentelemetry.io/docs/specs/semconv/gen-ai/gen-ai-spans/
//!
//! # Database Semantic Conventions
//!
//! **Span naming**: `{db.operation.name} {target}`
//! - Example: `describe public.orders`, `query acme.sales.orders`
//!
//! **Attributes**:
//! - `db.system.name`: `"postgresql"` or `"bigquery"`
//! - `db.collection.name`: qualified table name
//! - `db.query.text`: validated SQL (never the credentials)
//! - `db.response.returned_rows`: rows kept after the cap
//!
//! # LLM Conventions
//!
//! - `gen_ai.system`, `gen_ai.request.model`, `gen_ai.request.temperature`
//! - `gen_ai.usage.input_tokens`, `gen_ai.usage.output_tokens`
//!
//! # Example
//!
//! ```rust,ignore
//! use sql_chat::otel::{db_query_span, record_db_metrics};
//!
//! let span = db_query_span("postgresql", &sql, "public.orders");
//! let rows = session.run_query(&sql, 100).instrument(span).await?;
//! ```

pub mod db;
pub mod init;
pub mod llm;

pub use db::{db_query_span, db_span, record_db_metrics, DbOperation};
pub use init::{init_tracing, OtelGuard};
pub use llm::{llm_span, record_llm_usage};
