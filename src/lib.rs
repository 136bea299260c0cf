//! SQL Chat - natural-language questions over a single database table
//!
//! Pipeline per question:
//! - Introspect the table (PostgreSQL via `sqlx`, BigQuery via REST)
//! - Build a schema-grounded prompt and ask a hosted LLM for SQL
//! - Reject anything that is not a single read-only SELECT
//! - Execute with a row cap and return normalized rows
//!
//! Can be used as:
//! - Library (`SqlChat` plus the `Connector` / `LlmClient` traits)
//! - HTTP service (`sqlchat serve`)
//! - CLI (`sqlchat ask`, `sqlchat schema`, ...)

pub mod api;
pub mod chat;
pub mod config;
pub mod database;
pub mod llm;
pub mod otel;
pub mod query;
pub mod types;

pub use chat::SqlChat;
pub use config::{ConnectionConfig, Settings};
pub use types::{ChatError, Result};
