//! Typed request/response shapes and framework-independent handlers.
//!
//! Each `handle_*` function takes the orchestrator plus already-parsed input and returns
//! either a serializable response or an [`ApiError`] carrying the HTTP status. The axum
//! adapter in [`server`] only extracts input and renders output.

pub mod server;

pub use server::{router, serve};

use crate::chat::SqlChat;
use crate::config::ConnectionConfig;
use crate::types::{ChatError, Row, SchemaOverview};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Number of suggestions when the caller does not pass `n`.
pub const DEFAULT_SUGGESTIONS: usize = 3;

/// Body of `POST /query`: connection fields plus the question.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub config: ConnectionConfig,
    pub question: String,
    pub context: Option<String>,
    pub max_results: Option<usize>,
}

impl QueryRequest {
    /// Split a flat JSON object into connection config and question fields.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::InvalidRequest` for a non-object body, a missing or blank
    /// question, a malformed `max_results` or an invalid connection config
    pub fn from_json(value: JsonValue) -> Result<Self, ChatError> {
        let JsonValue::Object(mut map) = value else {
            return Err(ChatError::invalid("request body must be a JSON object"));
        };

        let question = match map.remove("question") {
            Some(JsonValue::String(q)) if !q.trim().is_empty() => q,
            Some(JsonValue::String(_)) | Some(JsonValue::Null) | None => {
                return Err(ChatError::invalid("question is required"))
            }
            Some(_) => return Err(ChatError::invalid("question must be a string")),
        };

        let context = match map.remove("context") {
            Some(JsonValue::String(c)) => Some(c),
            Some(JsonValue::Null) | None => None,
            Some(_) => return Err(ChatError::invalid("context must be a string")),
        };

        let max_results = match map.remove("max_results") {
            Some(JsonValue::Null) | None => None,
            Some(v) => Some(
                v.as_u64()
                    .map(|n| n as usize)
                    .ok_or_else(|| ChatError::invalid("max_results must be a non-negative integer"))?,
            ),
        };

        let config = ConnectionConfig::from_json(JsonValue::Object(map))?;

        Ok(Self {
            config,
            question,
            context,
            max_results,
        })
    }
}

/// Body of a successful `POST /query`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub question: String,
    pub generated_sql: String,
    pub results: Vec<Row>,
    pub column_names: Vec<String>,

    /// Database round trip in seconds
    pub execution_time: f64,

    pub row_count: usize,
    pub truncated: bool,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Error body returned for every failure.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<&'static str>,

    /// Rejected SQL, for unsafe-query failures only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_sql: Option<String>,
}

/// Failure with its HTTP status.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: u16,
    pub body: ErrorBody,
}

impl ApiError {
    /// HTTP status for each error kind.
    pub fn status_for(err: &ChatError) -> u16 {
        match err {
            ChatError::InvalidRequest(_) => 400,
            ChatError::Generation(_) | ChatError::UnsafeQuery { .. } | ChatError::Execution(_) => 422,
            ChatError::Connection { .. } => 502,
            ChatError::Timeout { .. } => 504,
            ChatError::Config(_) => 500,
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        let status = Self::status_for(&err);
        if status >= 500 {
            tracing::error!(status, error = %err, "request failed");
        } else {
            tracing::info!(status, error = %err, "request rejected");
        }

        let generated_sql = match &err {
            ChatError::UnsafeQuery { sql, .. } => Some(sql.clone()),
            _ => None,
        };

        Self {
            status,
            body: ErrorBody {
                error: err.to_string(),
                stage: err.stage().map(|s| s.as_str()),
                generated_sql,
            },
        }
    }
}

/// `POST /query`.
pub async fn handle_query(chat: &SqlChat, request: QueryRequest) -> Result<QueryResponse, ApiError> {
    let result = chat
        .answer(
            &request.config,
            &request.question,
            request.context.as_deref(),
            request.max_results,
        )
        .await?;

    Ok(QueryResponse {
        question: request.question,
        generated_sql: result.sql,
        results: result.rows,
        column_names: result.column_names,
        execution_time: result.execution_time_seconds,
        row_count: result.row_count,
        truncated: result.truncated,
    })
}

/// `GET|POST /schema`.
pub async fn handle_schema(chat: &SqlChat, config: &ConnectionConfig) -> Result<SchemaOverview, ApiError> {
    Ok(chat.schema_overview(config).await?)
}

/// `GET|POST /suggest-questions`.
pub async fn handle_suggest(
    chat: &SqlChat,
    config: &ConnectionConfig,
    n: Option<usize>,
) -> Result<Vec<String>, ApiError> {
    Ok(chat
        .suggest_questions(config, n.unwrap_or(DEFAULT_SUGGESTIONS))
        .await?)
}

/// `GET /health`.
pub fn handle_health() -> HealthResponse {
    HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    }
}
