//! axum adapter over the typed handlers.

use crate::api::{handle_health, handle_query, handle_schema, handle_suggest, ApiError, QueryRequest};
use crate::chat::SqlChat;
use crate::config::ConnectionConfig;
use crate::types::ChatError;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state
pub type AppState = Arc<SqlChat>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.body)).into_response()
    }
}

/// Parse a JSON body, mapping syntax errors to 400 rather than axum's default 422.
fn parse_body(body: &Bytes) -> Result<JsonValue, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::from(ChatError::invalid(format!("invalid JSON body: {}", e))))
}

/// Connection config from the JSON body when present, otherwise from the query string.
fn config_from(params: &HashMap<String, String>, body: &Bytes) -> Result<ConnectionConfig, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        let mut params = params.clone();
        params.remove("n");
        Ok(ConnectionConfig::from_params(&params)?)
    } else {
        Ok(ConnectionConfig::from_json(parse_body(body)?)?)
    }
}

fn parse_n(params: &HashMap<String, String>) -> Result<Option<usize>, ApiError> {
    params
        .get("n")
        .map(|n| {
            n.parse::<usize>()
                .map_err(|_| ApiError::from(ChatError::invalid(format!("n must be an integer, got {}", n))))
        })
        .transpose()
}

async fn schema(
    State(chat): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let config = config_from(&params, &body)?;
    let overview = handle_schema(&chat, &config).await?;
    Ok(Json(overview).into_response())
}

async fn suggest_questions(
    State(chat): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let n = parse_n(&params)?;
    let config = config_from(&params, &body)?;
    let questions = handle_suggest(&chat, &config, n).await?;
    Ok(Json(questions).into_response())
}

async fn query(State(chat): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let request = QueryRequest::from_json(parse_body(&body)?)?;
    let response = handle_query(&chat, request).await?;
    Ok(Json(response).into_response())
}

async fn health() -> Response {
    Json(handle_health()).into_response()
}

/// Build the router with permissive CORS and request tracing.
pub fn router(chat: AppState) -> Router {
    Router::new()
        .route("/schema", get(schema).post(schema))
        .route("/suggest-questions", get(suggest_questions).post(suggest_questions))
        .route("/query", post(query))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(chat)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

/// Serve the API until Ctrl-C.
pub async fn serve(chat: AppState, bind: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(address = %listener.local_addr()?, "sqlchat API listening");

    axum::serve(listener, router(chat))
        .with_graceful_shutdown(shutdown_signal())
        .await
}
