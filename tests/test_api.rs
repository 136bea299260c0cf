//! HTTP surface: routing, body parsing and status mapping.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use common::{chat_with, pg_config_json, FixtureConnector, StubLlm};
use serde_json::{json, Value};
use sql_chat::api::router;
use std::sync::Arc;
use tower::ServiceExt;

const PG_QUERY: &str = "db_type=postgres&host=localhost&database=shop&user=app&table=t";

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn app(connector: &FixtureConnector, llm_response: &str) -> axum::Router {
    router(Arc::new(chat_with(connector, Arc::new(StubLlm::new(llm_response)))))
}

fn query_body(question: &str) -> Value {
    let mut body = pg_config_json();
    body["question"] = json!(question);
    body
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(app(&FixtureConnector::new(1), ""), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_query_success() {
    let connector = FixtureConnector::new(7);
    let (status, body) = send(
        app(&connector, "SELECT COUNT(*) FROM t"),
        post_json("/query", &query_body("how many rows are there")),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["question"], "how many rows are there");
    assert_eq!(body["generated_sql"], "SELECT COUNT(*) FROM t");
    assert_eq!(body["column_names"], json!(["count"]));
    assert_eq!(body["results"], json!([{"count": 7}]));
    assert_eq!(body["row_count"], 1);
    assert_eq!(body["truncated"], false);
    assert!(body["execution_time"].is_number());
}

#[tokio::test]
async fn test_query_missing_question_is_400() {
    let connector = FixtureConnector::new(1);
    let (status, body) = send(app(&connector, "SELECT 1"), post_json("/query", &pg_config_json())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("question"));
    assert_eq!(connector.calls.connects(), 0);
}

#[tokio::test]
async fn test_malformed_json_is_400() {
    let request = Request::builder()
        .method("POST")
        .uri("/query")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(app(&FixtureConnector::new(1), ""), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unsafe_query_is_422_with_sql() {
    let connector = FixtureConnector::new(1);
    let (status, body) = send(
        app(&connector, "DROP TABLE t"),
        post_json("/query", &query_body("drop it")),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["generated_sql"], "DROP TABLE t");
    assert_eq!(body["stage"], "validation");
    assert_eq!(connector.calls.queries(), 0);
}

#[tokio::test]
async fn test_connection_failure_is_502() {
    let mut connector = FixtureConnector::new(1);
    connector.fail_connect = true;
    let (status, body) = send(
        app(&connector, "SELECT 1"),
        post_json("/query", &query_body("anything")),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["stage"], "introspection");
    assert!(!body["error"].as_str().unwrap().contains(common::PASSWORD));
}

#[tokio::test]
async fn test_schema_from_query_string() {
    let connector = FixtureConnector::new(10);
    let (status, body) = send(app(&connector, ""), get(&format!("/schema?{}", PG_QUERY))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["schema"]["name"], "public.t");
    assert_eq!(body["schema"]["columns"][0]["type"], "INTEGER");
    assert_eq!(body["sample_data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_schema_from_body() {
    let connector = FixtureConnector::new(2);
    let (status, body) = send(app(&connector, ""), post_json("/schema", &pg_config_json())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sample_data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_schema_bad_config_is_400() {
    let (status, _) = send(
        app(&FixtureConnector::new(1), ""),
        get("/schema?db_type=postgres&host=localhost"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_suggest_questions() {
    let connector = FixtureConnector::new(5);
    let (status, body) = send(
        app(&connector, "1. How many rows?\n2. Which names repeat?\n3. Largest id?"),
        get(&format!("/suggest-questions?n=2&{}", PG_QUERY)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["How many rows?", "Which names repeat?"]));
}

#[tokio::test]
async fn test_suggest_defaults_to_three() {
    let connector = FixtureConnector::new(5);
    let (status, body) = send(
        app(&connector, "a?\nb?\nc?\nd?"),
        post_json("/suggest-questions", &pg_config_json()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_suggest_out_of_range_is_400() {
    let (status, _) = send(
        app(&FixtureConnector::new(1), "q?"),
        get(&format!("/suggest-questions?n=50&{}", PG_QUERY)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
