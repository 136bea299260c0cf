//! Shared fixtures: an in-memory table behind `Connector` and a scripted LLM.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use sql_chat::config::{LlmSettings, Settings};
use sql_chat::database::{Connector, Session};
use sql_chat::llm::{LlmClient, LlmProvider};
use sql_chat::types::{
    ChatError, Column, ColumnType, Result, Row, RowSet, Scalar, Stage, TableSchema,
};
use sql_chat::{ConnectionConfig, SqlChat};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PASSWORD: &str = "fixture-s3cret";

/// Counters shared between a connector and the sessions it opens.
#[derive(Debug, Default)]
pub struct Calls {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub schema: AtomicUsize,
    pub samples: AtomicUsize,
    pub queries: AtomicUsize,
}

impl Calls {
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// In-memory table `{id INTEGER, name STRING}` with `row_total` rows.
#[derive(Clone)]
pub struct FixtureConnector {
    pub schema: TableSchema,
    pub row_total: usize,
    pub calls: Arc<Calls>,
    pub fail_connect: bool,
    /// When set, every `run_query` fails with this message
    pub query_error: Option<String>,
}

impl FixtureConnector {
    pub fn new(row_total: usize) -> Self {
        Self {
            schema: TableSchema {
                name: "public.t".to_string(),
                description: Some("Fixture table".to_string()),
                columns: vec![
                    Column::new("id", ColumnType::Integer, false),
                    Column::new("name", ColumnType::String, true),
                ],
            },
            row_total,
            calls: Arc::new(Calls::default()),
            fail_connect: false,
            query_error: None,
        }
    }
}

fn fixture_row(i: usize) -> Row {
    let mut row = Row::new();
    row.push("id", Scalar::Int(i as i64 + 1));
    row.push("name", Scalar::from(format!("row-{}", i + 1)));
    row
}

pub struct FixtureSession {
    connector: FixtureConnector,
}

#[async_trait]
impl Session for FixtureSession {
    async fn table_schema(&mut self) -> Result<TableSchema> {
        self.connector.calls.schema.fetch_add(1, Ordering::SeqCst);
        Ok(self.connector.schema.clone())
    }

    async fn sample_rows(&mut self, limit: usize) -> Result<Vec<Row>> {
        self.connector.calls.samples.fetch_add(1, Ordering::SeqCst);
        Ok((0..self.connector.row_total.min(limit)).map(fixture_row).collect())
    }

    async fn run_query(&mut self, sql: &str, max_rows: usize) -> Result<RowSet> {
        self.connector.calls.queries.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = &self.connector.query_error {
            return Err(ChatError::Execution(message.clone()));
        }

        if sql.to_ascii_uppercase().contains("COUNT(*)") {
            let mut row = Row::new();
            row.push("count", Scalar::Int(self.connector.row_total as i64));
            return Ok(RowSet {
                columns: vec!["count".to_string()],
                rows: vec![row],
                truncated: false,
            });
        }

        Ok(RowSet {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: (0..self.connector.row_total.min(max_rows)).map(fixture_row).collect(),
            truncated: self.connector.row_total > max_rows,
        })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.connector.calls.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Connector for FixtureConnector {
    async fn connect(&self, _config: &ConnectionConfig) -> Result<Box<dyn Session>> {
        self.calls.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(ChatError::connection(
                Stage::Introspection,
                format!("password authentication failed (password {})", PASSWORD),
            ));
        }
        Ok(Box::new(FixtureSession {
            connector: self.clone(),
        }))
    }
}

/// One recorded LLM call.
#[derive(Debug, Clone)]
pub struct LlmCall {
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

/// LLM that replays canned responses and records every call.
///
/// The last response repeats once the queue is down to one entry.
pub struct StubLlm {
    responses: Mutex<VecDeque<String>>,
    pub calls: Mutex<Vec<LlmCall>>,
    pub delay: Option<Duration>,
}

impl StubLlm {
    pub fn new(response: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from([response.to_string()])),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn slow(response: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(response)
        }
    }

    pub fn calls(&self) -> Vec<LlmCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for StubLlm {
    async fn chat_complete(&self, system: &str, user: &str, temperature: f32) -> Result<String> {
        self.calls.lock().unwrap().push(LlmCall {
            system: system.to_string(),
            user: user.to_string(),
            temperature,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut responses = self.responses.lock().unwrap();
        let response = if responses.len() > 1 {
            responses.pop_front().unwrap_or_default()
        } else {
            responses.front().cloned().unwrap_or_default()
        };
        Ok(response)
    }
}

pub fn test_settings() -> Settings {
    Settings {
        llm: LlmSettings {
            provider: LlmProvider::OpenAI,
            model: "stub-model".to_string(),
            api_key: "sk-test".to_string(),
            base_url: None,
            api_version: "2024-06-01".to_string(),
        },
        llm_timeout: Duration::from_secs(5),
        db_timeout: Duration::from_secs(5),
        max_results: 100,
        bind: "127.0.0.1:0".to_string(),
    }
}

pub fn pg_config_json() -> serde_json::Value {
    json!({
        "db_type": "postgres",
        "host": "localhost",
        "database": "shop",
        "user": "app",
        "password": PASSWORD,
        "table": "t"
    })
}

pub fn pg_config() -> ConnectionConfig {
    ConnectionConfig::from_json(pg_config_json()).unwrap()
}

/// Orchestrator over the given fixtures.
pub fn chat_with(connector: &FixtureConnector, llm: Arc<StubLlm>) -> SqlChat {
    SqlChat::new(test_settings(), llm, Arc::new(connector.clone()))
}
