//! BigQuery session over the REST v2 API.
//!
//! - Table metadata: `GET projects/{p}/datasets/{d}/tables/{t}`
//! - Queries: `POST projects/{p}/queries`, then `GET projects/{p}/queries/{job}` until the
//!   job completes
//!
//! Cells arrive as strings (`{"f": [{"v": "42"}]}`) and are decoded with the field type.
//! Timestamps are requested as int64 microseconds and rendered as RFC 3339.
//!
//! Bearer tokens come from, in order: an explicit `access_token`, a service-account key
//! exchanged through `gcp_auth`, or the metadata server of the machine we run on.

use crate::config::BigQueryConfig;
use crate::database::Session;
use crate::types::{
    ChatError, Column, ColumnType, Result, Row, RowSet, Scalar, ScalarKind, Stage, TableSchema,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

/// Public BigQuery REST endpoint.
pub const BIGQUERY_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// GCE / Cloud Run metadata server token endpoint.
pub const GCE_METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// OAuth scope requested for service-account tokens.
pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

/// Pause between job polls when the server returns before the wait elapses.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct TableResource {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    schema: Option<FieldList>,
}

#[derive(Debug, Default, Deserialize)]
struct FieldList {
    #[serde(default)]
    fields: Vec<Field>,
}

#[derive(Debug, Deserialize)]
struct Field {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    schema: Option<FieldList>,
    #[serde(default)]
    rows: Vec<TableRow>,
    #[serde(default)]
    total_rows: Option<String>,
    #[serde(default)]
    page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: JsonValue,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Authenticated handle on one BigQuery table.
pub struct BigQuerySession {
    http: Client,
    base_url: String,
    token: String,
    config: BigQueryConfig,
    job_wait: Duration,
}

impl BigQuerySession {
    /// Resolve a bearer token and build the session.
    ///
    /// # Errors
    ///
    /// - `ChatError::InvalidRequest` if the service-account key cannot be loaded
    /// - `ChatError::Connection` if no token can be obtained
    pub async fn connect(
        http: Client,
        base_url: &str,
        metadata_token_url: &str,
        config: &BigQueryConfig,
        job_wait: Duration,
    ) -> Result<Self> {
        let token = match config.access_token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => token.to_string(),
            None => match config.service_account_key()? {
                Some(key) => service_account_token(&JsonValue::Object(key).to_string()).await?,
                None => fetch_metadata_token(&http, metadata_token_url).await?,
            },
        };

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            config: config.clone(),
            job_wait,
        })
    }

    fn qualified_name(&self) -> String {
        format!(
            "{}.{}.{}",
            self.config.project_id, self.config.dataset_id, self.config.table_id
        )
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        stage: Stage,
    ) -> Result<T> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ChatError::connection(stage, format!("BigQuery request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ChatError::connection(stage, format!("BigQuery response failed: {}", e)))?;

        if !status.is_success() {
            return Err(status_error(status, &body, stage));
        }

        serde_json::from_str(&body).map_err(|e| {
            ChatError::connection(stage, format!("unexpected BigQuery response: {}", e))
        })
    }

    /// Run a query, wait for the job, then follow pages until the cap is covered.
    async fn query(&self, sql: &str, max_rows: usize, stage: Stage) -> Result<RowSet> {
        let page_size = max_rows.saturating_add(1);

        let mut body = json!({
            "query": sql,
            "useLegacySql": false,
            "maxResults": page_size,
            "timeoutMs": self.job_wait.as_millis() as u64,
            "formatOptions": {"useInt64Timestamp": true}
        });
        if let Some(location) = &self.config.location {
            body["location"] = json!(location);
        }

        let url = format!("{}/projects/{}/queries", self.base_url, self.config.project_id);
        let mut response: QueryResponse = self
            .send_json(self.http.post(&url).json(&body), stage)
            .await?;

        while !response.job_complete {
            let job = job_reference(&response, stage)?;
            tracing::debug!(job_id = %job.job_id, "waiting for BigQuery job");
            tokio::time::sleep(POLL_INTERVAL).await;
            response = self.query_results(job, page_size, None, stage).await?;
        }

        // a page holds at most ~10 MB, so wide rows can arrive short of the cap
        while response.rows.len() < page_size {
            let Some(token) = response.page_token.take() else {
                break;
            };
            let job = job_reference(&response, stage)?;
            let remaining = page_size - response.rows.len();
            tracing::debug!(job_id = %job.job_id, remaining, "fetching next BigQuery page");

            let page = self.query_results(job, remaining, Some(&token), stage).await?;
            if page.rows.is_empty() {
                break;
            }
            response.rows.extend(page.rows);
            response.page_token = page.page_token;
        }

        decode_response(response, max_rows)
    }

    /// `GET projects/{p}/queries/{job}`, optionally from a page token.
    async fn query_results(
        &self,
        job: JobReference,
        max_results: usize,
        page_token: Option<&str>,
        stage: Stage,
    ) -> Result<QueryResponse> {
        let url = format!(
            "{}/projects/{}/queries/{}",
            self.base_url, self.config.project_id, job.job_id
        );
        let mut params: Vec<(&str, String)> = vec![
            ("maxResults", max_results.to_string()),
            ("timeoutMs", self.job_wait.as_millis().to_string()),
            ("formatOptions.useInt64Timestamp", "true".to_string()),
        ];
        if let Some(location) = job.location.clone().or_else(|| self.config.location.clone()) {
            params.push(("location", location));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let mut response: QueryResponse =
            self.send_json(self.http.get(&url).query(&params), stage).await?;
        // result pages may omit the reference; later pages still need it
        if response.job_reference.is_none() {
            response.job_reference = Some(job);
        }
        Ok(response)
    }
}

fn job_reference(response: &QueryResponse, stage: Stage) -> Result<JobReference> {
    response.job_reference.clone().ok_or_else(|| {
        ChatError::connection(stage, "BigQuery returned an incomplete job without a reference")
    })
}

/// Exchange a service-account key for a BigQuery-scoped bearer token.
async fn service_account_token(key_json: &str) -> Result<String> {
    let account = CustomServiceAccount::from_json(key_json).map_err(|e| {
        ChatError::invalid(format!("invalid BigQuery service-account key: {}", e))
    })?;

    let token = account.token(&[BIGQUERY_SCOPE]).await.map_err(|e| {
        ChatError::connection(
            Stage::Introspection,
            format!("service-account token exchange failed: {}", e),
        )
    })?;
    Ok(token.as_str().to_string())
}

async fn fetch_metadata_token(http: &Client, url: &str) -> Result<String> {
    let response = http
        .get(url)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|e| {
            ChatError::connection(
                Stage::Introspection,
                format!("no BigQuery access_token given and metadata server unreachable: {}", e),
            )
        })?;

    if !response.status().is_success() {
        return Err(ChatError::connection(
            Stage::Introspection,
            format!("metadata server refused token request: {}", response.status()),
        ));
    }

    let token: MetadataToken = response.json().await.map_err(|e| {
        ChatError::connection(Stage::Introspection, format!("invalid metadata token: {}", e))
    })?;
    Ok(token.access_token)
}

/// Map a non-2xx response.
///
/// While executing caller SQL, a 400 (bad SQL) or 404 (unknown table named in the SQL) is
/// a rejected statement. Otherwise auth and missing resources are connection errors.
fn status_error(status: StatusCode, body: &str, stage: Stage) -> ChatError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| status.canonical_reason().unwrap_or("error").to_string());

    match status {
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND if stage == Stage::Execution => {
            ChatError::Execution(message)
        }
        StatusCode::NOT_FOUND => ChatError::connection(stage, format!("not found: {}", message)),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ChatError::connection(stage, format!("access denied: {}", message))
        }
        _ if stage == Stage::Execution => {
            ChatError::Execution(format!("BigQuery error {}: {}", status.as_u16(), message))
        }
        _ => ChatError::connection(stage, format!("BigQuery error {}: {}", status.as_u16(), message)),
    }
}

fn table_schema_from(name: String, resource: TableResource) -> Result<TableSchema> {
    let fields = resource.schema.unwrap_or_default().fields;
    if fields.is_empty() {
        return Err(ChatError::connection(
            Stage::Introspection,
            format!("table {} has no columns", name),
        ));
    }

    let columns = fields
        .into_iter()
        .map(|f| {
            let nullable = f.mode.as_deref().map(|m| m != "REQUIRED").unwrap_or(true);
            Column::new(f.name, ColumnType::from_bigquery(&f.field_type), nullable)
        })
        .collect();

    Ok(TableSchema {
        name,
        description: resource.description.filter(|d| !d.is_empty()),
        columns,
    })
}

fn decode_cell(value: JsonValue, field_type: &str) -> Scalar {
    match value {
        JsonValue::Null => Scalar::Null,
        JsonValue::String(text) if field_type.eq_ignore_ascii_case("TIMESTAMP") => text
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_micros)
            .map(|ts| Scalar::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
            .unwrap_or(Scalar::String(text)),
        JsonValue::String(text) => {
            Scalar::parse_as(&text, ScalarKind::for_bigquery(field_type))
        }
        JsonValue::Bool(b) => Scalar::Bool(b),
        // REPEATED and RECORD cells stay as their JSON text
        other => Scalar::String(other.to_string()),
    }
}

fn decode_response(response: QueryResponse, max_rows: usize) -> Result<RowSet> {
    let fields = response.schema.unwrap_or_default().fields;
    let columns: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();

    let total_rows = response
        .total_rows
        .as_deref()
        .and_then(|t| t.parse::<u64>().ok())
        .unwrap_or(response.rows.len() as u64);
    let truncated = response.rows.len() > max_rows || total_rows > max_rows as u64;

    let rows = response
        .rows
        .into_iter()
        .take(max_rows)
        .map(|row| {
            row.f
                .into_iter()
                .zip(fields.iter())
                .map(|(cell, field)| (field.name.clone(), decode_cell(cell.v, &field.field_type)))
                .collect::<Row>()
        })
        .collect();

    Ok(RowSet {
        columns,
        rows,
        truncated,
    })
}

#[async_trait]
impl Session for BigQuerySession {
    async fn table_schema(&mut self) -> Result<TableSchema> {
        let url = format!(
            "{}/projects/{}/datasets/{}/tables/{}",
            self.base_url, self.config.project_id, self.config.dataset_id, self.config.table_id
        );
        let resource: TableResource = self
            .send_json(self.http.get(&url), Stage::Introspection)
            .await?;
        table_schema_from(self.qualified_name(), resource)
    }

    async fn sample_rows(&mut self, limit: usize) -> Result<Vec<Row>> {
        let sql = format!("SELECT * FROM `{}` LIMIT {}", self.qualified_name(), limit);
        Ok(self.query(&sql, limit, Stage::Introspection).await?.rows)
    }

    async fn run_query(&mut self, sql: &str, max_rows: usize) -> Result<RowSet> {
        self.query(sql, max_rows, Stage::Execution).await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_schema_from_resource() {
        let resource: TableResource = serde_json::from_value(json!({
            "description": "Orders table",
            "schema": {"fields": [
                {"name": "id", "type": "INTEGER", "mode": "REQUIRED"},
                {"name": "amount", "type": "NUMERIC", "mode": "NULLABLE"},
                {"name": "created_at", "type": "TIMESTAMP"},
                {"name": "tags", "type": "STRING", "mode": "REPEATED"}
            ]}
        }))
        .unwrap();

        let schema = table_schema_from("acme.sales.orders".into(), resource).unwrap();
        assert_eq!(schema.name, "acme.sales.orders");
        assert_eq!(schema.description.as_deref(), Some("Orders table"));
        assert_eq!(schema.columns.len(), 4);
        assert!(!schema.columns[0].nullable);
        assert_eq!(schema.columns[1].column_type, ColumnType::Float);
        assert!(schema.columns[2].nullable);
    }

    #[test]
    fn test_empty_schema_is_connection_error() {
        let resource: TableResource = serde_json::from_value(json!({})).unwrap();
        let err = table_schema_from("a.b.c".into(), resource).unwrap_err();
        assert!(matches!(err, ChatError::Connection { .. }));
    }

    #[test]
    fn test_decode_response_truncates() {
        let response: QueryResponse = serde_json::from_value(json!({
            "jobComplete": true,
            "schema": {"fields": [
                {"name": "id", "type": "INT64"},
                {"name": "ok", "type": "BOOL"},
                {"name": "at", "type": "TIMESTAMP"}
            ]},
            "rows": [
                {"f": [{"v": "1"}, {"v": "true"}, {"v": "1700000000000000"}]},
                {"f": [{"v": "2"}, {"v": null}, {"v": null}]},
                {"f": [{"v": "3"}, {"v": "false"}, {"v": null}]}
            ],
            "totalRows": "3"
        }))
        .unwrap();

        let set = decode_response(response, 2).unwrap();
        assert_eq!(set.columns, vec!["id", "ok", "at"]);
        assert_eq!(set.rows.len(), 2);
        assert!(set.truncated);
        assert_eq!(set.rows[0].get("id"), Some(&Scalar::Int(1)));
        assert_eq!(set.rows[0].get("ok"), Some(&Scalar::Bool(true)));
        assert_eq!(
            set.rows[0].get("at"),
            Some(&Scalar::String("2023-11-14T22:13:20Z".into()))
        );
        assert_eq!(set.rows[1].get("ok"), Some(&Scalar::Null));
    }

    #[test]
    fn test_status_error_mapping() {
        let body = r#"{"error": {"code": 400, "message": "Unrecognized name: foo"}}"#;
        match status_error(StatusCode::BAD_REQUEST, body, Stage::Execution) {
            ChatError::Execution(msg) => assert_eq!(msg, "Unrecognized name: foo"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "{}", Stage::Introspection),
            ChatError::Connection { .. }
        ));
    }

    #[test]
    fn test_unknown_table_in_sql_is_execution_error() {
        let body = r#"{"error": {"code": 404, "message": "Not found: Table acme:sales.ordrs was not found"}}"#;
        match status_error(StatusCode::NOT_FOUND, body, Stage::Execution) {
            ChatError::Execution(msg) => assert!(msg.contains("acme:sales.ordrs")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, body, Stage::Execution),
            ChatError::Connection { .. }
        ));
    }

    #[test]
    fn test_decode_exact_numeric_keeps_digits() {
        assert_eq!(decode_cell(json!("19.990"), "NUMERIC"), Scalar::Float(19.99));
        assert_eq!(
            decode_cell(json!("12345678901234567890.5"), "BIGNUMERIC"),
            Scalar::String("12345678901234567890.5".into())
        );
    }
}
