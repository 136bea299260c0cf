//! Per-request database connection parameters.

use crate::types::{ChatError, Result};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;

fn default_port() -> u16 {
    5432
}

fn default_schema() -> String {
    "public".to_string()
}

/// SQL dialect spoken by the target database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Postgres,
    BigQuery,
}

impl SqlDialect {
    /// Name used in prompts.
    pub fn prompt_name(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::BigQuery => "BigQuery Standard SQL",
        }
    }

    /// Value for the `db.system.name` span attribute.
    pub fn system_name(&self) -> &'static str {
        match self {
            Self::Postgres => "postgresql",
            Self::BigQuery => "bigquery",
        }
    }
}

/// PostgreSQL connection parameters.
#[derive(Clone, Deserialize)]
pub struct PostgresConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub database: String,

    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_schema")]
    pub schema: String,

    pub table: String,

    /// `disable`, `prefer` or `require`
    #[serde(default)]
    pub ssl_mode: Option<String>,
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("schema", &self.schema)
            .field("table", &self.table)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// BigQuery connection parameters.
#[derive(Clone, Deserialize)]
pub struct BigQueryConfig {
    pub project_id: String,

    pub dataset_id: String,

    pub table_id: String,

    /// OAuth2 bearer token; when absent the GCE metadata server is asked for one
    #[serde(default)]
    pub access_token: Option<String>,

    /// Job location (e.g. `US`, `EU`)
    #[serde(default)]
    pub location: Option<String>,

    /// Service-account key, as a JSON object or its serialized text
    #[serde(default, alias = "credentials_json")]
    pub credentials: Option<JsonValue>,
}

impl BigQueryConfig {
    /// Service-account key as a JSON object, if one was given.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::InvalidRequest` if the key is neither an object nor JSON text of one
    pub fn service_account_key(&self) -> Result<Option<serde_json::Map<String, JsonValue>>> {
        let key = match &self.credentials {
            None | Some(JsonValue::Null) => return Ok(None),
            Some(JsonValue::String(text)) if text.trim().is_empty() => return Ok(None),
            Some(JsonValue::String(text)) => serde_json::from_str::<JsonValue>(text)
                .map_err(|_| ChatError::invalid("BigQuery credentials are not valid JSON"))?,
            Some(other) => other.clone(),
        };

        match key {
            JsonValue::Object(map) => Ok(Some(map)),
            _ => Err(ChatError::invalid(
                "BigQuery credentials must be a service-account key object",
            )),
        }
    }
}

impl fmt::Debug for BigQueryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigQueryConfig")
            .field("project_id", &self.project_id)
            .field("dataset_id", &self.dataset_id)
            .field("table_id", &self.table_id)
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .field("location", &self.location)
            .field("credentials", &self.credentials.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Connection parameters for one session, tagged by `db_type`.
///
/// ```json
/// {"db_type": "postgres", "host": "localhost", "database": "shop", "user": "app",
///  "password": "...", "table": "orders"}
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "db_type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    Postgres(PostgresConfig),
    Bigquery(BigQueryConfig),
}

impl ConnectionConfig {
    /// Parse from a JSON object and validate.
    pub fn from_json(value: JsonValue) -> Result<Self> {
        let config: Self = serde_json::from_value(value)
            .map_err(|e| ChatError::invalid(format!("invalid connection config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from flat string parameters (query string, CLI env) and validate.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self> {
        let mut map = serde_json::Map::new();
        for (key, value) in params {
            let value = match key.as_str() {
                "port" => value
                    .parse::<u16>()
                    .map(JsonValue::from)
                    .map_err(|_| ChatError::invalid(format!("invalid port: {}", value)))?,
                _ => JsonValue::String(value.clone()),
            };
            map.insert(key.clone(), value);
        }
        Self::from_json(JsonValue::Object(map))
    }

    /// Reject blank required fields.
    pub fn validate(&self) -> Result<()> {
        let required: Vec<(&str, &str)> = match self {
            Self::Postgres(pg) => vec![
                ("host", pg.host.as_str()),
                ("database", pg.database.as_str()),
                ("user", pg.user.as_str()),
                ("schema", pg.schema.as_str()),
                ("table", pg.table.as_str()),
            ],
            Self::Bigquery(bq) => vec![
                ("project_id", bq.project_id.as_str()),
                ("dataset_id", bq.dataset_id.as_str()),
                ("table_id", bq.table_id.as_str()),
            ],
        };

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(ChatError::invalid(format!(
                "missing {} connection details: {}",
                self.dialect().prompt_name(),
                missing.join(", ")
            )));
        }

        match self {
            Self::Postgres(pg) => {
                if let Some(mode) = &pg.ssl_mode {
                    if !matches!(mode.as_str(), "disable" | "prefer" | "require") {
                        return Err(ChatError::invalid(format!("unsupported ssl_mode: {}", mode)));
                    }
                }
            }
            Self::Bigquery(bq) => {
                bq.service_account_key()?;
            }
        }

        Ok(())
    }

    pub fn dialect(&self) -> SqlDialect {
        match self {
            Self::Postgres(_) => SqlDialect::Postgres,
            Self::Bigquery(_) => SqlDialect::BigQuery,
        }
    }

    /// Unquoted qualified table name, used as the schema name.
    pub fn table_name(&self) -> String {
        match self {
            Self::Postgres(pg) => format!("{}.{}", pg.schema, pg.table),
            Self::Bigquery(bq) => format!("{}.{}.{}", bq.project_id, bq.dataset_id, bq.table_id),
        }
    }

    /// Quoted table reference for use in SQL text.
    pub fn table_ref(&self) -> String {
        match self {
            Self::Postgres(pg) => format!(
                "{}.{}",
                quote_pg_ident(&pg.schema),
                quote_pg_ident(&pg.table)
            ),
            Self::Bigquery(bq) => format!(
                "`{}.{}.{}`",
                bq.project_id.replace('`', ""),
                bq.dataset_id.replace('`', ""),
                bq.table_id.replace('`', "")
            ),
        }
    }

    /// Values that must never appear in error messages or logs.
    pub fn secrets(&self) -> Vec<&str> {
        match self {
            Self::Postgres(pg) => vec![pg.password.as_str()],
            Self::Bigquery(bq) => {
                let mut secrets: Vec<&str> = bq.access_token.iter().map(|t| t.as_str()).collect();
                match &bq.credentials {
                    Some(JsonValue::String(text)) => secrets.push(text.as_str()),
                    Some(JsonValue::Object(key)) => {
                        secrets.extend(key.get("private_key").and_then(JsonValue::as_str))
                    }
                    _ => {}
                }
                secrets
            }
        }
    }
}

/// Double-quote a Postgres identifier.
pub fn quote_pg_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
