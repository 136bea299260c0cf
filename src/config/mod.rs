//! Service settings and per-request connection parameters.
//!
//! `Settings` is built once from the environment and passed into each component at
//! construction. There is no process-wide mutable configuration.

pub mod connection;

pub use connection::{quote_pg_ident, BigQueryConfig, ConnectionConfig, PostgresConfig, SqlDialect};

use crate::llm::LlmProvider;
use crate::types::{ChatError, Result};
use std::fmt;
use std::time::Duration;

/// Default model when `SQLCHAT_LLM_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default Azure OpenAI REST API version.
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";

pub use crate::query::DEFAULT_MAX_RESULTS;

/// Default deadline for each network leg.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// LLM endpoint settings.
#[derive(Clone)]
pub struct LlmSettings {
    pub provider: LlmProvider,

    /// Model name, or deployment name for Azure
    pub model: String,

    pub api_key: String,

    /// Override for the provider endpoint (Azure resource URL, proxies, tests)
    pub base_url: Option<String>,

    /// Azure `api-version` query parameter
    pub api_version: String,
}

impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// Service settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub llm: LlmSettings,

    /// Deadline for each LLM call
    pub llm_timeout: Duration,

    /// Deadline for each database round trip
    pub db_timeout: Duration,

    /// Row cap used when a request does not carry one
    pub max_results: usize,

    /// HTTP listen address
    pub bind: String,
}

impl Settings {
    /// Create settings from environment variables.
    ///
    /// Uses `SQLCHAT_LLM_MODEL` for the model and picks the API key by provider:
    /// `AZURE_OPENAI_API_KEY` when `AZURE_OPENAI_ENDPOINT` is set, `ANTHROPIC_API_KEY` for
    /// `claude*` models, `OPENAI_API_KEY` otherwise.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Config` if the API key is missing or a number does not parse
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let azure_endpoint = lookup("AZURE_OPENAI_ENDPOINT").filter(|v| !v.is_empty());
        let model = lookup("SQLCHAT_LLM_MODEL")
            .or_else(|| lookup("AZURE_OPENAI_DEPLOYMENT"))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let provider = if azure_endpoint.is_some() {
            LlmProvider::AzureOpenAI
        } else {
            LlmProvider::from_model(&model)
        };

        let key_var = provider.api_key_var();
        let api_key = lookup(key_var)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ChatError::Config(format!("{} environment variable not set", key_var))
            })?;

        let base_url = azure_endpoint.or_else(|| lookup("SQLCHAT_LLM_BASE_URL"));

        let llm = LlmSettings {
            provider,
            model,
            api_key,
            base_url,
            api_version: lookup("AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
        };

        let settings = Self {
            llm,
            llm_timeout: parse_secs(&lookup, "SQLCHAT_LLM_TIMEOUT_SECS")?.unwrap_or(DEFAULT_TIMEOUT),
            db_timeout: parse_secs(&lookup, "SQLCHAT_DB_TIMEOUT_SECS")?.unwrap_or(DEFAULT_TIMEOUT),
            max_results: match lookup("SQLCHAT_MAX_RESULTS") {
                Some(v) => v.parse().map_err(|_| {
                    ChatError::Config(format!("SQLCHAT_MAX_RESULTS is not a number: {}", v))
                })?,
                None => DEFAULT_MAX_RESULTS,
            },
            bind: lookup("SQLCHAT_BIND").unwrap_or_else(|| "0.0.0.0:8000".to_string()),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Reject zero timeouts and a zero row cap.
    pub fn validate(&self) -> Result<()> {
        if self.llm_timeout.is_zero() || self.db_timeout.is_zero() {
            return Err(ChatError::Config("timeouts must be greater than zero".into()));
        }
        if self.max_results == 0 {
            return Err(ChatError::Config("max_results must be greater than zero".into()));
        }
        Ok(())
    }
}

fn parse_secs<F>(lookup: &F, key: &str) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(v) => v
            .parse::<f64>()
            .ok()
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
            .map(Some)
            .ok_or_else(|| ChatError::Config(format!("{} is not a number of seconds: {}", key, v))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_openai_key() {
        let settings = Settings::from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
        assert_eq!(settings.llm.provider, LlmProvider::OpenAI);
        assert_eq!(settings.llm.model, DEFAULT_MODEL);
        assert_eq!(settings.llm_timeout, DEFAULT_TIMEOUT);
        assert_eq!(settings.db_timeout, DEFAULT_TIMEOUT);
        assert_eq!(settings.max_results, 100);
    }

    #[test]
    fn test_anthropic_model_selects_anthropic_key() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("SQLCHAT_LLM_MODEL", "claude-3-5-haiku-latest"),
            ("ANTHROPIC_API_KEY", "sk-ant"),
        ]))
        .unwrap();
        assert_eq!(settings.llm.provider, LlmProvider::Anthropic);
        assert_eq!(settings.llm.api_key, "sk-ant");
    }

    #[test]
    fn test_azure_endpoint_wins() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("AZURE_OPENAI_ENDPOINT", "https://acme.openai.azure.com"),
            ("AZURE_OPENAI_DEPLOYMENT", "sql-gpt"),
            ("AZURE_OPENAI_API_KEY", "az-key"),
        ]))
        .unwrap();
        assert_eq!(settings.llm.provider, LlmProvider::AzureOpenAI);
        assert_eq!(settings.llm.model, "sql-gpt");
        assert_eq!(settings.llm.base_url.as_deref(), Some("https://acme.openai.azure.com"));
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let err = Settings::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_timeouts_parse() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("SQLCHAT_LLM_TIMEOUT_SECS", "2.5"),
            ("SQLCHAT_DB_TIMEOUT_SECS", "10"),
        ]))
        .unwrap();
        assert_eq!(settings.llm_timeout, Duration::from_millis(2500));
        assert_eq!(settings.db_timeout, Duration::from_secs(10));

        assert!(Settings::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("SQLCHAT_DB_TIMEOUT_SECS", "0"),
        ]))
        .is_err());
    }

    #[test]
    fn test_out_of_range_timeouts_are_config_errors() {
        for value in ["1e30", "-1", "inf", "NaN", "soon"] {
            let err = Settings::from_lookup(lookup_from(&[
                ("OPENAI_API_KEY", "sk-test"),
                ("SQLCHAT_DB_TIMEOUT_SECS", value),
            ]))
            .unwrap_err();
            assert!(matches!(err, ChatError::Config(_)), "{}: {:?}", value, err);
        }
    }

    #[test]
    fn test_debug_hides_api_key() {
        let settings = Settings::from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk-secret")])).unwrap();
        assert!(!format!("{:?}", settings).contains("sk-secret"));
    }
}
