//! Error types for the question-to-SQL pipeline.
//!
//! Uses `thiserror` for ergonomic error definitions. Every variant that can be raised by more
//! than one component carries the pipeline [`Stage`] it came from so callers can tell which
//! leg failed (and retry only that leg).

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Pipeline stage a failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Schema and sample-row discovery
    Introspection,
    /// LLM call that turns the question into SQL
    Generation,
    /// Read-only guard over generated SQL
    Validation,
    /// Running the validated SQL
    Execution,
    /// LLM call that proposes example questions
    Suggestion,
}

impl Stage {
    /// Get stage name as string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Introspection => "introspection",
            Self::Generation => "generation",
            Self::Validation => "validation",
            Self::Execution => "execution",
            Self::Suggestion => "suggestion",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for all pipeline operations.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Bad credentials, unreachable host or unknown table
    #[error("Connection failed during {stage}: {message}")]
    Connection { stage: Stage, message: String },

    /// Empty or unusable LLM output, or the LLM API refused the request
    #[error("SQL generation failed: {0}")]
    Generation(String),

    /// Guard rejected the SQL; it was never executed
    #[error("Unsafe query rejected ({reason}): {sql}")]
    UnsafeQuery { sql: String, reason: String },

    /// Database rejected the SQL
    #[error("Query execution failed: {0}")]
    Execution(String),

    /// Either network leg exceeded its deadline
    #[error("{stage} timed out after {}s", after.as_secs_f64())]
    Timeout { stage: Stage, after: Duration },

    /// Caller supplied a missing or malformed field
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Settings are missing or inconsistent
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ChatError {
    /// Create a connection error for a stage.
    pub fn connection(stage: Stage, msg: impl Into<String>) -> Self {
        Self::Connection {
            stage,
            message: msg.into(),
        }
    }

    /// Create a guard rejection.
    pub fn unsafe_query(sql: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsafeQuery {
            sql: sql.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid-request error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Stage this error is attributed to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Connection { stage, .. } | Self::Timeout { stage, .. } => Some(*stage),
            Self::Generation(_) => Some(Stage::Generation),
            Self::UnsafeQuery { .. } => Some(Stage::Validation),
            Self::Execution(_) => Some(Stage::Execution),
            Self::InvalidRequest(_) | Self::Config(_) => None,
        }
    }

    /// Scrub secrets from every message this error carries.
    pub fn redacted(self, secrets: &[&str]) -> Self {
        match self {
            Self::Connection { stage, message } => Self::Connection {
                stage,
                message: redact(&message, secrets),
            },
            Self::Generation(m) => Self::Generation(redact(&m, secrets)),
            Self::Execution(m) => Self::Execution(redact(&m, secrets)),
            Self::InvalidRequest(m) => Self::InvalidRequest(redact(&m, secrets)),
            Self::Config(m) => Self::Config(redact(&m, secrets)),
            other => other,
        }
    }

    /// Check whether the caller may retry with the same or a rephrased question.
    ///
    /// Connection and configuration failures are fatal for the call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Generation(_) | Self::Execution(_) | Self::Timeout { .. }
        )
    }
}

/// Convenient result alias.
pub type Result<T> = std::result::Result<T, ChatError>;

/// Replace every occurrence of the given secrets in a provider message.
///
/// Empty secrets are ignored so an unset password never blanks the whole message.
pub fn redact(message: &str, secrets: &[&str]) -> String {
    let mut out = message.to_string();
    for secret in secrets.iter().filter(|s| !s.is_empty()) {
        out = out.replace(secret, "***");
    }
    out
}
