//! Question-to-answer pipeline.
//!
//! `SqlChat` composes introspection, prompt building, generation, the read-only guard and
//! execution. Every call opens its own session and releases it before returning; the only
//! shared state is the immutable [`Settings`] and the two collaborators.
//!
//! # Example
//!
//! ```rust,ignore
//! let chat = SqlChat::from_settings(Settings::from_env()?)?;
//! let result = chat.answer(&config, "how many orders shipped last week?", None, None).await?;
//! println!("{} rows", result.row_count);
//! ```

use crate::config::{ConnectionConfig, Settings};
use crate::database::{introspect, Connector, NativeConnector, Session, OVERVIEW_SAMPLE_ROWS};
use crate::llm::{build_prompt, build_suggestion_prompt, generate, suggest, HttpLlmClient, LlmClient};
use crate::query::{clamp_max_results, execute, validate};
use crate::types::{
    ChatError, GeneratedQuery, QueryResult, Result, Row, SchemaOverview, Stage, TableSchema,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Smallest and largest number of suggested questions per call.
pub const MIN_SUGGESTIONS: usize = 1;
pub const MAX_SUGGESTIONS: usize = 20;

/// Bound a future by `after`, attributing any timeout to `stage`.
async fn with_timeout<T, F>(stage: Stage, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(Err(ChatError::Timeout { after, .. })) => Err(ChatError::Timeout { stage, after }),
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(stage = %stage, after_secs = after.as_secs_f64(), "deadline exceeded");
            Err(ChatError::Timeout { stage, after })
        }
    }
}

/// Text-to-SQL orchestrator.
#[derive(Clone)]
pub struct SqlChat {
    settings: Settings,
    llm: Arc<dyn LlmClient>,
    connector: Arc<dyn Connector>,
}

impl SqlChat {
    /// Create from explicit collaborators.
    pub fn new(settings: Settings, llm: Arc<dyn LlmClient>, connector: Arc<dyn Connector>) -> Self {
        Self {
            settings,
            llm,
            connector,
        }
    }

    /// Create with the HTTP LLM client and native database connector.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Config` if either client cannot be built
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let llm = HttpLlmClient::new(settings.llm.clone(), settings.llm_timeout)?;
        let connector = NativeConnector::new(settings.db_timeout)?;
        Ok(Self::new(settings, Arc::new(llm), Arc::new(connector)))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    async fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn Session>> {
        config.validate()?;
        with_timeout(
            Stage::Introspection,
            self.settings.db_timeout,
            self.connector.connect(config),
        )
        .await
    }

    async fn release(&self, session: Box<dyn Session>) {
        match tokio::time::timeout(self.settings.db_timeout, session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "failed to close session"),
            Err(_) => tracing::warn!("timed out closing session"),
        }
    }

    /// Run `body` on a fresh session, release it on every path and scrub secrets.
    async fn with_session<'a, T, F, Fut>(&'a self, config: &'a ConnectionConfig, body: F) -> Result<T>
    where
        F: FnOnce(&'a Self, Box<dyn Session>) -> Fut,
        Fut: Future<Output = (Box<dyn Session>, Result<T>)> + 'a,
    {
        let session = self
            .open(config)
            .await
            .map_err(|e| e.redacted(&config.secrets()))?;
        let (session, result) = body(self, session).await;
        self.release(session).await;
        result.map_err(|e| e.redacted(&config.secrets()))
    }

    async fn describe(&self, session: &mut dyn Session, config: &ConnectionConfig) -> Result<TableSchema> {
        with_timeout(
            Stage::Introspection,
            self.settings.db_timeout,
            introspect::describe_table(session, config),
        )
        .await
    }

    async fn sample(
        &self,
        session: &mut dyn Session,
        config: &ConnectionConfig,
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        with_timeout(
            Stage::Introspection,
            self.settings.db_timeout,
            introspect::sample_table(session, config, limit),
        )
        .await
    }

    async fn generate_sql(
        &self,
        session: &mut dyn Session,
        config: &ConnectionConfig,
        question: &str,
        context: Option<&str>,
    ) -> Result<GeneratedQuery> {
        let schema = self.describe(session, config).await?;
        let prompt = build_prompt(&schema, question, config.dialect()).with_context(context);

        let generated = with_timeout(
            Stage::Generation,
            self.settings.llm_timeout,
            generate(&prompt, self.llm.as_ref()),
        )
        .await?;

        validate(&generated.sql).inspect_err(|e| {
            tracing::warn!(error = %e, "generated SQL rejected");
        })?;
        Ok(generated)
    }

    async fn run_validated(
        &self,
        session: &mut dyn Session,
        config: &ConnectionConfig,
        sql: &str,
        max_results: Option<usize>,
    ) -> Result<QueryResult> {
        let cap = clamp_max_results(max_results.or(Some(self.settings.max_results)));
        with_timeout(
            Stage::Execution,
            self.settings.db_timeout,
            execute(session, config, sql, cap),
        )
        .await
    }

    /// Answer a natural-language question with rows from the configured table.
    ///
    /// # Arguments
    ///
    /// * `config` - Connection parameters for this call
    /// * `question` - Natural-language question, must not be blank
    /// * `context` - Optional one-shot hint appended to the prompt
    /// * `max_results` - Row cap, defaults to `Settings::max_results`
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` for a blank question or bad config
    /// - `Connection` / `Timeout` for unreachable databases or slow legs
    /// - `Generation` for unusable LLM output
    /// - `UnsafeQuery` when the guard rejects the SQL (nothing is executed)
    /// - `Execution` when the database rejects the SQL
    #[tracing::instrument(skip_all, fields(table = %config.table_name()))]
    pub async fn answer(
        &self,
        config: &ConnectionConfig,
        question: &str,
        context: Option<&str>,
        max_results: Option<usize>,
    ) -> Result<QueryResult> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::invalid("question must not be empty"));
        }

        self.with_session(config, |chat, mut session| async move {
            let result = async {
                let generated = chat
                    .generate_sql(session.as_mut(), config, question, context)
                    .await?;
                chat.run_validated(session.as_mut(), config, &generated.sql, max_results)
                    .await
            }
            .await;
            (session, result)
        })
        .await
    }

    /// Generate and validate SQL without executing it.
    #[tracing::instrument(skip_all, fields(table = %config.table_name()))]
    pub async fn plan(
        &self,
        config: &ConnectionConfig,
        question: &str,
        context: Option<&str>,
    ) -> Result<GeneratedQuery> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::invalid("question must not be empty"));
        }

        self.with_session(config, |chat, mut session| async move {
            let result = chat
                .generate_sql(session.as_mut(), config, question, context)
                .await;
            (session, result)
        })
        .await
    }

    /// Validate and run caller-supplied SQL.
    #[tracing::instrument(skip_all, fields(table = %config.table_name()))]
    pub async fn run_sql(
        &self,
        config: &ConnectionConfig,
        sql: &str,
        max_results: Option<usize>,
    ) -> Result<QueryResult> {
        let sql = sql.trim();
        validate(sql)?;

        self.with_session(config, |chat, mut session| async move {
            let result = chat
                .run_validated(session.as_mut(), config, sql, max_results)
                .await;
            (session, result)
        })
        .await
    }

    /// Describe the configured table.
    pub async fn get_schema(&self, config: &ConnectionConfig) -> Result<TableSchema> {
        self.with_session(config, |chat, mut session| async move {
            let result = chat.describe(session.as_mut(), config).await;
            (session, result)
        })
        .await
    }

    /// Fetch sample rows; `limit` defaults to 5 and is clamped to `[1, 100]`.
    pub async fn get_sample_rows(
        &self,
        config: &ConnectionConfig,
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        self.with_session(config, |chat, mut session| async move {
            let result = chat.sample(session.as_mut(), config, limit).await;
            (session, result)
        })
        .await
    }

    /// Schema plus three sample rows.
    #[tracing::instrument(skip_all, fields(table = %config.table_name()))]
    pub async fn schema_overview(&self, config: &ConnectionConfig) -> Result<SchemaOverview> {
        self.with_session(config, |chat, mut session| async move {
            let result = async {
                let schema = chat.describe(session.as_mut(), config).await?;
                let sample_data = chat
                    .sample(session.as_mut(), config, Some(OVERVIEW_SAMPLE_ROWS))
                    .await?;
                Ok(SchemaOverview {
                    schema,
                    sample_data,
                })
            }
            .await;
            (session, result)
        })
        .await
    }

    /// Propose up to `n` example questions about the configured table.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` unless `1 <= n <= 20`
    #[tracing::instrument(skip_all, fields(table = %config.table_name(), n = n))]
    pub async fn suggest_questions(&self, config: &ConnectionConfig, n: usize) -> Result<Vec<String>> {
        if !(MIN_SUGGESTIONS..=MAX_SUGGESTIONS).contains(&n) {
            return Err(ChatError::invalid(format!(
                "n must be between {} and {}, got {}",
                MIN_SUGGESTIONS, MAX_SUGGESTIONS, n
            )));
        }

        self.with_session(config, |chat, mut session| async move {
            let result = async {
                let schema = chat.describe(session.as_mut(), config).await?;
                let samples = chat
                    .sample(session.as_mut(), config, Some(OVERVIEW_SAMPLE_ROWS))
                    .await?;
                let prompt = build_suggestion_prompt(&schema, &samples, n);
                with_timeout(
                    Stage::Suggestion,
                    chat.settings.llm_timeout,
                    suggest(&prompt, chat.llm.as_ref(), n),
                )
                .await
            }
            .await;
            (session, result)
        })
        .await
    }
}
