//! SQL Chat CLI
//!
//! Ask questions about one PostgreSQL or BigQuery table, or serve the HTTP API.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sql_chat::api;
use sql_chat::otel::init_tracing;
use sql_chat::{ConnectionConfig, Settings, SqlChat};
use std::collections::HashMap;
use std::sync::Arc;

/// SQL Chat - natural-language questions over a database table
#[derive(Parser)]
#[command(name = "sqlchat")]
#[command(about = "Ask a PostgreSQL or BigQuery table questions in plain language", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    db: DbArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Connection flags; every flag can also come from its `SQLCHAT_DB_*` variable.
#[derive(Args)]
struct DbArgs {
    /// Database type: postgres or bigquery
    #[arg(long, env = "SQLCHAT_DB_TYPE", default_value = "postgres", global = true)]
    db_type: String,

    /// Postgres host
    #[arg(long, env = "SQLCHAT_DB_HOST", global = true)]
    host: Option<String>,

    /// Postgres port
    #[arg(long, env = "SQLCHAT_DB_PORT", global = true)]
    port: Option<u16>,

    /// Postgres database name
    #[arg(long, env = "SQLCHAT_DB_DATABASE", global = true)]
    database: Option<String>,

    /// Postgres user
    #[arg(long, env = "SQLCHAT_DB_USER", global = true)]
    user: Option<String>,

    /// Postgres password
    #[arg(long, env = "SQLCHAT_DB_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Postgres schema
    #[arg(long, env = "SQLCHAT_DB_SCHEMA", global = true)]
    schema: Option<String>,

    /// Postgres table
    #[arg(long, env = "SQLCHAT_DB_TABLE", global = true)]
    table: Option<String>,

    /// Postgres SSL mode: disable, prefer, require
    #[arg(long, env = "SQLCHAT_DB_SSL_MODE", global = true)]
    ssl_mode: Option<String>,

    /// BigQuery project
    #[arg(long, env = "SQLCHAT_DB_PROJECT_ID", global = true)]
    project_id: Option<String>,

    /// BigQuery dataset
    #[arg(long, env = "SQLCHAT_DB_DATASET_ID", global = true)]
    dataset_id: Option<String>,

    /// BigQuery table
    #[arg(long, env = "SQLCHAT_DB_TABLE_ID", global = true)]
    table_id: Option<String>,

    /// BigQuery OAuth2 access token (defaults to the metadata server)
    #[arg(long, env = "SQLCHAT_DB_ACCESS_TOKEN", hide_env_values = true, global = true)]
    access_token: Option<String>,

    /// BigQuery job location
    #[arg(long, env = "SQLCHAT_DB_LOCATION", global = true)]
    location: Option<String>,
}

impl DbArgs {
    fn to_config(&self) -> anyhow::Result<ConnectionConfig> {
        let mut params = HashMap::new();
        params.insert("db_type".to_string(), self.db_type.clone());

        let fields: [(&str, Option<String>); 13] = [
            ("host", self.host.clone()),
            ("port", self.port.map(|p| p.to_string())),
            ("database", self.database.clone()),
            ("user", self.user.clone()),
            ("password", self.password.clone()),
            ("schema", self.schema.clone()),
            ("table", self.table.clone()),
            ("ssl_mode", self.ssl_mode.clone()),
            ("project_id", self.project_id.clone()),
            ("dataset_id", self.dataset_id.clone()),
            ("table_id", self.table_id.clone()),
            ("access_token", self.access_token.clone()),
            ("location", self.location.clone()),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                params.insert(key.to_string(), value);
            }
        }

        ConnectionConfig::from_params(&params).context("invalid connection flags")
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Address to bind (overrides SQLCHAT_BIND)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Natural language query
    Ask {
        /// Question in natural language
        question: String,

        /// Show generated SQL without executing
        #[arg(long)]
        plan: bool,

        /// Extra hint appended to the prompt
        #[arg(long)]
        context: Option<String>,

        /// Row cap
        #[arg(long)]
        max_results: Option<usize>,
    },

    /// Show table schema and sample rows
    Schema,

    /// Suggest example questions
    Suggest {
        /// Number of questions
        #[arg(short, long, default_value = "3")]
        n: usize,
    },

    /// SQL query (read-only)
    Query {
        /// SQL query string
        sql: String,

        /// Row cap
        #[arg(long)]
        max_results: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _guard = init_tracing("sqlchat")?;

    let settings = Settings::from_env().context("failed to load settings")?;
    let chat = SqlChat::from_settings(settings)?;

    match cli.command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| chat.settings().bind.clone());
            api::serve(Arc::new(chat), &bind)
                .await
                .with_context(|| format!("failed to serve on {}", bind))?;
        }
        Commands::Ask {
            question,
            plan,
            context,
            max_results,
        } => {
            let config = cli.db.to_config()?;
            cmd_ask(&chat, &config, &question, plan, context.as_deref(), max_results).await?;
        }
        Commands::Schema => {
            let config = cli.db.to_config()?;
            let overview = chat.schema_overview(&config).await?;
            println!("{}", serde_json::to_string_pretty(&overview)?);
        }
        Commands::Suggest { n } => {
            let config = cli.db.to_config()?;
            for (i, question) in chat.suggest_questions(&config, n).await?.iter().enumerate() {
                println!("{}. {}", i + 1, question);
            }
        }
        Commands::Query { sql, max_results } => {
            let config = cli.db.to_config()?;
            let result = chat.run_sql(&config, &sql, max_results).await?;
            print_result(&result)?;
        }
    }

    Ok(())
}

async fn cmd_ask(
    chat: &SqlChat,
    config: &ConnectionConfig,
    question: &str,
    plan: bool,
    context: Option<&str>,
    max_results: Option<usize>,
) -> anyhow::Result<()> {
    if plan {
        let generated = chat.plan(config, question, context).await?;
        println!("{}", generated.sql);
        return Ok(());
    }

    let result = chat.answer(config, question, context, max_results).await?;
    println!("-- {}", result.sql);
    print_result(&result)
}

fn print_result(result: &sql_chat::types::QueryResult) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&result.rows)?);
    println!(
        "{} row(s) in {:.3}s{}",
        result.row_count,
        result.execution_time_seconds,
        if result.truncated { " (truncated)" } else { "" }
    );
    Ok(())
}
