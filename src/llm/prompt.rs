//! Prompt construction for SQL generation and question suggestions.

use crate::config::SqlDialect;
use crate::types::{Row, TableSchema};
use std::fmt::Write;

/// System + user message pair for one chat completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system_message: String,
    pub user_message: String,

    /// Question the prompt was built for, without any appended context
    pub question: String,
}

impl Prompt {
    /// Append one-shot caller context to the user message.
    pub fn with_context(mut self, context: Option<&str>) -> Self {
        if let Some(ctx) = context.map(str::trim).filter(|c| !c.is_empty()) {
            self.user_message = format!("{}\n\nAdditional context: {}", self.user_message, ctx);
        }
        self
    }
}

fn write_columns(out: &mut String, schema: &TableSchema) {
    for column in &schema.columns {
        let _ = write!(out, "- {} ({})", column.name, column.column_type);
        if column.nullable {
            out.push_str(", nullable");
        }
        out.push('\n');
    }
}

/// Build the SQL-generation prompt.
///
/// The system message names the dialect and table, lists every column with its type tag and
/// pins the output format. The user message is the question verbatim.
pub fn build_prompt(schema: &TableSchema, question: &str, dialect: SqlDialect) -> Prompt {
    let mut system = format!(
        "You are an expert {} analyst. Translate the user's question into a single SQL query \
         against the table {}.\n",
        dialect.prompt_name(),
        schema.name
    );

    if let Some(description) = schema.description.as_deref().filter(|d| !d.trim().is_empty()) {
        let _ = writeln!(system, "Table description: {}", description.trim());
    }

    system.push_str("\nColumns:\n");
    write_columns(&mut system, schema);

    let _ = write!(
        system,
        "\nRules:\n\
         - Write {} syntax and reference the table as {}.\n\
         - Produce exactly one read-only SELECT statement (a WITH clause is allowed).\n\
         - Never modify data or schema.\n\
         - Return ONLY the SQL text: no explanation, no prose, no markdown code fences.",
        dialect.prompt_name(),
        schema.name
    );

    Prompt {
        system_message: system,
        user_message: question.to_string(),
        question: question.to_string(),
    }
}

/// Build the prompt that asks for `n` example questions.
pub fn build_suggestion_prompt(schema: &TableSchema, sample_rows: &[Row], n: usize) -> Prompt {
    let mut user = format!("Table: {}\n", schema.name);
    if let Some(description) = &schema.description {
        let _ = writeln!(user, "Description: {}", description);
    }

    user.push_str("\nColumns:\n");
    write_columns(&mut user, schema);

    if !sample_rows.is_empty() {
        user.push_str("\nSample rows:\n");
        for row in sample_rows {
            let line = serde_json::to_string(row).unwrap_or_default();
            let _ = writeln!(user, "{}", line);
        }
    }

    let _ = write!(
        user,
        "\nSuggest {} interesting questions a business user could ask about this data. \
         Return one question per line, without numbering or bullets.",
        n
    );

    Prompt {
        system_message: "You are a data analyst helping to explore a dataset.".to_string(),
        question: user.clone(),
        user_message: user,
    }
}
