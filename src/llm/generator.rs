//! Turns a prompt into SQL text.

use crate::llm::client::LlmClient;
use crate::llm::prompt::Prompt;
use crate::types::{ChatError, GeneratedQuery, Result};
use regex::Regex;
use std::sync::LazyLock;

/// SQL generation is deterministic.
pub const SQL_TEMPERATURE: f32 = 0.0;

/// First fenced block. Whatever info string follows the opening fence is dropped.
static FENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[^\n`]*\r?\n(.*?)```").expect("fence regex"));

/// Fence opened and closed on a single line.
static INLINE_FENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```([^\n`]*)```").expect("inline fence regex"));

/// Strip markdown code fences from an LLM response.
///
/// Handles:
/// - ```sql ... ```
/// - ```SQL ... ```
/// - any other info string, e.g. `sqlite` or `pgsql`
/// - ``` ... ```
/// - a fenced block with prose before or after it
/// - an opening fence that was never closed
pub fn strip_markdown(text: &str) -> String {
    let text = text.trim();

    for regex in [&*FENCE_REGEX, &*INLINE_FENCE_REGEX] {
        if let Some(body) = regex.captures(text).and_then(|caps| caps.get(1)) {
            return body.as_str().trim().to_string();
        }
    }

    if text.starts_with("```") {
        let start = text.find('\n').map(|i| i + 1).unwrap_or(text.len());
        return text[start..].trim().to_string();
    }

    text.to_string()
}

/// Extract SQL from a raw completion.
///
/// # Errors
///
/// Returns `ChatError::Generation` if nothing is left after stripping
pub fn extract_sql(raw: &str) -> Result<String> {
    let sql = strip_markdown(raw);
    if sql.is_empty() {
        return Err(ChatError::Generation("LLM returned no SQL".to_string()));
    }
    Ok(sql)
}

/// Ask the LLM for SQL answering the prompt's question.
pub async fn generate(prompt: &Prompt, llm: &dyn LlmClient) -> Result<GeneratedQuery> {
    let raw = llm
        .chat_complete(&prompt.system_message, &prompt.user_message, SQL_TEMPERATURE)
        .await?;
    let sql = extract_sql(&raw)?;

    tracing::debug!(sql = %sql, "generated SQL");

    Ok(GeneratedQuery {
        sql,
        source_question: prompt.question.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_sql_fence() {
        assert_eq!(strip_markdown("```sql\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_markdown("```SQL\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_markdown("```\nSELECT 1\n```"), "SELECT 1");
    }

    #[test]
    fn test_strip_any_info_string() {
        for tag in ["sqlite", "pgsql", "mysql", "postgresql", "googlesql", "sql title=q"] {
            let raw = format!("```{}\nSELECT 1\n```", tag);
            let sql = strip_markdown(&raw);
            assert_eq!(sql, "SELECT 1", "tag {}", tag);
            assert!(crate::query::validate(&sql).is_ok(), "tag {}", tag);
        }
        assert_eq!(strip_markdown("```sql\r\nSELECT 1\r\n```"), "SELECT 1");
    }

    #[test]
    fn test_inline_fence() {
        assert_eq!(strip_markdown("```SELECT 1```"), "SELECT 1");
    }

    #[test]
    fn test_strip_fence_inside_prose() {
        let raw = "Here is the query:\n```sql\nSELECT name\nFROM t\n```\nIt lists names.";
        assert_eq!(strip_markdown(raw), "SELECT name\nFROM t");
    }

    #[test]
    fn test_unclosed_fence() {
        assert_eq!(strip_markdown("```sql\nSELECT 2"), "SELECT 2");
    }

    #[test]
    fn test_plain_sql_untouched() {
        assert_eq!(strip_markdown("  SELECT COUNT(*) FROM t \n"), "SELECT COUNT(*) FROM t");
    }

    #[test]
    fn test_empty_output_is_error() {
        assert!(matches!(extract_sql("   "), Err(ChatError::Generation(_))));
        assert!(matches!(extract_sql("```sql\n```"), Err(ChatError::Generation(_))));
    }
}
