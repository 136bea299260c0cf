//! Example-question generation.

use crate::llm::client::LlmClient;
use crate::llm::prompt::Prompt;
use crate::types::Result;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Suggestions should vary between calls.
pub const SUGGESTION_TEMPERATURE: f32 = 0.7;

/// Leading list markers: `1.`, `2)`, `-`, `*`, `•`.
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d+\s*[.):]|[-*•])\s*").expect("list marker regex"));

/// Split a completion into at most `n` distinct questions.
pub fn parse_suggestions(raw: &str, n: usize) -> Vec<String> {
    let mut seen = HashSet::new();

    raw.lines()
        .map(|line| {
            let line = line.trim();
            LIST_MARKER
                .replace(line, "")
                .trim()
                .trim_matches('"')
                .trim()
                .to_string()
        })
        .filter(|q| !q.is_empty())
        .filter(|q| seen.insert(q.to_lowercase()))
        .take(n)
        .collect()
}

/// Ask the LLM for up to `n` questions.
pub async fn suggest(prompt: &Prompt, llm: &dyn LlmClient, n: usize) -> Result<Vec<String>> {
    let raw = llm
        .chat_complete(&prompt.system_message, &prompt.user_message, SUGGESTION_TEMPERATURE)
        .await?;
    Ok(parse_suggestions(&raw, n))
}
