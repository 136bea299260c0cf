//! LLM access: chat client, prompts, SQL extraction and question suggestions.

pub mod client;
pub mod generator;
pub mod prompt;
pub mod suggest;

pub use client::{HttpLlmClient, LlmClient, LlmProvider, TokenUsage};
pub use generator::{extract_sql, generate, strip_markdown, SQL_TEMPERATURE};
pub use prompt::{build_prompt, build_suggestion_prompt, Prompt};
pub use suggest::{parse_suggestions, suggest, SUGGESTION_TEMPERATURE};
