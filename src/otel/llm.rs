//! LLM call instrumentation (`gen_ai.*` conventions).

use tracing::{field, span, Level, Span};

/// Create a chat-completion span.
///
/// Token counts are declared empty and filled by [`record_llm_usage`] once the
/// provider responds.
pub fn llm_span(system: &'static str, model: &str, temperature: f32) -> Span {
    span!(
        Level::INFO,
        "gen_ai.chat",
        otel.name = %format!("chat {}", model),
        otel.kind = "client",
        gen_ai.system = system,
        gen_ai.operation.name = "chat",
        gen_ai.request.model = model,
        gen_ai.request.temperature = temperature as f64,
        gen_ai.usage.input_tokens = field::Empty,
        gen_ai.usage.output_tokens = field::Empty,
    )
}

/// Record token usage on the current span.
pub fn record_llm_usage(input_tokens: u32, output_tokens: u32) {
    let span = Span::current();
    span.record("gen_ai.usage.input_tokens", input_tokens);
    span.record("gen_ai.usage.output_tokens", output_tokens);
}
