use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::{sleep, Duration};

use crate::models::ContextBlob;

use super::{EngineError, InferenceEngine};

/// Deterministic reference engine. Prefill records the prompt verbatim as
/// its "context"; decode echoes a truncated, temperature-independent
/// transform of it. Good enough to exercise the orchestrator's contract
/// without depending on real model weights.
pub struct EchoEngine {
    display_name: String,
    max_prompt_chars: usize,
    /// Simulated per-token latency, so metrics are non-zero and plausible.
    per_token_latency: Duration,
}

impl EchoEngine {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            max_prompt_chars: 32_000,
            per_token_latency: Duration::from_micros(500),
        }
    }
}

#[async_trait]
impl InferenceEngine for EchoEngine {
    fn is_loaded(&self) -> bool {
        true
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    async fn prefill(&self, prompt: &str) -> Result<(ContextBlob, u32), EngineError> {
        if prompt.len() > self.max_prompt_chars {
            return Err(EngineError::PromptTooLong(prompt.len()));
        }
        let prompt_tokens = estimate_tokens(prompt);
        sleep(self.per_token_latency * prompt_tokens.min(200)).await;
        let context = ContextBlob::new(json!({ "prompt": prompt, "engine": self.display_name }));
        Ok((context, prompt_tokens))
    }

    async fn decode(
        &self,
        context: &ContextBlob,
        prompt: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<(String, u32), EngineError> {
        let source = context.get("prompt").and_then(Value::as_str).unwrap_or(prompt);
        generate_from(source, max_tokens, temperature, &self.per_token_latency).await
    }

    async fn generate_direct(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<(String, u32), EngineError> {
        generate_from(prompt, max_tokens, temperature, &self.per_token_latency).await
    }
}

async fn generate_from(
    source: &str,
    max_tokens: u32,
    temperature: f64,
    per_token_latency: &Duration,
) -> Result<(String, u32), EngineError> {
    let words: Vec<&str> = source.split_whitespace().collect();
    let take = (max_tokens as usize).min(words.len().max(1));
    let completion_tokens = take as u32;
    sleep(*per_token_latency * completion_tokens).await;

    let mut text = words.iter().take(take).cloned().collect::<Vec<_>>().join(" ");
    if temperature > 1.0 {
        text.push_str(" (variable)");
    }
    if text.is_empty() {
        text = "(no content)".to_string();
    }
    Ok((text, completion_tokens))
}

fn estimate_tokens(prompt: &str) -> u32 {
    (prompt.split_whitespace().count().max(1)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prefill_then_decode_round_trips_prompt() {
        let engine = EchoEngine::new("echo-1");
        let (context, prompt_tokens) = engine.prefill("hello world this is a test").await.unwrap();
        assert_eq!(prompt_tokens, 6);
        let (text, completion_tokens) = engine.decode(&context, "hello world", 3, 0.0).await.unwrap();
        assert_eq!(completion_tokens, 3);
        assert_eq!(text, "hello world this");
    }

    #[tokio::test]
    async fn rejects_overlong_prompt() {
        let engine = EchoEngine::new("echo-1");
        let prompt = "x".repeat(40_000);
        let err = engine.prefill(&prompt).await.unwrap_err();
        assert!(matches!(err, EngineError::PromptTooLong(_)));
    }
}
