//! The orchestrator core never talks to a real LLM; `InferenceEngine` is the
//! seam where a concrete engine would plug in. Out of scope here (§1): the
//! underlying LLMs are treated as opaque text-in/text-out engines with
//! KV-cache support.

pub mod echo;

use async_trait::async_trait;

use crate::models::ContextBlob;

pub use echo::EchoEngine;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine not loaded")]
    NotLoaded,
    #[error("prompt too long: {0} chars")]
    PromptTooLong(usize),
    #[error("engine busy")]
    Busy,
    #[error("engine internal error: {0}")]
    Internal(String),
}

/// One loaded model, split into its prefill and decode halves. A single
/// `InferenceEngine` backs exactly one prefill server and one decode server
/// for one `ModelKind`.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    fn is_loaded(&self) -> bool;

    fn display_name(&self) -> &str;

    /// Process the prompt, producing an opaque context plus prompt token
    /// count. MUST NOT generate any output tokens (§4.1).
    async fn prefill(&self, prompt: &str) -> Result<(ContextBlob, u32), EngineError>;

    /// Consume the context produced by `prefill` and generate up to
    /// `max_tokens`, returning generated text and completion token count.
    async fn decode(
        &self,
        context: &ContextBlob,
        prompt: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<(String, u32), EngineError>;

    /// Decode-only fallback path used when no prefill server is reachable
    /// (§4.3 Fallback): process the prompt and generate in one call.
    async fn generate_direct(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<(String, u32), EngineError>;
}
