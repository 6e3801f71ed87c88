use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ModelKind;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub model_kind: ModelKind,
}

impl GenerationRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.prompt.is_empty() {
            return Err("prompt must not be empty".to_string());
        }
        if self.max_tokens < 1 {
            return Err("max_tokens must be >= 1".to_string());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err("temperature must be within [0, 2]".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMethod {
    Disaggregated,
    DirectFallback,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerationMetrics {
    pub prefill_ms: u64,
    pub decode_ms: u64,
    pub total_ms: u64,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub prefill_tok_per_s: f64,
    pub decode_tok_per_s: f64,
    pub prefill_server: String,
    pub decode_server: String,
    pub method: GenerationMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerationResponse {
    pub text: String,
    pub metrics: GenerationMetrics,
}
