//! C2 — DecodeServer: an HTTP service wrapping one loaded engine, consuming
//! the context produced by its paired prefill server.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use utoipa::ToSchema;

use crate::engine::{EngineError, InferenceEngine};
use crate::models::{ContextBlob, ModelKind};
use crate::servers::prefill::HealthResponse;
use crate::utils::ApiError;

pub struct DecodeState {
    pub engine: Arc<dyn InferenceEngine>,
    pub model_kind: ModelKind,
    pub backpressure: Arc<Semaphore>,
}

pub fn router(state: Arc<DecodeState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/decode", post(decode))
        .route("/generate", post(generate))
        .with_state(state)
}

#[utoipa::path(get, path = "/health", responses((status = 200, body = HealthResponse)))]
async fn health(State(state): State<Arc<DecodeState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        state: if state.engine.is_loaded() { "healthy" } else { "offline" },
        model_loaded: state.engine.is_loaded(),
        display_name: state.engine.display_name().to_string(),
    })
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DecodeRequest {
    pub context: ContextBlob,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DecodeResponse {
    pub text: String,
    pub completion_tokens: u32,
    pub decode_ms: u64,
    pub decode_tok_per_s: f64,
}

#[utoipa::path(
    post,
    path = "/decode",
    request_body = DecodeRequest,
    responses((status = 200, body = DecodeResponse))
)]
async fn decode(
    State(state): State<Arc<DecodeState>>,
    Json(req): Json<DecodeRequest>,
) -> Result<Json<DecodeResponse>, ApiError> {
    validate_params(req.max_tokens, req.temperature)?;

    let Ok(_permit) = state.backpressure.clone().try_acquire_owned() else {
        return Err(ApiError::Busy);
    };

    if !state.engine.is_loaded() {
        return Err(ApiError::EngineUnavailable);
    }

    let tagged_kind = req.context.get("model_kind").cloned();
    let actual: Option<ModelKind> = tagged_kind.and_then(|v| serde_json::from_value(v).ok());
    if let Some(actual) = actual {
        if actual != state.model_kind {
            return Err(ApiError::ContextKindMismatch { expected: state.model_kind, actual });
        }
    }
    let inner = ContextBlob::new(req.context.get("inner").cloned().unwrap_or_else(|| req.context.clone().into_inner()));

    let start = Instant::now();
    let (text, completion_tokens) = state
        .engine
        .decode(&inner, &req.prompt, req.max_tokens, req.temperature)
        .await
        .map_err(map_engine_error)?;
    let decode_ms = start.elapsed().as_millis() as u64;
    let decode_tok_per_s =
        if decode_ms > 0 { completion_tokens as f64 / (decode_ms as f64 / 1000.0) } else { 0.0 };

    Ok(Json(DecodeResponse { text, completion_tokens, decode_ms, decode_tok_per_s }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GenerateResponse {
    pub text: String,
    pub completion_tokens: u32,
    pub decode_ms: u64,
}

/// Fallback endpoint used when no prefill server is reachable (§4.3, §6.2).
#[utoipa::path(
    post,
    path = "/generate",
    request_body = GenerateRequest,
    responses((status = 200, body = GenerateResponse))
)]
async fn generate(
    State(state): State<Arc<DecodeState>>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    validate_params(req.max_tokens, req.temperature)?;

    let Ok(_permit) = state.backpressure.clone().try_acquire_owned() else {
        return Err(ApiError::Busy);
    };

    if !state.engine.is_loaded() {
        return Err(ApiError::EngineUnavailable);
    }

    let start = Instant::now();
    let (text, completion_tokens) = state
        .engine
        .generate_direct(&req.prompt, req.max_tokens, req.temperature)
        .await
        .map_err(map_engine_error)?;
    let decode_ms = start.elapsed().as_millis() as u64;

    Ok(Json(GenerateResponse { text, completion_tokens, decode_ms }))
}

fn validate_params(max_tokens: u32, temperature: f64) -> Result<(), ApiError> {
    if max_tokens < 1 {
        return Err(ApiError::bad_param("max_tokens must be >= 1"));
    }
    if !(0.0..=2.0).contains(&temperature) {
        return Err(ApiError::bad_param("temperature must be within [0, 2]"));
    }
    Ok(())
}

fn map_engine_error(err: EngineError) -> ApiError {
    match err {
        EngineError::NotLoaded => ApiError::EngineUnavailable,
        EngineError::PromptTooLong(_) => ApiError::PromptTooLong,
        EngineError::Busy => ApiError::Busy,
        EngineError::Internal(msg) => ApiError::internal(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EchoEngine;
    use serde_json::json;

    fn test_state(model_kind: ModelKind) -> Arc<DecodeState> {
        Arc::new(DecodeState {
            engine: Arc::new(EchoEngine::new("test")),
            model_kind,
            backpressure: Arc::new(Semaphore::new(8)),
        })
    }

    #[tokio::test]
    async fn rejects_out_of_range_temperature() {
        let state = test_state(ModelKind::CodeAnalysis);
        let req = DecodeRequest {
            context: ContextBlob::new(json!({})),
            prompt: "hi".to_string(),
            max_tokens: 4,
            temperature: 3.0,
        };
        let err = decode(State(state), Json(req)).await.unwrap_err();
        assert!(matches!(err, ApiError::BadParam(_)));
    }

    #[tokio::test]
    async fn detects_context_kind_mismatch() {
        let state = test_state(ModelKind::Feedback);
        let req = DecodeRequest {
            context: ContextBlob::new(json!({ "model_kind": "code_analysis", "inner": { "prompt": "hi" } })),
            prompt: "hi".to_string(),
            max_tokens: 4,
            temperature: 0.5,
        };
        let err = decode(State(state), Json(req)).await.unwrap_err();
        assert!(matches!(err, ApiError::ContextKindMismatch { .. }));
    }

    #[tokio::test]
    async fn generate_direct_ignores_context() {
        let state = test_state(ModelKind::CodeAnalysis);
        let req = GenerateRequest {
            prompt: "a b c d".to_string(),
            max_tokens: 2,
            temperature: 0.0,
        };
        let resp = generate(State(state), Json(req)).await.unwrap();
        assert_eq!(resp.completion_tokens, 2);
    }
}
