//! C1 — PrefillServer: an HTTP service wrapping one loaded engine.

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
use crate::utils::ApiError;

pub struct PrefillState {
    pub engine: Arc<dyn InferenceEngine>,
    pub model_kind: ModelKind,
    /// Bounds in-flight requests; queue-full is surfaced as `ErrBusy` rather
    /// than blocking unbounded (§4.1 Concurrency).
    pub backpressure: Arc<Semaphore>,
}

pub fn router(state: Arc<PrefillState>) -> Router {
    Router::new().route("/health", get(health)).route("/prefill", post(prefill)).with_state(state)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub state: &'static str,
    pub model_loaded: bool,
    pub display_name: String,
}

#[utoipa::path(get, path = "/health", responses((status = 200, body = HealthResponse)))]
async fn health(State(state): State<Arc<PrefillState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        state: if state.engine.is_loaded() { "healthy" } else { "offline" },
        model_loaded: state.engine.is_loaded(),
        display_name: state.engine.display_name().to_string(),
    })
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PrefillRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PrefillResponse {
    pub context: ContextBlob,
    pub prompt_tokens: u32,
    pub prefill_ms: u64,
    pub prefill_tok_per_s: f64,
}

#[utoipa::path(
    post,
    path = "/prefill",
    request_body = PrefillRequest,
    responses((status = 200, body = PrefillResponse))
)]
async fn prefill(
    State(state): State<Arc<PrefillState>>,
    Json(req): Json<PrefillRequest>,
) -> Result<Json<PrefillResponse>, ApiError> {
    if req.prompt.is_empty() {
        return Err(ApiError::bad_param("prompt must not be empty"));
    }

    let Ok(_permit) = state.backpressure.clone().try_acquire_owned() else {
        return Err(ApiError::Busy);
    };

    if !state.engine.is_loaded() {
        return Err(ApiError::EngineUnavailable);
    }

    let start = Instant::now();
    let (inner, prompt_tokens) = state.engine.prefill(&req.prompt).await.map_err(map_engine_error)?;
    let prefill_ms = start.elapsed().as_millis() as u64;
    let prefill_tok_per_s =
        if prefill_ms > 0 { prompt_tokens as f64 / (prefill_ms as f64 / 1000.0) } else { 0.0 };

    // Tag the context with this server's model kind so the paired decode
    // server can detect a misconfigured pairing (§4.2 Co-location
    // convention) without otherwise inspecting the opaque payload.
    let context = ContextBlob::new(
        serde_json::json!({ "model_kind": state.model_kind, "inner": inner.into_inner() }),
    );

    Ok(Json(PrefillResponse { context, prompt_tokens, prefill_ms, prefill_tok_per_s }))
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

    fn test_state() -> Arc<PrefillState> {
        Arc::new(PrefillState {
            engine: Arc::new(EchoEngine::new("test")),
            model_kind: crate::models::ModelKind::CodeAnalysis,
            backpressure: Arc::new(Semaphore::new(8)),
        })
    }

    #[tokio::test]
    async fn rejects_empty_prompt() {
        let state = test_state();
        let err = prefill(State(state), Json(PrefillRequest { prompt: String::new() }))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadParam(_)));
    }

    #[tokio::test]
    async fn prefill_returns_token_count() {
        let state = test_state();
        let resp = prefill(State(state), Json(PrefillRequest { prompt: "a b c".to_string() }))
            .await
            .unwrap();
        assert_eq!(resp.prompt_tokens, 3);
    }
}
