use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// API Error with rich context and automatic error trait implementations.
///
/// Design: uses thiserror for ergonomic error handling with context. Each
/// variant carries meaningful context to help with debugging.
#[derive(Error, Debug)]
pub enum ApiError {
    // Prefill/decode contract errors 1xxx
    #[error("engine not loaded")]
    EngineUnavailable,

    #[error("prompt exceeds engine limit")]
    PromptTooLong,

    #[error("server busy, back-pressure queue full")]
    Busy,

    #[error("invalid parameter: {0}")]
    BadParam(String),

    #[error("context kind mismatch: expected {expected:?}, got {actual:?}")]
    ContextKindMismatch { expected: crate::models::ModelKind, actual: crate::models::ModelKind },

    // Orchestrator routing errors 2xxx
    #[error("no viable server path for {0:?}")]
    AllServersDown(crate::models::ModelKind),

    #[error("prefill call failed: status={status}, body={body}")]
    PrefillFailed { status: u16, body: String },

    #[error("decode call failed: status={status}, body={body}")]
    DecodeFailed { status: u16, body: String },

    #[error("timeout during {phase}")]
    Timeout { phase: &'static str },

    // Pipeline errors 3xxx
    #[error("deterministic validator unavailable: {0}")]
    DeterministicUnavailable(String),

    #[error("request cancelled")]
    Cancelled,

    // Configuration / startup errors 4xxx
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("rubric invalid: {0}")]
    InvalidRubric(String),

    // Generic wrappers 5xxx
    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn bad_param(message: impl Into<String>) -> Self {
        Self::BadParam(message.into())
    }

    pub fn error_code(&self) -> i32 {
        match self {
            Self::EngineUnavailable => 1001,
            Self::PromptTooLong => 1002,
            Self::Busy => 1003,
            Self::BadParam(_) => 1004,
            Self::ContextKindMismatch { .. } => 1005,

            Self::AllServersDown(_) => 2001,
            Self::PrefillFailed { .. } => 2002,
            Self::DecodeFailed { .. } => 2003,
            Self::Timeout { .. } => 2004,

            Self::DeterministicUnavailable(_) => 3001,
            Self::Cancelled => 3002,

            Self::Configuration(_) => 4001,
            Self::InvalidRubric(_) => 4002,

            Self::Internal(_) => 5001,
            Self::Other(_) => 5001,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let status = match &self {
            Self::EngineUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::PromptTooLong => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Busy => StatusCode::TOO_MANY_REQUESTS,
            Self::BadParam(_) => StatusCode::BAD_REQUEST,
            Self::ContextKindMismatch { .. } => StatusCode::CONFLICT,
            Self::AllServersDown(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::PrefillFailed { .. } | Self::DecodeFailed { .. } => StatusCode::BAD_GATEWAY,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::DeterministicUnavailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Cancelled => StatusCode::from_u16(499).unwrap(),
            Self::Configuration(_) | Self::InvalidRubric(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = self.to_string();
        let response = ApiErrorResponse { code, message, details: None };
        (status, Json(response)).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::internal(format!("JSON error: {}", err))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
