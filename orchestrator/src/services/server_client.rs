//! Thin HTTP client wrapping calls to a prefill or decode server instance.
//! Mirrors the outbound-client pattern used elsewhere in this codebase:
//! a shared, connection-pooled `reqwest::Client`, per-call timeouts, and
//! heavy `tracing` instrumentation around every request.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::ServerDescriptor;
use crate::utils::ApiError;

#[derive(Clone)]
pub struct ServerClient {
    http: reqwest::Client,
}

impl ServerClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .pool_max_idle_per_host(8)
                .build()
                .expect("reqwest client builds"),
        }
    }

    pub async fn health(&self, server: &ServerDescriptor, budget: Duration) -> HealthProbeResult {
        let url = format!("{}/health", server.base_url());
        debug!(server = %server, "probing health");

        match self.http.get(&url).timeout(budget).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<Value>().await {
                Ok(body) => {
                    let model_loaded = body.get("model_loaded").and_then(Value::as_bool).unwrap_or(false);
                    let healthy = body.get("state").and_then(Value::as_str) == Some("healthy");
                    HealthProbeResult { reachable: true, healthy: healthy && model_loaded }
                }
                Err(e) => {
                    warn!(server = %server, error = %e, "health probe returned unparsable body");
                    HealthProbeResult { reachable: true, healthy: false }
                }
            },
            Ok(resp) => {
                warn!(server = %server, status = %resp.status(), "health probe returned non-2xx");
                HealthProbeResult { reachable: true, healthy: false }
            }
            Err(e) => {
                warn!(server = %server, error = %e, "health probe unreachable");
                HealthProbeResult { reachable: false, healthy: false }
            }
        }
    }

    pub async fn post<Req, Resp>(
        &self,
        server: &ServerDescriptor,
        path: &str,
        body: &Req,
        budget: Duration,
    ) -> Result<Resp, PostError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", server.base_url(), path);
        debug!(server = %server, path, "issuing call");

        let resp = self
            .http
            .post(&url)
            .json(body)
            .timeout(budget)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { PostError::Timeout } else { PostError::Transport(e.to_string()) })?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(PostError::Status { status: status.as_u16(), body: body_text });
        }

        resp.json::<Resp>().await.map_err(|e| PostError::Transport(e.to_string()))
    }
}

impl Default for ServerClient {
    fn default() -> Self {
        Self::new()
    }
}

pub struct HealthProbeResult {
    pub reachable: bool,
    pub healthy: bool,
}

#[derive(Debug)]
pub enum PostError {
    Timeout,
    Transport(String),
    Status { status: u16, body: String },
}

impl PostError {
    pub fn into_prefill_error(self) -> ApiError {
        match self {
            PostError::Timeout => ApiError::Timeout { phase: "prefill" },
            PostError::Transport(msg) => ApiError::PrefillFailed { status: 0, body: msg },
            PostError::Status { status, body } => ApiError::PrefillFailed { status, body },
        }
    }

    pub fn into_decode_error(self) -> ApiError {
        match self {
            PostError::Timeout => ApiError::Timeout { phase: "decode" },
            PostError::Transport(msg) => ApiError::DecodeFailed { status: 0, body: msg },
            PostError::Status { status, body } => ApiError::DecodeFailed { status, body },
        }
    }
}
