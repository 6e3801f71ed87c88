//! C3 — Orchestrator: routes one `GenerationRequest` to the configured
//! prefill/decode pair for its `ModelKind`, applying fallback and health
//! policy (§4.3).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::{CallBudgets, OrchestratorConfig};
use crate::models::{
    GenerationMethod, GenerationMetrics, GenerationRequest, GenerationResponse, HealthStatus,
    ModelKind, ServerDescriptor, ServerRole,
};
use crate::services::health_prober::{HealthProbeTask, HealthTable};
use crate::services::metrics_collector::MetricsCollector;
use crate::services::server_client::ServerClient;
use crate::servers::decode::{DecodeRequest, DecodeResponse, GenerateRequest, GenerateResponse};
use crate::servers::prefill::{PrefillRequest, PrefillResponse};
use crate::utils::{ApiError, ScheduledExecutor};

struct RoutePair {
    prefill: ServerDescriptor,
    decode: ServerDescriptor,
    /// Per-server in-flight caps (§5); shared across calls routed to the
    /// same server.
    prefill_inflight: Arc<Semaphore>,
    decode_inflight: Arc<Semaphore>,
}

pub struct Orchestrator {
    routes: HashMap<ModelKind, RoutePair>,
    client: ServerClient,
    health: HealthTable,
    metrics: Arc<MetricsCollector>,
    budgets: CallBudgets,
    prober_shutdown: Arc<AtomicBool>,
}

impl Orchestrator {
    /// Builds the routing table from the configuration document (§6.3),
    /// spawning the background health prober. Fails fast if a `ModelKind`
    /// does not have exactly one prefill and one decode server configured.
    pub fn new(config: &OrchestratorConfig, metrics: Arc<MetricsCollector>) -> Result<Self, ApiError> {
        let mut routes = HashMap::new();
        let mut all_servers = Vec::new();

        for kind in [ModelKind::CodeAnalysis, ModelKind::Feedback] {
            let prefill_entry = config
                .prefill_servers
                .iter()
                .find(|s| s.model_kind == kind)
                .ok_or_else(|| ApiError::Configuration(format!("no prefill server for {:?}", kind)))?;
            let decode_entry = config
                .decode_servers
                .iter()
                .find(|s| s.model_kind == kind)
                .ok_or_else(|| ApiError::Configuration(format!("no decode server for {:?}", kind)))?;

            let prefill = ServerDescriptor {
                host: prefill_entry.host.clone(),
                port: prefill_entry.port,
                model_kind: kind,
                role: ServerRole::Prefill,
                display_name: prefill_entry.name.clone(),
            };
            let decode = ServerDescriptor {
                host: decode_entry.host.clone(),
                port: decode_entry.port,
                model_kind: kind,
                role: ServerRole::Decode,
                display_name: decode_entry.name.clone(),
            };

            all_servers.push(prefill.clone());
            all_servers.push(decode.clone());

            routes.insert(
                kind,
                RoutePair {
                    prefill,
                    decode,
                    prefill_inflight: Arc::new(Semaphore::new(config.per_server_in_flight)),
                    decode_inflight: Arc::new(Semaphore::new(config.per_server_in_flight)),
                },
            );
        }

        let client = ServerClient::new();
        let health = HealthTable::new();
        let budgets = config.call_budgets_ms.clone();

        let prober = HealthProbeTask::new(
            all_servers,
            client.clone(),
            health.clone(),
            Duration::from_millis(budgets.health),
        );
        let prober_shutdown = prober.shutdown_handle();
        let executor =
            ScheduledExecutor::new("health-probe", Duration::from_millis(config.health_probe_interval_ms));
        tokio::spawn(async move {
            executor.start(prober).await;
        });

        Ok(Self { routes, client, health, metrics, budgets, prober_shutdown })
    }

    /// §4.3 public contract: `generate`.
    pub async fn generate(&self, req: GenerationRequest) -> Result<GenerationResponse, ApiError> {
        req.validate().map_err(ApiError::bad_param)?;

        let route = self.routes.get(&req.model_kind).ok_or_else(|| {
            ApiError::Configuration(format!("no route configured for {:?}", req.model_kind))
        })?;

        let prefill_status = self.health.status(&route.prefill);
        let decode_status = self.health.status(&route.decode);

        let start = Instant::now();

        let result = if prefill_status.state.is_usable() {
            self.generate_disaggregated(route, &req, prefill_status).await
        } else if decode_status.state.is_usable() {
            warn!(model_kind = %req.model_kind, "prefill offline, falling back to direct decode");
            self.generate_fallback(route, &req).await
        } else {
            Err(ApiError::AllServersDown(req.model_kind))
        };

        match &result {
            Ok(resp) => {
                self.metrics.record_success(
                    req.model_kind,
                    &route.decode.display_name,
                    resp.metrics.prefill_ms,
                    resp.metrics.decode_ms,
                    start.elapsed().as_millis() as u64,
                    resp.metrics.prompt_tokens,
                    resp.metrics.completion_tokens,
                );
            }
            Err(_) => {
                self.metrics.record_failure(req.model_kind, &route.decode.display_name);
            }
        }

        result
    }

    async fn generate_disaggregated(
        &self,
        route: &RoutePair,
        req: &GenerationRequest,
        _prefill_status: HealthStatus,
    ) -> Result<GenerationResponse, ApiError> {
        let Ok(_permit) = route.prefill_inflight.clone().try_acquire_owned() else {
            return Err(ApiError::Busy);
        };

        let prefill_body = PrefillRequest { prompt: req.prompt.clone() };
        let prefill_resp: PrefillResponse = self
            .client
            .post(&route.prefill, "/prefill", &prefill_body, Duration::from_millis(self.budgets.prefill))
            .await
            .map_err(|e| e.into_prefill_error())?;

        let Ok(_decode_permit) = route.decode_inflight.clone().try_acquire_owned() else {
            return Err(ApiError::Busy);
        };

        let decode_body = DecodeRequest {
            context: prefill_resp.context,
            prompt: req.prompt.clone(),
            max_tokens: req.max_tokens,
            temperature: req.temperature,
        };
        let decode_resp: DecodeResponse = self
            .client
            .post(&route.decode, "/decode", &decode_body, Duration::from_millis(self.budgets.decode))
            .await
            .map_err(|e| e.into_decode_error())?;

        let total_ms = prefill_resp.prefill_ms + decode_resp.decode_ms;
        Ok(GenerationResponse {
            text: decode_resp.text,
            metrics: GenerationMetrics {
                prefill_ms: prefill_resp.prefill_ms,
                decode_ms: decode_resp.decode_ms,
                total_ms,
                prompt_tokens: prefill_resp.prompt_tokens,
                completion_tokens: decode_resp.completion_tokens,
                prefill_tok_per_s: prefill_resp.prefill_tok_per_s,
                decode_tok_per_s: decode_resp.decode_tok_per_s,
                prefill_server: route.prefill.display_name.clone(),
                decode_server: route.decode.display_name.clone(),
                method: GenerationMethod::Disaggregated,
            },
        })
    }

    async fn generate_fallback(
        &self,
        route: &RoutePair,
        req: &GenerationRequest,
    ) -> Result<GenerationResponse, ApiError> {
        let Ok(_permit) = route.decode_inflight.clone().try_acquire_owned() else {
            return Err(ApiError::Busy);
        };

        let body = GenerateRequest {
            prompt: req.prompt.clone(),
            max_tokens: req.max_tokens,
            temperature: req.temperature,
        };
        let resp: GenerateResponse = self
            .client
            .post(&route.decode, "/generate", &body, Duration::from_millis(self.budgets.decode))
            .await
            .map_err(|e| e.into_decode_error())?;

        let prompt_tokens = req.prompt.split_whitespace().count() as u32;
        Ok(GenerationResponse {
            text: resp.text,
            metrics: GenerationMetrics {
                prefill_ms: 0,
                decode_ms: resp.decode_ms,
                total_ms: resp.decode_ms,
                prompt_tokens,
                completion_tokens: resp.completion_tokens,
                prefill_tok_per_s: 0.0,
                decode_tok_per_s: if resp.decode_ms > 0 {
                    resp.completion_tokens as f64 / (resp.decode_ms as f64 / 1000.0)
                } else {
                    0.0
                },
                prefill_server: "none".to_string(),
                decode_server: route.decode.display_name.clone(),
                method: GenerationMethod::DirectFallback,
            },
        })
    }

    /// §4.3: returns cached statuses, never blocks on a fresh probe.
    pub fn health(&self) -> HashMap<String, HealthStatus> {
        let mut servers = Vec::new();
        for route in self.routes.values() {
            servers.push(route.prefill.clone());
            servers.push(route.decode.clone());
        }
        self.health.snapshot(&servers)
    }

    pub fn close(&self) {
        info!("stopping orchestrator health probes");
        self.prober_shutdown.store(true, Ordering::Relaxed);
    }
}
