//! Background health probing (§4.3, §5). Runs on a `ScheduledExecutor`
//! rather than a bare `tokio::spawn` loop — the same shape this codebase
//! uses for its own periodic refresh jobs.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{info, warn};

use crate::models::{HealthState, HealthStatus, ServerDescriptor};
use crate::services::server_client::ServerClient;
use crate::utils::ScheduledTask;

struct HealthEntry {
    status: std::sync::RwLock<HealthStatus>,
    consecutive_failures: AtomicU32,
}

impl Default for HealthEntry {
    fn default() -> Self {
        Self { status: std::sync::RwLock::new(HealthStatus::unknown()), consecutive_failures: AtomicU32::new(0) }
    }
}

/// Shared, concurrently-read/written health cache. Probers are the sole
/// writers; `generate()` calls are readers that never block on a fresh
/// probe (§4.3).
#[derive(Default, Clone)]
pub struct HealthTable {
    entries: Arc<DashMap<String, HealthEntry>>,
}

impl HealthTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, server: &ServerDescriptor) -> HealthStatus {
        self.entries.entry(server.key()).or_default().status.read().unwrap().clone()
    }

    pub fn snapshot(&self, servers: &[ServerDescriptor]) -> HashMap<String, HealthStatus> {
        servers.iter().map(|s| (s.key(), self.status(s))).collect()
    }

    fn record(&self, server: &ServerDescriptor, reachable: bool, healthy: bool) {
        let entry = self.entries.entry(server.key()).or_default();
        let mut status = entry.status.write().unwrap();

        if healthy {
            entry.consecutive_failures.store(0, Ordering::Relaxed);
            let was_offline = status.state == HealthState::Offline;
            status.state = HealthState::Healthy;
            status.model_loaded = true;
            status.last_checked = chrono::Utc::now();
            if was_offline {
                info!(server = %server, "server restored to healthy after 1 success");
            }
        } else {
            let failures = entry.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
            status.last_checked = chrono::Utc::now();
            status.model_loaded = reachable && status.model_loaded;
            if failures >= 3 && status.state != HealthState::Offline {
                status.state = HealthState::Offline;
                warn!(server = %server, failures, "server marked offline after 3 consecutive failures");
            }
        }
    }
}

pub struct HealthProbeTask {
    servers: Vec<ServerDescriptor>,
    client: ServerClient,
    table: HealthTable,
    budget: Duration,
    shutdown: Arc<AtomicBool>,
}

impl HealthProbeTask {
    pub fn new(
        servers: Vec<ServerDescriptor>,
        client: ServerClient,
        table: HealthTable,
        budget: Duration,
    ) -> Self {
        Self { servers, client, table, budget, shutdown: Arc::new(AtomicBool::new(false)) }
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    async fn probe_all(&self) {
        let probes = self.servers.iter().map(|server| {
            let client = self.client.clone();
            let budget = self.budget;
            async move {
                let result = client.health(server, budget).await;
                (server.clone(), result)
            }
        });

        let results = futures_join_all(probes).await;
        for (server, result) in results {
            self.table.record(&server, result.reachable, result.healthy);
        }
    }
}

/// Local stand-in for `futures::future::join_all` so the crate does not pull
/// in the whole `futures` family for one combinator.
async fn futures_join_all<F, T>(iter: impl IntoIterator<Item = F>) -> Vec<T>
where
    F: Future<Output = T>,
{
    let handles: Vec<F> = iter.into_iter().collect();
    let mut out = Vec::with_capacity(handles.len());
    for handle in handles {
        out.push(handle.await);
    }
    out
}

impl ScheduledTask for HealthProbeTask {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(async move {
            self.probe_all().await;
            Ok(())
        })
    }

    fn should_terminate(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelKind;

    fn descriptor() -> ServerDescriptor {
        ServerDescriptor {
            host: "127.0.0.1".to_string(),
            port: 1,
            model_kind: ModelKind::CodeAnalysis,
            role: crate::models::ServerRole::Prefill,
            display_name: "test".to_string(),
        }
    }

    #[test]
    fn three_failures_mark_offline() {
        let table = HealthTable::new();
        let server = descriptor();
        table.record(&server, true, false);
        assert_eq!(table.status(&server).state, HealthState::Offline); // initial state already Offline
        table.record(&server, true, true);
        assert_eq!(table.status(&server).state, HealthState::Healthy);
        table.record(&server, true, false);
        table.record(&server, true, false);
        assert_eq!(table.status(&server).state, HealthState::Healthy);
        table.record(&server, true, false);
        assert_eq!(table.status(&server).state, HealthState::Offline);
    }

    #[test]
    fn one_success_restores_healthy() {
        let table = HealthTable::new();
        let server = descriptor();
        table.record(&server, true, false);
        table.record(&server, true, false);
        table.record(&server, true, false);
        assert_eq!(table.status(&server).state, HealthState::Offline);
        table.record(&server, true, true);
        assert_eq!(table.status(&server).state, HealthState::Healthy);
    }
}
