//! Shared test fixtures: spin up echo-backed prefill/decode servers on
//! ephemeral ports and wire an `Orchestrator`/`GradingPipeline` against them.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::config::{CallBudgets, OrchestratorConfig, ServerEntry};
use crate::engine::EchoEngine;
use crate::models::{
    CellOutput, CodeCell, ModelKind, ParsedSubmission, Rubric, RubricSection, SectionKind,
};
use crate::servers::decode::{self, DecodeState};
use crate::servers::prefill::{self, PrefillState};
use crate::services::{GradingPipeline, MetricsCollector, Orchestrator};

pub struct SpawnedServer {
    pub port: u16,
}

pub async fn spawn_prefill(model_kind: ModelKind, name: &str) -> SpawnedServer {
    let state = Arc::new(PrefillState {
        engine: Arc::new(EchoEngine::new(name)),
        model_kind,
        backpressure: Arc::new(Semaphore::new(8)),
    });
    let app = prefill::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind prefill");
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    SpawnedServer { port }
}

pub async fn spawn_decode(model_kind: ModelKind, name: &str) -> SpawnedServer {
    let state = Arc::new(DecodeState {
        engine: Arc::new(EchoEngine::new(name)),
        model_kind,
        backpressure: Arc::new(Semaphore::new(8)),
    });
    let app = decode::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind decode");
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    SpawnedServer { port }
}

/// A port nothing listens on, standing in for a server that's down.
pub fn dead_port() -> u16 {
    1
}

pub struct RoutePorts {
    pub code_prefill: u16,
    pub code_decode: u16,
    pub feedback_prefill: u16,
    pub feedback_decode: u16,
}

pub fn build_orchestrator(ports: RoutePorts) -> Arc<Orchestrator> {
    let config = OrchestratorConfig {
        prefill_servers: vec![
            ServerEntry {
                host: "127.0.0.1".to_string(),
                port: ports.code_prefill,
                model_kind: ModelKind::CodeAnalysis,
                name: "code-prefill".to_string(),
            },
            ServerEntry {
                host: "127.0.0.1".to_string(),
                port: ports.feedback_prefill,
                model_kind: ModelKind::Feedback,
                name: "feedback-prefill".to_string(),
            },
        ],
        decode_servers: vec![
            ServerEntry {
                host: "127.0.0.1".to_string(),
                port: ports.code_decode,
                model_kind: ModelKind::CodeAnalysis,
                name: "code-decode".to_string(),
            },
            ServerEntry {
                host: "127.0.0.1".to_string(),
                port: ports.feedback_decode,
                model_kind: ModelKind::Feedback,
                name: "feedback-decode".to_string(),
            },
        ],
        per_server_in_flight: 8,
        health_probe_interval_ms: 30,
        call_budgets_ms: CallBudgets { prefill: 5_000, decode: 5_000, health: 500, pipeline: 10_000 },
    };
    let metrics = Arc::new(MetricsCollector::new());
    Arc::new(Orchestrator::new(&config, metrics).expect("routing table builds"))
}

/// Gives the background health prober time for its first tick to land.
pub async fn wait_for_first_probe() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

pub fn build_pipeline(orchestrator: Arc<Orchestrator>, pipeline_budget: Duration) -> GradingPipeline {
    GradingPipeline::new(orchestrator, 4, 0.80, pipeline_budget)
}

pub fn sample_rubric() -> Rubric {
    Rubric {
        assignment_id: "hw1".to_string(),
        total_points: 10.0,
        sections: vec![RubricSection {
            id: "core".to_string(),
            name: "Core analysis".to_string(),
            weight_fraction: 1.0,
            required_variables: ["result".to_string()].into_iter().collect(),
            required_functions: HashSet::new(),
            required_columns: HashSet::new(),
            kind: SectionKind::Code,
            points: 10.0,
            min_words: 50,
            expected_reflections: vec![],
        }],
        partial_credit_rules: vec![],
    }
}

pub fn sample_submission() -> ParsedSubmission {
    ParsedSubmission {
        code_cells: vec![CodeCell {
            source: "result = df['revenue'].sum()".to_string(),
            outputs: vec![CellOutput { text: "42".to_string() }],
        }],
        required_variables_present: ["result".to_string()].into_iter().collect(),
        ..Default::default()
    }
}
