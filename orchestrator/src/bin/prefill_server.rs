//! Standalone C1 process: one prefill server for one `ModelKind`, backed by
//! the echo reference engine. Real deployments would swap `EchoEngine` for a
//! GPU-backed implementation of `InferenceEngine` without touching the HTTP
//! surface below.

use std::env;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Semaphore;
use tracing::info;

use grading_orchestrator::config::LoggingConfig;
use grading_orchestrator::engine::EchoEngine;
use grading_orchestrator::init_tracing;
use grading_orchestrator::models::ModelKind;
use grading_orchestrator::servers::prefill::{router, PrefillState};

#[derive(Parser)]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    #[arg(long, default_value_t = 9001)]
    port: u16,
    #[arg(long, value_enum, default_value = "code-analysis")]
    model_kind: ModelKindArg,
    #[arg(long, default_value_t = 8)]
    in_flight: usize,
    #[arg(long, default_value = "prefill")]
    name: String,
}

#[derive(Clone, clap::ValueEnum)]
enum ModelKindArg {
    CodeAnalysis,
    Feedback,
}

impl From<ModelKindArg> for ModelKind {
    fn from(value: ModelKindArg) -> Self {
        match value {
            ModelKindArg::CodeAnalysis => ModelKind::CodeAnalysis,
            ModelKindArg::Feedback => ModelKind::Feedback,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _guard = init_tracing(&LoggingConfig {
        level: env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        file: None,
    });

    let state = Arc::new(PrefillState {
        engine: Arc::new(EchoEngine::new(args.name.clone())),
        model_kind: args.model_kind.into(),
        backpressure: Arc::new(Semaphore::new(args.in_flight)),
    });

    let app = router(state);
    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr, name = %args.name, "prefill server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
