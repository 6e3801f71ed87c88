//! Standalone C2 process: one decode server for one `ModelKind`, backed by
//! the echo reference engine (see `prefill_server.rs`).

use std::env;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Semaphore;
use tracing::info;

use grading_orchestrator::config::LoggingConfig;
use grading_orchestrator::engine::EchoEngine;
use grading_orchestrator::init_tracing;
use grading_orchestrator::models::ModelKind;
use grading_orchestrator::servers::decode::{router, DecodeState};

#[derive(Parser)]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    #[arg(long, default_value_t = 9002)]
    port: u16,
    #[arg(long, value_enum, default_value = "code-analysis")]
    model_kind: ModelKindArg,
    #[arg(long, default_value_t = 8)]
    in_flight: usize,
    #[arg(long, default_value = "decode")]
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

    let state = Arc::new(DecodeState {
        engine: Arc::new(EchoEngine::new(args.name.clone())),
        model_kind: args.model_kind.into(),
        backpressure: Arc::new(Semaphore::new(args.in_flight)),
    });

    let app = router(state);
    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr, name = %args.name, "decode server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
