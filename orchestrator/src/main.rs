use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dashmap::DashMap;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use grading_orchestrator::config::Config;
use grading_orchestrator::handlers::grade::{self, AppState, RubricEntry};
use grading_orchestrator::services::{GradingPipeline, MetricsCollector, Orchestrator};
use grading_orchestrator::{init_tracing, rubric_loader, submission_loader};

#[derive(Parser)]
#[command(name = "grading-orchestrator", about = "Disaggregated inference orchestration core")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator and grading pipeline behind an HTTP endpoint.
    Serve {
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory of `<rubric_id>.json` rubric files, loaded at startup.
        #[arg(long, default_value = "rubrics")]
        rubrics_dir: PathBuf,
    },
    /// One-shot mode: grade a single submission and print the result.
    Grade {
        #[arg(long)]
        submission: PathBuf,
        #[arg(long)]
        rubric: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::from(3);
        }
    };

    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Commands::Serve { config, rubrics_dir } => run_serve(config, rubrics_dir).await,
        Commands::Grade { submission, rubric } => run_grade(submission, rubric).await,
    }
}

async fn run_serve(config_path: Option<PathBuf>, rubrics_dir: PathBuf) -> ExitCode {
    let config = match config_path {
        Some(path) => Config::load_from(&path),
        None => Config::load(),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    let _log_guard = init_tracing(&config.logging);
    info!(port = config.server.port, "starting grading orchestrator");

    let metrics = Arc::new(MetricsCollector::new());
    let orchestrator = match Orchestrator::new(&config.orchestrator, metrics.clone()) {
        Ok(o) => Arc::new(o),
        Err(e) => {
            error!(error = %e, "failed to build orchestrator routing table");
            return ExitCode::from(1);
        }
    };

    // Give the first health probe a chance to run before deciding whether
    // every server is down at startup (§6.5 exit code 2).
    tokio::time::sleep(std::time::Duration::from_millis(
        config.orchestrator.health_probe_interval_ms.min(2_000),
    ))
    .await;

    if orchestrator.health().values().all(|s| !s.state.is_usable()) {
        error!("all configured servers are down at startup");
        return ExitCode::from(2);
    }

    let rubrics = DashMap::new();
    if let Err(e) = load_rubrics_dir(&rubrics_dir, &rubrics) {
        error!(error = %e, "failed to load rubrics directory");
        return ExitCode::from(1);
    }

    let pipeline = Arc::new(GradingPipeline::new(
        orchestrator.clone(),
        config.pipeline.output_compare_concurrency,
        config.pipeline.match_threshold,
        std::time::Duration::from_millis(config.orchestrator.call_budgets_ms.pipeline),
    ));

    let state = Arc::new(AppState { pipeline, orchestrator: orchestrator.clone(), metrics, rubrics });

    let app = axum::Router::new()
        .route("/grade", axum::routing::post(grade::grade))
        .route("/health", axum::routing::get(grade::health))
        .route("/metrics", axum::routing::get(grade::metrics))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, addr, "failed to bind");
            return ExitCode::from(3);
        }
    };

    info!(addr, "listening");
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server error");
        orchestrator.close();
        return ExitCode::from(3);
    }

    orchestrator.close();
    ExitCode::SUCCESS
}

async fn run_grade(submission_path: PathBuf, rubric_path: PathBuf) -> ExitCode {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };
    let _log_guard = init_tracing(&config.logging);

    let metrics = Arc::new(MetricsCollector::new());
    let orchestrator = match Orchestrator::new(&config.orchestrator, metrics) {
        Ok(o) => Arc::new(o),
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };

    let rubric = match rubric_loader::load_rubric(&rubric_path) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("rubric error: {e}");
            return ExitCode::from(1);
        }
    };
    let submission = match submission_loader::load_submission(&submission_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("submission error: {e}");
            return ExitCode::from(1);
        }
    };

    let pipeline = GradingPipeline::new(
        orchestrator.clone(),
        config.pipeline.output_compare_concurrency,
        config.pipeline.match_threshold,
        std::time::Duration::from_millis(config.orchestrator.call_budgets_ms.pipeline),
    );

    let input = grading_orchestrator::services::GradingInput { submission, rubric, solution_outputs: vec![] };
    match pipeline.grade(input).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result).unwrap());
            orchestrator.close();
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("grading failed: {e}");
            orchestrator.close();
            ExitCode::from(3)
        }
    }
}

fn load_rubrics_dir(dir: &std::path::Path, rubrics: &DashMap<String, RubricEntry>) -> anyhow::Result<()> {
    if !dir.exists() {
        info!(dir = %dir.display(), "rubrics directory not found, starting with none loaded");
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let rubric = rubric_loader::load_rubric(&path).map_err(|e| anyhow::anyhow!("{e}"))?;
        let id = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
        rubrics.insert(id, RubricEntry { rubric, solution_outputs: vec![] });
    }
    Ok(())
}

#[derive(OpenApi)]
#[openapi(paths(grade::grade, grade::health, grade::metrics))]
struct ApiDoc;
