use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{GradingResult, HealthStatus, Rubric};
use crate::services::{GradingInput, GradingPipeline, MetricsCollector, MetricsSnapshot, Orchestrator};
use crate::submission_loader;
use crate::utils::ApiError;

pub struct RubricEntry {
    pub rubric: Rubric,
    pub solution_outputs: Vec<String>,
}

pub struct AppState {
    pub pipeline: Arc<GradingPipeline>,
    pub orchestrator: Arc<Orchestrator>,
    pub metrics: Arc<MetricsCollector>,
    pub rubrics: DashMap<String, RubricEntry>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GradeRequest {
    pub submission_ref: String,
    pub rubric_id: String,
}

#[utoipa::path(
    post,
    path = "/grade",
    request_body = GradeRequest,
    responses((status = 200, body = GradingResult))
)]
pub async fn grade(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GradeRequest>,
) -> Result<Json<GradingResult>, ApiError> {
    let entry = state
        .rubrics
        .get(&req.rubric_id)
        .ok_or_else(|| ApiError::bad_param(format!("unknown rubric_id: {}", req.rubric_id)))?;

    let submission = submission_loader::load_submission(std::path::Path::new(&req.submission_ref))?;

    let input = GradingInput {
        submission,
        rubric: entry.rubric.clone(),
        solution_outputs: entry.solution_outputs.clone(),
    };
    drop(entry);

    let result = state.pipeline.grade(input).await?;
    Ok(Json(result))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthSnapshotResponse {
    pub servers: std::collections::HashMap<String, HealthStatus>,
}

#[utoipa::path(get, path = "/health", responses((status = 200, body = HealthSnapshotResponse)))]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthSnapshotResponse> {
    Json(HealthSnapshotResponse { servers: state.orchestrator.health() })
}

#[utoipa::path(get, path = "/metrics", responses((status = 200, body = MetricsSnapshot)))]
pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
