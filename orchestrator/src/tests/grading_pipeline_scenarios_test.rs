//! End-to-end scenarios driving a real `GradingPipeline` against echo-backed
//! prefill/decode servers over real HTTP.

use std::time::Duration;

use crate::models::{GenerationMethod, ModelKind};
use crate::services::GradingInput;
use crate::tests::common::*;

#[tokio::test]
async fn happy_path_both_models_succeed() {
    let code_prefill = spawn_prefill(ModelKind::CodeAnalysis, "code-prefill").await;
    let code_decode = spawn_decode(ModelKind::CodeAnalysis, "code-decode").await;
    let feedback_prefill = spawn_prefill(ModelKind::Feedback, "feedback-prefill").await;
    let feedback_decode = spawn_decode(ModelKind::Feedback, "feedback-decode").await;

    let orchestrator = build_orchestrator(RoutePorts {
        code_prefill: code_prefill.port,
        code_decode: code_decode.port,
        feedback_prefill: feedback_prefill.port,
        feedback_decode: feedback_decode.port,
    });
    wait_for_first_probe().await;

    let pipeline = build_pipeline(orchestrator, Duration::from_secs(10));
    let input =
        GradingInput { submission: sample_submission(), rubric: sample_rubric(), solution_outputs: vec!["42".to_string()] };

    let result = pipeline.grade(input).await.expect("grading succeeds");

    assert!((result.base_score - 100.0).abs() < 1e-9);
    assert!(result.layer_results.code_analysis.available);
    assert!(result.layer_results.feedback.available);
    assert_eq!(result.layer_results.output_compare.match_rate, Some(1.0));
    assert!(result.notice.is_none());
    assert_eq!(
        result.metrics.code_model.as_ref().unwrap().method,
        GenerationMethod::Disaggregated
    );
}

#[tokio::test]
async fn prefill_offline_falls_back_to_direct_decode() {
    let code_decode = spawn_decode(ModelKind::CodeAnalysis, "code-decode").await;
    let feedback_prefill = spawn_prefill(ModelKind::Feedback, "feedback-prefill").await;
    let feedback_decode = spawn_decode(ModelKind::Feedback, "feedback-decode").await;

    // No prefill server for CodeAnalysis: it stays at its default Offline
    // health status since nothing ever answers its probe.
    let orchestrator = build_orchestrator(RoutePorts {
        code_prefill: dead_port(),
        code_decode: code_decode.port,
        feedback_prefill: feedback_prefill.port,
        feedback_decode: feedback_decode.port,
    });
    wait_for_first_probe().await;

    let pipeline = build_pipeline(orchestrator, Duration::from_secs(10));
    let input =
        GradingInput { submission: sample_submission(), rubric: sample_rubric(), solution_outputs: vec!["42".to_string()] };

    let result = pipeline.grade(input).await.expect("grading still succeeds via fallback");

    let code_metrics = result.metrics.code_model.as_ref().expect("code model ran");
    assert_eq!(code_metrics.method, GenerationMethod::DirectFallback);
    assert_eq!(code_metrics.prefill_server, "none");
}

#[tokio::test]
async fn both_servers_down_for_a_model_kind_returns_all_servers_down() {
    let feedback_prefill = spawn_prefill(ModelKind::Feedback, "feedback-prefill").await;
    let feedback_decode = spawn_decode(ModelKind::Feedback, "feedback-decode").await;

    let orchestrator = build_orchestrator(RoutePorts {
        code_prefill: dead_port(),
        code_decode: dead_port(),
        feedback_prefill: feedback_prefill.port,
        feedback_decode: feedback_decode.port,
    });
    wait_for_first_probe().await;

    let err = orchestrator
        .generate(crate::models::GenerationRequest {
            prompt: "hello".to_string(),
            max_tokens: 8,
            temperature: 0.2,
            model_kind: ModelKind::CodeAnalysis,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, crate::utils::ApiError::AllServersDown(ModelKind::CodeAnalysis)));
}

#[tokio::test]
async fn pipeline_budget_exceeded_surfaces_as_timeout() {
    let code_prefill = spawn_prefill(ModelKind::CodeAnalysis, "code-prefill").await;
    let code_decode = spawn_decode(ModelKind::CodeAnalysis, "code-decode").await;
    let feedback_prefill = spawn_prefill(ModelKind::Feedback, "feedback-prefill").await;
    let feedback_decode = spawn_decode(ModelKind::Feedback, "feedback-decode").await;

    let orchestrator = build_orchestrator(RoutePorts {
        code_prefill: code_prefill.port,
        code_decode: code_decode.port,
        feedback_prefill: feedback_prefill.port,
        feedback_decode: feedback_decode.port,
    });
    wait_for_first_probe().await;

    // A budget shorter than the echo engine's simulated per-token latency
    // guarantees the outer timeout fires before both C3 flights complete.
    let pipeline = build_pipeline(orchestrator, Duration::from_nanos(1));
    let input =
        GradingInput { submission: sample_submission(), rubric: sample_rubric(), solution_outputs: vec!["42".to_string()] };

    let err = pipeline.grade(input).await.unwrap_err();
    assert!(matches!(err, crate::utils::ApiError::Timeout { phase: "pipeline" }));
}
