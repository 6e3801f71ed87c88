//! C6 — GradingPipeline: drives C4, C5, and two C3 flights, blends their
//! results under the policy in §4.5/§4.6, and assembles the final
//! `GradingResult`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::models::{
    DeterministicLayerResult, Finding, FindingKind, GenerationMethod, GenerationRequest,
    GradingResult, LayerResults, ModelKind, NarrativeLayerResult, OutputCompareLayerResult,
    ParsedSubmission, ResultMetrics, Rubric,
};
use crate::services::deterministic_validator::DeterministicValidator;
use crate::services::orchestrator::Orchestrator;
use crate::services::output_comparator::OutputComparator;
use crate::utils::ApiError;

pub struct GradingInput {
    pub submission: ParsedSubmission,
    pub rubric: Rubric,
    pub solution_outputs: Vec<String>,
}

pub struct GradingPipeline {
    validator: DeterministicValidator,
    comparator: OutputComparator,
    orchestrator: Arc<Orchestrator>,
    output_compare_semaphore: Arc<Semaphore>,
    pipeline_budget: Duration,
    max_tokens: u32,
}

impl GradingPipeline {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        output_compare_concurrency: usize,
        match_threshold: f64,
        pipeline_budget: Duration,
    ) -> Self {
        Self {
            validator: DeterministicValidator::new(),
            comparator: OutputComparator::new(match_threshold),
            orchestrator,
            output_compare_semaphore: Arc::new(Semaphore::new(output_compare_concurrency)),
            pipeline_budget,
            max_tokens: 512,
        }
    }

    pub async fn grade(&self, input: GradingInput) -> Result<GradingResult, ApiError> {
        tokio::time::timeout(self.pipeline_budget, self.grade_inner(input))
            .await
            .map_err(|_| ApiError::Timeout { phase: "pipeline" })?
    }

    async fn grade_inner(&self, input: GradingInput) -> Result<GradingResult, ApiError> {
        let start = Instant::now();
        let GradingInput { submission, rubric, solution_outputs } = input;

        // 1. C4 runs synchronously; its findings seed the LLM prompts.
        let deterministic = self.validator.evaluate(&rubric, &submission);

        let code_prompt = build_prompt(&rubric, &submission, &deterministic.findings, ModelKind::CodeAnalysis);
        let feedback_prompt = build_prompt(&rubric, &submission, &deterministic.findings, ModelKind::Feedback);

        // 2-4. C5 and the two C3 flights run concurrently; a failure in any
        // one must not abort the others (§4.6 step 5).
        let (compare_result, code_result, feedback_result) = tokio::join!(
            self.run_output_compare(&submission, &solution_outputs),
            self.run_generation(ModelKind::CodeAnalysis, code_prompt),
            self.run_generation(ModelKind::Feedback, feedback_prompt),
        );

        let mut findings = deterministic.findings.clone();
        let mut notice = None;

        let output_compare = match compare_result {
            Ok(result) => OutputCompareLayerResult { match_rate: result.match_rate, comparisons: result.comparisons },
            Err(e) => {
                warn!(error = %e, "output comparator failed");
                findings.push(Finding::global(FindingKind::Error, format!("output comparison unavailable: {e}")));
                notice = Some("output comparison unavailable".to_string());
                OutputCompareLayerResult::default()
            }
        };

        let (code_analysis, code_metrics) = match code_result {
            Ok(resp) => (NarrativeLayerResult { text: Some(resp.text), available: true }, Some(resp.metrics)),
            Err(e) => {
                warn!(error = %e, "code-analysis generation failed");
                findings.push(Finding::global(FindingKind::Error, format!("code-analysis model unavailable: {e}")));
                notice = Some("narrative feedback partially unavailable".to_string());
                (NarrativeLayerResult::default(), None)
            }
        };

        let (feedback, feedback_metrics) = match feedback_result {
            Ok(resp) => (NarrativeLayerResult { text: Some(resp.text), available: true }, Some(resp.metrics)),
            Err(e) => {
                warn!(error = %e, "feedback generation failed");
                findings.push(Finding::global(FindingKind::Error, format!("feedback model unavailable: {e}")));
                notice = Some("narrative feedback partially unavailable".to_string());
                (NarrativeLayerResult::default(), None)
            }
        };

        // 6. Blend: base score, then bounded output-comparison adjustment.
        let base_score = deterministic.base_score;
        let adjustment = output_compare
            .match_rate
            .map(|rate| adjustment_for_match_rate(rate, base_score))
            .unwrap_or(0.0);

        let final_score_0_100 = (base_score + adjustment).clamp(0.0, 100.0);

        info!(
            base_score,
            adjustment,
            final_score_0_100,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "grading pipeline completed"
        );

        Ok(GradingResult {
            final_score_0_100,
            base_score,
            adjustment,
            layer_results: LayerResults {
                deterministic: DeterministicLayerResult { base_score },
                output_compare,
                code_analysis,
                feedback,
            },
            findings,
            metrics: ResultMetrics {
                code_model: code_metrics,
                feedback_model: feedback_metrics,
                total_wall_ms: start.elapsed().as_millis() as u64,
            },
            notice,
        })
    }

    async fn run_output_compare(
        &self,
        submission: &ParsedSubmission,
        solution_outputs: &[String],
    ) -> Result<crate::services::output_comparator::OutputCompareResult, ApiError> {
        let _permit = self
            .output_compare_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ApiError::internal("output comparator semaphore closed"))?;
        Ok(self.comparator.compare(submission, solution_outputs))
    }

    async fn run_generation(
        &self,
        model_kind: ModelKind,
        prompt: String,
    ) -> Result<crate::models::GenerationResponse, ApiError> {
        self.orchestrator
            .generate(GenerationRequest { prompt, max_tokens: self.max_tokens, temperature: 0.2, model_kind })
            .await
    }
}

/// §4.5 score adjustment policy table. Returns a signed adjustment already
/// bounded by `|adjustment| <= 0.5 * base_score` and gated on
/// `base_score >= 30` (§3 invariants).
fn adjustment_for_match_rate(match_rate: f64, base_score: f64) -> f64 {
    if base_score < 30.0 {
        return 0.0;
    }

    let raw = if match_rate >= 0.90 {
        0.0
    } else if match_rate >= 0.75 {
        -5.0
    } else if match_rate >= 0.60 {
        -10.0
    } else if match_rate >= 0.40 {
        -15.0
    } else {
        // Cap final score at 50 rather than a flat subtraction.
        return (50.0 - base_score).min(0.0).max(-0.5 * base_score);
    };

    raw.max(-0.5 * base_score)
}

fn build_prompt(
    rubric: &Rubric,
    submission: &ParsedSubmission,
    findings: &[Finding],
    model_kind: ModelKind,
) -> String {
    let findings_summary = findings
        .iter()
        .map(|f| format!("- [{:?}] {}: {}", f.kind, f.section_id, f.note))
        .collect::<Vec<_>>()
        .join("\n");

    match model_kind {
        ModelKind::CodeAnalysis => format!(
            "Assignment: {}\nReview the submitted code cells for quality issues.\nDeterministic findings:\n{}\nCode cells: {}",
            rubric.assignment_id,
            findings_summary,
            submission.code_cells.len()
        ),
        ModelKind::Feedback => format!(
            "Assignment: {}\nWrite constructive narrative feedback for the student.\nDeterministic findings:\n{}",
            rubric.assignment_id, findings_summary
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjustment_suppressed_on_failing_work() {
        assert_eq!(adjustment_for_match_rate(0.10, 12.0), 0.0);
    }

    #[test]
    fn adjustment_bounded_by_half_base_score() {
        let adj = adjustment_for_match_rate(0.20, 40.0);
        assert!(adj >= -0.5 * 40.0);
    }

    #[test]
    fn high_match_rate_has_no_adjustment() {
        assert_eq!(adjustment_for_match_rate(0.95, 80.0), 0.0);
    }

    #[test]
    fn mid_match_rate_applies_fixed_penalty() {
        assert_eq!(adjustment_for_match_rate(0.80, 80.0), -5.0);
    }
}
