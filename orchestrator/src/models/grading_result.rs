use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Finding, GenerationMetrics};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OutputCellComparison {
    pub cell_index: usize,
    pub student_output: String,
    pub solution_output: String,
    pub similarity: f64,
    pub matched: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct DeterministicLayerResult {
    pub base_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct OutputCompareLayerResult {
    /// `None` when C5 was skipped or aborted (size/time guard, §4.5).
    pub match_rate: Option<f64>,
    pub comparisons: Vec<OutputCellComparison>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct NarrativeLayerResult {
    pub text: Option<String>,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct LayerResults {
    pub deterministic: DeterministicLayerResult,
    pub output_compare: OutputCompareLayerResult,
    pub code_analysis: NarrativeLayerResult,
    pub feedback: NarrativeLayerResult,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct ResultMetrics {
    pub code_model: Option<GenerationMetrics>,
    pub feedback_model: Option<GenerationMetrics>,
    pub total_wall_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GradingResult {
    pub final_score_0_100: f64,
    pub base_score: f64,
    pub adjustment: f64,
    pub layer_results: LayerResults,
    pub findings: Vec<Finding>,
    pub metrics: ResultMetrics,
    /// Set when one or more LLM layers failed; the deterministic score still
    /// stands (§7 user-visible behaviour).
    pub notice: Option<String>,
}
