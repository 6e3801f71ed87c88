pub mod context;
pub mod finding;
pub mod generation;
pub mod grading_result;
pub mod model_kind;
pub mod rubric;
pub mod server;
pub mod submission;

pub use context::ContextBlob;
pub use finding::{Finding, FindingKind, GLOBAL_SECTION_ID};
pub use generation::{GenerationMethod, GenerationMetrics, GenerationRequest, GenerationResponse};
pub use grading_result::{
    DeterministicLayerResult, GradingResult, LayerResults, NarrativeLayerResult,
    OutputCellComparison, OutputCompareLayerResult, ResultMetrics,
};
pub use model_kind::ModelKind;
pub use rubric::{Condition, Rubric, RubricSection, Rule, SectionKind};
pub use server::{HealthState, HealthStatus, ServerDescriptor, ServerRole};
pub use submission::{CellOutput, CodeCell, ParsedSubmission};
