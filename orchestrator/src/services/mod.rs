pub mod deterministic_validator;
pub mod grading_pipeline;
pub mod health_prober;
pub mod metrics_collector;
pub mod orchestrator;
pub mod output_comparator;
pub mod server_client;

pub use deterministic_validator::{DeterministicResult, DeterministicValidator};
pub use grading_pipeline::{GradingInput, GradingPipeline};
pub use health_prober::{HealthProbeTask, HealthTable};
pub use metrics_collector::{MetricsCollector, MetricsSnapshot};
pub use orchestrator::Orchestrator;
pub use output_comparator::{OutputCompareResult, OutputComparator};
