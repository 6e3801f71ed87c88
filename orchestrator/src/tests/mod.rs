pub mod common;
mod grading_pipeline_scenarios_test;
