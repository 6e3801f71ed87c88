use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const GLOBAL_SECTION_ID: &str = "__global__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Pass,
    PartialCredit,
    Missing,
    Error,
    OutputMismatch,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Finding {
    pub section_id: String,
    pub kind: FindingKind,
    pub points_awarded: f64,
    pub max_points: f64,
    pub note: String,
}

impl Finding {
    pub fn global(kind: FindingKind, note: impl Into<String>) -> Self {
        Self {
            section_id: GLOBAL_SECTION_ID.to_string(),
            kind,
            points_awarded: 0.0,
            max_points: 0.0,
            note: note.into(),
        }
    }
}
