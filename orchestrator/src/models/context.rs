use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// The KV hand-off payload. Opaque to the orchestrator: it is produced by a
/// prefill call and fed straight back into the paired decode call without
/// inspection (§3). Single-use — the orchestrator drops it once decode
/// returns.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ContextBlob(pub Value);

impl ContextBlob {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn into_inner(self) -> Value {
        self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}
