use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ModelKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ServerRole {
    Prefill,
    Decode,
}

/// Static, startup-immutable description of one prefill or decode instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ServerDescriptor {
    pub host: String,
    pub port: u16,
    pub model_kind: ModelKind,
    pub role: ServerRole,
    pub display_name: String,
}

impl ServerDescriptor {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn key(&self) -> String {
        format!("{}:{}:{:?}", self.host, self.port, self.role)
    }
}

impl std::fmt::Display for ServerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}:{})", self.display_name, self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    /// Reserved for a future partial-health signal; treated as Healthy.
    Degraded,
    Offline,
}

impl HealthState {
    pub fn is_usable(&self) -> bool {
        !matches!(self, HealthState::Offline)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthStatus {
    pub state: HealthState,
    pub last_checked: DateTime<Utc>,
    pub model_loaded: bool,
}

impl HealthStatus {
    pub fn unknown() -> Self {
        Self { state: HealthState::Offline, last_checked: Utc::now(), model_loaded: false }
    }
}
