use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::models::ModelKind;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub orchestrator: OrchestratorConfig,
    pub logging: LoggingConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// §6.3 orchestrator configuration document: the full set of prefill/decode
/// servers, per-server limits and call budgets.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub prefill_servers: Vec<ServerEntry>,
    pub decode_servers: Vec<ServerEntry>,
    pub per_server_in_flight: usize,
    #[serde(deserialize_with = "deserialize_duration_ms")]
    pub health_probe_interval_ms: u64,
    pub call_budgets_ms: CallBudgets,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    pub host: String,
    pub port: u16,
    pub model_kind: ModelKind,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CallBudgets {
    pub prefill: u64,
    pub decode: u64,
    pub health: u64,
    pub pipeline: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// Bounds for the concurrent work a grading request fans out into (§5).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Max concurrent C5 output-comparison jobs.
    pub output_compare_concurrency: usize,
    /// Max concurrent grading requests admitted to the pipeline at all.
    pub request_concurrency: usize,
    /// Back-pressure queue depth per ModelKind before ErrBusy (§5).
    pub backpressure_queue_depth: usize,
    pub match_threshold: f64,
}

impl Config {
    /// Loading order: config file, then `APP_*` environment overrides, then
    /// validation.
    pub fn load() -> Result<Self, anyhow::Error> {
        let mut config = if let Some(config_path) = Self::find_config_file() {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Same pipeline as `load()`, but reads an explicitly named file
    /// instead of searching the default candidate paths (used by `serve
    /// --config <file>`).
    pub fn load_from(path: &Path) -> Result<Self, anyhow::Error> {
        let mut config = Self::from_toml(path.to_str().ok_or_else(|| anyhow::anyhow!("non-utf8 config path"))?)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("APP_SERVER_HOST") {
            self.server.host = host;
            tracing::info!("override server.host from env: {}", self.server.host);
        }

        if let Ok(port) = std::env::var("APP_SERVER_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
                tracing::info!("override server.port from env: {}", self.server.port);
            }
        }

        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("override logging.level from env: {}", self.logging.level);
        }

        if let Ok(interval) = std::env::var("APP_HEALTH_PROBE_INTERVAL_MS") {
            match interval.parse() {
                Ok(val) => {
                    self.orchestrator.health_probe_interval_ms = val;
                    tracing::info!("override health_probe_interval_ms from env: {}", val);
                }
                Err(e) => tracing::warn!(
                    "invalid APP_HEALTH_PROBE_INTERVAL_MS '{}': {} (keeping {})",
                    interval,
                    e,
                    self.orchestrator.health_probe_interval_ms
                ),
            }
        }

        if let Ok(depth) = std::env::var("APP_BACKPRESSURE_QUEUE_DEPTH") {
            if let Ok(val) = depth.parse() {
                self.pipeline.backpressure_queue_depth = val;
                tracing::info!("override backpressure_queue_depth from env: {}", val);
            }
        }
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("server port cannot be 0");
        }

        for kind in [ModelKind::CodeAnalysis, ModelKind::Feedback] {
            let prefill_count =
                self.orchestrator.prefill_servers.iter().filter(|s| s.model_kind == kind).count();
            let decode_count =
                self.orchestrator.decode_servers.iter().filter(|s| s.model_kind == kind).count();
            if prefill_count != 1 {
                anyhow::bail!(
                    "expected exactly one prefill server for {:?}, found {}",
                    kind,
                    prefill_count
                );
            }
            if decode_count != 1 {
                anyhow::bail!(
                    "expected exactly one decode server for {:?}, found {}",
                    kind,
                    decode_count
                );
            }
        }

        if self.orchestrator.per_server_in_flight == 0 {
            anyhow::bail!("per_server_in_flight must be > 0");
        }
        if self.orchestrator.health_probe_interval_ms == 0 {
            anyhow::bail!("health_probe_interval_ms must be > 0");
        }
        if self.pipeline.output_compare_concurrency == 0 {
            anyhow::bail!("pipeline.output_compare_concurrency must be > 0");
        }
        if !(0.0..=1.0).contains(&self.pipeline.match_threshold) {
            anyhow::bail!("pipeline.match_threshold must be within [0,1]");
        }

        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            prefill_servers: Vec::new(),
            decode_servers: Vec::new(),
            per_server_in_flight: 8,
            health_probe_interval_ms: 10_000,
            call_budgets_ms: CallBudgets::default(),
        }
    }
}

impl Default for CallBudgets {
    fn default() -> Self {
        Self { prefill: 60_000, decode: 180_000, health: 2_000, pipeline: 300_000 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info,grading_orchestrator=debug".to_string(), file: None }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_compare_concurrency: 4,
            request_concurrency: 32,
            backpressure_queue_depth: 32,
            match_threshold: 0.80,
        }
    }
}

fn deserialize_duration_ms<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = u64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a number of milliseconds or a string like '10s', '2m'")
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v)
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if v >= 0 { Ok(v as u64) } else { Err(E::custom("negative not allowed")) }
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_ms(v).map_err(E::custom)
        }
        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_ms(&v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}

fn parse_duration_to_ms(input: &str) -> Result<u64, String> {
    if let Ok(val) = input.parse::<u64>() {
        return Ok(val);
    }
    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: u64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "ms" => Ok(n),
        "s" | "sec" | "secs" | "second" | "seconds" => Ok(n * 1000),
        "m" | "min" | "mins" | "minute" | "minutes" => Ok(n * 60_000),
        _ => Err(format!("unsupported unit: {}", unit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_fails_validation_without_servers() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn duration_parses_units() {
        assert_eq!(parse_duration_to_ms("10000").unwrap(), 10_000);
        assert_eq!(parse_duration_to_ms("10s").unwrap(), 10_000);
        assert_eq!(parse_duration_to_ms("2m").unwrap(), 120_000);
    }
}
