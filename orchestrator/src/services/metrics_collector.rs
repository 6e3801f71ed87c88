//! C7 — MetricsCollector: per-request counters and timing histograms, keyed
//! by (ModelKind, server). Thread-safe, no persistence.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

use crate::models::ModelKind;

#[derive(Default)]
struct ServerCounters {
    requests_total: AtomicU64,
    requests_failed: AtomicU64,
    decode_tokens_total: AtomicU64,
    prefill_tokens_total: AtomicU64,
    prefill_ms_samples: parking_lot_sum::Histogram,
    decode_ms_samples: parking_lot_sum::Histogram,
    end_to_end_ms_samples: parking_lot_sum::Histogram,
}

/// Minimal lock-free running-sum histogram: enough to report count/sum/max
/// without pulling in a full metrics crate for three numbers.
mod parking_lot_sum {
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    pub struct Histogram {
        count: AtomicU64,
        sum_ms: AtomicU64,
        max_ms: AtomicU64,
    }

    impl Histogram {
        pub fn record(&self, value_ms: u64) {
            self.count.fetch_add(1, Ordering::Relaxed);
            self.sum_ms.fetch_add(value_ms, Ordering::Relaxed);
            self.max_ms.fetch_max(value_ms, Ordering::Relaxed);
        }

        pub fn snapshot(&self) -> super::HistogramSnapshot {
            let count = self.count.load(Ordering::Relaxed);
            let sum_ms = self.sum_ms.load(Ordering::Relaxed);
            super::HistogramSnapshot {
                count,
                avg_ms: if count > 0 { sum_ms as f64 / count as f64 } else { 0.0 },
                max_ms: self.max_ms.load(Ordering::Relaxed),
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Default, utoipa::ToSchema)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub avg_ms: f64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, Serialize, Default, utoipa::ToSchema)]
pub struct ServerMetricsSnapshot {
    pub requests_total: u64,
    pub requests_failed: u64,
    pub decode_tokens_total: u64,
    pub prefill_tokens_total: u64,
    pub prefill_ms: HistogramSnapshot,
    pub decode_ms: HistogramSnapshot,
    pub end_to_end_ms: HistogramSnapshot,
}

#[derive(Debug, Clone, Serialize, Default, utoipa::ToSchema)]
pub struct MetricsSnapshot {
    pub by_server: std::collections::HashMap<String, ServerMetricsSnapshot>,
}

/// Thread-safe accumulator. `DashMap` gives per-key sharded locking so
/// concurrent requests across different `(ModelKind, server)` pairs don't
/// contend (teacher idiom: `dashmap` used wherever request-rate structures
/// need concurrent reads and writes without a single global mutex).
#[derive(Default)]
pub struct MetricsCollector {
    servers: DashMap<String, ServerCounters>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(model_kind: ModelKind, server: &str) -> String {
        format!("{}:{}", model_kind, server)
    }

    pub fn record_success(
        &self,
        model_kind: ModelKind,
        server: &str,
        prefill_ms: u64,
        decode_ms: u64,
        total_ms: u64,
        prompt_tokens: u32,
        completion_tokens: u32,
    ) {
        let entry = self.servers.entry(Self::key(model_kind, server)).or_default();
        entry.requests_total.fetch_add(1, Ordering::Relaxed);
        entry.prefill_tokens_total.fetch_add(prompt_tokens as u64, Ordering::Relaxed);
        entry.decode_tokens_total.fetch_add(completion_tokens as u64, Ordering::Relaxed);
        entry.prefill_ms_samples.record(prefill_ms);
        entry.decode_ms_samples.record(decode_ms);
        entry.end_to_end_ms_samples.record(total_ms);
    }

    pub fn record_failure(&self, model_kind: ModelKind, server: &str) {
        let entry = self.servers.entry(Self::key(model_kind, server)).or_default();
        entry.requests_total.fetch_add(1, Ordering::Relaxed);
        entry.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut by_server = std::collections::HashMap::new();
        for entry in self.servers.iter() {
            by_server.insert(
                entry.key().clone(),
                ServerMetricsSnapshot {
                    requests_total: entry.requests_total.load(Ordering::Relaxed),
                    requests_failed: entry.requests_failed.load(Ordering::Relaxed),
                    decode_tokens_total: entry.decode_tokens_total.load(Ordering::Relaxed),
                    prefill_tokens_total: entry.prefill_tokens_total.load(Ordering::Relaxed),
                    prefill_ms: entry.prefill_ms_samples.snapshot(),
                    decode_ms: entry.decode_ms_samples.snapshot(),
                    end_to_end_ms: entry.end_to_end_ms_samples.snapshot(),
                },
            );
        }
        MetricsSnapshot { by_server }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_counters_per_key() {
        let collector = MetricsCollector::new();
        collector.record_success(ModelKind::CodeAnalysis, "srv-1", 10, 20, 30, 5, 8);
        collector.record_success(ModelKind::CodeAnalysis, "srv-1", 12, 18, 30, 5, 8);
        collector.record_failure(ModelKind::Feedback, "srv-2");

        let snapshot = collector.snapshot();
        let code_analysis = &snapshot.by_server["code_analysis:srv-1"];
        assert_eq!(code_analysis.requests_total, 2);
        assert_eq!(code_analysis.prefill_tokens_total, 10);
        assert!((code_analysis.prefill_ms.avg_ms - 11.0).abs() < 1e-9);

        let feedback = &snapshot.by_server["feedback:srv-2"];
        assert_eq!(feedback.requests_failed, 1);
    }
}
