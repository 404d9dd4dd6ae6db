use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use carepath_core::config::METRICS_LATENCY_SAMPLE_CAP;
use dashmap::DashMap;
use serde::Serialize;

/// In-process request counters backing `GET /metrics` (§4.11, §6).
///
/// Per-instance only — there is no cross-instance aggregation, matching the
/// correlation registry and push hub's own per-instance scope (§5).
pub struct Metrics {
    total_messages: AtomicU64,
    total_errors: AtomicU64,
    latencies_ms: Mutex<VecDeque<u64>>,
    intent_counts: DashMap<String, u64>,
}

#[derive(Debug, Serialize)]
pub struct Percentiles {
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            total_messages: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            latencies_ms: Mutex::new(VecDeque::with_capacity(METRICS_LATENCY_SAMPLE_CAP)),
            intent_counts: DashMap::new(),
        }
    }

    /// Record one completed `/chat` request.
    pub fn record_request(&self, intent: &str, elapsed_ms: u64, is_error: bool) {
        self.total_messages.fetch_add(1, Ordering::Relaxed);
        if is_error {
            self.total_errors.fetch_add(1, Ordering::Relaxed);
        }
        *self.intent_counts.entry(intent.to_string()).or_insert(0) += 1;

        let mut samples = self.latencies_ms.lock().unwrap();
        if samples.len() >= METRICS_LATENCY_SAMPLE_CAP {
            samples.pop_front();
        }
        samples.push_back(elapsed_ms);
    }

    pub fn total_messages(&self) -> u64 {
        self.total_messages.load(Ordering::Relaxed)
    }

    pub fn error_rate(&self) -> f64 {
        let total = self.total_messages();
        if total == 0 {
            return 0.0;
        }
        self.total_errors.load(Ordering::Relaxed) as f64 / total as f64
    }

    pub fn intent_distribution(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .intent_counts
            .iter()
            .map(|entry| (entry.key().clone(), serde_json::json!(*entry.value())))
            .collect();
        serde_json::Value::Object(map)
    }

    pub fn response_time_percentiles(&self) -> Percentiles {
        let mut samples: Vec<u64> = self.latencies_ms.lock().unwrap().iter().copied().collect();
        if samples.is_empty() {
            return Percentiles { p50_ms: 0, p95_ms: 0, p99_ms: 0 };
        }
        samples.sort_unstable();
        Percentiles {
            p50_ms: percentile(&samples, 0.50),
            p95_ms: percentile(&samples, 0.95),
            p99_ms: percentile(&samples, 0.99),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn percentile(sorted: &[u64], p: f64) -> u64 {
    let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_of_empty_samples_are_zero() {
        let metrics = Metrics::new();
        let p = metrics.response_time_percentiles();
        assert_eq!(p.p50_ms, 0);
    }

    #[test]
    fn records_accumulate_counts_and_intents() {
        let metrics = Metrics::new();
        metrics.record_request("appointment_booking", 50, false);
        metrics.record_request("appointment_booking", 80, true);
        assert_eq!(metrics.total_messages(), 2);
        assert!((metrics.error_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(metrics.intent_distribution()["appointment_booking"], 2);
    }

    #[test]
    fn latency_samples_are_capped() {
        let metrics = Metrics::new();
        for i in 0..(METRICS_LATENCY_SAMPLE_CAP + 10) {
            metrics.record_request("general_info", i as u64, false);
        }
        assert_eq!(metrics.latencies_ms.lock().unwrap().len(), METRICS_LATENCY_SAMPLE_CAP);
    }
}
