//! Service metrics collection
//!
//! Prometheus counters for commits, event fan-out, gate contention and
//! session lifecycle, rendered in text format for `GET /metrics`.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    pub balance_commits: IntCounter,
    pub balance_events_dispatched: IntCounter,
    pub gate_rejections: IntCounter,
    pub operations: IntCounterVec,
    pub sessions_active: IntGaugeVec,
    pub session_timeouts: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let balance_commits = IntCounter::new(
            "dicebank_balance_commits_total",
            "Balance writes committed by the mutation pipeline",
        )?;
        let balance_events_dispatched = IntCounter::new(
            "dicebank_balance_events_dispatched_total",
            "Balance events handed to subscribers",
        )?;
        let gate_rejections = IntCounter::new(
            "dicebank_gate_rejections_total",
            "Operations rejected because another one was in flight for the player",
        )?;
        let operations = IntCounterVec::new(
            Opts::new("dicebank_operations_total", "Money-moving operations by outcome"),
            &["operation", "outcome"],
        )?;
        let sessions_active = IntGaugeVec::new(
            Opts::new("dicebank_sessions_active", "Open streaming sessions"),
            &["endpoint"],
        )?;
        let session_timeouts = IntCounter::new(
            "dicebank_session_timeouts_total",
            "Sessions closed by the idle timer",
        )?;

        registry.register(Box::new(balance_commits.clone()))?;
        registry.register(Box::new(balance_events_dispatched.clone()))?;
        registry.register(Box::new(gate_rejections.clone()))?;
        registry.register(Box::new(operations.clone()))?;
        registry.register(Box::new(sessions_active.clone()))?;
        registry.register(Box::new(session_timeouts.clone()))?;

        Ok(Self {
            registry,
            balance_commits,
            balance_events_dispatched,
            gate_rejections,
            operations,
            sessions_active,
            session_timeouts,
        })
    }

    pub fn record_operation(&self, operation: &str, outcome: &str) {
        self.operations.with_label_values(&[operation, outcome]).inc();
    }

    /// Render every metric in Prometheus text format
    pub fn to_prometheus_format(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_render() {
        let metrics = Metrics::new().unwrap();
        metrics.balance_commits.inc();
        metrics.record_operation("deposit", "success");
        metrics.sessions_active.with_label_values(&["wallet"]).inc();

        let text = metrics.to_prometheus_format();
        assert!(text.contains("dicebank_balance_commits_total 1"));
        assert!(text.contains("operation=\"deposit\""));
        assert!(text.contains("dicebank_sessions_active{endpoint=\"wallet\"} 1"));
    }
}
