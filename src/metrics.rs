use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::sync::Arc;
use std::time::Duration;

pub const OUTCOME_UNMATCHED: &str = "unmatched";
pub const OUTCOME_DELIVERED: &str = "delivered";
pub const OUTCOME_FAILED: &str = "failed";

/// Per-processor outcome metrics, tagged by bridge and processor id
pub struct ExecutorMetrics {
    pub events_total: IntCounterVec,
    pub action_duration: HistogramVec,
    pub registry: Registry,
}

impl ExecutorMetrics {
    pub fn new() -> crate::Result<Arc<Self>> {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> crate::Result<Arc<Self>> {
        let events_total = IntCounterVec::new(
            Opts::new(
                "processor_events_total",
                "Events evaluated by a processor, by outcome",
            ),
            &["bridge_id", "processor_id", "outcome"],
        )?;

        let action_duration = HistogramVec::new(
            HistogramOpts::new(
                "processor_action_duration_seconds",
                "Latency of action invocations",
            ),
            &["bridge_id", "processor_id"],
        )?;

        registry.register(Box::new(events_total.clone()))?;
        registry.register(Box::new(action_duration.clone()))?;

        Ok(Arc::new(Self {
            events_total,
            action_duration,
            registry,
        }))
    }

    pub fn record_outcome(&self, bridge_id: &str, processor_id: &str, outcome: &str) {
        self.events_total
            .with_label_values(&[bridge_id, processor_id, outcome])
            .inc();
    }

    pub fn observe_action(&self, bridge_id: &str, processor_id: &str, elapsed: Duration) {
        self.action_duration
            .with_label_values(&[bridge_id, processor_id])
            .observe(elapsed.as_secs_f64());
    }

    /// Drop every series of an undeployed processor
    pub fn remove_processor(&self, bridge_id: &str, processor_id: &str) {
        for outcome in [OUTCOME_UNMATCHED, OUTCOME_DELIVERED, OUTCOME_FAILED] {
            let _ = self
                .events_total
                .remove_label_values(&[bridge_id, processor_id, outcome]);
        }
        let _ = self
            .action_duration
            .remove_label_values(&[bridge_id, processor_id]);
    }

    pub fn outcome_count(&self, bridge_id: &str, processor_id: &str, outcome: &str) -> u64 {
        self.events_total
            .with_label_values(&[bridge_id, processor_id, outcome])
            .get()
    }
}
