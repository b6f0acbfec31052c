use crate::config::ExecutorConfig;
use crate::executor::action::{ActionInvoker, ActionProviderFactory, DefaultActionProviderFactory};
use crate::executor::filter::{FilterEvaluatorFactory, FilterSet, StringFilterEvaluatorFactory};
use crate::executor::transformation::{
    TemplateEvaluatorFactory, TransformationEvaluator, TransformationEvaluatorFactory,
};
use crate::metrics::{ExecutorMetrics, OUTCOME_DELIVERED, OUTCOME_FAILED, OUTCOME_UNMATCHED};
use crate::types::{Event, ProcessorDto};
use crate::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// At least one filter rejected the event
    Unmatched,
    Delivered,
    ActionFailed(String),
}

/// Runtime pipeline of one deployed processor. Immutable once built.
pub struct Executor {
    processor: ProcessorDto,
    filters: FilterSet,
    transformation: Box<dyn TransformationEvaluator>,
    action: Arc<dyn ActionInvoker>,
    metrics: Arc<ExecutorMetrics>,
}

impl Executor {
    pub fn processor(&self) -> &ProcessorDto {
        &self.processor
    }

    pub fn bridge_id(&self) -> &str {
        self.processor.bridge_id()
    }

    pub fn processor_id(&self) -> &str {
        &self.processor.id
    }

    pub async fn process(&self, event: &Event) -> ProcessOutcome {
        if !self.filters.matches(event) {
            self.metrics
                .record_outcome(self.bridge_id(), self.processor_id(), OUTCOME_UNMATCHED);
            return ProcessOutcome::Unmatched;
        }

        let payload = self.transformation.render(event);

        let start = Instant::now();
        let result = self.action.invoke(&payload).await;
        self.metrics
            .observe_action(self.bridge_id(), self.processor_id(), start.elapsed());

        match result {
            Ok(()) => {
                debug!(
                    "Processor {} delivered event to {} action '{}'",
                    self.processor_id(),
                    self.action.action_type(),
                    self.processor.action.name()
                );
                self.metrics
                    .record_outcome(self.bridge_id(), self.processor_id(), OUTCOME_DELIVERED);
                ProcessOutcome::Delivered
            }
            Err(e) => {
                warn!(
                    "Processor {} of bridge {} failed to invoke action: {}",
                    self.processor_id(),
                    self.bridge_id(),
                    e
                );
                self.metrics
                    .record_outcome(self.bridge_id(), self.processor_id(), OUTCOME_FAILED);
                ProcessOutcome::ActionFailed(e.to_string())
            }
        }
    }
}

/// Compiles processors into executors. Every step that can fail runs here so a broken
/// processor is rejected before it reaches the registry.
#[derive(Clone)]
pub struct ExecutorFactory {
    filter_factory: Arc<dyn FilterEvaluatorFactory>,
    transformation_factory: Arc<dyn TransformationEvaluatorFactory>,
    action_factory: Arc<dyn ActionProviderFactory>,
    metrics: Arc<ExecutorMetrics>,
}

impl ExecutorFactory {
    pub fn new(
        filter_factory: Arc<dyn FilterEvaluatorFactory>,
        transformation_factory: Arc<dyn TransformationEvaluatorFactory>,
        action_factory: Arc<dyn ActionProviderFactory>,
        metrics: Arc<ExecutorMetrics>,
    ) -> Self {
        Self {
            filter_factory,
            transformation_factory,
            action_factory,
            metrics,
        }
    }

    /// Factory wired with the built-in filters, templates and actions
    pub fn with_defaults(config: &ExecutorConfig, metrics: Arc<ExecutorMetrics>) -> Self {
        Self::new(
            Arc::new(StringFilterEvaluatorFactory),
            Arc::new(TemplateEvaluatorFactory),
            Arc::new(DefaultActionProviderFactory::new(Duration::from_millis(
                config.webhook_timeout_ms,
            ))),
            metrics,
        )
    }

    pub fn build(&self, processor: ProcessorDto) -> Result<Executor> {
        let filters = FilterSet::compile(&processor.filters, self.filter_factory.as_ref())?;
        let transformation = self
            .transformation_factory
            .build(processor.transformation_template.as_deref())?;
        let action = self
            .action_factory
            .resolve(&processor.action, processor.bridge_id(), &processor.id)?;

        Ok(Executor {
            processor,
            filters,
            transformation,
            action,
            metrics: self.metrics.clone(),
        })
    }

    pub fn metrics(&self) -> &Arc<ExecutorMetrics> {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::types::{Action, BridgeDto, BridgeStatus, Filter};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingInvoker {
        payloads: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl ActionInvoker for RecordingInvoker {
        async fn invoke(&self, payload: &str) -> Result<()> {
            self.payloads.lock().push(payload.to_string());
            if self.fail {
                return Err(BridgeError::ActionFailed("sink unavailable".to_string()));
            }
            Ok(())
        }

        fn action_type(&self) -> &'static str {
            "Recording"
        }
    }

    struct FixedActionFactory(Arc<RecordingInvoker>);

    impl ActionProviderFactory for FixedActionFactory {
        fn resolve(&self, _: &Action, _: &str, _: &str) -> Result<Arc<dyn ActionInvoker>> {
            Ok(self.0.clone())
        }
    }

    fn processor(filters: Vec<Filter>, template: Option<&str>) -> ProcessorDto {
        ProcessorDto {
            id: "p1".to_string(),
            name: "orders".to_string(),
            bridge: BridgeDto::new("b1", "bridge", "http://ingress", "c1", BridgeStatus::Available),
            status: BridgeStatus::Requested,
            filters,
            transformation_template: template.map(str::to_string),
            action: Action::Log {
                name: "audit".to_string(),
            },
        }
    }

    fn factory(invoker: Arc<RecordingInvoker>, metrics: Arc<ExecutorMetrics>) -> ExecutorFactory {
        ExecutorFactory::new(
            Arc::new(StringFilterEvaluatorFactory),
            Arc::new(TemplateEvaluatorFactory),
            Arc::new(FixedActionFactory(invoker)),
            metrics,
        )
    }

    #[tokio::test]
    async fn test_matching_event_is_transformed_and_delivered() {
        let invoker = Arc::new(RecordingInvoker::default());
        let metrics = ExecutorMetrics::new().unwrap();
        let executor = factory(invoker.clone(), metrics.clone())
            .build(processor(
                vec![Filter::begins_with("type", "order.")],
                Some("Order {data.id}"),
            ))
            .unwrap();

        let outcome = executor
            .process(&json!({"type": "order.created", "data": {"id": "o-7"}}))
            .await;

        assert_eq!(outcome, ProcessOutcome::Delivered);
        assert_eq!(*invoker.payloads.lock(), vec!["Order o-7".to_string()]);
        assert_eq!(metrics.outcome_count("b1", "p1", OUTCOME_DELIVERED), 1);
    }

    #[tokio::test]
    async fn test_unmatched_event_never_reaches_action() {
        let invoker = Arc::new(RecordingInvoker::default());
        let metrics = ExecutorMetrics::new().unwrap();
        let executor = factory(invoker.clone(), metrics.clone())
            .build(processor(vec![Filter::equals("region", "EU")], None))
            .unwrap();

        let outcome = executor.process(&json!({"region": "US"})).await;

        assert_eq!(outcome, ProcessOutcome::Unmatched);
        assert!(invoker.payloads.lock().is_empty());
        assert_eq!(metrics.outcome_count("b1", "p1", OUTCOME_UNMATCHED), 1);
    }

    #[tokio::test]
    async fn test_action_failure_does_not_stop_executor() {
        let invoker = Arc::new(RecordingInvoker {
            fail: true,
            ..Default::default()
        });
        let metrics = ExecutorMetrics::new().unwrap();
        let executor = factory(invoker.clone(), metrics.clone())
            .build(processor(vec![], None))
            .unwrap();

        for _ in 0..3 {
            let outcome = executor.process(&json!({"n": 1})).await;
            assert!(matches!(outcome, ProcessOutcome::ActionFailed(_)));
        }

        assert_eq!(invoker.payloads.lock().len(), 3);
        assert_eq!(metrics.outcome_count("b1", "p1", OUTCOME_FAILED), 3);
    }

    #[test]
    fn test_broken_processor_is_rejected_at_build() {
        let invoker = Arc::new(RecordingInvoker::default());
        let metrics = ExecutorMetrics::new().unwrap();
        let factory = factory(invoker, metrics);

        let result = factory.build(processor(vec![Filter::equals("a..b", "x")], None));
        assert!(matches!(result, Err(BridgeError::InvalidFilter(_))));

        let result = factory.build(processor(vec![], Some("hello {data.name")));
        assert!(matches!(result, Err(BridgeError::InvalidTemplate(_))));
    }

    #[test]
    fn test_default_factory_rejects_bad_webhook() {
        let metrics = ExecutorMetrics::new().unwrap();
        let factory =
            ExecutorFactory::with_defaults(&ExecutorConfig { webhook_timeout_ms: 1000 }, metrics);

        let mut broken = processor(vec![], None);
        broken.action = Action::Webhook {
            name: "sink".to_string(),
            endpoint: "ftp://example.com".to_string(),
            headers: Default::default(),
        };
        assert!(matches!(factory.build(broken), Err(BridgeError::InvalidAction(_))));
    }
}
