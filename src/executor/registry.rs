use crate::executor::executor::{Executor, ExecutorFactory, ProcessOutcome};
use crate::types::{Event, ProcessorDto};
use crate::Result;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

type ExecutorSet = Arc<Vec<Arc<Executor>>>;

/// Read side of the runtime, used by the dispatch path
pub trait ExecutorsProvider: Send + Sync {
    /// Every live executor across all bridges
    fn get_executors(&self) -> Vec<Arc<Executor>>;

    /// Snapshot of the executors of one bridge. Unknown bridges yield an empty list.
    fn get_executors_for(&self, bridge_id: &str) -> Vec<Arc<Executor>>;
}

/// Admission surface for pipeline changes
pub trait ExecutorDeploymentManager: ExecutorsProvider {
    /// Build and admit an executor, replacing any executor already deployed for the
    /// same processor id. Nothing is admitted if the build fails.
    fn deploy(&self, processor: ProcessorDto) -> Result<()>;

    /// Returns false when nothing was deployed under that id
    fn undeploy(&self, bridge_id: &str, processor_id: &str) -> bool;
}

/// In-memory registry. Mutations are serialized by one lock over the whole map; each
/// bridge's executors are published as an immutable vector so readers clone an `Arc` and
/// never hold the lock while processing.
pub struct ExecutorRegistry {
    factory: ExecutorFactory,
    executors: Mutex<HashMap<String, ExecutorSet>>,
}

impl ExecutorRegistry {
    pub fn new(factory: ExecutorFactory) -> Self {
        Self {
            factory,
            executors: Mutex::new(HashMap::new()),
        }
    }

    pub fn bridge_count(&self) -> usize {
        self.executors.lock().len()
    }
}

impl ExecutorsProvider for ExecutorRegistry {
    fn get_executors(&self) -> Vec<Arc<Executor>> {
        let snapshot: Vec<ExecutorSet> = self.executors.lock().values().cloned().collect();
        snapshot
            .iter()
            .flat_map(|set| set.iter().cloned())
            .collect()
    }

    fn get_executors_for(&self, bridge_id: &str) -> Vec<Arc<Executor>> {
        let snapshot = self.executors.lock().get(bridge_id).cloned();
        match snapshot {
            Some(set) => set.as_ref().clone(),
            None => Vec::new(),
        }
    }
}

impl ExecutorDeploymentManager for ExecutorRegistry {
    fn deploy(&self, processor: ProcessorDto) -> Result<()> {
        let bridge_id = processor.bridge_id().to_string();
        let processor_id = processor.id.clone();
        let executor = Arc::new(self.factory.build(processor)?);

        let mut executors = self.executors.lock();
        let current = executors.get(&bridge_id).cloned().unwrap_or_default();
        let mut next: Vec<Arc<Executor>> = current
            .iter()
            .filter(|existing| existing.processor_id() != processor_id)
            .cloned()
            .collect();
        let replaced = next.len() != current.len();
        next.push(executor);
        executors.insert(bridge_id.clone(), Arc::new(next));
        drop(executors);

        if replaced {
            info!("Redeployed executor for processor {} on bridge {}", processor_id, bridge_id);
        } else {
            info!("Deployed executor for processor {} on bridge {}", processor_id, bridge_id);
        }
        Ok(())
    }

    fn undeploy(&self, bridge_id: &str, processor_id: &str) -> bool {
        let mut executors = self.executors.lock();
        let current = match executors.get(bridge_id) {
            Some(set) => set.clone(),
            None => {
                debug!("No executors registered for bridge {}", bridge_id);
                return false;
            }
        };

        let next: Vec<Arc<Executor>> = current
            .iter()
            .filter(|existing| existing.processor_id() != processor_id)
            .cloned()
            .collect();
        if next.len() == current.len() {
            debug!("Processor {} is not deployed on bridge {}", processor_id, bridge_id);
            return false;
        }

        if next.is_empty() {
            executors.remove(bridge_id);
        } else {
            executors.insert(bridge_id.to_string(), Arc::new(next));
        }
        drop(executors);

        self.factory.metrics().remove_processor(bridge_id, processor_id);
        info!("Undeployed executor for processor {} on bridge {}", processor_id, bridge_id);
        true
    }
}

/// Summary of one event dispatched to a bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub dispatch_id: String,
    pub matched: usize,
    pub unmatched: usize,
    pub failed: usize,
}

/// Fans an event out to every executor of its bridge
#[derive(Clone)]
pub struct EventDispatcher {
    provider: Arc<dyn ExecutorsProvider>,
}

impl EventDispatcher {
    pub fn new(provider: Arc<dyn ExecutorsProvider>) -> Self {
        Self { provider }
    }

    pub async fn dispatch(&self, bridge_id: &str, event: &Event) -> DispatchReport {
        let dispatch_id = uuid::Uuid::new_v4().to_string();
        let executors = self.provider.get_executors_for(bridge_id);

        let outcomes = join_all(executors.iter().map(|executor| executor.process(event))).await;

        let mut report = DispatchReport {
            dispatch_id,
            matched: 0,
            unmatched: 0,
            failed: 0,
        };
        for outcome in outcomes {
            match outcome {
                ProcessOutcome::Delivered => report.matched += 1,
                ProcessOutcome::Unmatched => report.unmatched += 1,
                ProcessOutcome::ActionFailed(_) => {
                    report.matched += 1;
                    report.failed += 1;
                }
            }
        }

        debug!(
            "Dispatch {} on bridge {}: {} executors, {} matched, {} failed",
            report.dispatch_id,
            bridge_id,
            executors.len(),
            report.matched,
            report.failed
        );
        report
    }
}
