use crate::config::ShardConfig;
use crate::executor::{ExecutorDeploymentManager, ExecutorsProvider};
use crate::shard::client::ManagerClient;
use crate::shard::notifier::{NotificationHandle, StatusNotifier};
use crate::shard::provisioner::ResourceProvisioner;
use crate::shard::reconciler::BridgeStatusNotifier;
use crate::types::{BridgeDto, BridgeStatus, ProcessorDto};
use crate::Result;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityOutcome {
    Provisioned,
    Deleted,
    Skipped,
    Failed,
}

/// Counts of one pass over the pending entities of a kind
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub provisioned: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SyncReport {
    fn from_outcomes(outcomes: Vec<EntityOutcome>) -> Self {
        let mut report = SyncReport::default();
        for outcome in outcomes {
            match outcome {
                EntityOutcome::Provisioned => report.provisioned += 1,
                EntityOutcome::Deleted => report.deleted += 1,
                EntityOutcome::Skipped => report.skipped += 1,
                EntityOutcome::Failed => report.failed += 1,
            }
        }
        report
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResyncReport {
    pub deployed: usize,
    pub undeployed: usize,
    pub failed: usize,
}

/// Drives the shard towards the state held by the manager and reports status back
pub struct ManagerSyncService {
    manager: Arc<dyn ManagerClient>,
    notifier: Arc<StatusNotifier>,
    provisioner: Arc<ResourceProvisioner>,
    deployments: Arc<dyn ExecutorDeploymentManager>,
    semaphore: Arc<Semaphore>,
    poll_interval: Duration,
}

impl ManagerSyncService {
    pub fn new(
        manager: Arc<dyn ManagerClient>,
        provisioner: Arc<ResourceProvisioner>,
        deployments: Arc<dyn ExecutorDeploymentManager>,
        config: &ShardConfig,
    ) -> Self {
        Self {
            notifier: Arc::new(StatusNotifier::new(manager.clone())),
            manager,
            provisioner,
            deployments,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_syncs)),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }

    pub async fn notify_bridge_status_change(&self, bridge: BridgeDto) -> NotificationHandle {
        self.notifier.notify_bridge(bridge).await
    }

    pub async fn notify_processor_status_change(
        &self,
        processor: ProcessorDto,
    ) -> NotificationHandle {
        self.notifier.notify_processor(processor).await
    }

    pub async fn fetch_and_process_bridges_to_deploy_or_delete(&self) -> Result<SyncReport> {
        let bridges = self.manager.fetch_bridges_to_deploy_or_delete().await?;
        info!("[shard] Received {} bridges to deploy or delete", bridges.len());

        let outcomes =
            join_all(bridges.into_iter().map(|bridge| self.process_bridge(bridge))).await;
        Ok(SyncReport::from_outcomes(outcomes))
    }

    pub async fn fetch_and_process_processors_to_deploy_or_delete(&self) -> Result<SyncReport> {
        let processors = self.manager.fetch_processors_to_deploy_or_delete().await?;
        info!("[shard] Received {} processors to deploy or delete", processors.len());

        let outcomes = join_all(
            processors
                .into_iter()
                .map(|processor| self.process_processor(processor)),
        )
        .await;
        Ok(SyncReport::from_outcomes(outcomes))
    }

    async fn process_bridge(&self, bridge: BridgeDto) -> EntityOutcome {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return EntityOutcome::Failed,
        };

        match bridge.status {
            BridgeStatus::Requested => {
                let mut guard = self.notifier.lock_bridge(&bridge.id).await;
                // A request from the manager opens a new lifecycle for the bridge
                guard.reset();
                if let Err(e) = self.provisioner.create_bridge_ingress(&bridge).await {
                    error!("[shard] Failed to provision bridge '{}': {}", bridge.id, e);
                    return EntityOutcome::Failed;
                }
                guard.notify_bridge(bridge.with_status(BridgeStatus::Provisioning));

                // A reconciled ingress gets no further watch event, so report it here
                match self.provisioner.get_bridge_ingress(&bridge).await {
                    Ok(Some(ingress)) if ingress.current_status().is_some() => {
                        guard.notify_bridge(bridge.with_status(BridgeStatus::Available));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("[shard] Failed to read ingress of bridge '{}': {}", bridge.id, e)
                    }
                }
                EntityOutcome::Provisioned
            }
            BridgeStatus::DeletionRequested => {
                let mut guard = self.notifier.lock_bridge(&bridge.id).await;
                if let Err(e) = self.provisioner.delete_bridge_ingress(&bridge).await {
                    error!("[shard] Failed to delete bridge '{}': {}", bridge.id, e);
                    return EntityOutcome::Failed;
                }
                guard.notify_bridge(bridge.with_status(BridgeStatus::Deleted));
                EntityOutcome::Deleted
            }
            other => {
                warn!("[shard] Ignoring bridge '{}' in status {}", bridge.id, other);
                EntityOutcome::Skipped
            }
        }
    }

    async fn process_processor(&self, processor: ProcessorDto) -> EntityOutcome {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return EntityOutcome::Failed,
        };

        match processor.status {
            BridgeStatus::Requested => {
                let mut guard = self.notifier.lock_processor(&processor.id).await;
                guard.reset();
                if let Err(e) = self.deployments.deploy(processor.clone()) {
                    error!("[shard] Failed to deploy processor '{}': {}", processor.id, e);
                    return EntityOutcome::Failed;
                }
                if let Err(e) = self.provisioner.apply_processor(&processor).await {
                    error!("[shard] Failed to store processor '{}': {}", processor.id, e);
                    self.deployments.undeploy(processor.bridge_id(), &processor.id);
                    return EntityOutcome::Failed;
                }

                guard.notify_processor(processor.with_status(BridgeStatus::Provisioning));
                guard.notify_processor(processor.with_status(BridgeStatus::Available));
                EntityOutcome::Provisioned
            }
            BridgeStatus::DeletionRequested => {
                let mut guard = self.notifier.lock_processor(&processor.id).await;
                if let Err(e) = self.provisioner.delete_processor(&processor).await {
                    error!("[shard] Failed to delete processor '{}': {}", processor.id, e);
                    return EntityOutcome::Failed;
                }
                self.deployments.undeploy(processor.bridge_id(), &processor.id);

                guard.notify_processor(processor.with_status(BridgeStatus::Deleted));
                EntityOutcome::Deleted
            }
            other => {
                warn!("[shard] Ignoring processor '{}' in status {}", processor.id, other);
                EntityOutcome::Skipped
            }
        }
    }

    /// One poll cycle over both entity kinds
    pub async fn sync_once(&self) {
        let (bridges, processors) = tokio::join!(
            self.fetch_and_process_bridges_to_deploy_or_delete(),
            self.fetch_and_process_processors_to_deploy_or_delete()
        );

        match bridges {
            Ok(report) => debug!("[shard] Bridge sync: {:?}", report),
            Err(e) => error!("[shard] Failed to fetch bridges from manager: {}", e),
        }
        match processors {
            Ok(report) => debug!("[shard] Processor sync: {:?}", report),
            Err(e) => error!("[shard] Failed to fetch processors from manager: {}", e),
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("[shard] Polling manager every {:?}", self.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sync_once().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("[shard] Manager sync stopped");
    }

    /// Align live executors with the stored processor resources
    pub async fn resync_executors(&self) -> Result<ResyncReport> {
        let stored = self.provisioner.list_processors().await?;
        let live = self.deployments.get_executors();
        let mut report = ResyncReport::default();

        let live_ids: HashSet<(String, String)> = live
            .iter()
            .map(|e| (e.bridge_id().to_string(), e.processor_id().to_string()))
            .collect();
        let stored_ids: HashSet<(String, String)> = stored
            .iter()
            .map(|p| (p.bridge_id().to_string(), p.id.clone()))
            .collect();

        for processor in stored {
            if live_ids.contains(&(processor.bridge_id().to_string(), processor.id.clone())) {
                continue;
            }
            match self.deployments.deploy(processor.clone()) {
                Ok(()) => report.deployed += 1,
                Err(e) => {
                    error!("[shard] Failed to redeploy processor '{}': {}", processor.id, e);
                    report.failed += 1;
                }
            }
        }

        for executor in live {
            let id = (executor.bridge_id().to_string(), executor.processor_id().to_string());
            if !stored_ids.contains(&id) && self.deployments.undeploy(&id.0, &id.1) {
                report.undeployed += 1;
            }
        }

        info!(
            "[shard] Executor resync: {} deployed, {} undeployed, {} failed",
            report.deployed, report.undeployed, report.failed
        );
        Ok(report)
    }
}

#[async_trait]
impl BridgeStatusNotifier for ManagerSyncService {
    async fn notify_bridge_status_change(&self, bridge: BridgeDto) -> NotificationHandle {
        self.notifier.notify_bridge(bridge).await
    }
}
