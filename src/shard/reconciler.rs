use crate::shard::cluster::{ClusterClient, ResourceEvent};
use crate::shard::notifier::NotificationHandle;
use crate::shard::resources::INGRESS_PROVISIONED_STATUS;
use crate::types::{BridgeDto, BridgeStatus};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Applied,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    NoOp,
    /// Set the provisioned marker and report AVAILABLE
    MarkProvisioned,
    NotifyDeleted,
}

/// Transition of one ingress. Redelivered `Applied` events for an already marked resource
/// are no-ops; deletion is reported whatever the prior state was.
pub fn reconcile(current_status: Option<&str>, kind: EventKind) -> ReconcileAction {
    match (kind, current_status) {
        (EventKind::Deleted, _) => ReconcileAction::NotifyDeleted,
        (EventKind::Applied, None) => ReconcileAction::MarkProvisioned,
        (EventKind::Applied, Some(status)) if status.is_empty() => ReconcileAction::MarkProvisioned,
        (EventKind::Applied, Some(_)) => ReconcileAction::NoOp,
    }
}

/// Integration point the reconciler reports bridge transitions through
#[async_trait]
pub trait BridgeStatusNotifier: Send + Sync {
    async fn notify_bridge_status_change(&self, bridge: BridgeDto) -> NotificationHandle;
}

pub struct IngressReconciler {
    cluster: Arc<dyn ClusterClient>,
    notifier: Arc<dyn BridgeStatusNotifier>,
}

impl IngressReconciler {
    pub fn new(cluster: Arc<dyn ClusterClient>, notifier: Arc<dyn BridgeStatusNotifier>) -> Self {
        Self { cluster, notifier }
    }

    /// Apply one watch event. The notification is fired and not awaited; its
    /// outcome is logged by the notification task.
    pub async fn handle(&self, event: ResourceEvent) -> Result<ReconcileAction> {
        match event {
            ResourceEvent::Applied(resource) => {
                let key = resource.key();
                info!(
                    "Create or update BridgeIngress: '{}' in namespace '{}'",
                    key.name, key.namespace
                );

                // Act on the stored state; the event may be stale.
                let current = match self.cluster.get_ingress(&key).await? {
                    Some(current) => current,
                    None => {
                        debug!("BridgeIngress {} no longer exists", key);
                        return Ok(ReconcileAction::NoOp);
                    }
                };

                let action = reconcile(current.current_status(), EventKind::Applied);
                if action == ReconcileAction::MarkProvisioned {
                    self.cluster
                        .update_ingress_status(&key, INGRESS_PROVISIONED_STATUS)
                        .await?;
                    let _ = self
                        .notifier
                        .notify_bridge_status_change(current.to_dto(BridgeStatus::Available))
                        .await;
                }
                Ok(action)
            }
            ResourceEvent::Deleted(resource) => {
                let key = resource.key();
                info!("Deleted BridgeIngress: '{}' in namespace '{}'", key.name, key.namespace);

                let action = reconcile(resource.current_status(), EventKind::Deleted);
                let _ = self
                    .notifier
                    .notify_bridge_status_change(resource.to_dto(BridgeStatus::Deleted))
                    .await;
                Ok(action)
            }
        }
    }

    /// Consume watch events one at a time until shutdown or until the watch closes
    pub async fn run(
        self,
        mut events: mpsc::UnboundedReceiver<ResourceEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("BridgeIngress reconciler started");

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => {
                            if let Err(e) = self.handle(event).await {
                                error!("Failed to reconcile BridgeIngress: {}", e);
                            }
                        }
                        None => {
                            debug!("BridgeIngress watch closed");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("BridgeIngress reconciler stopped");
    }
}
