//! Shard side of the lifecycle protocol.
//!
//! [`ManagerSyncService`] polls the manager for pending bridges and processors, provisions or
//! removes their cluster resources and reports the resulting status. [`IngressReconciler`]
//! watches ingress resources and reports AVAILABLE and DELETED transitions through the same
//! ordered [`StatusNotifier`].

pub mod client;
pub mod cluster;
pub mod notifier;
pub mod provisioner;
pub mod reconciler;
pub mod resources;
pub mod sync;

pub use client::{HttpManagerClient, ManagerClient, SHARD_API_BASE_PATH, SHARD_API_PROCESSORS_PATH};
pub use cluster::{ClusterClient, InMemoryCluster, ResourceEvent};
pub use notifier::{EntityGuard, NotificationHandle, NotifyOutcome, StatusNotifier};
pub use provisioner::{CustomerNamespaceProvider, ResourceProvisioner};
pub use reconciler::{
    reconcile, BridgeStatusNotifier, EventKind, IngressReconciler, ReconcileAction,
};
pub use resources::{BridgeIngress, ProcessorResource, ResourceKey, INGRESS_PROVISIONED_STATUS};
pub use sync::{ManagerSyncService, ResyncReport, SyncReport};
