use crate::shard::resources::{BridgeIngress, ProcessorResource, ResourceKey};
use crate::{error::BridgeError, Result};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;
use tracing::debug;

/// Change observed on a watched ingress resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent {
    Applied(BridgeIngress),
    Deleted(BridgeIngress),
}

impl ResourceEvent {
    pub fn resource(&self) -> &BridgeIngress {
        match self {
            ResourceEvent::Applied(resource) | ResourceEvent::Deleted(resource) => resource,
        }
    }
}

/// Cluster resource API used by the shard
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn namespace_exists(&self, namespace: &str) -> Result<bool>;

    async fn create_namespace(&self, namespace: &str) -> Result<()>;

    /// Fails with `AlreadyExists` if an ingress with the same key is present
    async fn create_ingress(&self, ingress: BridgeIngress) -> Result<()>;

    /// Returns false when there was nothing to delete
    async fn delete_ingress(&self, key: &ResourceKey) -> Result<bool>;

    async fn get_ingress(&self, key: &ResourceKey) -> Result<Option<BridgeIngress>>;

    async fn update_ingress_status(&self, key: &ResourceKey, status: &str) -> Result<()>;

    async fn apply_processor(&self, namespace: &str, processor: ProcessorResource) -> Result<()>;

    async fn delete_processor(&self, key: &ResourceKey) -> Result<bool>;

    async fn list_processors(&self) -> Result<Vec<ProcessorResource>>;
}

/// Cluster held in process memory. Every ingress write is published on the watch channel
/// returned by [`InMemoryCluster::new`].
pub struct InMemoryCluster {
    namespaces: DashSet<String>,
    ingresses: DashMap<ResourceKey, BridgeIngress>,
    processors: DashMap<ResourceKey, ProcessorResource>,
    events: mpsc::UnboundedSender<ResourceEvent>,
}

impl InMemoryCluster {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ResourceEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let cluster = Self {
            namespaces: DashSet::new(),
            ingresses: DashMap::new(),
            processors: DashMap::new(),
            events,
        };
        (cluster, receiver)
    }

    fn publish(&self, event: ResourceEvent) {
        if self.events.send(event).is_err() {
            debug!("No watcher for ingress events");
        }
    }

    pub fn ingress_count(&self) -> usize {
        self.ingresses.len()
    }

    pub fn namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> =
            self.namespaces.iter().map(|ns| ns.key().clone()).collect();
        namespaces.sort();
        namespaces
    }
}

#[async_trait]
impl ClusterClient for InMemoryCluster {
    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        Ok(self.namespaces.contains(namespace))
    }

    async fn create_namespace(&self, namespace: &str) -> Result<()> {
        if !self.namespaces.insert(namespace.to_string()) {
            return Err(BridgeError::AlreadyExists(format!("Namespace {}", namespace)));
        }
        debug!("Created namespace {}", namespace);
        Ok(())
    }

    async fn create_ingress(&self, ingress: BridgeIngress) -> Result<()> {
        let key = ingress.key();
        if !self.namespaces.contains(&key.namespace) {
            return Err(BridgeError::Cluster(format!("Namespace {} does not exist", key.namespace)));
        }

        match self.ingresses.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(BridgeError::AlreadyExists(format!("BridgeIngress {}", key)))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(ingress.clone());
                self.publish(ResourceEvent::Applied(ingress));
                Ok(())
            }
        }
    }

    async fn delete_ingress(&self, key: &ResourceKey) -> Result<bool> {
        match self.ingresses.remove(key) {
            Some((_, ingress)) => {
                self.publish(ResourceEvent::Deleted(ingress));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_ingress(&self, key: &ResourceKey) -> Result<Option<BridgeIngress>> {
        Ok(self.ingresses.get(key).map(|entry| entry.value().clone()))
    }

    async fn update_ingress_status(&self, key: &ResourceKey, status: &str) -> Result<()> {
        let updated = {
            let mut entry = self
                .ingresses
                .get_mut(key)
                .ok_or_else(|| BridgeError::NotFound(format!("BridgeIngress {}", key)))?;
            entry.set_status(status);
            entry.value().clone()
        };
        self.publish(ResourceEvent::Applied(updated));
        Ok(())
    }

    async fn apply_processor(&self, namespace: &str, processor: ProcessorResource) -> Result<()> {
        if !self.namespaces.contains(namespace) {
            return Err(BridgeError::Cluster(format!("Namespace {} does not exist", namespace)));
        }
        self.processors.insert(processor.key(namespace), processor);
        Ok(())
    }

    async fn delete_processor(&self, key: &ResourceKey) -> Result<bool> {
        Ok(self.processors.remove(key).is_some())
    }

    async fn list_processors(&self) -> Result<Vec<ProcessorResource>> {
        let mut processors: Vec<(ResourceKey, ProcessorResource)> = self
            .processors
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        processors.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(processors.into_iter().map(|(_, p)| p).collect())
    }
}
