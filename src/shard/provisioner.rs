use crate::config::IngressConfig;
use crate::error::BridgeError;
use crate::shard::cluster::ClusterClient;
use crate::shard::resources::{BridgeIngress, ProcessorResource};
use crate::types::{BridgeDto, ProcessorDto};
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// Maps a tenant to its namespace
#[derive(Debug, Clone)]
pub struct CustomerNamespaceProvider {
    prefix: String,
}

impl CustomerNamespaceProvider {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// `{prefix}{customerId}`, lowercased, with characters outside `[a-z0-9-]` replaced by `-`
    pub fn resolve_namespace(&self, customer_id: &str) -> String {
        format!("{}{}", self.prefix, customer_id)
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' { c } else { '-' })
            .collect()
    }
}

/// Creates and removes the cluster resources backing bridges and processors
pub struct ResourceProvisioner {
    cluster: Arc<dyn ClusterClient>,
    namespaces: CustomerNamespaceProvider,
    image: String,
}

impl ResourceProvisioner {
    pub fn new(cluster: Arc<dyn ClusterClient>, config: &IngressConfig) -> Self {
        Self {
            cluster,
            namespaces: CustomerNamespaceProvider::new(&config.namespace_prefix),
            image: config.image.clone(),
        }
    }

    pub fn cluster(&self) -> &Arc<dyn ClusterClient> {
        &self.cluster
    }

    pub fn resolve_namespace(&self, customer_id: &str) -> String {
        self.namespaces.resolve_namespace(customer_id)
    }

    async fn get_or_create_namespace(&self, customer_id: &str) -> Result<String> {
        let namespace = self.namespaces.resolve_namespace(customer_id);
        if !self.cluster.namespace_exists(&namespace).await? {
            match self.cluster.create_namespace(&namespace).await {
                Ok(()) => info!("Created namespace {} for customer {}", namespace, customer_id),
                Err(BridgeError::AlreadyExists(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(namespace)
    }

    /// An ingress that already exists counts as created
    pub async fn create_bridge_ingress(&self, bridge: &BridgeDto) -> Result<()> {
        let namespace = self.get_or_create_namespace(&bridge.customer_id).await?;
        let ingress = BridgeIngress::from_dto(bridge, &namespace, &self.image);
        let key = ingress.key();

        match self.cluster.create_ingress(ingress).await {
            Ok(()) => {
                info!("Created BridgeIngress {}", key);
                Ok(())
            }
            Err(BridgeError::AlreadyExists(_)) => {
                debug!("BridgeIngress {} already exists", key);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Returns false when no ingress was present
    pub async fn delete_bridge_ingress(&self, bridge: &BridgeDto) -> Result<bool> {
        let namespace = self.namespaces.resolve_namespace(&bridge.customer_id);
        let key = BridgeIngress::from_dto(bridge, &namespace, &self.image).key();

        let deleted = self.cluster.delete_ingress(&key).await?;
        if deleted {
            info!("Deleted BridgeIngress {}", key);
        } else {
            debug!("BridgeIngress {} was already gone", key);
        }
        Ok(deleted)
    }

    pub async fn get_bridge_ingress(&self, bridge: &BridgeDto) -> Result<Option<BridgeIngress>> {
        let namespace = self.namespaces.resolve_namespace(&bridge.customer_id);
        let key = BridgeIngress::from_dto(bridge, &namespace, &self.image).key();
        self.cluster.get_ingress(&key).await
    }

    pub async fn apply_processor(&self, processor: &ProcessorDto) -> Result<()> {
        let namespace = self.get_or_create_namespace(&processor.bridge.customer_id).await?;
        self.cluster
            .apply_processor(&namespace, ProcessorResource::from_dto(processor))
            .await
    }

    pub async fn delete_processor(&self, processor: &ProcessorDto) -> Result<bool> {
        let namespace = self.namespaces.resolve_namespace(&processor.bridge.customer_id);
        self.cluster
            .delete_processor(&ProcessorResource::from_dto(processor).key(&namespace))
            .await
    }

    pub async fn list_processors(&self) -> Result<Vec<ProcessorDto>> {
        Ok(self
            .cluster
            .list_processors()
            .await?
            .iter()
            .map(ProcessorResource::to_dto)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::cluster::InMemoryCluster;
    use crate::shard::resources::ResourceKey;
    use crate::types::BridgeStatus;

    fn provisioner() -> (ResourceProvisioner, Arc<InMemoryCluster>) {
        let (cluster, _events) = InMemoryCluster::new();
        let cluster = Arc::new(cluster);
        let config = IngressConfig {
            image: "ingress:test".to_string(),
            namespace_prefix: "ob-".to_string(),
        };
        (ResourceProvisioner::new(cluster.clone(), &config), cluster)
    }

    #[test]
    fn test_namespace_resolution() {
        let provider = CustomerNamespaceProvider::new("ob-");
        assert_eq!(provider.resolve_namespace("myCustomerId"), "ob-mycustomerid");
        assert_eq!(provider.resolve_namespace("Acme Corp_01"), "ob-acme-corp-01");
    }

    #[tokio::test]
    async fn test_create_bridge_ingress_creates_namespace_once() {
        let (provisioner, cluster) = provisioner();
        let b1 = BridgeDto::new("b1", "one", "http://ingress", "C1", BridgeStatus::Requested);
        let b2 = BridgeDto::new("b2", "two", "http://ingress", "C1", BridgeStatus::Requested);

        provisioner.create_bridge_ingress(&b1).await.unwrap();
        provisioner.create_bridge_ingress(&b2).await.unwrap();
        provisioner.create_bridge_ingress(&b1).await.unwrap();

        assert_eq!(cluster.namespaces(), vec!["ob-c1".to_string()]);
        assert_eq!(cluster.ingress_count(), 2);

        let stored = cluster
            .get_ingress(&ResourceKey::new("ob-c1", "b1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.spec.image, "ingress:test");
    }

    #[tokio::test]
    async fn test_delete_missing_ingress_is_not_an_error() {
        let (provisioner, _cluster) = provisioner();
        let bridge = BridgeDto::new(
            "b1",
            "one",
            "http://ingress",
            "c1",
            BridgeStatus::DeletionRequested,
        );
        assert!(!provisioner.delete_bridge_ingress(&bridge).await.unwrap());
    }
}
