//! Manager-side state: the processor store and an in-process manager that serves the
//! shard API without a network hop.

pub mod dao;

pub use dao::{InMemoryProcessorTable, ProcessorDao, ProcessorTable};

use crate::shard::client::ManagerClient;
use crate::types::{BridgeDto, BridgeStatus, ProcessorDto};
use crate::{error::BridgeError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

/// Status update received from a shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Bridge(BridgeDto),
    Processor(ProcessorDto),
}

/// Manager holding bridges and processors in memory. Status updates pushed by the shard
/// are applied to the stored entities and recorded in arrival order.
#[derive(Default)]
pub struct InMemoryManager {
    bridges: Mutex<Vec<BridgeDto>>,
    processors: ProcessorDao,
    updates: Mutex<Vec<StatusUpdate>>,
}

impl InMemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bridge(&self, bridge: BridgeDto) {
        let mut bridges = self.bridges.lock();
        bridges.retain(|b| b.id != bridge.id);
        bridges.push(bridge);
    }

    pub fn add_processor(&self, processor: ProcessorDto) {
        self.processors.persist(processor);
    }

    pub fn bridge(&self, id: &str) -> Option<BridgeDto> {
        self.bridges.lock().iter().find(|b| b.id == id).cloned()
    }

    pub fn processor(&self, id: &str) -> Result<Option<ProcessorDto>> {
        self.processors.find_by_id(id)
    }

    pub fn processors(&self) -> &ProcessorDao {
        &self.processors
    }

    pub fn request_bridge_deletion(&self, id: &str) -> Result<BridgeDto> {
        let mut bridges = self.bridges.lock();
        let bridge = bridges
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| BridgeError::NotFound(format!("Bridge {}", id)))?;
        bridge.status = BridgeStatus::DeletionRequested;
        Ok(bridge.clone())
    }

    pub fn request_processor_deletion(&self, id: &str) -> Result<ProcessorDto> {
        self.processors.update_status(id, BridgeStatus::DeletionRequested)
    }

    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().clone()
    }

    pub fn bridge_updates(&self, id: &str) -> Vec<BridgeStatus> {
        self.updates
            .lock()
            .iter()
            .filter_map(|update| match update {
                StatusUpdate::Bridge(b) if b.id == id => Some(b.status),
                _ => None,
            })
            .collect()
    }

    pub fn processor_updates(&self, id: &str) -> Vec<BridgeStatus> {
        self.updates
            .lock()
            .iter()
            .filter_map(|update| match update {
                StatusUpdate::Processor(p) if p.id == id => Some(p.status),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ManagerClient for InMemoryManager {
    async fn fetch_bridges_to_deploy_or_delete(&self) -> Result<Vec<BridgeDto>> {
        let pending = BridgeStatus::pending();
        Ok(self
            .bridges
            .lock()
            .iter()
            .filter(|b| pending.contains(&b.status))
            .cloned()
            .collect())
    }

    async fn fetch_processors_to_deploy_or_delete(&self) -> Result<Vec<ProcessorDto>> {
        Ok(self.processors.find_by_statuses(&BridgeStatus::pending()))
    }

    async fn update_bridge(&self, bridge: &BridgeDto) -> Result<()> {
        {
            let mut bridges = self.bridges.lock();
            let stored = bridges
                .iter_mut()
                .find(|b| b.id == bridge.id)
                .ok_or_else(|| BridgeError::NotFound(format!("Bridge {}", bridge.id)))?;
            stored.status = bridge.status;
        }
        self.updates.lock().push(StatusUpdate::Bridge(bridge.clone()));
        info!("Bridge {} is now {}", bridge.id, bridge.status);
        Ok(())
    }

    async fn update_processor(&self, processor: &ProcessorDto) -> Result<()> {
        self.processors.update_status(&processor.id, processor.status)?;
        self.updates
            .lock()
            .push(StatusUpdate::Processor(processor.clone()));
        info!("Processor {} is now {}", processor.id, processor.status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Action;

    fn bridge(id: &str, status: BridgeStatus) -> BridgeDto {
        BridgeDto::new(id, format!("name-{}", id), "http://ingress", "c1", status)
    }

    #[tokio::test]
    async fn test_only_pending_entities_are_served() {
        let manager = InMemoryManager::new();
        manager.add_bridge(bridge("b1", BridgeStatus::Requested));
        manager.add_bridge(bridge("b2", BridgeStatus::Available));
        manager.add_bridge(bridge("b3", BridgeStatus::DeletionRequested));
        manager.add_processor(ProcessorDto {
            id: "p1".to_string(),
            name: "p1".to_string(),
            bridge: bridge("b2", BridgeStatus::Available),
            status: BridgeStatus::Available,
            filters: vec![],
            transformation_template: None,
            action: Action::Log {
                name: "audit".to_string(),
            },
        });

        let ids: Vec<String> = manager
            .fetch_bridges_to_deploy_or_delete()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, vec!["b1", "b3"]);
        assert!(manager.fetch_processors_to_deploy_or_delete().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_updates_are_applied_and_recorded() {
        let manager = InMemoryManager::new();
        manager.add_bridge(bridge("b1", BridgeStatus::Requested));

        manager
            .update_bridge(&bridge("b1", BridgeStatus::Provisioning))
            .await
            .unwrap();

        assert_eq!(manager.bridge("b1").unwrap().status, BridgeStatus::Provisioning);
        assert_eq!(manager.bridge_updates("b1"), vec![BridgeStatus::Provisioning]);
        assert!(manager.fetch_bridges_to_deploy_or_delete().await.unwrap().is_empty());

        let result = manager.update_bridge(&bridge("unknown", BridgeStatus::Deleted)).await;
        assert!(matches!(result, Err(BridgeError::NotFound(_))));
    }
}
