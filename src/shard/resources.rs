use crate::types::{Action, BridgeDto, BridgeStatus, Filter, ProcessorDto};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status marker set on an ingress once it has been reconciled
pub const INGRESS_PROVISIONED_STATUS: &str = "OK";

/// Namespaced identity of a cluster resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeIngressSpec {
    pub bridge_id: String,
    pub bridge_name: String,
    pub customer_id: String,
    pub endpoint: String,
    pub image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeIngressStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Shard-local ingress of one bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeIngress {
    pub metadata: ObjectMeta,
    pub spec: BridgeIngressSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BridgeIngressStatus>,
}

impl BridgeIngress {
    pub fn from_dto(bridge: &BridgeDto, namespace: &str, image: &str) -> Self {
        Self {
            metadata: ObjectMeta {
                name: bridge.id.clone(),
                namespace: namespace.to_string(),
            },
            spec: BridgeIngressSpec {
                bridge_id: bridge.id.clone(),
                bridge_name: bridge.name.clone(),
                customer_id: bridge.customer_id.clone(),
                endpoint: bridge.endpoint.clone(),
                image: image.to_string(),
            },
            status: None,
        }
    }

    pub fn to_dto(&self, status: BridgeStatus) -> BridgeDto {
        BridgeDto {
            id: self.spec.bridge_id.clone(),
            name: self.spec.bridge_name.clone(),
            endpoint: self.spec.endpoint.clone(),
            customer_id: self.spec.customer_id.clone(),
            status,
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.metadata.namespace, &self.metadata.name)
    }

    /// Status string, `None` when unset or empty
    pub fn current_status(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.status.as_deref())
            .filter(|s| !s.is_empty())
    }

    pub fn set_status(&mut self, status: &str) {
        self.status = Some(BridgeIngressStatus {
            status: Some(status.to_string()),
        });
    }
}

/// Stored form of a deployed processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorResource {
    pub id: String,
    pub name: String,
    pub bridge: BridgeDto,
    pub status: BridgeStatus,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation_template: Option<String>,
    pub action: Action,
}

impl ProcessorResource {
    pub fn from_dto(processor: &ProcessorDto) -> Self {
        Self {
            id: processor.id.clone(),
            name: processor.name.clone(),
            bridge: processor.bridge.clone(),
            status: processor.status,
            filters: processor.filters.clone(),
            transformation_template: processor.transformation_template.clone(),
            action: processor.action.clone(),
        }
    }

    pub fn to_dto(&self) -> ProcessorDto {
        ProcessorDto {
            id: self.id.clone(),
            name: self.name.clone(),
            bridge: self.bridge.clone(),
            status: self.status,
            filters: self.filters.clone(),
            transformation_template: self.transformation_template.clone(),
            action: self.action.clone(),
        }
    }

    pub fn key(&self, namespace: &str) -> ResourceKey {
        ResourceKey::new(namespace, &self.id)
    }
}
