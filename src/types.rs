use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type BridgeId = String;
pub type ProcessorId = String;

/// An event flowing into a bridge. Filter keys and template expressions address
/// its fields with dotted paths from the document root.
pub type Event = serde_json::Value;

/// Lifecycle status shared by bridges and processors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeStatus {
    Requested,
    Provisioning,
    Available,
    DeletionRequested,
    Deleted,
}

impl BridgeStatus {
    /// Position in the forward lifecycle. Status updates only ever move to a higher rank.
    pub fn rank(self) -> u8 {
        match self {
            BridgeStatus::Requested => 0,
            BridgeStatus::Provisioning => 1,
            BridgeStatus::Available => 2,
            BridgeStatus::DeletionRequested => 3,
            BridgeStatus::Deleted => 4,
        }
    }

    /// Statuses the shard picks up from the manager
    pub fn pending() -> [BridgeStatus; 2] {
        [BridgeStatus::Requested, BridgeStatus::DeletionRequested]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BridgeStatus::Requested => "REQUESTED",
            BridgeStatus::Provisioning => "PROVISIONING",
            BridgeStatus::Available => "AVAILABLE",
            BridgeStatus::DeletionRequested => "DELETION_REQUESTED",
            BridgeStatus::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bridge representation exchanged with the manager
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeDto {
    pub id: BridgeId,
    pub name: String,
    pub endpoint: String,
    pub customer_id: String,
    pub status: BridgeStatus,
}

impl BridgeDto {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        endpoint: impl Into<String>,
        customer_id: impl Into<String>,
        status: BridgeStatus,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            endpoint: endpoint.into(),
            customer_id: customer_id.into(),
            status,
        }
    }

    /// Copy of this bridge carrying a new status
    pub fn with_status(&self, status: BridgeStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

/// Processor representation exchanged with the manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorDto {
    pub id: ProcessorId,
    pub name: String,
    pub bridge: BridgeDto,
    pub status: BridgeStatus,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation_template: Option<String>,
    pub action: Action,
}

impl ProcessorDto {
    pub fn bridge_id(&self) -> &str {
        &self.bridge.id
    }

    pub fn with_status(&self, status: BridgeStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

/// String predicate over one event field. The `type` discriminant selects the variant;
/// an unknown discriminant fails to decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Filter {
    #[serde(rename = "StringBeginsWith")]
    BeginsWith { key: String, value: String },
    #[serde(rename = "StringContains")]
    Contains { key: String, value: String },
    #[serde(rename = "StringEquals")]
    Equals { key: String, value: String },
}

impl Filter {
    pub fn begins_with(key: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::BeginsWith {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn contains(key: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Contains {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Filter::BeginsWith { key, .. }
            | Filter::Contains { key, .. }
            | Filter::Equals { key, .. } => key,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Filter::BeginsWith { value, .. }
            | Filter::Contains { value, .. }
            | Filter::Equals { value, .. } => value,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Filter::BeginsWith { .. } => "StringBeginsWith",
            Filter::Contains { .. } => "StringContains",
            Filter::Equals { .. } => "StringEquals",
        }
    }
}

/// Sink an executor delivers rendered payloads to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    /// HTTP POST of the payload to an endpoint
    Webhook {
        name: String,
        endpoint: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
    /// Payload is written to the shard log
    Log { name: String },
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Action::Webhook { name, .. } | Action::Log { name } => name,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Webhook { .. } => "Webhook",
            Action::Log { .. } => "Log",
        }
    }
}

/// One page of a paginated lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResult<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub total: u64,
}

impl<T> ListResult<T> {
    pub fn empty(page: u32) -> Self {
        Self {
            items: Vec::new(),
            page,
            total: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bridge_wire_format() {
        let bridge = BridgeDto::new(
            "myId-1",
            "myName-1",
            "myEndpoint",
            "myCustomerId",
            BridgeStatus::DeletionRequested,
        );
        let value = serde_json::to_value(&bridge).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "myId-1",
                "name": "myName-1",
                "endpoint": "myEndpoint",
                "customerId": "myCustomerId",
                "status": "DELETION_REQUESTED"
            })
        );
    }

    #[test]
    fn test_filter_decoding_dispatches_on_type() {
        let filters: Vec<Filter> = serde_json::from_value(json!([
            {"type": "StringBeginsWith", "key": "type", "value": "order."},
            {"type": "StringContains", "key": "source", "value": "shop"},
            {"type": "StringEquals", "key": "region", "value": "EU"}
        ]))
        .unwrap();

        assert_eq!(filters[0], Filter::begins_with("type", "order."));
        assert_eq!(filters[1], Filter::contains("source", "shop"));
        assert_eq!(filters[2], Filter::equals("region", "EU"));
        assert_eq!(filters[2].type_name(), "StringEquals");
    }

    #[test]
    fn test_unknown_filter_type_is_rejected() {
        let result: std::result::Result<Filter, _> =
            serde_json::from_value(json!({"type": "NumberGreaterThan", "key": "n", "value": "1"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_action_type_is_rejected() {
        let result: std::result::Result<Action, _> =
            serde_json::from_value(json!({"type": "KafkaTopic", "name": "a", "topic": "t"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_processor_defaults() {
        let processor: ProcessorDto = serde_json::from_value(json!({
            "id": "p1",
            "name": "processor",
            "bridge": {
                "id": "b1", "name": "bridge", "endpoint": "http://ingress",
                "customerId": "c1", "status": "AVAILABLE"
            },
            "status": "REQUESTED",
            "action": {"type": "Log", "name": "audit"}
        }))
        .unwrap();

        assert!(processor.filters.is_empty());
        assert!(processor.transformation_template.is_none());
        assert_eq!(processor.bridge_id(), "b1");
        assert_eq!(processor.action.type_name(), "Log");
    }

    #[test]
    fn test_status_rank_is_forward_order() {
        let ordered = [
            BridgeStatus::Requested,
            BridgeStatus::Provisioning,
            BridgeStatus::Available,
            BridgeStatus::DeletionRequested,
            BridgeStatus::Deleted,
        ];
        assert!(ordered.windows(2).all(|w| w[0].rank() < w[1].rank()));
    }
}
