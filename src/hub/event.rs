//! Events pushed to connected consumers
//!
//! Wire shape: `{"type", "clusterId"?, "data", "timestamp"}`. The payload is a
//! closed enum keyed by `type`, so a payload can never disagree with its kind
//! and an unknown kind fails to decode.

use crate::k8s::types::ClusterSnapshot;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(flatten)]
    pub payload: EventPayload,
    #[serde(rename = "clusterId", default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    ConnectionStatus(ConnectionStatus),
    ClusterUpdate(ClusterSnapshot),
    ClusterRemoved(ClusterRef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRef {
    pub id: String,
    pub name: String,
}

impl Event {
    pub fn new(payload: EventPayload, cluster_id: Option<String>) -> Self {
        Self {
            payload,
            cluster_id,
            timestamp: Utc::now(),
        }
    }

    /// Sent once to every connection right after it registers.
    pub fn connected() -> Self {
        Self::new(
            EventPayload::ConnectionStatus(ConnectionStatus {
                status: "connected".to_string(),
            }),
            None,
        )
    }

    pub fn cluster_update(snapshot: ClusterSnapshot) -> Self {
        let id = snapshot.id.clone();
        Self::new(EventPayload::ClusterUpdate(snapshot), Some(id))
    }

    pub fn cluster_removed(id: String, name: String) -> Self {
        Self::new(
            EventPayload::ClusterRemoved(ClusterRef {
                id: id.clone(),
                name,
            }),
            Some(id),
        )
    }

    pub fn kind(&self) -> &'static str {
        match self.payload {
            EventPayload::ConnectionStatus(_) => "connection_status",
            EventPayload::ClusterUpdate(_) => "cluster_update",
            EventPayload::ClusterRemoved(_) => "cluster_removed",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
