//! Results reported back by the workers

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status tokens emitted by the workers
pub mod status {
    pub const CLONED: &str = "cloned";
    pub const BUILDING: &str = "building";
    pub const BUILT: &str = "built";
    pub const RUNNING: &str = "running";
    pub const STOPPED: &str = "stopped";
    pub const DELETED: &str = "deleted";
}

/// Outcome of a command, as published on the result routing key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMessage {
    pub deployment_id: Uuid,

    /// Raw worker status token, mapped by the API
    pub status: String,
}

impl ResultMessage {
    pub fn new(deployment_id: Uuid, status: impl Into<String>) -> Self {
        Self {
            deployment_id,
            status: status.into(),
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}
