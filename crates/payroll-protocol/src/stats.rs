use serde::{Deserialize, Serialize};

/// Read-only snapshot of the hub, returned verbatim by `GET /api/sse/stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub active_connections: usize,
    pub max_connections: usize,
    /// One entry per open stream; an admin with two tabs appears twice.
    pub subscriber_ids: Vec<String>,
    pub history_size: usize,
    pub max_history_size: usize,
    pub throttle_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
}
