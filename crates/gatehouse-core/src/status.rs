//! Device health report published to `/devices/{id}/status`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Items dropped per bounded queue since start-up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDrops {
    /// Audit-mirror queue
    pub audit: u64,
    /// Pending-notice queue
    pub pending: u64,
    /// Control (remote unlock) queue
    pub control: u64,
    /// Sum of the above
    pub total: u64,
}

impl QueueDrops {
    /// Build from per-queue counters
    pub fn new(audit: u64, pending: u64, control: u64) -> Self {
        Self {
            audit,
            pending,
            control,
            total: audit.saturating_add(pending).saturating_add(control),
        }
    }
}

/// Periodic health report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    /// Whether the device considers itself online
    pub online: bool,
    /// Wall-clock time of the report, if synchronized
    pub last_seen: Option<DateTime<Utc>>,
    /// Current network address
    pub ip: Option<String>,
    /// Connectivity signal quality (dBm)
    pub signal: Option<i32>,
    /// Free memory indicator in bytes
    pub free_memory: Option<u64>,
    /// Seconds since start-up
    pub uptime: u64,
    /// Queue overflow counters
    pub queue_drops: QueueDrops,
    /// Firmware version string
    pub firmware_version: String,
    /// Execution contexts that missed their liveness deadline
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stale_contexts: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        let status = DeviceStatus {
            online: true,
            last_seen: None,
            ip: Some("10.0.0.2".to_string()),
            signal: Some(-61),
            free_memory: Some(1024),
            uptime: 42,
            queue_drops: QueueDrops::new(1, 2, 0),
            firmware_version: "1.0.0".to_string(),
            stale_contexts: Vec::new(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["freeMemory"], 1024);
        assert_eq!(json["queueDrops"]["total"], 3);
        assert_eq!(json["firmwareVersion"], "1.0.0");
        assert!(json.get("staleContexts").is_none());
    }
}
