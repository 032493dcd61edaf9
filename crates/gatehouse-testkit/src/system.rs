//! Fixed system indicators.

use gatehouse_core::effects::SystemEffects;

/// System indicators with constant values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedSystemInfo {
    /// Reported network address
    pub address: Option<String>,
    /// Reported signal strength
    pub signal: Option<i32>,
    /// Reported free memory
    pub free_memory: Option<u64>,
}

impl Default for FixedSystemInfo {
    fn default() -> Self {
        Self {
            address: Some("192.0.2.10".to_string()),
            signal: Some(-58),
            free_memory: Some(96 * 1024),
        }
    }
}

impl SystemEffects for FixedSystemInfo {
    fn network_address(&self) -> Option<String> {
        self.address.clone()
    }

    fn signal_strength(&self) -> Option<i32> {
        self.signal
    }

    fn free_memory(&self) -> Option<u64> {
        self.free_memory
    }
}
