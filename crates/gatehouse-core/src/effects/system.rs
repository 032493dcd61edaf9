//! System indicators for the health report.

use std::sync::Arc;

/// Best-effort device indicators; every value is optional.
pub trait SystemEffects: Send + Sync {
    /// Current network address
    fn network_address(&self) -> Option<String>;

    /// Connectivity signal quality in dBm
    fn signal_strength(&self) -> Option<i32>;

    /// Free memory in bytes
    fn free_memory(&self) -> Option<u64>;
}

impl<T: SystemEffects + ?Sized> SystemEffects for Arc<T> {
    fn network_address(&self) -> Option<String> {
        (**self).network_address()
    }

    fn signal_strength(&self) -> Option<i32> {
        (**self).signal_strength()
    }

    fn free_memory(&self) -> Option<u64> {
        (**self).free_memory()
    }
}
