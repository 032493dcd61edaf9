//! System indicators for the health report.

use gatehouse_core::effects::SystemEffects;
use parking_lot::Mutex;
use std::fs;
use std::net::UdpSocket;
use std::path::PathBuf;
use sysinfo::System;

const WIRELESS_STATUS: &str = "/proc/net/wireless";

/// Documentation-range address; connecting a UDP socket sends nothing but
/// makes the kernel pick the outbound interface.
const ROUTE_PROBE: &str = "192.0.2.1:80";

/// Reads address, signal and memory from the host
pub struct SystemInfoHandler {
    system: Mutex<System>,
    wireless_status: PathBuf,
}

impl std::fmt::Debug for SystemInfoHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemInfoHandler")
            .field("wireless_status", &self.wireless_status)
            .finish_non_exhaustive()
    }
}

impl SystemInfoHandler {
    /// Handler over the live host
    pub fn new() -> Self {
        Self::with_wireless_status(WIRELESS_STATUS)
    }

    /// Handler reading link quality from a custom `/proc/net/wireless` copy
    pub fn with_wireless_status(path: impl Into<PathBuf>) -> Self {
        Self {
            system: Mutex::new(System::new()),
            wireless_status: path.into(),
        }
    }
}

impl Default for SystemInfoHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Signal level in dBm of the first interface listed.
fn parse_wireless_level(contents: &str) -> Option<i32> {
    // Two header lines, then: iface: status link level noise ...
    let line = contents.lines().nth(2)?;
    let (_, stats) = line.split_once(':')?;
    let level = stats.split_whitespace().nth(2)?;
    level.trim_end_matches('.').parse::<f64>().ok().map(|v| v as i32)
}

impl SystemEffects for SystemInfoHandler {
    fn network_address(&self) -> Option<String> {
        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect(ROUTE_PROBE).ok()?;
        let ip = socket.local_addr().ok()?.ip();
        (!ip.is_unspecified()).then(|| ip.to_string())
    }

    fn signal_strength(&self) -> Option<i32> {
        fs::read_to_string(&self.wireless_status)
            .ok()
            .and_then(|contents| parse_wireless_level(&contents))
    }

    fn free_memory(&self) -> Option<u64> {
        let mut system = self.system.lock();
        system.refresh_memory();
        Some(system.available_memory()).filter(|bytes| *bytes > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Inter-| sta-|   Quality        |   Discarded packets               | Missed | WE
 face | tus | link level noise |  nwid  crypt   frag  retry   misc | beacon | 22
 wlan0: 0000   52.  -58.  -256        0      0      0      0     12        0
";

    #[test]
    fn test_parse_wireless_level() {
        assert_eq!(parse_wireless_level(SAMPLE), Some(-58));
        assert_eq!(parse_wireless_level("header\nheader\n"), None);
    }

    #[test]
    fn test_missing_wireless_file_has_no_signal() {
        let dir = tempfile::tempdir().unwrap();
        let handler = SystemInfoHandler::with_wireless_status(dir.path().join("wireless"));
        assert_eq!(handler.signal_strength(), None);

        fs::write(dir.path().join("wireless"), SAMPLE).unwrap();
        assert_eq!(handler.signal_strength(), Some(-58));
    }
}
