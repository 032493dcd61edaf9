//! Node configuration.
//!
//! Values are resolved in order: built-in defaults, the TOML file (when it
//! exists), `GATEHOUSE_*` environment variables, then command-line flags.
//! The result is validated once and converted into the plain settings the
//! engine consumes.

use gatehouse_core::DeviceId;
use gatehouse_effects::GpioPins;
use gatehouse_engine::{
    ActuationConfig, ExitMonitorConfig, NodeSettings, ProcessorConfig, QueueConfig, RuntimeConfig,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Resolve the default storage path for the node.
///
/// Priority:
/// 1. `$GATEHOUSE_PATH/.gatehouse` if GATEHOUSE_PATH is set
/// 2. `~/.gatehouse` (home directory)
/// 3. `./.gatehouse` (current directory fallback)
pub fn default_storage_path() -> PathBuf {
    std::env::var("GATEHOUSE_PATH")
        .ok()
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".gatehouse")
}

/// Configuration loading and validation failures
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },

    /// An environment override does not parse
    #[error("environment variable {key}={value:?} is not valid")]
    Env {
        /// Variable name
        key: String,
        /// Offending value
        value: String,
    },

    /// A value is out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Full node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Log filter used when neither `--verbose` nor `RUST_LOG` is given
    pub log_level: String,
    /// Identity of this node
    pub device: DeviceSection,
    /// Local persistence
    pub storage: StorageSection,
    /// Periods and timeouts
    pub timing: TimingSection,
    /// Queue sizes
    pub queues: QueueSection,
    /// Door hardware
    pub hardware: HardwareSection,
    /// Uplink spool
    pub remote: RemoteSection,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            device: DeviceSection::default(),
            storage: StorageSection::default(),
            timing: TimingSection::default(),
            queues: QueueSection::default(),
            hardware: HardwareSection::default(),
            remote: RemoteSection::default(),
        }
    }
}

/// `[device]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSection {
    /// Device id used in remote paths
    pub device_id: String,
    /// Reported in the health report
    pub firmware_version: String,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            device_id: "gatehouse-1".to_string(),
            firmware_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// `[storage]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Root for the registry and audit directories
    pub base_path: PathBuf,
    /// Days of audit history kept
    pub audit_retention_days: u32,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            base_path: default_storage_path(),
            audit_retention_days: 30,
        }
    }
}

impl StorageSection {
    /// Directory of the per-set registry files
    pub fn registry_path(&self) -> PathBuf {
        self.base_path.join("registry")
    }

    /// Directory of the day-partitioned audit files
    pub fn audit_path(&self) -> PathBuf {
        self.base_path.join("audit")
    }
}

/// `[timing]`, all values in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSection {
    pub control_period_ms: u64,
    pub network_period_ms: u64,
    pub command_poll_ms: u64,
    pub status_interval_ms: u64,
    pub cooldown_ms: u64,
    pub unlock_ms: u64,
    pub debounce_ms: u64,
    pub registry_lock_timeout_ms: u64,
    pub remote_timeout_ms: u64,
    pub watchdog_timeout_ms: u64,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            control_period_ms: 10,
            network_period_ms: 100,
            command_poll_ms: 2_000,
            status_interval_ms: 60_000,
            cooldown_ms: gatehouse_engine::config::COOLDOWN_MS,
            unlock_ms: gatehouse_engine::config::DEFAULT_UNLOCK_MS,
            debounce_ms: gatehouse_engine::config::DEBOUNCE_MS,
            registry_lock_timeout_ms: gatehouse_engine::config::REGISTRY_LOCK_TIMEOUT_MS,
            remote_timeout_ms: 5_000,
            watchdog_timeout_ms: 5_000,
        }
    }
}

/// `[queues]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSection {
    pub audit_capacity: usize,
    pub pending_capacity: usize,
    pub control_capacity: usize,
    /// Items mirrored per queue per network cycle
    pub mirror_batch: usize,
}

impl Default for QueueSection {
    fn default() -> Self {
        let queues = QueueConfig::default();
        Self {
            audit_capacity: queues.audit_capacity,
            pending_capacity: queues.pending_capacity,
            control_capacity: queues.control_capacity,
            mirror_batch: ProcessorConfig::default().mirror_batch,
        }
    }
}

/// `[hardware]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareSection {
    pub lock_pin: u32,
    pub buzzer_pin: u32,
    pub exit_pin: u32,
    /// Sysfs GPIO root
    pub gpio_root: PathBuf,
    /// Line source for scans; `-` reads standard input
    pub reader_path: String,
}

impl Default for HardwareSection {
    fn default() -> Self {
        Self {
            lock_pin: 17,
            buzzer_pin: 27,
            exit_pin: 22,
            gpio_root: PathBuf::from("/sys/class/gpio"),
            reader_path: "-".to_string(),
        }
    }
}

impl HardwareSection {
    /// Pin assignment for the GPIO handler
    pub fn pins(&self) -> GpioPins {
        GpioPins {
            lock: self.lock_pin,
            buzzer: self.buzzer_pin,
            exit: self.exit_pin,
        }
    }
}

/// `[remote]`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    /// Spool directory shared with the uplink; defaults under `base_path`
    pub spool_path: Option<PathBuf>,
}

impl NodeConfig {
    /// Read `path` over the defaults. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `GATEHOUSE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `GATEHOUSE_*` overrides from `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("GATEHOUSE_DEVICE_ID") {
            self.device.device_id = value;
        }
        if let Some(value) = lookup("GATEHOUSE_LOG_LEVEL") {
            self.log_level = value;
        }
        if let Some(value) = lookup("GATEHOUSE_STORAGE_PATH") {
            self.storage.base_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("GATEHOUSE_SPOOL_PATH") {
            self.remote.spool_path = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("GATEHOUSE_READER_PATH") {
            self.hardware.reader_path = value;
        }
        if let Some(value) = lookup("GATEHOUSE_GPIO_ROOT") {
            self.hardware.gpio_root = PathBuf::from(value);
        }
        if let Some(value) = lookup("GATEHOUSE_AUDIT_RETENTION_DAYS") {
            self.storage.audit_retention_days = value.parse().map_err(|_| ConfigError::Env {
                key: "GATEHOUSE_AUDIT_RETENTION_DAYS".to_string(),
                value,
            })?;
        }
        Ok(())
    }

    /// Spool directory, defaulting under the storage root
    pub fn spool_path(&self) -> PathBuf {
        self.remote
            .spool_path
            .clone()
            .unwrap_or_else(|| self.storage.base_path.join("spool"))
    }

    /// Reject values the node cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        DeviceId::new(self.device.device_id.as_str())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let t = &self.timing;
        let periods = [
            ("timing.control_period_ms", t.control_period_ms),
            ("timing.network_period_ms", t.network_period_ms),
            ("timing.command_poll_ms", t.command_poll_ms),
            ("timing.status_interval_ms", t.status_interval_ms),
            ("timing.remote_timeout_ms", t.remote_timeout_ms),
            ("timing.watchdog_timeout_ms", t.watchdog_timeout_ms),
            ("timing.unlock_ms", t.unlock_ms),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
        }

        let q = &self.queues;
        let capacities = [
            ("queues.audit_capacity", q.audit_capacity),
            ("queues.pending_capacity", q.pending_capacity),
            ("queues.control_capacity", q.control_capacity),
            ("queues.mirror_batch", q.mirror_batch),
        ];
        if let Some((name, _)) = capacities.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
        }

        if self.storage.audit_retention_days == 0 {
            return Err(ConfigError::Invalid(
                "storage.audit_retention_days must be at least 1".to_string(),
            ));
        }
        if self.hardware.reader_path.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "hardware.reader_path cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Engine settings for this configuration. Call [`Self::validate`] first.
    pub fn to_settings(&self) -> Result<NodeSettings, ConfigError> {
        let device = DeviceId::new(self.device.device_id.as_str())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let t = &self.timing;
        Ok(NodeSettings {
            device,
            firmware_version: self.device.firmware_version.clone(),
            audit_dir: self.storage.audit_path(),
            audit_retention_days: self.storage.audit_retention_days,
            lock_timeout: Duration::from_millis(t.registry_lock_timeout_ms),
            actuation: ActuationConfig {
                cooldown_ms: t.cooldown_ms,
                unlock_ms: t.unlock_ms,
            },
            exit: ExitMonitorConfig {
                debounce_ms: t.debounce_ms,
            },
            queues: QueueConfig {
                audit_capacity: self.queues.audit_capacity,
                pending_capacity: self.queues.pending_capacity,
                control_capacity: self.queues.control_capacity,
            },
            processor: ProcessorConfig {
                command_poll: Duration::from_millis(t.command_poll_ms),
                status_interval: Duration::from_millis(t.status_interval_ms),
                remote_timeout: Duration::from_millis(t.remote_timeout_ms),
                mirror_batch: self.queues.mirror_batch,
            },
            runtime: RuntimeConfig {
                control_period: Duration::from_millis(t.control_period_ms),
                network_period: Duration::from_millis(t.network_period_ms),
                watchdog_timeout: Duration::from_millis(t.watchdog_timeout_ms),
            },
        })
    }
}
