//! Sysfs GPIO handler.
//!
//! Drives the lock relay and buzzer and samples the exit input through the
//! legacy `/sys/class/gpio` interface. Each access is a single small file
//! read or write, cheap enough for the control cycle.

use gatehouse_core::effects::{InputEffects, Output, OutputEffects};
use gatehouse_core::HardwareError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// GPIO line numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioPins {
    /// Lock relay output
    pub lock: u32,
    /// Buzzer output
    pub buzzer: u32,
    /// Request-to-exit input
    pub exit: u32,
}

/// GPIO lines under a sysfs root
#[derive(Debug, Clone)]
pub struct SysfsGpioHandler {
    root: PathBuf,
    pins: GpioPins,
}

fn output_error(pin: u32, reason: impl ToString) -> HardwareError {
    HardwareError::Output {
        pin: format!("gpio{pin}"),
        reason: reason.to_string(),
    }
}

impl SysfsGpioHandler {
    /// Export and configure the pins. Outputs start low.
    pub fn open(root: impl Into<PathBuf>, pins: GpioPins) -> Result<Self, HardwareError> {
        let handler = Self {
            root: root.into(),
            pins,
        };
        handler.configure(pins.lock, "low")?;
        handler.configure(pins.buzzer, "low")?;
        handler.configure(pins.exit, "in")?;
        info!(lock = pins.lock, buzzer = pins.buzzer, exit = pins.exit, "gpio configured");
        Ok(handler)
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }

    /// Export `pin` if needed and set its direction. Writing `low` makes an
    /// output that starts low without a glitch.
    fn configure(&self, pin: u32, direction: &str) -> Result<(), HardwareError> {
        let dir = self.pin_dir(pin);
        if !dir.exists() {
            write_value(&self.root.join("export"), &pin.to_string())
                .map_err(|e| output_error(pin, format!("export failed: {e}")))?;
            debug!(pin, "gpio exported");
        }
        write_value(&dir.join("direction"), direction)
            .map_err(|e| output_error(pin, format!("direction failed: {e}")))
    }

    fn output_pin(&self, output: Output) -> u32 {
        match output {
            Output::Lock => self.pins.lock,
            Output::Buzzer => self.pins.buzzer,
        }
    }
}

fn write_value(path: &Path, value: &str) -> std::io::Result<()> {
    fs::write(path, value)
}

impl OutputEffects for SysfsGpioHandler {
    fn set_output(&self, output: Output, high: bool) -> Result<(), HardwareError> {
        let pin = self.output_pin(output);
        write_value(&self.pin_dir(pin).join("value"), if high { "1" } else { "0" })
            .map_err(|e| output_error(pin, e))
    }
}

impl InputEffects for SysfsGpioHandler {
    fn exit_request_level(&self) -> Result<bool, HardwareError> {
        let pin = self.pins.exit;
        let raw = fs::read_to_string(self.pin_dir(pin).join("value")).map_err(|e| {
            HardwareError::Input {
                pin: format!("gpio{pin}"),
                reason: e.to_string(),
            }
        })?;
        Ok(raw.trim() == "1")
    }
}
