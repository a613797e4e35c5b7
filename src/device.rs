//! Digital port abstraction.
//!
//! A [`DigitalPort`] is one 8-line input port and one 8-line output port on a single
//! device. Only the scheduler thread talks to it; implementations are expected to bound
//! every call with a short driver timeout rather than block indefinitely.

use crate::error::DeviceError;
use crate::event::Bitmask;
use serde::{Deserialize, Serialize};

/// Which device and which ports to open.
///
/// `device` is an opaque driver identifier (e.g. `"Dev1"`); ports are indices on it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    pub device: String,
    pub input_port: u8,
    pub output_port: u8,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            device: "Dev1".to_string(),
            input_port: 1,
            output_port: 2,
        }
    }
}

impl PortConfig {
    /// Reject configurations no driver could honor.
    pub fn validate(&self) -> Result<(), DeviceError> {
        if self.device.trim().is_empty() {
            return Err(DeviceError::ChannelConfig(
                "device name must not be empty".to_string(),
            ));
        }
        if self.input_port == self.output_port {
            return Err(DeviceError::ChannelConfig(format!(
                "input and output must use different ports (both are {})",
                self.input_port
            )));
        }
        Ok(())
    }

    /// Human-readable `device/portN` names, as shown in status reports.
    pub fn input_channel(&self) -> String {
        format!("{}/port{}", self.device, self.input_port)
    }

    pub fn output_channel(&self) -> String {
        format!("{}/port{}", self.device, self.output_port)
    }
}

pub trait DigitalPort: Send {
    /// Open the input and output channels described by `config`.
    ///
    /// Fails with [`DeviceError::DeviceNotFound`] when no hardware is attached and with
    /// [`DeviceError::ChannelConfig`] for any other driver failure. Calling `start` on an
    /// already started port restarts it.
    fn start(&mut self, config: &PortConfig) -> Result<(), DeviceError>;

    /// Read the current level of all input lines.
    fn sample_inputs(&mut self) -> Result<Bitmask, DeviceError>;

    /// Drive all output lines to `value`.
    fn write_output(&mut self, value: Bitmask) -> Result<(), DeviceError>;

    /// Release both channels. Idempotent.
    fn stop(&mut self);

    /// Backend name for status reports.
    fn name(&self) -> &str;
}
