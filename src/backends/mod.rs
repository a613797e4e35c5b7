//! Digital port backends.
//!
//! Implementations of [`DigitalPort`](crate::device::DigitalPort).
//!
//! # Feature flags
//! - **`hid`** — enables the USB-HID board backend (`hidapi`, needs the platform HID
//!   libraries at build time).
//!
//! The virtual backend is always available; it is what tests and hardware-less setups use.

use crate::device::{DigitalPort, PortConfig};
use crate::error::DeviceError;
use serde::{Deserialize, Serialize};

#[cfg(feature = "hid")]
#[cfg_attr(docsrs, doc(cfg(feature = "hid")))]
pub mod hid;
pub mod virtual_port;

pub use virtual_port::{VirtualPort, VirtualPortHandle};

/// Which backend drives the port.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Virtual,
    Hid,
}

/// Identity and timing of a USB-HID board.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HidSettings {
    pub vendor_id: u16,
    pub product_id: u16,
    pub read_timeout_ms: i32,
}

impl Default for HidSettings {
    fn default() -> Self {
        // National Instruments USB-6501
        Self {
            vendor_id: 0x3923,
            product_id: 0x7272,
            read_timeout_ms: 10,
        }
    }
}

/// The `[port]` section of the daemon config.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortSettings {
    pub backend: BackendKind,
    #[serde(flatten)]
    pub config: PortConfig,
    pub hid: HidSettings,
}

/// Build the configured backend. The port is returned unstarted.
pub fn open_port(settings: &PortSettings) -> Result<Box<dyn DigitalPort>, DeviceError> {
    match settings.backend {
        BackendKind::Virtual => Ok(Box::new(VirtualPort::new("virtual"))),
        #[cfg(feature = "hid")]
        BackendKind::Hid => Ok(Box::new(hid::HidPort::new(settings.hid.clone()))),
        #[cfg(not(feature = "hid"))]
        BackendKind::Hid => Err(DeviceError::ChannelConfig(
            "built without the `hid` feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_backend_opens() {
        let port = open_port(&PortSettings::default()).unwrap();
        assert_eq!(port.name(), "virtual");
    }

    #[cfg(not(feature = "hid"))]
    #[test]
    fn hid_backend_needs_feature() {
        let settings = PortSettings {
            backend: BackendKind::Hid,
            ..PortSettings::default()
        };
        assert!(matches!(
            open_port(&settings),
            Err(DeviceError::ChannelConfig(_))
        ));
    }
}
