//! USB-HID digital I/O board.
//!
//! [`HidPort`] wraps a `hidapi::HidDevice` located by vendor/product id. It assumes the
//! common report layout of simple HID DIO boards:
//! - **Input report:** one byte per port; byte `n` is the level of port `n`.
//! - **Output report:** `[report_id = 0, port, value]`.
//!
//! Reads use a short timeout. A read that returns no report means the board had nothing
//! new to say, so the last sample is reported again.

use super::HidSettings;
use crate::device::{DigitalPort, PortConfig};
use crate::error::DeviceError;
use crate::event::Bitmask;
use hidapi::{HidApi, HidDevice};

/// Largest input report we expect from a DIO board.
const REPORT_LEN: usize = 64;

pub struct HidPort {
    settings: HidSettings,
    open: Option<OpenBoard>,
}

struct OpenBoard {
    raw: HidDevice,
    input_port: u8,
    output_port: u8,
    last: Bitmask,
    buf: [u8; REPORT_LEN],
}

impl HidPort {
    pub fn new(settings: HidSettings) -> Self {
        Self {
            settings,
            open: None,
        }
    }

    fn board(&mut self) -> Result<&mut OpenBoard, DeviceError> {
        self.open
            .as_mut()
            .ok_or_else(|| DeviceError::DeviceUnavailable("HID board is not open".to_string()))
    }
}

impl DigitalPort for HidPort {
    fn start(&mut self, config: &PortConfig) -> Result<(), DeviceError> {
        config.validate()?;
        self.stop();

        let api = HidApi::new().map_err(|e| DeviceError::ChannelConfig(e.to_string()))?;
        let raw = api
            .open(self.settings.vendor_id, self.settings.product_id)
            .map_err(|_| DeviceError::DeviceNotFound)?;

        tracing::debug!(
            vid = self.settings.vendor_id,
            pid = self.settings.product_id,
            product = %raw.get_product_string().ok().flatten().unwrap_or_default(),
            "opened HID board"
        );

        self.open = Some(OpenBoard {
            raw,
            input_port: config.input_port,
            output_port: config.output_port,
            last: 0,
            buf: [0u8; REPORT_LEN],
        });
        Ok(())
    }

    fn sample_inputs(&mut self) -> Result<Bitmask, DeviceError> {
        let timeout = self.settings.read_timeout_ms;
        let board = self.board()?;
        let n = board
            .raw
            .read_timeout(&mut board.buf, timeout)
            .map_err(|e| DeviceError::DeviceUnavailable(e.to_string()))?;
        if n == 0 {
            return Ok(board.last);
        }
        let idx = usize::from(board.input_port);
        if idx >= n {
            return Err(DeviceError::ChannelConfig(format!(
                "input report has {n} bytes, port {idx} is out of range"
            )));
        }
        board.last = board.buf[idx];
        Ok(board.last)
    }

    fn write_output(&mut self, value: Bitmask) -> Result<(), DeviceError> {
        let board = self.board()?;
        let report = [0u8, board.output_port, value];
        board
            .raw
            .write(&report)
            .map(|_| ())
            .map_err(|e| DeviceError::DeviceUnavailable(e.to_string()))
    }

    fn stop(&mut self) {
        // Dropping the HidDevice closes the handle.
        self.open = None;
    }

    fn name(&self) -> &str {
        "hid"
    }
}
