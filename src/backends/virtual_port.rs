//! In-memory digital port.
//!
//! [`VirtualPort`] behaves like a real board from the scheduler's point of view. A
//! [`VirtualPortHandle`] (cloneable, usable from any thread) plays the part of the
//! outside world: it sets input levels, reads back what was written, unplugs the board
//! and injects read failures.

use crate::device::{DigitalPort, PortConfig};
use crate::error::DeviceError;
use crate::event::Bitmask;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct Wires {
    present: bool,
    started: bool,
    inputs: Bitmask,
    writes: Vec<Bitmask>,
    failing_samples: usize,
    starts: usize,
    samples: usize,
    config: Option<PortConfig>,
}

impl Default for Wires {
    fn default() -> Self {
        Self {
            present: true,
            started: false,
            inputs: 0,
            writes: Vec::new(),
            failing_samples: 0,
            starts: 0,
            samples: 0,
            config: None,
        }
    }
}

fn lock(wires: &Mutex<Wires>) -> MutexGuard<'_, Wires> {
    wires.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct VirtualPort {
    name: String,
    wires: Arc<Mutex<Wires>>,
}

impl VirtualPort {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            wires: Arc::new(Mutex::new(Wires::default())),
        }
    }

    /// A port whose board is unplugged; `start` reports `DeviceNotFound`.
    pub fn absent(name: &str) -> Self {
        let port = Self::new(name);
        lock(&port.wires).present = false;
        port
    }

    pub fn handle(&self) -> VirtualPortHandle {
        VirtualPortHandle {
            wires: Arc::clone(&self.wires),
        }
    }
}

impl DigitalPort for VirtualPort {
    fn start(&mut self, config: &PortConfig) -> Result<(), DeviceError> {
        config.validate()?;
        let mut wires = lock(&self.wires);
        wires.starts += 1;
        if !wires.present {
            wires.started = false;
            return Err(DeviceError::DeviceNotFound);
        }
        wires.started = true;
        wires.config = Some(config.clone());
        Ok(())
    }

    fn sample_inputs(&mut self) -> Result<Bitmask, DeviceError> {
        let mut wires = lock(&self.wires);
        wires.samples += 1;
        if !wires.present || !wires.started {
            return Err(DeviceError::DeviceUnavailable(
                "virtual port is not started".to_string(),
            ));
        }
        if wires.failing_samples > 0 {
            wires.failing_samples -= 1;
            return Err(DeviceError::Timeout);
        }
        Ok(wires.inputs)
    }

    fn write_output(&mut self, value: Bitmask) -> Result<(), DeviceError> {
        let mut wires = lock(&self.wires);
        if !wires.present || !wires.started {
            return Err(DeviceError::DeviceUnavailable(
                "virtual port is not started".to_string(),
            ));
        }
        wires.writes.push(value);
        Ok(())
    }

    fn stop(&mut self) {
        lock(&self.wires).started = false;
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Test-side access to a [`VirtualPort`].
#[derive(Clone)]
pub struct VirtualPortHandle {
    wires: Arc<Mutex<Wires>>,
}

impl VirtualPortHandle {
    /// Drive the input lines to `levels`.
    pub fn set_inputs(&self, levels: Bitmask) {
        lock(&self.wires).inputs = levels;
    }

    /// Every value written to the output port so far, oldest first.
    pub fn writes(&self) -> Vec<Bitmask> {
        lock(&self.wires).writes.clone()
    }

    /// Plug or unplug the board. Takes effect on the next `start`.
    pub fn set_present(&self, present: bool) {
        lock(&self.wires).present = present;
    }

    /// Make the next `count` samples fail with `Timeout`.
    pub fn fail_next_samples(&self, count: usize) {
        lock(&self.wires).failing_samples = count;
    }

    pub fn is_started(&self) -> bool {
        lock(&self.wires).started
    }

    /// How many times `start` was called.
    pub fn start_count(&self) -> usize {
        lock(&self.wires).starts
    }

    /// How many times `sample_inputs` was called, failed calls included.
    pub fn sample_count(&self) -> usize {
        lock(&self.wires).samples
    }

    /// Configuration from the last successful `start`.
    pub fn config(&self) -> Option<PortConfig> {
        lock(&self.wires).config.clone()
    }
}
