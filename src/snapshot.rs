//! Point-in-time daemon status.
//!
//! [`StatusReport`] is an **owned**, read-only view of both queues and the published
//! device status, taken under the queue lock in one step so the counts agree with each
//! other. It is what the `list` command returns.
//!
//! # Semantics
//! - `pending_outputs` is in dispatch order (earliest first).
//! - `due_in` is seconds from the snapshot time; negative means overdue and will fire
//!   on the next scheduler tick.
//! - `dropped_inputs` counts input edges discarded because the input log was full since
//!   the last `digin`.

use crate::clock::Timestamp;
use crate::device::PortConfig;
use crate::event::{Bitmask, Event, EventKind};
use crate::scheduler::DaemonState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device facts the scheduler publishes for status reports.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub active: bool,
    pub backend: String,
    pub config: PortConfig,
    pub last_sample: Bitmask,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingKind {
    Write,
    Quit,
    Init,
}

/// One entry of the output schedule as seen by `list`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingOutput {
    pub kind: PendingKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Bitmask>,
    pub due_in: f64,
}

impl PendingOutput {
    /// Returns `None` for input edges, which never sit in the output schedule.
    pub(crate) fn from_event(event: &Event, now: Timestamp) -> Option<Self> {
        let (kind, value) = match event.kind() {
            EventKind::OutputWrite { value } => (PendingKind::Write, Some(value)),
            EventKind::Quit => (PendingKind::Quit, None),
            EventKind::Init => (PendingKind::Init, None),
            EventKind::InputRose { .. } | EventKind::InputFell { .. } => return None,
        };
        Some(Self {
            kind,
            value,
            due_in: event.timestamp() - now,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub state: DaemonState,
    pub device_active: bool,
    pub backend: String,
    pub input_channel: String,
    pub output_channel: String,
    pub last_sample: Bitmask,
    pub pending_inputs: usize,
    pub dropped_inputs: u64,
    pub pending_outputs: Vec<PendingOutput>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "digio daemon is {:?}", self.state)?;
        if !self.device_active {
            writeln!(f, "{} device is not initialized.", self.backend)?;
        } else {
            writeln!(
                f,
                "Input port is: {}. Output port is: {}.",
                self.input_channel, self.output_channel
            )?;
        }
        if self.pending_outputs.is_empty() {
            writeln!(f, "No digout events pending.")?;
        }
        for pending in &self.pending_outputs {
            match (pending.kind, pending.value) {
                (PendingKind::Write, Some(value)) => writeln!(
                    f,
                    "Set output port to {value} is pending in {:.6} seconds.",
                    pending.due_in
                )?,
                (kind, _) => writeln!(
                    f,
                    "{kind:?} is pending in {:.6} seconds.",
                    pending.due_in
                )?,
            }
        }
        write!(f, "{} digin events in queue", self.pending_inputs)?;
        if self.dropped_inputs > 0 {
            write!(f, " ({} dropped)", self.dropped_inputs)?;
        }
        Ok(())
    }
}
