//! The input log and the output schedule, behind one lock.
//!
//! Both queues share a single [`Mutex`] so that a status report sees them in a consistent
//! joint state. Every operation holds the lock for its whole duration and never calls out
//! to the device or the scheduler while holding it.
//!
//! - **Input log**: FIFO of input edges in arrival order, capped; on overflow the oldest
//!   entries are discarded and counted.
//! - **Output schedule**: sorted ascending by due time. Entries with equal due times keep
//!   submission order.

use crate::clock::Timestamp;
use crate::device::PortConfig;
use crate::event::{Bitmask, Event};
use crate::scheduler::DaemonState;
use crate::snapshot::{DeviceStatus, PendingOutput, StatusReport};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default cap on buffered input edges.
pub const DEFAULT_INPUT_CAPACITY: usize = 4096;

/// Result of [`EventQueues::drain_inputs`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputDrain {
    /// Oldest first.
    pub events: Vec<Event>,
    /// Edges discarded due to overflow since the previous drain.
    pub dropped: u64,
}

struct Shared {
    input: VecDeque<Event>,
    output: VecDeque<Event>,
    dropped: u64,
    state: DaemonState,
    device: DeviceStatus,
    pending_init: Option<PortConfig>,
}

pub struct EventQueues {
    capacity: usize,
    shared: Mutex<Shared>,
}

impl EventQueues {
    pub fn new(input_capacity: usize) -> Self {
        Self {
            capacity: input_capacity.max(1),
            shared: Mutex::new(Shared {
                input: VecDeque::new(),
                output: VecDeque::new(),
                dropped: 0,
                state: DaemonState::Initializing,
                device: DeviceStatus::default(),
                pending_init: None,
            }),
        }
    }

    // Every mutation finishes before the guard drops, so a panic elsewhere cannot leave
    // the queues half-updated.
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append input edges. Returns how many old entries were discarded to make room.
    pub fn push_input(&self, events: impl IntoIterator<Item = Event>) -> usize {
        let mut shared = self.lock();
        self.append_inputs(&mut shared, events)
    }

    /// Record `sample` as the last observed input level and append the edges it produced,
    /// in one critical section. Returns how many old entries were discarded.
    pub fn publish_sample(
        &self,
        sample: Bitmask,
        events: impl IntoIterator<Item = Event>,
    ) -> usize {
        let mut shared = self.lock();
        shared.device.last_sample = sample;
        self.append_inputs(&mut shared, events)
    }

    fn append_inputs(
        &self,
        shared: &mut Shared,
        events: impl IntoIterator<Item = Event>,
    ) -> usize {
        let mut discarded = 0;
        for event in events {
            debug_assert!(event.is_input(), "output event pushed to input log");
            while shared.input.len() >= self.capacity {
                shared.input.pop_front();
                discarded += 1;
            }
            shared.input.push_back(event);
        }
        shared.dropped += discarded as u64;
        discarded
    }

    /// Take every buffered input edge, oldest first, and reset the overflow count.
    pub fn drain_inputs(&self) -> InputDrain {
        let mut shared = self.lock();
        let events = shared.input.drain(..).collect();
        let dropped = std::mem::take(&mut shared.dropped);
        InputDrain { events, dropped }
    }

    /// Insert into the output schedule after every entry due at or before `event`.
    pub fn push_output_sorted(&self, event: Event) {
        debug_assert!(!event.is_input(), "input edge pushed to output schedule");
        let mut shared = self.lock();
        let idx = shared
            .output
            .partition_point(|queued| queued.timestamp() <= event.timestamp());
        shared.output.insert(idx, event);
    }

    /// Remove and return the head of the schedule if it is due at `now`.
    pub fn pop_due_output(&self, now: Timestamp) -> Option<Event> {
        let mut shared = self.lock();
        let due = shared
            .output
            .front()
            .map_or(false, |head| head.timestamp() <= now);
        if due {
            shared.output.pop_front()
        } else {
            None
        }
    }

    pub fn peek_output(&self) -> Option<Event> {
        self.lock().output.front().copied()
    }

    /// Drop everything pending in both queues. Nothing is flushed.
    pub fn clear_all(&self) {
        let mut shared = self.lock();
        shared.input.clear();
        shared.output.clear();
        shared.dropped = 0;
        shared.pending_init = None;
    }

    /// Record `config` as the next device configuration and schedule an `Init` at `at`.
    ///
    /// A later request replaces an earlier one that has not been applied yet.
    pub fn request_init(&self, config: PortConfig, at: Timestamp) {
        let mut shared = self.lock();
        shared.pending_init = Some(config);
        let event = Event::init(at);
        let idx = shared
            .output
            .partition_point(|queued| queued.timestamp() <= at);
        shared.output.insert(idx, event);
    }

    pub fn take_pending_init(&self) -> Option<PortConfig> {
        self.lock().pending_init.take()
    }

    pub fn state(&self) -> DaemonState {
        self.lock().state
    }

    pub fn set_state(&self, state: DaemonState) {
        self.lock().state = state;
    }

    pub fn device_status(&self) -> DeviceStatus {
        self.lock().device.clone()
    }

    pub fn publish_device_status(&self, status: DeviceStatus) {
        self.lock().device = status;
    }

    /// Port configuration `init` should start from: the pending one if any, else the
    /// one the device is running with.
    pub fn effective_port_config(&self) -> PortConfig {
        let shared = self.lock();
        shared
            .pending_init
            .clone()
            .unwrap_or_else(|| shared.device.config.clone())
    }

    pub fn input_len(&self) -> usize {
        self.lock().input.len()
    }

    pub fn output_len(&self) -> usize {
        self.lock().output.len()
    }

    /// Copy of the output schedule in dispatch order.
    pub fn outputs(&self) -> Vec<Event> {
        self.lock().output.iter().copied().collect()
    }

    /// Joint read of both queues and the device status.
    pub fn snapshot(&self, now: Timestamp) -> StatusReport {
        let shared = self.lock();
        StatusReport {
            state: shared.state,
            device_active: shared.device.active,
            backend: shared.device.backend.clone(),
            input_channel: shared.device.config.input_channel(),
            output_channel: shared.device.config.output_channel(),
            last_sample: shared.device.last_sample,
            pending_inputs: shared.input.len(),
            dropped_inputs: shared.dropped,
            pending_outputs: shared
                .output
                .iter()
                .filter_map(|event| PendingOutput::from_event(event, now))
                .collect(),
        }
    }
}

impl Default for EventQueues {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_CAPACITY)
    }
}
