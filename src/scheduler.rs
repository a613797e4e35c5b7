//! Polling and output dispatch.
//!
//! The [`Scheduler`] owns the [`DigitalPort`]. Each tick it:
//! 1. samples the inputs (outside the queue lock) and appends any edges to the input log,
//! 2. pops at most one due entry off the output schedule and acts on it,
//! 3. sleeps briefly if neither step produced work.
//!
//! Device failures stop here: they are logged and the daemon carries on. When the
//! device cannot be started the scheduler still runs in degraded mode, where sampling is
//! skipped and output writes fail with `DeviceUnavailable` but are still consumed.
//!
//! Lifecycle: `Initializing → Running → Stopping → Stopped`. Only a dispatched `Quit`
//! leaves `Running`.

use crate::clock::{Clock, Timestamp};
use crate::device::{DigitalPort, PortConfig};
use crate::edge::detect_edges;
use crate::error::DeviceError;
use crate::event::{Bitmask, Event, EventKind};
use crate::queues::EventQueues;
use crate::snapshot::DeviceStatus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default upper bound on the idle sleep between ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonState {
    Initializing,
    Running,
    Stopping,
    Stopped,
}

/// What a dispatched output entry did.
#[derive(Clone, Debug, PartialEq)]
pub enum Dispatched {
    Wrote(Bitmask),
    WriteFailed { value: Bitmask, error: DeviceError },
    Quit,
    Restarted { active: bool },
}

/// Work done by one [`Scheduler::tick`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickOutcome {
    /// Input edges appended to the log.
    pub edges: usize,
    pub dispatched: Option<Dispatched>,
}

impl TickOutcome {
    pub fn is_idle(&self) -> bool {
        self.edges == 0 && self.dispatched.is_none()
    }
}

pub struct Scheduler {
    port: Box<dyn DigitalPort>,
    queues: Arc<EventQueues>,
    clock: Arc<dyn Clock>,
    config: PortConfig,
    poll_interval: Duration,
    state: DaemonState,
    active: bool,
    last_sample: Bitmask,
    // Set while consecutive samples fail, so a flapping device logs once per streak.
    sample_failing: bool,
}

impl Scheduler {
    pub fn new(
        port: Box<dyn DigitalPort>,
        queues: Arc<EventQueues>,
        clock: Arc<dyn Clock>,
        config: PortConfig,
    ) -> Self {
        Self {
            port,
            queues,
            clock,
            config,
            poll_interval: DEFAULT_POLL_INTERVAL,
            state: DaemonState::Initializing,
            active: false,
            last_sample: 0,
            sample_failing: false,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// `false` while running degraded.
    pub fn device_active(&self) -> bool {
        self.active
    }

    /// Start the device and enter `Running`, degraded if the device will not start.
    pub fn start(&mut self) {
        self.set_state(DaemonState::Initializing);
        info!(
            input = %self.config.input_channel(),
            output = %self.config.output_channel(),
            backend = self.port.name(),
            "starting digital I/O"
        );
        self.open_device();
        self.set_state(DaemonState::Running);
    }

    /// Run one sample + dispatch pass. Does nothing unless `Running`.
    pub fn tick(&mut self) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if self.state != DaemonState::Running {
            return outcome;
        }

        if self.active {
            outcome.edges = self.sample();
        }

        let now = self.clock.now();
        if let Some(event) = self.queues.pop_due_output(now) {
            outcome.dispatched = self.dispatch(event);
        }
        outcome
    }

    /// Release the device and drop everything still queued.
    pub fn shutdown(&mut self) {
        if self.state == DaemonState::Stopped {
            return;
        }
        self.set_state(DaemonState::Stopping);
        self.port.stop();
        self.active = false;
        let discarded = self.queues.output_len();
        self.queues.clear_all();
        self.publish_status();
        self.set_state(DaemonState::Stopped);
        info!(discarded, "digital I/O stopped");
    }

    /// Start, tick until a `Quit` is dispatched, then shut down.
    pub fn run(mut self) {
        self.start();
        while self.state == DaemonState::Running {
            let outcome = self.tick();
            if outcome.is_idle() {
                std::thread::sleep(self.idle_sleep());
            }
        }
        self.shutdown();
    }

    /// Poll interval, shortened when the next output is due sooner.
    fn idle_sleep(&self) -> Duration {
        match self.queues.peek_output() {
            Some(next) => {
                let until = next.timestamp() - self.clock.now();
                if until <= 0.0 {
                    Duration::ZERO
                } else if until >= self.poll_interval.as_secs_f64() {
                    self.poll_interval
                } else {
                    Duration::from_secs_f64(until)
                }
            }
            None => self.poll_interval,
        }
    }

    fn sample(&mut self) -> usize {
        match self.port.sample_inputs() {
            Ok(sample) => {
                if self.sample_failing {
                    info!("input sampling recovered");
                    self.sample_failing = false;
                }
                let now = self.clock.now();
                if sample == self.last_sample {
                    return 0;
                }
                let events = detect_edges(self.last_sample, sample, now);
                self.last_sample = sample;
                let edges = events.len();
                let discarded = self.queues.publish_sample(sample, events);
                if discarded > 0 {
                    warn!(discarded, "input log full, dropped oldest edges");
                }
                edges
            }
            Err(e) => {
                if !self.sample_failing {
                    warn!(error = %e, "input sample failed, treating as unchanged");
                    self.sample_failing = true;
                }
                0
            }
        }
    }

    fn dispatch(&mut self, event: Event) -> Option<Dispatched> {
        match event.kind() {
            EventKind::OutputWrite { value } => Some(self.write(value, event.timestamp())),
            EventKind::Quit => {
                info!("quit dispatched");
                self.set_state(DaemonState::Stopping);
                Some(Dispatched::Quit)
            }
            EventKind::Init => {
                if let Some(config) = self.queues.take_pending_init() {
                    self.config = config;
                }
                self.port.stop();
                self.open_device();
                Some(Dispatched::Restarted {
                    active: self.active,
                })
            }
            EventKind::InputRose { .. } | EventKind::InputFell { .. } => {
                warn!(?event, "input edge found in output schedule, ignoring");
                None
            }
        }
    }

    fn write(&mut self, value: Bitmask, due: Timestamp) -> Dispatched {
        let result = if self.active {
            self.port.write_output(value)
        } else {
            Err(DeviceError::DeviceUnavailable(
                "no device active".to_string(),
            ))
        };
        match result {
            Ok(()) => {
                debug!(value, due, "output written");
                Dispatched::Wrote(value)
            }
            Err(error) => {
                warn!(value, due, error = %error, "output write failed, event dropped");
                Dispatched::WriteFailed { value, error }
            }
        }
    }

    fn open_device(&mut self) {
        self.last_sample = 0;
        self.sample_failing = false;
        self.active = match self.port.start(&self.config) {
            Ok(()) => {
                info!(
                    input = %self.config.input_channel(),
                    output = %self.config.output_channel(),
                    "device started"
                );
                true
            }
            Err(DeviceError::DeviceNotFound) => {
                warn!("no device found, running without hardware");
                false
            }
            Err(e) => {
                error!(
                    error = %e,
                    input = %self.config.input_channel(),
                    output = %self.config.output_channel(),
                    "could not start device, running without hardware"
                );
                false
            }
        };
        self.publish_status();
    }

    fn publish_status(&self) {
        self.queues.publish_device_status(DeviceStatus {
            active: self.active,
            backend: self.port.name().to_string(),
            config: self.config.clone(),
            last_sample: self.last_sample,
        });
    }

    fn set_state(&mut self, state: DaemonState) {
        self.state = state;
        self.queues.set_state(state);
    }
}
