//! digio — digital I/O event daemon.
//!
//! Polls a digital input port for level changes, timestamps every edge, and drives a
//! digital output port at controller-scheduled times. A controller process talks to the
//! daemon over a local socket with a small command set (`init`, `dig_in`, `dig_out`,
//! `list`, `quit`, `time`).

pub mod backends;
#[cfg(unix)]
pub mod client;
pub mod channel;
pub mod clock;
pub mod command;
pub mod config;
pub mod daemon;
pub mod device;
pub mod edge;
pub mod error;
pub mod event;
pub mod logger;
pub mod protocol;
pub mod queues;
pub mod scheduler;
pub mod snapshot;
#[cfg(unix)]
pub mod transport;

pub use channel::{request_channel, Controller, RequestReceiver};
pub use clock::{Clock, ManualClock, MonotonicClock, Timestamp};
pub use command::{Command, CommandChannel, CommandProcessor, DigInPayload, Reply, ReplyPayload};
pub use config::DaemonConfig;
pub use daemon::Daemon;
pub use device::{DigitalPort, PortConfig};
pub use edge::detect_edges;
pub use error::{ChannelError, ConfigError, DeviceError, Error, Result};
pub use event::{Bitmask, Event, EventKind, Line};
pub use queues::EventQueues;
pub use scheduler::{DaemonState, Scheduler};
pub use snapshot::StatusReport;
