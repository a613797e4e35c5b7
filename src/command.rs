//! Controller commands and the loop that serves them.
//!
//! Each [`Command`] maps to exactly one queue operation. The processor never touches the
//! device: `init` and `quit` only schedule intent that the scheduler acts on.

use crate::clock::{Clock, Timestamp};
use crate::error::{ChannelError, Error, Result};
use crate::event::{Bitmask, Event, EventKind, Line};
use crate::queues::{EventQueues, InputDrain};
use crate::scheduler::DaemonState;
use crate::snapshot::StatusReport;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long the command loop waits for a request before re-checking the daemon state.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_millis(50);

/// `type` value of a rising edge in a `dig_in` reply.
pub const DIG_UP: u8 = 1;
/// `type` value of a falling edge in a `dig_in` reply.
pub const DIG_DOWN: u8 = 0;

/// Request from the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    /// (Re)start the device. Omitted fields keep their current values.
    Init {
        #[serde(default)]
        device: Option<String>,
        #[serde(default)]
        input_port: Option<u8>,
        #[serde(default)]
        output_port: Option<u8>,
    },

    /// Take every buffered input edge.
    DigIn,

    /// Drive the output port to `value` at daemon time `time`.
    DigOut { time: Timestamp, value: Bitmask },

    /// Report status.
    List,

    /// Stop the daemon at the next tick.
    Quit,

    /// Report the daemon's current clock reading.
    Time,
}

/// Input edges as parallel arrays, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DigInPayload {
    /// [`DIG_UP`] or [`DIG_DOWN`] per edge.
    #[serde(rename = "type")]
    pub kind: Vec<u8>,
    pub line: Vec<Line>,
    pub when: Vec<Timestamp>,
    /// Edges lost to input log overflow since the previous `dig_in`.
    pub dropped: u64,
}

impl DigInPayload {
    pub fn len(&self) -> usize {
        self.line.len()
    }

    pub fn is_empty(&self) -> bool {
        self.line.is_empty()
    }
}

impl From<InputDrain> for DigInPayload {
    fn from(drain: InputDrain) -> Self {
        let mut payload = DigInPayload {
            dropped: drain.dropped,
            ..Default::default()
        };
        for event in drain.events {
            let (kind, line) = match event.kind() {
                EventKind::InputRose { line } => (DIG_UP, line),
                EventKind::InputFell { line } => (DIG_DOWN, line),
                EventKind::OutputWrite { .. } | EventKind::Quit | EventKind::Init => continue,
            };
            payload.kind.push(kind);
            payload.line.push(line);
            payload.when.push(event.timestamp());
        }
        payload
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyPayload {
    #[default]
    Empty,
    Events(DigInPayload),
    Status(StatusReport),
    Time {
        now: Timestamp,
    },
    Error {
        code: String,
        message: String,
    },
}

/// Answer to one [`Command`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub ok: bool,
    #[serde(default)]
    pub payload: ReplyPayload,
}

impl Reply {
    pub fn ok(payload: ReplyPayload) -> Self {
        Self { ok: true, payload }
    }

    pub fn error(err: &Error) -> Self {
        Self {
            ok: false,
            payload: ReplyPayload::Error {
                code: err.code().to_string(),
                message: err.to_string(),
            },
        }
    }
}

/// Transport seam between the controller and the command loop.
pub trait CommandChannel {
    /// Wait up to `timeout` for the next command. `Ok(None)` means nothing arrived.
    ///
    /// A [`ChannelError::Protocol`] means a malformed request arrived; it still expects a
    /// reply through [`send_reply`](Self::send_reply).
    fn receive_command(&mut self, timeout: Duration) -> Result<Option<Command>, ChannelError>;

    /// Answer the request most recently received.
    fn send_reply(&mut self, reply: Reply) -> Result<(), ChannelError>;
}

/// Turns commands into queue operations.
#[derive(Clone)]
pub struct CommandProcessor {
    queues: Arc<EventQueues>,
    clock: Arc<dyn Clock>,
}

impl CommandProcessor {
    pub fn new(queues: Arc<EventQueues>, clock: Arc<dyn Clock>) -> Self {
        Self { queues, clock }
    }

    pub fn handle(&self, command: Command) -> Reply {
        match self.execute(command) {
            Ok(payload) => Reply::ok(payload),
            Err(err) => {
                warn!(code = err.code(), error = %err, "command rejected");
                Reply::error(&err)
            }
        }
    }

    fn execute(&self, command: Command) -> Result<ReplyPayload> {
        let now = self.clock.now();
        match command {
            Command::Init {
                device,
                input_port,
                output_port,
            } => {
                self.ensure_running()?;
                let mut config = self.queues.effective_port_config();
                if let Some(device) = device {
                    config.device = device;
                }
                if let Some(port) = input_port {
                    config.input_port = port;
                }
                if let Some(port) = output_port {
                    config.output_port = port;
                }
                config.validate()?;
                info!(
                    input = %config.input_channel(),
                    output = %config.output_channel(),
                    "init requested"
                );
                self.queues.request_init(config, now);
                Ok(ReplyPayload::Empty)
            }
            Command::DigIn => {
                let payload = DigInPayload::from(self.queues.drain_inputs());
                if payload.dropped > 0 {
                    warn!(dropped = payload.dropped, "reporting dropped input edges");
                }
                Ok(ReplyPayload::Events(payload))
            }
            Command::DigOut { time, value } => {
                if !time.is_finite() {
                    return Err(Error::Protocol(format!("dig_out time {time} is not finite")));
                }
                self.ensure_running()?;
                debug!(time, value, due_in = time - now, "output scheduled");
                self.queues.push_output_sorted(Event::output(time, value));
                Ok(ReplyPayload::Empty)
            }
            Command::List => Ok(ReplyPayload::Status(self.queues.snapshot(now))),
            Command::Quit => {
                info!("quit requested");
                self.queues.push_output_sorted(Event::quit(now));
                Ok(ReplyPayload::Empty)
            }
            Command::Time => Ok(ReplyPayload::Time { now }),
        }
    }

    fn ensure_running(&self) -> Result<()> {
        match self.queues.state() {
            DaemonState::Stopping | DaemonState::Stopped => Err(Error::Stopped),
            DaemonState::Initializing | DaemonState::Running => Ok(()),
        }
    }

    /// Answer commands until the scheduler reports `Stopped`.
    ///
    /// Malformed requests get a failure reply and change nothing. Returns
    /// [`ChannelError::Disconnected`] if every controller went away first.
    pub fn serve(&self, channel: &mut dyn CommandChannel) -> Result<(), ChannelError> {
        while self.queues.state() != DaemonState::Stopped {
            let reply = match channel.receive_command(RECEIVE_TIMEOUT) {
                Ok(Some(command)) => self.handle(command),
                Ok(None) => continue,
                Err(ChannelError::Protocol(message)) => {
                    warn!(%message, "malformed request");
                    Reply::error(&Error::Protocol(message))
                }
                Err(err) => return Err(err),
            };
            if let Err(err) = channel.send_reply(reply) {
                warn!(error = %err, "could not deliver reply");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::device::PortConfig;
    use crate::snapshot::PendingKind;

    fn processor() -> (CommandProcessor, Arc<EventQueues>, Arc<ManualClock>) {
        let queues = Arc::new(EventQueues::default());
        queues.set_state(DaemonState::Running);
        let clock = Arc::new(ManualClock::new(100.0));
        let processor = CommandProcessor::new(Arc::clone(&queues), clock.clone());
        (processor, queues, clock)
    }

    fn error_code(reply: &Reply) -> &str {
        match &reply.payload {
            ReplyPayload::Error { code, .. } => code,
            other => panic!("expected error payload, got {other:?}"),
        }
    }

    #[test]
    fn dig_out_is_scheduled_in_time_order() {
        let (processor, queues, _) = processor();
        assert!(processor.handle(Command::DigOut { time: 5.0, value: 0xFF }).ok);
        assert!(processor.handle(Command::DigOut { time: 2.0, value: 0x01 }).ok);
        assert_eq!(
            queues.outputs(),
            vec![Event::output(2.0, 0x01), Event::output(5.0, 0xFF)]
        );
    }

    #[test]
    fn dig_out_in_the_past_is_accepted() {
        let (processor, queues, _) = processor();
        assert!(processor.handle(Command::DigOut { time: 1.0, value: 3 }).ok);
        assert_eq!(queues.pop_due_output(100.0), Some(Event::output(1.0, 3)));
    }

    #[test]
    fn non_finite_dig_out_is_a_protocol_error() {
        let (processor, queues, _) = processor();
        let reply = processor.handle(Command::DigOut {
            time: f64::NAN,
            value: 1,
        });
        assert!(!reply.ok);
        assert_eq!(error_code(&reply), "protocol");
        assert_eq!(queues.output_len(), 0);
    }

    #[test]
    fn dig_in_drains_as_parallel_arrays() {
        let (processor, queues, _) = processor();
        queues.push_input([Event::rose(1.0, 0), Event::fell(2.0, 3)]);

        let reply = processor.handle(Command::DigIn);
        assert!(reply.ok);
        assert_eq!(
            reply.payload,
            ReplyPayload::Events(DigInPayload {
                kind: vec![DIG_UP, DIG_DOWN],
                line: vec![0, 3],
                when: vec![1.0, 2.0],
                dropped: 0,
            })
        );

        let again = processor.handle(Command::DigIn);
        assert_eq!(again.payload, ReplyPayload::Events(DigInPayload::default()));
    }

    #[test]
    fn quit_is_scheduled_now_ahead_of_later_outputs() {
        let (processor, queues, _) = processor();
        for t in [101.0, 102.0, 103.0] {
            processor.handle(Command::DigOut { time: t, value: 1 });
        }
        assert!(processor.handle(Command::Quit).ok);
        assert_eq!(queues.peek_output(), Some(Event::quit(100.0)));
    }

    #[test]
    fn list_reports_joint_state() {
        let (processor, queues, clock) = processor();
        queues.push_input([Event::rose(1.0, 2)]);
        processor.handle(Command::DigOut {
            time: 102.5,
            value: 0x10,
        });
        clock.set(101.0);

        let reply = processor.handle(Command::List);
        let ReplyPayload::Status(report) = reply.payload else {
            panic!("expected status payload");
        };
        assert_eq!(report.state, DaemonState::Running);
        assert_eq!(report.pending_inputs, 1);
        assert_eq!(report.pending_outputs.len(), 1);
        assert_eq!(report.pending_outputs[0].kind, PendingKind::Write);
        assert_eq!(report.pending_outputs[0].due_in, 1.5);
    }

    #[test]
    fn init_merges_overrides_and_schedules_restart() {
        let (processor, queues, _) = processor();
        let reply = processor.handle(Command::Init {
            device: None,
            input_port: Some(0),
            output_port: None,
        });
        assert!(reply.ok);
        assert_eq!(queues.peek_output(), Some(Event::init(100.0)));
        assert_eq!(
            queues.take_pending_init(),
            Some(PortConfig {
                input_port: 0,
                ..PortConfig::default()
            })
        );
    }

    #[test]
    fn bad_init_changes_nothing() {
        let (processor, queues, _) = processor();
        let reply = processor.handle(Command::Init {
            device: None,
            input_port: Some(2),
            output_port: Some(2),
        });
        assert!(!reply.ok);
        assert_eq!(error_code(&reply), "channel_config");
        assert_eq!(queues.output_len(), 0);
        assert_eq!(queues.take_pending_init(), None);
    }

    #[test]
    fn stopped_daemon_refuses_new_outputs() {
        let (processor, queues, _) = processor();
        queues.set_state(DaemonState::Stopping);
        let reply = processor.handle(Command::DigOut { time: 1.0, value: 1 });
        assert_eq!(error_code(&reply), "stopped");
        assert_eq!(queues.output_len(), 0);
    }

    #[test]
    fn time_reports_clock() {
        let (processor, _, clock) = processor();
        clock.set(42.25);
        assert_eq!(
            processor.handle(Command::Time).payload,
            ReplyPayload::Time { now: 42.25 }
        );
    }

    #[test]
    fn commands_decode_from_json() {
        let cmd: Command =
            serde_json::from_str(r#"{"op":"dig_out","time":5.0,"value":255}"#).unwrap();
        assert_eq!(
            cmd,
            Command::DigOut {
                time: 5.0,
                value: 0xFF
            }
        );
        let cmd: Command = serde_json::from_str(r#"{"op":"init","input_port":3}"#).unwrap();
        assert_eq!(
            cmd,
            Command::Init {
                device: None,
                input_port: Some(3),
                output_port: None
            }
        );
        assert!(serde_json::from_str::<Command>(r#"{"op":"dig_out","time":1,"value":256}"#).is_err());
        assert!(serde_json::from_str::<Command>(r#"{"op":"reboot"}"#).is_err());
    }

    struct Scripted {
        inbox: Vec<Result<Option<Command>, ChannelError>>,
        replies: Vec<Reply>,
        queues: Arc<EventQueues>,
    }

    impl CommandChannel for Scripted {
        fn receive_command(&mut self, _: Duration) -> Result<Option<Command>, ChannelError> {
            if self.inbox.is_empty() {
                // stand-in for the scheduler finishing its shutdown
                self.queues.set_state(DaemonState::Stopped);
                return Ok(None);
            }
            self.inbox.remove(0)
        }

        fn send_reply(&mut self, reply: Reply) -> Result<(), ChannelError> {
            self.replies.push(reply);
            Ok(())
        }
    }

    #[test]
    fn serve_answers_every_request_including_malformed_ones() {
        let (processor, queues, _) = processor();
        let mut channel = Scripted {
            inbox: vec![
                Ok(Some(Command::DigOut { time: 1.0, value: 1 })),
                Ok(None),
                Err(ChannelError::Protocol("not json".into())),
                Ok(Some(Command::List)),
            ],
            replies: Vec::new(),
            queues: Arc::clone(&queues),
        };

        processor.serve(&mut channel).unwrap();
        assert_eq!(channel.replies.len(), 3);
        assert!(channel.replies[0].ok);
        assert_eq!(error_code(&channel.replies[1]), "protocol");
        assert!(channel.replies[2].ok);
        assert_eq!(queues.output_len(), 1);
    }
}
