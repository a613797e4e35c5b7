//! In-process command channel.
//!
//! Requests travel to the command loop over a `crossbeam` channel, each carrying a
//! one-shot reply sender. [`Controller`] is the sending side (cloneable, one per client
//! thread); [`RequestReceiver`] is the loop's [`CommandChannel`].

use crate::command::{Command, CommandChannel, Reply};
use crate::error::ChannelError;
use crate::protocol::decode_command;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// One request in flight.
pub struct RequestMessage {
    /// Decoded command, or why decoding failed.
    pub request: Result<Command, String>,
    pub respond: Sender<Reply>,
}

pub fn request_channel() -> (Controller, RequestReceiver) {
    let (tx, rx) = channel::unbounded();
    (
        Controller { tx },
        RequestReceiver {
            rx,
            pending: None,
        },
    )
}

#[derive(Clone)]
pub struct Controller {
    tx: Sender<RequestMessage>,
}

impl Controller {
    /// Send `command` and block until the command loop answers.
    pub fn request(&self, command: Command) -> Result<Reply, ChannelError> {
        self.submit(Ok(command))
    }

    /// Decode a raw JSON request line and submit it. Lines that do not decode are still
    /// submitted so the command loop answers them with a protocol error.
    pub fn request_line(&self, line: &str) -> Result<Reply, ChannelError> {
        self.submit(decode_command(line).map_err(|e| e.to_string()))
    }

    fn submit(&self, request: Result<Command, String>) -> Result<Reply, ChannelError> {
        let (respond, reply) = channel::bounded(1);
        self.tx
            .send(RequestMessage { request, respond })
            .map_err(|_| ChannelError::Disconnected)?;
        reply.recv().map_err(|_| ChannelError::Disconnected)
    }
}

pub struct RequestReceiver {
    rx: Receiver<RequestMessage>,
    pending: Option<Sender<Reply>>,
}

impl CommandChannel for RequestReceiver {
    fn receive_command(&mut self, timeout: Duration) -> Result<Option<Command>, ChannelError> {
        match self.rx.recv_timeout(timeout) {
            Ok(RequestMessage { request, respond }) => {
                self.pending = Some(respond);
                request.map(Some).map_err(ChannelError::Protocol)
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(ChannelError::Disconnected),
        }
    }

    fn send_reply(&mut self, reply: Reply) -> Result<(), ChannelError> {
        let respond = self.pending.take().ok_or(ChannelError::NoPendingRequest)?;
        respond.send(reply).map_err(|_| ChannelError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ReplyPayload;
    use std::thread;

    #[test]
    fn request_gets_its_own_reply() {
        let (controller, mut receiver) = request_channel();
        let client = thread::spawn(move || controller.request(Command::Time));

        let cmd = receiver
            .receive_command(Duration::from_secs(5))
            .unwrap()
            .unwrap();
        assert_eq!(cmd, Command::Time);
        receiver
            .send_reply(Reply::ok(ReplyPayload::Time { now: 3.0 }))
            .unwrap();

        let reply = client.join().unwrap().unwrap();
        assert_eq!(reply.payload, ReplyPayload::Time { now: 3.0 });
    }

    #[test]
    fn malformed_line_surfaces_as_protocol_error() {
        let (controller, mut receiver) = request_channel();
        let client = thread::spawn(move || controller.request_line("{\"op\":\"explode\"}"));

        let err = receiver
            .receive_command(Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, ChannelError::Protocol(_)));
        receiver
            .send_reply(Reply::ok(ReplyPayload::Empty))
            .unwrap();
        assert!(client.join().unwrap().is_ok());
    }

    #[test]
    fn idle_channel_times_out() {
        let (_controller, mut receiver) = request_channel();
        assert!(receiver
            .receive_command(Duration::from_millis(1))
            .unwrap()
            .is_none());
    }

    #[test]
    fn dropped_controllers_disconnect() {
        let (controller, mut receiver) = request_channel();
        drop(controller);
        assert!(matches!(
            receiver.receive_command(Duration::from_millis(1)),
            Err(ChannelError::Disconnected)
        ));
    }

    #[test]
    fn reply_without_request_is_refused() {
        let (_controller, mut receiver) = request_channel();
        assert!(matches!(
            receiver.send_reply(Reply::ok(ReplyPayload::Empty)),
            Err(ChannelError::NoPendingRequest)
        ));
    }

    #[test]
    fn gone_command_loop_disconnects_controller() {
        let (controller, receiver) = request_channel();
        drop(receiver);
        assert!(matches!(
            controller.request(Command::List),
            Err(ChannelError::Disconnected)
        ));
    }
}
