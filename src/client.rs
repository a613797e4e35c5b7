//! Controller-side socket client.

use crate::command::{Command, Reply};
use crate::error::Result;
use crate::protocol::{decode_reply, encode_command};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

/// Upper bound on waiting for a reply.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Send one command to the daemon listening on `socket` and wait for its reply.
pub fn send(socket: impl AsRef<Path>, command: &Command) -> Result<Reply> {
    let mut stream = UnixStream::connect(socket.as_ref())?;
    stream.set_read_timeout(Some(REPLY_TIMEOUT))?;
    stream.write_all(&encode_command(command)?)?;
    stream.flush()?;

    let mut line = String::new();
    BufReader::new(stream).read_line(&mut line)?;
    decode_reply(&line)
}
