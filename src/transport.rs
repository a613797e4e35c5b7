//! Unix-domain socket front end.
//!
//! Two kinds of threads:
//! - Acceptor: accepts connections and spawns a handler for each
//! - Client handler: reads request lines, forwards them through a [`Controller`], writes
//!   the replies back
//!
//! All state changes still happen on the command loop; handlers only shuttle bytes.

use crate::channel::Controller;
use crate::command::Reply;
use crate::error::{ChannelError, Error};
use crate::protocol::encode_reply;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Longest request line accepted, newline excluded. Longer requests get a protocol error
/// and the connection is closed.
pub const MAX_REQUEST_LEN: usize = 64 * 1024;

pub struct SocketServer {
    path: PathBuf,
    listener: UnixListener,
}

impl SocketServer {
    /// Bind `path`, replacing a stale socket file left by a previous run.
    ///
    /// Fails with `AddrInUse` if another daemon is already answering on `path`.
    pub fn bind(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if UnixStream::connect(&path).is_ok() {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("a daemon is already listening on {}", path.display()),
            ));
        }
        let _ = std::fs::remove_file(&path);

        let listener = UnixListener::bind(&path)?;
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600));
        }
        info!(socket = %path.display(), "listening");
        Ok(Self { path, listener })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run the acceptor on its own thread. It lives until the process exits.
    pub fn spawn(self, controller: Controller) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("digio-accept".to_string())
            .spawn(move || self.accept_loop(controller))
    }

    fn accept_loop(self, controller: Controller) {
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let controller = controller.clone();
                    let spawned = thread::Builder::new()
                        .name("digio-client".to_string())
                        .spawn(move || handle_client(stream, controller));
                    if let Err(e) = spawned {
                        warn!(error = %e, "could not spawn client handler");
                    }
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
    }
}

fn handle_client(stream: UnixStream, controller: Controller) {
    let mut reader = match stream.try_clone() {
        Ok(r) => BufReader::new(r),
        Err(e) => {
            warn!(error = %e, "failed to clone client stream");
            return;
        }
    };
    let mut writer = stream;
    debug!("client connected");

    let mut buf = Vec::new();
    loop {
        buf.clear();
        let limit = MAX_REQUEST_LEN as u64 + 1;
        match (&mut reader).take(limit).read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "client read failed");
                break;
            }
        }

        if buf.len() > MAX_REQUEST_LEN && buf.last() != Some(&b'\n') {
            warn!(limit = MAX_REQUEST_LEN, "request too long, closing connection");
            let err = Error::Protocol(format!("request longer than {MAX_REQUEST_LEN} bytes"));
            let _ = write_reply(&mut writer, &Reply::error(&err));
            break;
        }

        let (reply, gone) = match std::str::from_utf8(&buf) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => match controller.request_line(line) {
                Ok(reply) => (reply, false),
                Err(e) => (Reply::error(&Error::Channel(e)), true),
            },
            Err(e) => {
                let err = Error::Protocol(format!("request is not valid UTF-8: {e}"));
                (Reply::error(&err), false)
            }
        };
        if write_reply(&mut writer, &reply).is_err() || gone {
            break;
        }
    }
    debug!("client disconnected");
}

fn write_reply(writer: &mut UnixStream, reply: &Reply) -> Result<(), ChannelError> {
    let bytes = encode_reply(reply).unwrap_or_else(|e| {
        let msg = e.to_string().replace('"', "\\\"");
        format!(
            "{{\"ok\":false,\"payload\":{{\"kind\":\"error\",\"code\":\"internal\",\"message\":\"{msg}\"}}}}\n"
        )
        .into_bytes()
    });
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
