//! Error types.
//!
//! Device failures never escape the scheduler; they are logged and the daemon keeps
//! running in degraded mode. Command failures travel back to the controller inside the
//! reply, tagged with [`Error::code`].

use thiserror::Error;

/// Failures reported by a [`DigitalPort`](crate::device::DigitalPort).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// No compatible hardware is attached.
    #[error("no compatible device found")]
    DeviceNotFound,

    /// The device is absent or a call against it failed.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The driver rejected the channel/port configuration.
    #[error("channel configuration failed: {0}")]
    ChannelConfig(String),

    /// A read or write did not complete within the driver timeout.
    #[error("device call timed out")]
    Timeout,
}

/// Failures on the controller ↔ daemon command channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The other side of the channel is gone.
    #[error("command channel disconnected")]
    Disconnected,

    /// A request could not be decoded. A failure reply is still owed.
    #[error("malformed request: {0}")]
    Protocol(String),

    /// A reply was sent with no request awaiting one.
    #[error("no request is awaiting a reply")]
    NoPendingRequest,

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures loading or validating [`DaemonConfig`](crate::config::DaemonConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Malformed or unknown command arguments.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The daemon is shutting down and accepts no new work.
    #[error("daemon is stopping")]
    Stopped,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable snake_case code placed in failure replies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Device(DeviceError::DeviceNotFound) => "device_not_found",
            Error::Device(DeviceError::DeviceUnavailable(_)) => "device_unavailable",
            Error::Device(DeviceError::ChannelConfig(_)) => "channel_config",
            Error::Device(DeviceError::Timeout) => "timeout",
            Error::Channel(ChannelError::Protocol(_)) | Error::Protocol(_) => "protocol",
            Error::Stopped => "stopped",
            Error::Channel(_) => "channel",
            Error::Config(_) => "config",
            Error::Json(_) => "json",
            Error::Io(_) => "io",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
