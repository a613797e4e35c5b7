//! Daemon configuration.
//!
//! A TOML document; every field has a default, so an empty file (or no file) is a valid
//! configuration.
//!
//! ```toml
//! socket_path = ".mglDigIO"
//! poll_interval_ms = 1
//! input_queue_capacity = 4096
//! log_filter = "info"
//!
//! [port]
//! backend = "virtual"
//! device = "Dev1"
//! input_port = 1
//! output_port = 2
//! ```

use crate::backends::PortSettings;
use crate::error::ConfigError;
use crate::queues::DEFAULT_INPUT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Socket file name used when none is configured.
pub const DEFAULT_SOCKET: &str = ".mglDigIO";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    /// Upper bound on the scheduler's idle sleep.
    pub poll_interval_ms: u64,
    pub input_queue_capacity: usize,
    /// `tracing` filter directive; `RUST_LOG` overrides it.
    pub log_filter: String,
    pub port: PortSettings,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET),
            poll_interval_ms: 1,
            input_queue_capacity: DEFAULT_INPUT_CAPACITY,
            log_filter: "info".to_string(),
            port: PortSettings::default(),
        }
    }
}

impl DaemonConfig {
    /// Read and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "input_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.socket_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("socket_path must not be empty".to_string()));
        }
        self.port
            .config
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::BackendKind;

    #[test]
    fn empty_document_is_all_defaults() {
        let config = DaemonConfig::from_toml_str("").unwrap();
        assert_eq!(config, DaemonConfig::default());
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn full_document_parses() {
        let config = DaemonConfig::from_toml_str(
            r#"
            socket_path = "/tmp/digio.sock"
            poll_interval_ms = 5
            input_queue_capacity = 16
            log_filter = "digio=debug"

            [port]
            backend = "hid"
            device = "Dev2"
            input_port = 0
            output_port = 1

            [port.hid]
            vendor_id = 0x1234
            product_id = 0x5678
            read_timeout_ms = 20
            "#,
        )
        .unwrap();

        assert_eq!(config.socket_path, PathBuf::from("/tmp/digio.sock"));
        assert_eq!(config.input_queue_capacity, 16);
        assert_eq!(config.port.backend, BackendKind::Hid);
        assert_eq!(config.port.config.device, "Dev2");
        assert_eq!(config.port.config.input_port, 0);
        assert_eq!(config.port.config.output_port, 1);
        assert_eq!(config.port.hid.vendor_id, 0x1234);
        assert_eq!(config.port.hid.read_timeout_ms, 20);
    }

    #[test]
    fn clashing_ports_are_invalid() {
        let err = DaemonConfig::from_toml_str("[port]\ninput_port = 2\noutput_port = 2\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_capacity_is_invalid() {
        let err = DaemonConfig::from_toml_str("input_queue_capacity = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn syntax_errors_are_reported() {
        let err = DaemonConfig::from_toml_str("poll_interval_ms = \"fast\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("digio.toml");
        std::fs::write(&path, "poll_interval_ms = 3\n").unwrap();
        assert_eq!(DaemonConfig::load(&path).unwrap().poll_interval_ms, 3);
        assert!(matches!(
            DaemonConfig::load(dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
