//! Listener configuration types.
//!
//! A [`ListenerConfig`] describes one transport's listening socket: which
//! transport kind it serves, the port it binds, and whether it is enabled.
//! Exactly one configuration is active per [`TransportKind`] at any time;
//! hot reconfiguration replaces it atomically through the listener
//! manager's restart operation.
//!
//! Configuration is deliberately a plain struct with no file persistence:
//! the active port lives only in process memory for the current run, and
//! is changed through the in-process `set_port` call.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The two transports the relay exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// Line-oriented streaming protocol over raw TCP.
    Stream,
    /// Request/response JSON API over HTTP.
    RequestResponse,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Stream => write!(f, "stream"),
            TransportKind::RequestResponse => write!(f, "http"),
        }
    }
}

/// Errors constructing a listener configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("port 0 is not a valid listener port (valid range is 1-65535)")]
    PortOutOfRange,
}

/// Active configuration for one transport's listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub kind: TransportKind,
    /// Bound port, 1-65535.
    pub port: u16,
    /// Disabled listeners are configured but not started.
    pub enabled: bool,
}

impl ListenerConfig {
    /// Builds an enabled configuration, rejecting port 0.
    pub fn new(kind: TransportKind, port: u16) -> Result<Self, ConfigError> {
        if port == 0 {
            return Err(ConfigError::PortOutOfRange);
        }
        Ok(Self {
            kind,
            port,
            enabled: true,
        })
    }

    /// Returns a copy of this configuration bound to a different port.
    pub fn with_port(self, port: u16) -> Result<Self, ConfigError> {
        if port == 0 {
            return Err(ConfigError::PortOutOfRange);
        }
        Ok(Self { port, ..self })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
