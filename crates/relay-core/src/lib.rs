//! # relay-core
//!
//! Shared domain library for the Command Relay & Broadcast Server.
//!
//! The relay lets a remote operator feed textual commands into a host
//! application that only accepts input on its own single-threaded control
//! loop, and mirrors the host's log/status feed back out to every connected
//! operator. This crate holds the pieces of that system that are pure
//! domain logic:
//!
//! - **`log_bus`** – The bounded, thread-safe log/event bus. Every log
//!   line produced anywhere in the relay flows through one [`LogBus`],
//!   which keeps the most recent 1000 entries and fans each new entry out
//!   to all subscribers in publish order.
//!
//! - **`command`** – Sanitization of untrusted command text and the
//!   immutable [`CommandRequest`] value built for each inbound command.
//!
//! - **`config`** – [`TransportKind`] and [`ListenerConfig`], the unit of
//!   hot port reconfiguration.
//!
//! - **`status`** – [`StatusSnapshot`], the read-only host metrics value
//!   republished wholesale on a fixed cadence, and the [`StatusCell`] it
//!   is swapped through.
//!
//! This crate has no dependency on tokio, sockets, or any OS API. The
//! `relay-server` crate provides the transports and wiring on top of it.

pub mod command;
pub mod config;
pub mod log_bus;
pub mod status;

// Re-export the most-used types at the crate root so callers can write
// `relay_core::LogBus` instead of `relay_core::log_bus::LogBus`.
pub use command::{sanitize, strip_slash, CommandOrigin, CommandRequest};
pub use config::{ConfigError, ListenerConfig, TransportKind};
pub use log_bus::{LogBus, LogEntry, SubscriberId};
pub use status::{HostMetrics, StatusCell, StatusSnapshot, NOMINAL_TICK_RATE};
