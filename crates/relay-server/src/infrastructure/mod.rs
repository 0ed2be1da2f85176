//! Infrastructure layer: sockets, transports, and the host bridge.
//!
//! - [`host_bridge`] – marshalled access to the host's single-owner
//!   command executor and its read-only metrics.
//! - [`registry`] – the live-session registry shared by the transports.
//! - [`listener`] – lifecycle (start / hot-restart / stop) of each
//!   transport's accept loop.
//! - [`stream_server`] – the line-oriented TCP transport.
//! - [`http_server`] – the JSON-over-HTTP transport.

pub mod host_bridge;
pub mod http_server;
pub mod listener;
pub mod registry;
pub mod stream_server;
