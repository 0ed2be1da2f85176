//! Command Relay & Broadcast Server — entry point.
//!
//! Starts both transports over a demo host loop that approves every
//! command and reports synthetic metrics. A real host embeds the library
//! instead: build a `ChannelBridge` pair, drain the `HostHandle` on the
//! host's control loop, and hand the bridge to `RelayServer`.
//!
//! # Usage
//!
//! ```text
//! relay-server [OPTIONS]
//!
//! Options:
//!   --stream-port <PORT>  line-protocol listener port [default: 7878]
//!   --http-port   <PORT>  HTTP API listener port [default: 8080]
//!   --bind        <ADDR>  bind address [default: 0.0.0.0]
//!   --grace-ms    <MS>    session drain grace on stop/restart [default: 1000]
//! ```
//!
//! Each option can also be set through an environment variable
//! (`RELAY_STREAM_PORT`, `RELAY_HTTP_PORT`, `RELAY_BIND`,
//! `RELAY_GRACE_MS`); CLI arguments take precedence. Log verbosity is
//! controlled by `RUST_LOG` (default `info`).

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use relay_core::{HostMetrics, ListenerConfig, TransportKind};
use relay_server::infrastructure::host_bridge::{ChannelBridge, HostHandle};
use relay_server::{RelayOptions, RelayServer};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Command Relay & Broadcast Server.
///
/// Exposes a line-oriented TCP protocol and a JSON HTTP API through which
/// remote operators run commands on the host application and watch its
/// log feed.
#[derive(Debug, Parser)]
#[command(name = "relay-server", version)]
struct Cli {
    /// TCP port for the line-protocol listener.
    #[arg(long, default_value_t = 7878, env = "RELAY_STREAM_PORT")]
    stream_port: u16,

    /// TCP port for the HTTP API listener.
    #[arg(long, default_value_t = 8080, env = "RELAY_HTTP_PORT")]
    http_port: u16,

    /// IP address both listeners bind to.
    ///
    /// Use `0.0.0.0` to accept connections from any interface, or
    /// `127.0.0.1` for local connections only.
    #[arg(long, default_value = "0.0.0.0", env = "RELAY_BIND")]
    bind: String,

    /// Grace period, in milliseconds, given to in-flight sessions when a
    /// listener stops or hot-restarts.
    #[arg(long, default_value_t = 1000, env = "RELAY_GRACE_MS")]
    grace_ms: u64,
}

impl Cli {
    /// Converts the parsed arguments into [`RelayOptions`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not a valid IP address or either
    /// port is 0.
    fn into_options(self) -> anyhow::Result<RelayOptions> {
        let bind_addr: IpAddr = self
            .bind
            .parse()
            .with_context(|| format!("invalid bind address: '{}'", self.bind))?;

        Ok(RelayOptions {
            bind_addr,
            stream: ListenerConfig::new(TransportKind::Stream, self.stream_port)
                .context("invalid stream port")?,
            http: ListenerConfig::new(TransportKind::RequestResponse, self.http_port)
                .context("invalid http port")?,
            grace: Duration::from_millis(self.grace_ms),
            ..RelayOptions::default()
        })
    }
}

// ── Demo host loop ────────────────────────────────────────────────────────────

/// Stand-in for a real host application's control loop.
///
/// Approves every command and publishes steady synthetic metrics, so the
/// relay is exercisable end to end without a host process.
async fn run_demo_host(mut host: HostHandle) {
    host.publish_metrics(HostMetrics {
        frame_rate: 60.0,
        latency_ms: 0,
        tick_rate: 20.0,
    });

    while let Some(request) = host.next_request().await {
        debug!("demo host executing {:?}", request.command);
        request.respond(true);
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let options = cli.into_options()?;

    info!(
        "command relay starting — stream port {}, http port {}, bind {}",
        options.stream.port, options.http.port, options.bind_addr
    );

    let (bridge, host) = ChannelBridge::new(32);
    tokio::spawn(run_demo_host(host));

    let server = RelayServer::new(Arc::new(bridge), options);
    server.start().await.context("failed to start listeners")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("received ctrl-c — shutting down");

    server.shutdown().await;
    info!("command relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["relay-server"]);
        assert_eq!(cli.stream_port, 7878);
        assert_eq!(cli.http_port, 8080);
        assert_eq!(cli.bind, "0.0.0.0");
        assert_eq!(cli.grace_ms, 1000);
    }

    #[test]
    fn test_cli_stream_port_override() {
        let cli = Cli::parse_from(["relay-server", "--stream-port", "9999"]);
        assert_eq!(cli.stream_port, 9999);
    }

    #[test]
    fn test_cli_http_port_override() {
        let cli = Cli::parse_from(["relay-server", "--http-port", "9090"]);
        assert_eq!(cli.http_port, 9090);
    }

    #[test]
    fn test_cli_bind_override() {
        let cli = Cli::parse_from(["relay-server", "--bind", "127.0.0.1"]);
        assert_eq!(cli.bind, "127.0.0.1");
    }

    #[test]
    fn test_into_options_default_ports() {
        let options = Cli::parse_from(["relay-server"]).into_options().unwrap();
        assert_eq!(options.stream.port, 7878);
        assert_eq!(options.http.port, 8080);
    }

    #[test]
    fn test_into_options_grace_period() {
        let options = Cli::parse_from(["relay-server", "--grace-ms", "250"])
            .into_options()
            .unwrap();
        assert_eq!(options.grace, Duration::from_millis(250));
    }

    #[test]
    fn test_into_options_invalid_bind_returns_error() {
        let cli = Cli {
            stream_port: 7878,
            http_port: 8080,
            bind: "not.an.ip".to_string(),
            grace_ms: 1000,
        };
        assert!(cli.into_options().is_err());
    }

    #[test]
    fn test_into_options_rejects_port_zero() {
        let cli = Cli {
            stream_port: 0,
            http_port: 8080,
            bind: "127.0.0.1".to_string(),
            grace_ms: 1000,
        };
        assert!(cli.into_options().is_err());
    }
}
