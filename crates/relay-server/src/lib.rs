//! relay-server library crate.
//!
//! The Command Relay & Broadcast Server: accepts remote operator
//! connections on two transports, funnels their commands through a
//! sanitizing pipeline into the host application's single-owner executor,
//! and fans the host's log feed back out to every connected session.
//!
//! ```text
//! operators (TCP lines / HTTP JSON)
//!         ↕
//! [relay-server]
//!   ├── application/      CommandPipeline, status sampler
//!   └── infrastructure/
//!         ├── listener    start / hot-restart / stop per transport
//!         ├── stream_server   line protocol sessions
//!         ├── http_server     JSON API (axum)
//!         ├── registry        live sessions
//!         └── host_bridge     marshalled entry into the host
//!         ↕
//! host application (single-threaded control loop)
//! ```
//!
//! [`RelayServer`] wires all of it together; `main.rs` adds CLI parsing
//! and a demo host loop. Embedders construct a [`ChannelBridge`] pair,
//! hand the bridge to [`RelayServer::new`], and drain the
//! [`HostHandle`] on their control loop.
//!
//! [`ChannelBridge`]: infrastructure::host_bridge::ChannelBridge
//! [`HostHandle`]: infrastructure::host_bridge::HostHandle

pub mod application;
pub mod infrastructure;

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use relay_core::{ConfigError, ListenerConfig, LogBus, StatusCell, TransportKind};

use crate::application::pipeline::CommandPipeline;
use crate::application::sampler::{spawn_sampler, DEFAULT_SAMPLE_PERIOD};
use crate::infrastructure::host_bridge::ExecutorBridge;
use crate::infrastructure::http_server::{ApiState, HttpTransport};
use crate::infrastructure::listener::{
    ListenerError, ListenerManager, ListenerState, Transport, DEFAULT_GRACE,
};
use crate::infrastructure::registry::ConnectionRegistry;
use crate::infrastructure::stream_server::StreamTransport;

/// Runtime options for the relay.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Address both listeners bind to.
    pub bind_addr: IpAddr,
    /// Stream (line protocol) listener configuration.
    pub stream: ListenerConfig,
    /// HTTP listener configuration.
    pub http: ListenerConfig,
    /// Grace period for in-flight sessions during stop/restart.
    pub grace: Duration,
    /// Status sampling cadence.
    pub sample_period: Duration,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            stream: ListenerConfig::new(TransportKind::Stream, 7878)
                .expect("default stream port is valid"),
            http: ListenerConfig::new(TransportKind::RequestResponse, 8080)
                .expect("default http port is valid"),
            grace: DEFAULT_GRACE,
            sample_period: DEFAULT_SAMPLE_PERIOD,
        }
    }
}

/// Outcome of a [`RelayServer::set_port`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetPortOutcome {
    /// The listener was already bound to the requested port.
    Unchanged,
    /// The listener was hot-restarted onto the new port.
    Moved { port: u16 },
}

/// The assembled relay: one log bus, one registry, one pipeline, one
/// listener manager over both transports, and the status sampler.
pub struct RelayServer {
    options: RelayOptions,
    log_bus: Arc<LogBus>,
    registry: Arc<ConnectionRegistry>,
    status: Arc<StatusCell>,
    listeners: ListenerManager,
    sampler_shutdown: watch::Sender<bool>,
    sampler: Mutex<Option<JoinHandle<()>>>,
}

impl RelayServer {
    /// Wires the relay around an executor bridge and spawns the sampler.
    /// Listeners stay stopped until [`Self::start`].
    pub fn new(bridge: Arc<dyn ExecutorBridge>, options: RelayOptions) -> Self {
        let log_bus = Arc::new(LogBus::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let status = Arc::new(StatusCell::new());
        let pipeline = Arc::new(CommandPipeline::new(
            Arc::clone(&bridge),
            Arc::clone(&log_bus),
        ));

        let stream_transport: Arc<dyn Transport> = Arc::new(StreamTransport::new(
            options.bind_addr,
            Arc::clone(&registry),
            Arc::clone(&log_bus),
            Arc::clone(&pipeline),
        ));
        let http_transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(
            options.bind_addr,
            ApiState {
                log_bus: Arc::clone(&log_bus),
                pipeline,
                status: Arc::clone(&status),
            },
        ));

        let listeners = ListenerManager::new(
            vec![stream_transport, http_transport],
            Arc::clone(&log_bus),
            options.grace,
        );

        let (sampler_shutdown, sampler_rx) = watch::channel(false);
        let sampler = spawn_sampler(
            bridge,
            Arc::clone(&status),
            options.sample_period,
            sampler_rx,
        );

        Self {
            options,
            log_bus,
            registry,
            status,
            listeners,
            sampler_shutdown,
            sampler: Mutex::new(Some(sampler)),
        }
    }

    /// Starts every enabled listener.
    ///
    /// # Errors
    ///
    /// The first bind failure is returned; a transport that started
    /// before the failure keeps running (failures never cross transport
    /// boundaries).
    pub async fn start(&self) -> Result<(), ListenerError> {
        if self.options.stream.enabled {
            self.listeners.start(self.options.stream).await?;
        }
        if self.options.http.enabled {
            let port = self.listeners.start(self.options.http).await?;
            self.log_bus
                .publish(format!("command relay ready: http://localhost:{port}"));
        }
        Ok(())
    }

    /// Hot port reassignment for one transport kind.
    ///
    /// Requesting the currently bound port is a success no-op. Otherwise
    /// the listener is restarted onto the new port: the old socket stops
    /// accepting, open sessions get the grace period, and the new socket
    /// is bound.
    pub async fn set_port(
        &self,
        kind: TransportKind,
        new_port: u16,
    ) -> Result<SetPortOutcome, ListenerError> {
        if self.listeners.bound_port(kind).await == Some(new_port) {
            self.log_bus
                .publish(format!("{kind} port unchanged ({new_port})"));
            return Ok(SetPortOutcome::Unchanged);
        }

        let config = match self.listeners.active_config(kind).await {
            Some(active) => active.with_port(new_port)?,
            None => ListenerConfig::new(kind, new_port)?,
        };
        let port = self.listeners.restart(config).await?;
        info!("{kind} listener moved to port {port}");
        Ok(SetPortOutcome::Moved { port })
    }

    /// The actually bound port for a transport kind, if running.
    pub async fn get_port(&self, kind: TransportKind) -> Option<u16> {
        self.listeners.bound_port(kind).await
    }

    /// Current listener lifecycle state for a transport kind.
    pub fn listener_state(&self, kind: TransportKind) -> ListenerState {
        self.listeners.state(kind)
    }

    /// Stops one transport's listener. Idempotent.
    pub async fn stop(&self, kind: TransportKind) -> Result<(), ListenerError> {
        self.listeners.stop(kind).await
    }

    /// Stops both listeners and the sampler.
    pub async fn shutdown(&self) {
        let _ = self.listeners.stop(TransportKind::Stream).await;
        let _ = self.listeners.stop(TransportKind::RequestResponse).await;
        let _ = self.sampler_shutdown.send(true);
        let sampler = self
            .sampler
            .lock()
            .expect("sampler lock poisoned")
            .take();
        if let Some(task) = sampler {
            let _ = task.await;
        }
    }

    /// The process-wide log bus.
    pub fn log_bus(&self) -> Arc<LogBus> {
        Arc::clone(&self.log_bus)
    }

    /// The live-session registry.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// The current status snapshot holder.
    pub fn status(&self) -> Arc<StatusCell> {
        Arc::clone(&self.status)
    }

    /// Validates a requested port before it reaches `set_port`, for
    /// callers that surface errors to an operator first.
    pub fn validate_port(port: u16) -> Result<(), ConfigError> {
        ListenerConfig::new(TransportKind::Stream, port).map(|_| ())
    }
}
