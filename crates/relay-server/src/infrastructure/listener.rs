//! Listener manager: lifecycle of each transport's accept loop.
//!
//! One [`ListenerManager`] owns both transports' listening sockets. Each
//! transport kind has a slot holding its running listener (if any) behind
//! an async mutex, so `start`/`restart`/`stop` for the same kind are
//! serialized: a second `restart` issued while one is in flight waits for
//! it instead of racing it. The two slots are independent — restarting the
//! stream listener never blocks the HTTP listener.
//!
//! # Cancellation
//!
//! Every listener gets a `tokio::sync::watch` shutdown channel at bind
//! time. Stopping signals the channel; the accept loop's `select!` wakes
//! immediately (no polling sleep loop), the listening socket is dropped so
//! no new sessions are accepted, and in-flight sessions get a bounded
//! grace period to finish before the listener task is aborted outright.
//!
//! # State machine
//!
//! `Stopped → Starting → Running → Stopping → Stopped`, observable through
//! [`ListenerManager::state`]. A bind failure falls back from `Starting`
//! to `Stopped` and leaves any previously running listener untouched
//! (`start`) or the slot cleanly stopped (`restart`).

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use relay_core::{ListenerConfig, LogBus, TransportKind};

/// Default grace period given to in-flight sessions during stop/restart.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(1);

/// Observable lifecycle state of one transport's listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Errors from listener lifecycle operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {kind} listener on port {port}: {source}")]
    Bind {
        kind: TransportKind,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("{kind} listener is already running on port {port}")]
    AlreadyRunning { kind: TransportKind, port: u16 },
    #[error("no transport registered for kind {0}")]
    UnknownKind(TransportKind),
    #[error(transparent)]
    Config(#[from] relay_core::ConfigError),
}

/// A transport that can bind a listening socket and run its accept loop.
///
/// Implementations spawn their accept/serve task at bind time and return
/// it together with the actually-bound port. The task must exit promptly
/// once the shutdown channel is signalled.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    fn kind(&self) -> TransportKind;

    async fn bind(
        &self,
        port: u16,
        shutdown: watch::Receiver<bool>,
    ) -> io::Result<BoundTransport>;
}

/// Result of a successful [`Transport::bind`].
pub struct BoundTransport {
    /// The port actually bound (interesting when binding port 0 in tests).
    pub local_port: u16,
    /// The accept/serve task. Dropping or aborting it force-closes all
    /// of the listener's sessions.
    pub task: JoinHandle<()>,
}

struct RunningListener {
    config: ListenerConfig,
    local_port: u16,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct Slot {
    transport: Arc<dyn Transport>,
    running: Mutex<Option<RunningListener>>,
    state: watch::Sender<ListenerState>,
}

/// Owns the accept loops for every transport kind.
pub struct ListenerManager {
    slots: HashMap<TransportKind, Slot>,
    log_bus: Arc<LogBus>,
    grace: Duration,
}

impl ListenerManager {
    pub fn new(
        transports: Vec<Arc<dyn Transport>>,
        log_bus: Arc<LogBus>,
        grace: Duration,
    ) -> Self {
        let slots = transports
            .into_iter()
            .map(|transport| {
                let (state, _) = watch::channel(ListenerState::Stopped);
                (
                    transport.kind(),
                    Slot {
                        transport,
                        running: Mutex::new(None),
                        state,
                    },
                )
            })
            .collect();
        Self {
            slots,
            log_bus,
            grace,
        }
    }

    fn slot(&self, kind: TransportKind) -> Result<&Slot, ListenerError> {
        self.slots.get(&kind).ok_or(ListenerError::UnknownKind(kind))
    }

    /// Starts the listener for `config.kind`.
    ///
    /// # Errors
    ///
    /// [`ListenerError::AlreadyRunning`] if one is active for that kind
    /// (use [`Self::restart`]), or [`ListenerError::Bind`] if the socket
    /// cannot be bound — in which case any previously running listener is
    /// left untouched.
    pub async fn start(&self, config: ListenerConfig) -> Result<u16, ListenerError> {
        let slot = self.slot(config.kind)?;
        let mut running = slot.running.lock().await;
        if let Some(active) = running.as_ref() {
            return Err(ListenerError::AlreadyRunning {
                kind: config.kind,
                port: active.local_port,
            });
        }
        let started = self.bind_slot(slot, config).await?;
        let port = started.local_port;
        *running = Some(started);
        Ok(port)
    }

    /// Hot reconfiguration: stop the current listener for this kind (if
    /// any), then start a new one at `config.port`.
    ///
    /// Serialized per kind — concurrent callers queue on the slot lock,
    /// so two simultaneously bound listeners for one kind are impossible.
    pub async fn restart(&self, config: ListenerConfig) -> Result<u16, ListenerError> {
        let slot = self.slot(config.kind)?;
        let mut running = slot.running.lock().await;
        if let Some(active) = running.take() {
            self.drain_listener(slot, active).await;
        }
        let started = self.bind_slot(slot, config).await?;
        let port = started.local_port;
        *running = Some(started);
        Ok(port)
    }

    /// Stops the listener for `kind`. Idempotent: stopping an already
    /// stopped listener is a no-op.
    pub async fn stop(&self, kind: TransportKind) -> Result<(), ListenerError> {
        let slot = self.slot(kind)?;
        let mut running = slot.running.lock().await;
        if let Some(active) = running.take() {
            self.drain_listener(slot, active).await;
        }
        Ok(())
    }

    /// The port currently bound for `kind`, if its listener is running.
    pub async fn bound_port(&self, kind: TransportKind) -> Option<u16> {
        let slot = self.slots.get(&kind)?;
        let running = slot.running.lock().await;
        running.as_ref().map(|r| r.local_port)
    }

    /// Current lifecycle state for `kind`.
    pub fn state(&self, kind: TransportKind) -> ListenerState {
        self.slots
            .get(&kind)
            .map(|slot| *slot.state.borrow())
            .unwrap_or(ListenerState::Stopped)
    }

    /// Active configuration for `kind`, if running.
    pub async fn active_config(&self, kind: TransportKind) -> Option<ListenerConfig> {
        let slot = self.slots.get(&kind)?;
        let running = slot.running.lock().await;
        running.as_ref().map(|r| r.config)
    }

    async fn bind_slot(
        &self,
        slot: &Slot,
        config: ListenerConfig,
    ) -> Result<RunningListener, ListenerError> {
        let kind = config.kind;
        slot.state.send_replace(ListenerState::Starting);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        match slot.transport.bind(config.port, shutdown_rx).await {
            Ok(bound) => {
                slot.state.send_replace(ListenerState::Running);
                info!("{kind} listener running on port {}", bound.local_port);
                self.log_bus
                    .publish(format!("{kind} listener started on port {}", bound.local_port));
                Ok(RunningListener {
                    config,
                    local_port: bound.local_port,
                    shutdown: shutdown_tx,
                    task: bound.task,
                })
            }
            Err(source) => {
                slot.state.send_replace(ListenerState::Stopped);
                warn!("{kind} listener bind failed on port {}: {source}", config.port);
                self.log_bus.publish(format!(
                    "{kind} listener failed to start on port {}: {source}",
                    config.port
                ));
                Err(ListenerError::Bind {
                    kind,
                    port: config.port,
                    source,
                })
            }
        }
    }

    /// Signals shutdown, waits up to the grace period for the listener
    /// task (and its sessions) to finish, then aborts whatever remains.
    async fn drain_listener(&self, slot: &Slot, mut listener: RunningListener) {
        let kind = listener.config.kind;
        slot.state.send_replace(ListenerState::Stopping);
        let _ = listener.shutdown.send(true);

        match tokio::time::timeout(self.grace, &mut listener.task).await {
            Ok(_) => info!("{kind} listener on port {} stopped", listener.local_port),
            Err(_) => {
                warn!(
                    "{kind} listener on port {} did not drain within {:?}; force-closing",
                    listener.local_port, self.grace
                );
                // Aborting the accept task drops its session JoinSet,
                // which cancels every remaining session.
                listener.task.abort();
            }
        }
        slot.state.send_replace(ListenerState::Stopped);
        self.log_bus
            .publish(format!("{kind} listener on port {} stopped", listener.local_port));
    }
}
