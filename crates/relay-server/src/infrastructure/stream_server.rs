//! Streaming transport: the line-oriented TCP protocol.
//!
//! Wire contract, per session:
//!
//! 1. On connect the server sends two banner lines (service name, then
//!    port + usage hint).
//! 2. Each client line is either the literal `exit` (case-insensitive) —
//!    farewell line, session closes — or a command, which is handed to the
//!    command pipeline. The server replies `[executed] <line>` whether or
//!    not the host accepted the command; the true outcome is visible in
//!    the audit log entry that follows. Blank lines are dropped silently.
//! 3. Every log entry published while the session is open is pushed to it
//!    unprompted, one per line.
//!
//! Each accepted connection gets exactly one session task, which owns the
//! socket until closure. Remote disconnect (EOF) closes the session and
//! unregisters it without any external signal. A registry guard runs on
//! drop, so even a force-cancelled session leaves no stale registry entry
//! behind.
//!
//! Fan-out is a single log-bus subscription owned by the accept loop: each
//! published entry is pushed through the registry into every open
//! session's outbound queue. A session only joins the registry once its
//! banners are out, so it never receives its own connect notice.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::{tcp::OwnedWriteHalf, TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use futures_util::StreamExt;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info, warn};

use relay_core::{CommandOrigin, LogBus, SubscriberId, TransportKind};

use crate::application::pipeline::{CommandPipeline, PipelineError};
use crate::infrastructure::listener::{BoundTransport, Transport};
use crate::infrastructure::registry::{ConnectionRegistry, SessionHandle};

/// First banner line sent to every new session.
const BANNER_SERVICE: &str = "=== Command Relay stream service ===";

/// Line-oriented TCP transport.
pub struct StreamTransport {
    bind_addr: IpAddr,
    registry: Arc<ConnectionRegistry>,
    log_bus: Arc<LogBus>,
    pipeline: Arc<CommandPipeline>,
}

impl StreamTransport {
    pub fn new(
        bind_addr: IpAddr,
        registry: Arc<ConnectionRegistry>,
        log_bus: Arc<LogBus>,
        pipeline: Arc<CommandPipeline>,
    ) -> Self {
        Self {
            bind_addr,
            registry,
            log_bus,
            pipeline,
        }
    }
}

#[async_trait]
impl Transport for StreamTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stream
    }

    async fn bind(
        &self,
        port: u16,
        shutdown: watch::Receiver<bool>,
    ) -> std::io::Result<BoundTransport> {
        let listener = TcpListener::bind(SocketAddr::new(self.bind_addr, port)).await?;
        let local_port = listener.local_addr()?.port();

        let registry = Arc::clone(&self.registry);
        let log_bus = Arc::clone(&self.log_bus);
        let pipeline = Arc::clone(&self.pipeline);
        let task = tokio::spawn(accept_loop(
            listener, local_port, registry, log_bus, pipeline, shutdown,
        ));

        Ok(BoundTransport { local_port, task })
    }
}

/// Accepts connections until shutdown, then drains its sessions.
///
/// Accept errors while running are logged and the loop continues; a single
/// failed accept must not kill the listener. Once shutdown is signalled
/// the listening socket is dropped (no new sessions) and the loop waits
/// for the open sessions to finish — the listener manager bounds that wait
/// with the grace period and aborts this task if it is exceeded, which
/// cancels the remaining sessions through the `JoinSet`.
async fn accept_loop(
    listener: TcpListener,
    local_port: u16,
    registry: Arc<ConnectionRegistry>,
    log_bus: Arc<LogBus>,
    pipeline: Arc<CommandPipeline>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut sessions: JoinSet<()> = JoinSet::new();

    // One subscription per listener: every published entry is pushed to
    // every registered session. Sessions that closed mid-iteration fail
    // their push and are skipped.
    let fanout_registry = Arc::clone(&registry);
    let _fanout = FanoutGuard {
        log_bus: Arc::clone(&log_bus),
        subscriber: log_bus.subscribe(move |entry| {
            fanout_registry.for_each(|session| {
                let _ = session.push(entry.text.clone());
            });
        }),
    };

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("stream listener on port {local_port}: shutdown signalled");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!("stream session connecting from {peer}");
                    sessions.spawn(handle_session(
                        stream,
                        peer,
                        local_port,
                        Arc::clone(&registry),
                        Arc::clone(&log_bus),
                        Arc::clone(&pipeline),
                        shutdown.clone(),
                    ));
                }
                Err(e) => {
                    // Transient failure (fd exhaustion and the like).
                    warn!("stream listener on port {local_port}: accept error: {e}");
                }
            },
            // Reap finished sessions so the set does not grow unbounded.
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
        }
    }

    // Stop accepting immediately; let in-flight sessions finish.
    drop(listener);
    while sessions.join_next().await.is_some() {}
    debug!("stream listener on port {local_port}: all sessions drained");
}

/// Drops the listener's fan-out subscription when the accept loop ends,
/// including when the listener task is aborted during a force-close. A
/// stale subscription would double-deliver entries after a hot restart.
struct FanoutGuard {
    log_bus: Arc<LogBus>,
    subscriber: SubscriberId,
}

impl Drop for FanoutGuard {
    fn drop(&mut self) {
        self.log_bus.unsubscribe(self.subscriber);
    }
}

/// Unregisters the session on drop, so cleanup also runs when the session
/// task is cancelled during a force-close.
struct SessionGuard {
    registry: Arc<ConnectionRegistry>,
    session_id: uuid::Uuid,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.session_id);
    }
}

/// Runs one session from accept to close.
async fn handle_session(
    stream: TcpStream,
    peer: SocketAddr,
    local_port: u16,
    registry: Arc<ConnectionRegistry>,
    log_bus: Arc<LogBus>,
    pipeline: Arc<CommandPipeline>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = FramedRead::new(read_half, LinesCodec::new());

    // Outbound queue fed by the listener's log fan-out. Banners and
    // command replies are written directly; this session task is the
    // only writer either way.
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();

    let handle = SessionHandle::new(TransportKind::Stream, outbound_tx.clone());
    let session_id = handle.id;
    let origin = CommandOrigin::Session(session_id.to_string());

    // Banner lines go out before anything else, directly on the socket.
    if write_line(&mut write_half, BANNER_SERVICE).await.is_err()
        || write_line(
            &mut write_half,
            &format!(
                "port: {local_port} | send a command line to execute | type 'exit' to disconnect"
            ),
        )
        .await
        .is_err()
    {
        return;
    }

    // Record the connect before registering: fan-out only reaches
    // registered sessions, so this one never sees its own notice.
    log_bus.publish(format!("stream session {session_id} connected from {peer}"));

    registry.register(handle);
    let _guard = SessionGuard {
        registry,
        session_id,
    };

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("session {session_id}: closing for listener shutdown");
                break;
            }
            outbound = outbound_rx.recv() => {
                // Senders live as long as this scope; recv can't yield None here.
                if let Some(line) = outbound {
                    if write_line(&mut write_half, &line).await.is_err() {
                        debug!("session {session_id}: write failed (peer gone)");
                        break;
                    }
                }
            }
            inbound = lines.next() => match inbound {
                None => {
                    debug!("session {session_id}: peer closed the connection");
                    break;
                }
                Some(Err(e)) => {
                    warn!("session {session_id}: read error: {e}");
                    break;
                }
                Some(Ok(line)) => {
                    let trimmed = line.trim().to_string();
                    if trimmed.eq_ignore_ascii_case("exit") {
                        let _ = write_line(&mut write_half, "disconnecting...").await;
                        break;
                    }
                    match pipeline.submit(&line, origin.clone()).await {
                        // The reply intentionally does not reflect the
                        // dispatch verdict; the audit log entry does.
                        Ok(_) => {
                            if write_line(&mut write_half, &format!("[executed] {trimmed}"))
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                        // Blank line: no dispatch, no reply.
                        Err(PipelineError::Blank) => {}
                    }
                }
            }
        }
    }

    log_bus.publish(format!("stream session {session_id} disconnected"));
    info!("stream session {session_id} ({peer}) closed");
}

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await
}
