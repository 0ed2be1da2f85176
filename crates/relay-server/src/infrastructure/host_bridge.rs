//! Executor bridge: the relay's only doorway into the host application.
//!
//! The host's command executor is single-owner: it may only run commands
//! on the host's own control-loop thread. Network threads therefore never
//! call the executor directly. Instead, [`ChannelBridge`] marshals each
//! dispatch through an mpsc request channel into a [`HostHandle`] that the
//! host drains on its control loop, and the calling session handler awaits
//! the boolean result on a oneshot reply channel.
//!
//! Failure never crosses this boundary as a panic. A host that has gone
//! away (handle dropped) or that drops a reply is a definite "unavailable"
//! outcome reported as `false` — no null-like sentinels.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use relay_core::HostMetrics;

/// Capability interface to the host's command execution and metrics.
///
/// `dispatch_command` returns `false` when the host has no active session
/// to execute against or the command was rejected. `read_status` is
/// read-only and non-blocking, safe to call from the sampler task.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutorBridge: Send + Sync {
    async fn dispatch_command(&self, text: &str) -> bool;
    fn read_status(&self) -> HostMetrics;
}

/// One request handed to the host's control loop.
#[derive(Debug)]
pub struct HostRequest {
    /// The sanitized command text to execute.
    pub command: String,
    reply: oneshot::Sender<bool>,
}

impl HostRequest {
    /// Reports the execution outcome back to the waiting session handler.
    /// A dropped reply receiver (session already gone) is ignored.
    pub fn respond(self, success: bool) {
        let _ = self.reply.send(success);
    }
}

/// Host side of the bridge: drained by the host's control loop.
#[derive(Debug)]
pub struct HostHandle {
    requests: mpsc::Receiver<HostRequest>,
    metrics: Arc<RwLock<HostMetrics>>,
}

impl HostHandle {
    /// Receives the next pending command request. Returns `None` once
    /// every bridge clone has been dropped.
    pub async fn next_request(&mut self) -> Option<HostRequest> {
        self.requests.recv().await
    }

    /// Publishes fresh instantaneous metrics for the sampler to read.
    pub fn publish_metrics(&self, metrics: HostMetrics) {
        *self.metrics.write().expect("metrics lock poisoned") = metrics;
    }
}

/// Relay side of the bridge.
#[derive(Debug, Clone)]
pub struct ChannelBridge {
    requests: mpsc::Sender<HostRequest>,
    metrics: Arc<RwLock<HostMetrics>>,
}

impl ChannelBridge {
    /// Creates a bridge and the matching host handle.
    ///
    /// `queue_depth` bounds how many commands may be waiting on the host
    /// at once; senders past that point wait, which keeps a flood of
    /// remote commands from piling up unbounded behind a slow host.
    pub fn new(queue_depth: usize) -> (Self, HostHandle) {
        let (tx, rx) = mpsc::channel(queue_depth);
        let metrics = Arc::new(RwLock::new(HostMetrics::default()));
        (
            Self {
                requests: tx,
                metrics: Arc::clone(&metrics),
            },
            HostHandle {
                requests: rx,
                metrics,
            },
        )
    }
}

#[async_trait]
impl ExecutorBridge for ChannelBridge {
    async fn dispatch_command(&self, text: &str) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = HostRequest {
            command: text.to_string(),
            reply: reply_tx,
        };
        if self.requests.send(request).await.is_err() {
            debug!("dispatch of {text:?} failed: host handle dropped");
            return false;
        }
        // A host that drops the reply without answering counts as a
        // rejection, not an error.
        reply_rx.await.unwrap_or(false)
    }

    fn read_status(&self) -> HostMetrics {
        *self.metrics.read().expect("metrics lock poisoned")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
