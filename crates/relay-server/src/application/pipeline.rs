//! Command pipeline: sanitize, gate, dispatch, audit.
//!
//! Every inbound command — from either transport — flows through one
//! [`CommandPipeline::submit`] call:
//!
//! 1. The raw text is sanitized ([`relay_core::sanitize`]).
//! 2. Blank results are rejected before any executor contact.
//! 3. A leading `/` is stripped (the host's grammar has no prefix marker).
//! 4. The command is dispatched through the [`ExecutorBridge`] and the
//!    host's boolean verdict is passed through unchanged — no retries, no
//!    reinterpretation.
//! 5. The dispatch is recorded on the log bus, success or failure. The
//!    audit trail cannot be skipped by any transport.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use relay_core::{strip_slash, CommandOrigin, CommandRequest, LogBus};

use crate::infrastructure::host_bridge::ExecutorBridge;

/// Rejections raised before the executor is ever contacted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("command is blank after sanitization")]
    Blank,
}

/// Shared command pipeline, one per process.
pub struct CommandPipeline {
    bridge: Arc<dyn ExecutorBridge>,
    log_bus: Arc<LogBus>,
}

impl CommandPipeline {
    pub fn new(bridge: Arc<dyn ExecutorBridge>, log_bus: Arc<LogBus>) -> Self {
        Self { bridge, log_bus }
    }

    /// Sanitizes and dispatches one command, returning the host's verdict.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Blank`] if nothing useful remains after
    /// sanitization; the executor bridge is not invoked and nothing is
    /// published to the log bus.
    pub async fn submit(
        &self,
        raw: &str,
        origin: CommandOrigin,
    ) -> Result<bool, PipelineError> {
        let request = CommandRequest::new(raw, origin);
        if request.is_blank() {
            debug!(origin = %request.origin, "rejected blank command");
            return Err(PipelineError::Blank);
        }

        let command = strip_slash(&request.clean);
        debug!(origin = %request.origin, command, "dispatching command");

        let success = self.bridge.dispatch_command(command).await;

        self.log_bus.publish(format!(
            "{command} | result: {}",
            if success { "success" } else { "failed" }
        ));

        Ok(success)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
