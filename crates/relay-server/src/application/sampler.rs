//! Status sampler: periodic host metrics snapshotting.
//!
//! Once per second the sampler reads instantaneous metrics through the
//! executor bridge's read-only status interface, derives a clamped
//! [`StatusSnapshot`], and stores it in the shared [`StatusCell`] —
//! replacing the previous snapshot wholesale so readers never observe a
//! partial update. The task exits promptly when the shutdown channel is
//! signalled; there is no polling sleep loop to leak.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::debug;

use relay_core::{StatusCell, StatusSnapshot};

use crate::infrastructure::host_bridge::ExecutorBridge;

/// Default sampling cadence.
pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_secs(1);

/// Spawns the sampler task.
pub fn spawn_sampler(
    bridge: Arc<dyn ExecutorBridge>,
    cell: Arc<StatusCell>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!("status sampler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let snapshot = StatusSnapshot::from_metrics(bridge.read_status());
                    cell.store(snapshot);
                }
            }
        }
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
