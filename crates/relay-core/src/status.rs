//! Host status snapshots.
//!
//! The status sampler reads instantaneous metrics from the host once per
//! second and publishes a fresh [`StatusSnapshot`]. Snapshots are value
//! types with no persistent identity: the new one replaces the old one
//! wholesale inside a [`StatusCell`], so readers always observe a
//! complete, internally consistent set of numbers and never a partially
//! updated one.
//!
//! Tick-derived rates are clamped to [`NOMINAL_TICK_RATE`] — a host that
//! briefly reports a burst above nominal is noise, not signal.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// The host's nominal tick rate; tick-derived rates are clamped to it.
pub const NOMINAL_TICK_RATE: f64 = 20.0;

/// Raw instantaneous metrics read from the host through the executor
/// bridge's read-only status interface.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HostMetrics {
    /// Frames rendered per second.
    pub frame_rate: f64,
    /// Round-trip latency to the host's upstream peer, in milliseconds.
    pub latency_ms: u32,
    /// Ticks per second as measured over the last sampling window.
    pub tick_rate: f64,
}

/// A complete, read-only view of host health, recomputed on a fixed
/// cadence and replaced wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Frame rate.
    pub fps: f64,
    /// Round-trip latency in milliseconds.
    pub ping: u32,
    /// Tick rate, clamped to [`NOMINAL_TICK_RATE`].
    pub tps: f64,
    /// Secondary tick rate; the host executor is single-threaded, so this
    /// tracks `tps` (still clamped independently).
    pub mtps: f64,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            fps: 0.0,
            ping: 0,
            tps: 0.0,
            mtps: 0.0,
        }
    }
}

impl StatusSnapshot {
    /// Derives a snapshot from raw host metrics, clamping tick rates.
    pub fn from_metrics(metrics: HostMetrics) -> Self {
        let tps = metrics.tick_rate.min(NOMINAL_TICK_RATE).max(0.0);
        Self {
            fps: metrics.frame_rate.max(0.0),
            ping: metrics.latency_ms,
            tps,
            mtps: tps.min(NOMINAL_TICK_RATE),
        }
    }
}

/// Holder for the current snapshot.
///
/// `load` copies the whole value out under a read lock and `store`
/// replaces it under a write lock, so a reader can never see half of an
/// update. `StatusSnapshot` is `Copy`; the lock is held only for the
/// duration of the copy.
#[derive(Debug, Default)]
pub struct StatusCell {
    inner: RwLock<StatusSnapshot>,
}

impl StatusCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current snapshot by value.
    pub fn load(&self) -> StatusSnapshot {
        *self.inner.read().expect("status cell lock poisoned")
    }

    /// Replaces the current snapshot.
    pub fn store(&self, snapshot: StatusSnapshot) {
        *self.inner.write().expect("status cell lock poisoned") = snapshot;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_metrics_passes_healthy_values_through() {
        let snap = StatusSnapshot::from_metrics(HostMetrics {
            frame_rate: 120.0,
            latency_ms: 42,
            tick_rate: 19.7,
        });
        assert_eq!(snap.fps, 120.0);
        assert_eq!(snap.ping, 42);
        assert_eq!(snap.tps, 19.7);
        assert_eq!(snap.mtps, 19.7);
    }

    #[test]
    fn test_from_metrics_clamps_tick_rate_to_nominal() {
        // A sampling window straddling a burst can report > 20 ticks/s;
        // the snapshot must clamp it.
        let snap = StatusSnapshot::from_metrics(HostMetrics {
            frame_rate: 60.0,
            latency_ms: 0,
            tick_rate: 173.4,
        });
        assert_eq!(snap.tps, NOMINAL_TICK_RATE);
        assert_eq!(snap.mtps, NOMINAL_TICK_RATE);
    }

    #[test]
    fn test_from_metrics_floors_negative_values_at_zero() {
        let snap = StatusSnapshot::from_metrics(HostMetrics {
            frame_rate: -1.0,
            latency_ms: 0,
            tick_rate: -5.0,
        });
        assert_eq!(snap.fps, 0.0);
        assert_eq!(snap.tps, 0.0);
    }

    #[test]
    fn test_cell_load_returns_last_stored_snapshot() {
        let cell = StatusCell::new();
        let snap = StatusSnapshot {
            fps: 59.9,
            ping: 23,
            tps: 20.0,
            mtps: 20.0,
        };
        cell.store(snap);
        assert_eq!(cell.load(), snap);
    }

    #[test]
    fn test_cell_default_is_all_zero() {
        let cell = StatusCell::new();
        assert_eq!(cell.load(), StatusSnapshot::default());
    }

    #[test]
    fn test_snapshot_serializes_with_wire_field_names() {
        let snap = StatusSnapshot {
            fps: 60.0,
            ping: 12,
            tps: 20.0,
            mtps: 20.0,
        };
        let json = serde_json::to_value(snap).unwrap();
        assert_eq!(json["fps"], 60.0);
        assert_eq!(json["ping"], 12);
        assert_eq!(json["tps"], 20.0);
        assert_eq!(json["mtps"], 20.0);
    }
}
