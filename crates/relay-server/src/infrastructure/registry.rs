//! Connection registry: the live set of transport sessions.
//!
//! Accept loops register a [`SessionHandle`] when a session opens and the
//! session's guard unregisters it on close, so the registry never holds a
//! session whose channel is gone for longer than the close itself takes.
//! Fan-out iterates the registry and pushes a line into each session's
//! outbound queue; a session that closed mid-iteration simply fails its
//! push and is skipped silently.
//!
//! Lock discipline: one `std::sync::Mutex` around the map, held only for
//! map operations and non-blocking channel sends. Nothing here awaits.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use uuid::Uuid;

use relay_core::TransportKind;

/// Handle to one live session, owned by the registry for the duration of
/// "open". The outbound sender feeds the session's writer; sends never
/// block.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub kind: TransportKind,
    outbound: mpsc::UnboundedSender<String>,
}

impl SessionHandle {
    pub fn new(kind: TransportKind, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            outbound,
        }
    }

    /// Queues a line for delivery. Returns `false` if the session's
    /// channel is already closed.
    pub fn push(&self, line: impl Into<String>) -> bool {
        self.outbound.send(line.into()).is_ok()
    }
}

/// Thread-safe registry of live sessions. No ordering guarantee.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: Mutex<HashMap<Uuid, SessionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fully constructed session.
    pub fn register(&self, handle: SessionHandle) {
        let mut sessions = self.sessions.lock().expect("registry lock poisoned");
        sessions.insert(handle.id, handle);
    }

    /// Removes a session. Unknown ids are ignored (close paths can race).
    pub fn unregister(&self, id: Uuid) {
        let mut sessions = self.sessions.lock().expect("registry lock poisoned");
        sessions.remove(&id);
    }

    /// Visits every live session. Used only for fan-out; the visitor must
    /// not block.
    pub fn for_each(&self, mut visitor: impl FnMut(&SessionHandle)) {
        let sessions = self.sessions.lock().expect("registry lock poisoned");
        for handle in sessions.values() {
            visitor(handle);
        }
    }

    /// Number of live sessions.
    pub fn count(&self) -> usize {
        self.sessions.lock().expect("registry lock poisoned").len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn make_session() -> (SessionHandle, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SessionHandle::new(TransportKind::Stream, tx), rx)
    }

    #[test]
    fn test_registry_starts_empty() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = make_session();
        let id = handle.id;

        registry.register(handle);
        assert_eq!(registry.count(), 1);

        registry.unregister(id);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_unregister_unknown_id_is_a_no_op() {
        let registry = ConnectionRegistry::new();
        registry.unregister(Uuid::new_v4());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_for_each_visits_every_session() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = make_session();
        let (b, _rx_b) = make_session();
        registry.register(a);
        registry.register(b);

        let mut visited = 0;
        registry.for_each(|_| visited += 1);
        assert_eq!(visited, 2);
    }

    #[test]
    fn test_push_to_closed_session_reports_failure_without_panicking() {
        let (handle, rx) = make_session();
        drop(rx); // session's writer is gone

        assert!(!handle.push("line"));
    }

    #[test]
    fn test_fan_out_skips_closed_sessions_silently() {
        let registry = ConnectionRegistry::new();
        let (open, mut open_rx) = make_session();
        let (closed, closed_rx) = make_session();
        registry.register(open);
        registry.register(closed);
        drop(closed_rx);

        let mut delivered = 0;
        registry.for_each(|session| {
            if session.push("broadcast") {
                delivered += 1;
            }
        });

        assert_eq!(delivered, 1);
        assert_eq!(open_rx.try_recv().unwrap(), "broadcast");
    }

    #[test]
    fn test_concurrent_register_unregister_loses_no_updates() {
        use std::sync::Arc;

        let registry = Arc::new(ConnectionRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    let (session, _rx) = {
                        let (tx, rx) = mpsc::unbounded_channel();
                        (SessionHandle::new(TransportKind::Stream, tx), rx)
                    };
                    let id = session.id;
                    registry.register(session);
                    registry.unregister(id);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(registry.count(), 0);
    }
}
