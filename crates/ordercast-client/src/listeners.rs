//! Status and server-event listener registry.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ordercast_core::ConnectionState;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

/// Receives connection state changes.
pub trait StatusListener: Send + Sync {
    /// Called with each new state (and once on registration).
    fn on_status(&self, state: ConnectionState);
}

/// Receives named server events.
pub trait EventListener: Send + Sync {
    /// Called with every inbound event the listener registered for.
    fn on_event(&self, event: &str, payload: &Value);
}

/// Token returned by [`on`](crate::RealtimeClient::on) and
/// [`on_status_change`](crate::RealtimeClient::on_status_change).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Entries {
    status: Vec<(ListenerId, Arc<dyn StatusListener>)>,
    events: Vec<(ListenerId, String, Arc<dyn EventListener>)>,
}

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Entries>,
}

impl Listeners {
    fn allocate(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub(crate) fn add_status(&self, listener: Arc<dyn StatusListener>) -> ListenerId {
        let id = self.allocate();
        self.entries.lock().status.push((id, listener));
        id
    }

    pub(crate) fn add_event(&self, event: &str, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = self.allocate();
        self.entries
            .lock()
            .events
            .push((id, event.to_string(), listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.status.len() + entries.events.len();
        entries.status.retain(|(lid, _)| *lid != id);
        entries.events.retain(|(lid, _, _)| *lid != id);
        entries.status.len() + entries.events.len() != before
    }

    pub(crate) fn notify_status(&self, state: ConnectionState) {
        let targets: Vec<_> = self
            .entries
            .lock()
            .status
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in targets {
            deliver_status(listener.as_ref(), state);
        }
    }

    pub(crate) fn notify_event(&self, event: &str, payload: &Value) {
        let targets: Vec<_> = self
            .entries
            .lock()
            .events
            .iter()
            .filter(|(_, name, _)| name == event)
            .map(|(_, _, l)| Arc::clone(l))
            .collect();
        for listener in targets {
            if catch_unwind(AssertUnwindSafe(|| listener.on_event(event, payload))).is_err() {
                warn!(event, "event listener panicked");
            }
        }
    }
}

pub(crate) fn deliver_status(listener: &dyn StatusListener, state: ConnectionState) {
    if catch_unwind(AssertUnwindSafe(|| listener.on_status(state))).is_err() {
        warn!(%state, "status listener panicked");
    }
}
