//! Notification subscriber registry.
//!
//! Subscribers are explicit handles implementing [`NotificationHandler`] or
//! [`ErrorHandler`]. The registry keeps them per category, in one global set,
//! and in one error set, each in subscription order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ordercast_core::{Category, DispatchError, Notification};
use parking_lot::Mutex;
use thiserror::Error;

/// Token returned by every subscribe call; pass it back to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub_{}", self.0)
    }
}

/// Failure reported by a subscriber.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl From<&str> for HandlerError {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Receives validated notifications.
pub trait NotificationHandler: Send + Sync {
    /// Handle one notification. An `Err` marks this delivery as failed.
    fn handle(&self, notification: &Notification) -> Result<(), HandlerError>;
}

/// Receives subscriber failures.
pub trait ErrorHandler: Send + Sync {
    /// Called once per failing subscriber per notification.
    fn on_dispatch_error(&self, error: &DispatchError, notification: &Notification);
}

/// Snapshot of the handlers a notification is delivered to, in order.
pub(crate) type Targets = Vec<(SubscriptionId, Arc<dyn NotificationHandler>)>;

#[derive(Default)]
struct Entries {
    by_category: BTreeMap<Category, Targets>,
    global: Targets,
    errors: Vec<(SubscriptionId, Arc<dyn ErrorHandler>)>,
}

/// Category → subscribers multimap plus global and error sets.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    entries: Mutex<Entries>,
}

impl SubscriberRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Subscribe to one category.
    pub fn subscribe(
        &self,
        category: Category,
        handler: Arc<dyn NotificationHandler>,
    ) -> SubscriptionId {
        let id = self.allocate();
        self.entries
            .lock()
            .by_category
            .entry(category)
            .or_default()
            .push((id, handler));
        id
    }

    /// Subscribe to every category.
    pub fn subscribe_all(&self, handler: Arc<dyn NotificationHandler>) -> SubscriptionId {
        let id = self.allocate();
        self.entries.lock().global.push((id, handler));
        id
    }

    /// Subscribe to dispatch failures.
    pub fn subscribe_errors(&self, handler: Arc<dyn ErrorHandler>) -> SubscriptionId {
        let id = self.allocate();
        self.entries.lock().errors.push((id, handler));
        id
    }

    /// Remove a subscription. Unknown or already-removed ids are a no-op.
    ///
    /// Returns whether anything was removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.lock();
        let mut removed = false;
        for targets in entries.by_category.values_mut() {
            removed |= remove_id(targets, id);
        }
        entries.by_category.retain(|_, targets| !targets.is_empty());
        removed |= remove_id(&mut entries.global, id);
        let before = entries.errors.len();
        entries.errors.retain(|(sid, _)| *sid != id);
        removed || entries.errors.len() != before
    }

    /// Category subscribers followed by global subscribers.
    pub(crate) fn targets(&self, category: Category) -> Targets {
        let entries = self.entries.lock();
        let mut targets = entries
            .by_category
            .get(&category)
            .cloned()
            .unwrap_or_default();
        targets.extend(entries.global.iter().cloned());
        targets
    }

    pub(crate) fn error_handlers(&self) -> Vec<Arc<dyn ErrorHandler>> {
        self.entries
            .lock()
            .errors
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect()
    }

    /// Total registered subscriptions of every kind.
    pub fn len(&self) -> usize {
        let entries = self.entries.lock();
        entries.by_category.values().map(Vec::len).sum::<usize>()
            + entries.global.len()
            + entries.errors.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn remove_id(targets: &mut Targets, id: SubscriptionId) -> bool {
    let before = targets.len();
    targets.retain(|(sid, _)| *sid != id);
    targets.len() != before
}
