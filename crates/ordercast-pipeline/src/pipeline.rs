//! Notification ingestion and sequential dispatch.
//!
//! [`NotificationPipeline::process_notification`] validates a raw payload,
//! counts it, appends it to the pending queue, and starts a drain unless one
//! is already running. The drain pops pending notifications one at a time and
//! hands each to the category subscribers and then the global subscribers.
//!
//! Queue and stats live behind one lock that is never held while a subscriber
//! runs, so a subscriber may feed the pipeline again. Such a notification is
//! appended to `pending` and picked up by the drain already in progress.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ordercast_core::{Category, DispatchError, Notification, ValidationError};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::queue::BoundedQueue;
use crate::registry::{
    ErrorHandler, NotificationHandler, SubscriberRegistry, SubscriptionId, Targets,
};
use crate::stats::PipelineStats;

/// Queue bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueCapacities {
    /// Pending notifications awaiting dispatch.
    pub pending: usize,
    /// Successfully dispatched history.
    pub processed: usize,
    /// Failed dispatch history.
    pub failed: usize,
}

impl Default for QueueCapacities {
    fn default() -> Self {
        Self {
            pending: 100,
            processed: 100,
            failed: 50,
        }
    }
}

/// A notification at least one subscriber failed on.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedNotification {
    /// The notification as dispatched.
    pub notification: Notification,
    /// One entry per failing subscriber.
    pub errors: Vec<String>,
    /// When the dispatch finished.
    pub failed_at: DateTime<Utc>,
}

struct Inner {
    pending: BoundedQueue<Notification>,
    processed: BoundedQueue<Notification>,
    failed: BoundedQueue<FailedNotification>,
    stats: PipelineStats,
    draining: bool,
}

/// Validates, queues, and dispatches notifications to subscribers.
pub struct NotificationPipeline {
    registry: SubscriberRegistry,
    inner: Mutex<Inner>,
}

impl Default for NotificationPipeline {
    fn default() -> Self {
        Self::new(QueueCapacities::default())
    }
}

impl NotificationPipeline {
    /// Empty pipeline with the given queue bounds.
    pub fn new(capacities: QueueCapacities) -> Self {
        Self {
            registry: SubscriberRegistry::new(),
            inner: Mutex::new(Inner {
                pending: BoundedQueue::new(capacities.pending),
                processed: BoundedQueue::new(capacities.processed),
                failed: BoundedQueue::new(capacities.failed),
                stats: PipelineStats::default(),
                draining: false,
            }),
        }
    }

    // ── ingestion ───────────────────────────────────────────────────────

    /// Validate and enqueue a raw server payload, then drain.
    ///
    /// Invalid payloads are logged and dropped without touching stats or
    /// queues; the error is returned for callers that care.
    pub fn process_notification(&self, raw: &Value) -> Result<(), ValidationError> {
        self.process_at(raw, Utc::now())
    }

    /// [`process_notification`](Self::process_notification) with an explicit
    /// receipt time, used as `occurredAt` when the payload has none.
    pub fn process_at(&self, raw: &Value, received_at: DateTime<Utc>) -> Result<(), ValidationError> {
        match Notification::from_value(raw, received_at) {
            Ok(notification) => {
                self.enqueue(notification);
                Ok(())
            }
            Err(error) => {
                warn!(%error, "dropping invalid notification");
                Err(error)
            }
        }
    }

    /// Count and enqueue an already validated notification, then drain.
    pub fn enqueue(&self, notification: Notification) {
        {
            let mut inner = self.inner.lock();
            inner.stats.record_received(notification.category());
            debug!(
                order_id = notification.order_id(),
                table_id = notification.table_id(),
                category = %notification.category(),
                "notification received"
            );
            if let Some(evicted) = inner.pending.push(notification) {
                inner.stats.evicted += 1;
                warn!(
                    order_id = evicted.order_id(),
                    category = %evicted.category(),
                    "pending queue full, evicted oldest notification"
                );
            }
        }
        self.drain();
    }

    // ── drain ───────────────────────────────────────────────────────────

    fn drain(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.draining {
                trace!("drain already running, notification queued");
                return;
            }
            inner.draining = true;
        }

        loop {
            let next = {
                let mut inner = self.inner.lock();
                match inner.pending.pop() {
                    Some(n) => n,
                    None => {
                        inner.draining = false;
                        break;
                    }
                }
            };

            let failures = self.dispatch(&next);
            let now = Utc::now();

            let mut inner = self.inner.lock();
            if failures.is_empty() {
                inner.stats.record_processed(now);
                let _ = inner.processed.push(next);
            } else {
                inner.stats.record_failed();
                let _ = inner.failed.push(FailedNotification {
                    notification: next,
                    errors: failures.iter().map(|e| e.message.clone()).collect(),
                    failed_at: now,
                });
            }
        }
    }

    /// Deliver to every target; returns one error per failing subscriber.
    fn dispatch(&self, notification: &Notification) -> Vec<DispatchError> {
        let targets: Targets = self.registry.targets(notification.category());
        let mut failures = Vec::new();

        for (id, handler) in targets {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle(notification)));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.0,
                Err(panic) => format!("subscriber panicked: {}", panic_message(&*panic)),
            };
            let error = DispatchError {
                subscriber_id: id.get(),
                category: notification.category(),
                order_id: notification.order_id(),
                message,
            };
            warn!(
                subscriber = %id,
                order_id = error.order_id,
                category = %error.category,
                error = %error.message,
                "subscriber failed"
            );
            self.report(&error, notification);
            failures.push(error);
        }
        failures
    }

    fn report(&self, error: &DispatchError, notification: &Notification) {
        for handler in self.registry.error_handlers() {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                handler.on_dispatch_error(error, notification);
            }));
            if outcome.is_err() {
                warn!(order_id = error.order_id, "error subscriber panicked");
            }
        }
    }

    // ── subscribers ─────────────────────────────────────────────────────

    /// Subscribe to one category.
    pub fn subscribe(
        &self,
        category: Category,
        handler: Arc<dyn NotificationHandler>,
    ) -> SubscriptionId {
        self.registry.subscribe(category, handler)
    }

    /// Subscribe to every category.
    pub fn subscribe_all(&self, handler: Arc<dyn NotificationHandler>) -> SubscriptionId {
        self.registry.subscribe_all(handler)
    }

    /// Subscribe to dispatch failures.
    pub fn subscribe_errors(&self, handler: Arc<dyn ErrorHandler>) -> SubscriptionId {
        self.registry.subscribe_errors(handler)
    }

    /// Remove a subscription; unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.unsubscribe(id)
    }

    /// Registered subscriptions of every kind.
    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    // ── queries ─────────────────────────────────────────────────────────

    /// Processed then pending notifications matching `predicate`.
    fn select(&self, predicate: impl Fn(&Notification) -> bool) -> Vec<Notification> {
        let inner = self.inner.lock();
        inner
            .processed
            .iter()
            .chain(inner.pending.iter())
            .filter(|n| predicate(n))
            .cloned()
            .collect()
    }

    /// Processed and pending notifications of one category.
    pub fn by_category(&self, category: Category) -> Vec<Notification> {
        self.select(|n| n.category() == category)
    }

    /// Processed and pending notifications for one table.
    pub fn by_table(&self, table_id: u64) -> Vec<Notification> {
        self.select(|n| n.table_id() == table_id)
    }

    /// Processed and pending notifications for one order.
    pub fn by_order(&self, order_id: u64) -> Vec<Notification> {
        self.select(|n| n.order_id() == order_id)
    }

    /// The `n` most recently processed notifications, newest first.
    pub fn recent(&self, n: usize) -> Vec<Notification> {
        self.inner
            .lock()
            .processed
            .iter()
            .rev()
            .take(n)
            .cloned()
            .collect()
    }

    /// Pending snapshot, oldest first.
    pub fn pending(&self) -> Vec<Notification> {
        self.inner.lock().pending.iter().cloned().collect()
    }

    /// Processed snapshot, oldest first.
    pub fn processed(&self) -> Vec<Notification> {
        self.inner.lock().processed.iter().cloned().collect()
    }

    /// Failed snapshot, oldest first.
    pub fn failed(&self) -> Vec<FailedNotification> {
        self.inner.lock().failed.iter().cloned().collect()
    }

    /// Current counters.
    pub fn stats(&self) -> PipelineStats {
        self.inner.lock().stats.clone()
    }

    // ── management ──────────────────────────────────────────────────────

    /// Empty all three queues. Stats are kept.
    pub fn clear_queues(&self) {
        let mut inner = self.inner.lock();
        inner.pending.clear();
        inner.processed.clear();
        inner.failed.clear();
        debug!("notification queues cleared");
    }

    /// Zero every counter. Queues are kept.
    pub fn reset_stats(&self) {
        self.inner.lock().stats = PipelineStats::default();
        debug!("notification stats reset");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
