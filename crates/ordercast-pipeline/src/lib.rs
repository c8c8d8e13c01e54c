//! # ordercast-pipeline
//!
//! Ingestion and dispatch of domain notifications, independent of transport
//! state.
//!
//! - [`NotificationPipeline`]: validate, enqueue, and drain notifications
//! - [`BoundedQueue`]: fixed-capacity FIFO that evicts its oldest element
//! - [`SubscriberRegistry`]: category, global, and error subscribers
//! - [`PipelineStats`]: accumulated counters, reset only on request

#![deny(unsafe_code)]

pub mod pipeline;
pub mod queue;
pub mod registry;
pub mod stats;

pub use pipeline::{FailedNotification, NotificationPipeline, QueueCapacities};
pub use queue::BoundedQueue;
pub use registry::{
    ErrorHandler, HandlerError, NotificationHandler, SubscriberRegistry, SubscriptionId,
};
pub use stats::PipelineStats;
