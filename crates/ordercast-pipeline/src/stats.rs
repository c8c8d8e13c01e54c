//! Pipeline counters.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ordercast_core::Category;
use serde::{Deserialize, Serialize};

/// Accumulated pipeline counters.
///
/// Created once with the pipeline and reset only by an explicit
/// [`reset_stats`](crate::NotificationPipeline::reset_stats).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStats {
    /// Valid notifications accepted.
    pub total_received: u64,
    /// Notifications every subscriber handled.
    pub total_processed: u64,
    /// Notifications at least one subscriber failed on.
    pub total_failed: u64,
    /// Accepted notifications per category.
    pub by_category: BTreeMap<Category, u64>,
    /// When the last successful dispatch finished.
    pub last_processed_at: Option<DateTime<Utc>>,
    /// Pending notifications dropped because the queue was full.
    pub evicted: u64,
}

impl PipelineStats {
    pub(crate) fn record_received(&mut self, category: Category) {
        self.total_received += 1;
        *self.by_category.entry(category).or_insert(0) += 1;
    }

    pub(crate) fn record_processed(&mut self, at: DateTime<Utc>) {
        self.total_processed += 1;
        self.last_processed_at = Some(at);
    }

    pub(crate) fn record_failed(&mut self) {
        self.total_failed += 1;
    }

    /// Count for one category (zero when never seen).
    pub fn category_count(&self, category: Category) -> u64 {
        self.by_category.get(&category).copied().unwrap_or(0)
    }
}
