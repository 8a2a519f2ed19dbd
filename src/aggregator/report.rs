//! Structured summary of one aggregation run

use super::MergeStrategy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A producer that did not finish its batch, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerFailure {
    pub producer_id: usize,
    pub cause: String,
    /// Records pushed before the failure; nonzero only for a producer
    /// aborted mid-batch, whose records stay in the result
    pub forwarded: usize,
}

/// Counts and failures observed while aggregating
///
/// For every run `received == unique + duplicates`, and
/// `forwarded == received + abandoned` unless a consumer panicked. Both
/// `fetched` and `forwarded` include producers aborted at the deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationReport {
    pub run_id: Uuid,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,

    pub producers: usize,
    pub consumers: usize,
    pub batch_size: usize,
    pub queue_capacity: usize,
    pub merge_strategy: MergeStrategy,

    /// Records returned by the source across all producers
    pub fetched: usize,
    /// Records pushed onto the hand-off queue
    pub forwarded: usize,
    /// Records taken off the queue by consumers
    pub received: usize,
    /// Records in the final result
    pub unique: usize,
    /// Records discarded because their key had already been seen
    pub duplicates: usize,
    /// Records left in the queue when consumers stopped at the deadline
    pub abandoned: usize,

    pub failed_producers: Vec<ProducerFailure>,
    pub deadline_exceeded: bool,
}

impl AggregationReport {
    pub fn succeeded_producers(&self) -> usize {
        self.producers.saturating_sub(self.failed_producers.len())
    }

    /// True when every producer succeeded and every fetched record was processed
    pub fn is_complete(&self) -> bool {
        self.failed_producers.is_empty() && !self.deadline_exceeded && self.abandoned == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} unique of {} received ({} duplicates) from {}/{} producers in {}ms",
            self.unique,
            self.received,
            self.duplicates,
            self.succeeded_producers(),
            self.producers,
            self.elapsed_ms
        )
    }
}
