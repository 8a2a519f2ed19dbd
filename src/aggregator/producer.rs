//! Producer tasks: one fetch per producer, forwarded onto the hand-off queue

use super::queue::QueueSender;
use crate::source::RecordSource;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// What one producer did before returning
#[derive(Debug, Clone)]
pub struct ProducerOutcome {
    pub producer_id: usize,
    /// Records returned by the source
    pub fetched: usize,
    /// Records pushed onto the queue
    pub forwarded: usize,
    pub elapsed: Duration,
    /// Cause of failure, if the fetch failed
    pub error: Option<String>,
}

impl ProducerOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Live counters for one producer, readable after the task is aborted
#[derive(Debug, Default)]
pub struct ProducerProgress {
    fetched: AtomicUsize,
    forwarded: AtomicUsize,
}

impl ProducerProgress {
    /// Records returned by the source so far
    pub fn fetched(&self) -> usize {
        self.fetched.load(Ordering::SeqCst)
    }

    /// Records pushed onto the queue so far
    pub fn forwarded(&self) -> usize {
        self.forwarded.load(Ordering::SeqCst)
    }
}

/// Fetch one batch and forward every record
///
/// A failed fetch is logged and reported in the outcome; nothing is pushed
/// and the producer does not retry.
pub(crate) async fn run_producer<S: RecordSource>(
    producer_id: usize,
    source: Arc<S>,
    batch_size: usize,
    queue: QueueSender<S::Record>,
    progress: Arc<ProducerProgress>,
) -> ProducerOutcome {
    let start = Instant::now();
    let mut outcome = ProducerOutcome {
        producer_id,
        fetched: 0,
        forwarded: 0,
        elapsed: Duration::ZERO,
        error: None,
    };

    match source.fetch(batch_size).await {
        Ok(records) => {
            outcome.fetched = records.len();
            progress.fetched.store(outcome.fetched, Ordering::SeqCst);
            debug!(
                "Producer {} fetched {} records from {}",
                producer_id,
                outcome.fetched,
                source.name()
            );

            for record in records {
                if let Err(e) = queue.push(record).await {
                    warn!("Producer {} stopped forwarding: {}", producer_id, e);
                    outcome.error = Some(e.to_string());
                    break;
                }
                outcome.forwarded += 1;
                progress.forwarded.fetch_add(1, Ordering::SeqCst);
            }
        }
        Err(e) => {
            warn!(
                "Producer {} failed fetching from {}: {}",
                producer_id,
                source.name(),
                e
            );
            outcome.error = Some(e.to_string());
        }
    }

    outcome.elapsed = start.elapsed();
    outcome
}
