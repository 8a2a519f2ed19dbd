//! Consumer tasks: drain the hand-off queue and deduplicate into a result set

use super::queue::QueueReceiver;
use super::result_set::ResultSet;
use crate::model::DedupRecord;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Where a consumer merges its records
pub enum ConsumerSink<O> {
    /// One result set shared by every consumer behind a single lock
    Shared(Arc<Mutex<ResultSet<O>>>),
    /// A result set private to this consumer, merged after all consumers finish
    Private(ResultSet<O>),
}

/// What one consumer did before returning
#[derive(Debug)]
pub struct ConsumerOutcome<O> {
    pub consumer_id: usize,
    /// Records taken off the queue
    pub received: usize,
    /// Records added to the result set
    pub inserted: usize,
    /// Records discarded because their key was already present
    pub duplicates: usize,
    /// Whether the consumer stopped at the deadline rather than at end of stream
    pub stopped_early: bool,
    /// The private result set, when running with [`ConsumerSink::Private`]
    pub private: Option<ResultSet<O>>,
}

enum Next<T> {
    Item(T),
    Closed,
    Deadline,
}

async fn next_record<T>(queue: &QueueReceiver<T>, deadline: Option<Instant>) -> Next<T> {
    match deadline {
        Some(deadline) => {
            tokio::select! {
                biased;
                _ = tokio::time::sleep_until(deadline) => Next::Deadline,
                item = queue.pop() => item.map_or(Next::Closed, Next::Item),
            }
        }
        None => queue.pop().await.map_or(Next::Closed, Next::Item),
    }
}

/// Pop records until the queue reports end of stream (or the deadline passes)
pub(crate) async fn run_consumer<R: DedupRecord>(
    consumer_id: usize,
    queue: QueueReceiver<R>,
    mut sink: ConsumerSink<R::Output>,
    deadline: Option<Instant>,
) -> ConsumerOutcome<R::Output> {
    let mut received = 0;
    let mut inserted = 0;
    let mut stopped_early = false;

    loop {
        let record = match next_record(&queue, deadline).await {
            Next::Item(record) => record,
            Next::Closed => break,
            Next::Deadline => {
                stopped_early = true;
                break;
            }
        };
        received += 1;

        let key = record.dedup_key();
        let output = record.project();

        let added = match &mut sink {
            ConsumerSink::Shared(set) => set.lock().await.insert(key, output),
            ConsumerSink::Private(set) => set.insert(key, output),
        };
        if added {
            inserted += 1;
        }
    }

    debug!(
        "Consumer {} finished: {} received, {} inserted{}",
        consumer_id,
        received,
        inserted,
        if stopped_early { " (deadline)" } else { "" }
    );

    ConsumerOutcome {
        consumer_id,
        received,
        inserted,
        duplicates: received - inserted,
        stopped_early,
        private: match sink {
            ConsumerSink::Shared(_) => None,
            ConsumerSink::Private(set) => Some(set),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::queue::HandoffQueue;
    use crate::model::{DedupKey, User};
    use crate::testing::fixtures::users;
    use std::time::Duration;

    async fn filled_queue(records: Vec<User>) -> HandoffQueue<User> {
        let mut queue = HandoffQueue::bounded(records.len());
        let tx = queue.sender().unwrap();
        for record in records {
            tx.push(record).await.unwrap();
        }
        drop(tx);
        queue.close();
        queue
    }

    #[tokio::test]
    async fn test_shared_sink_discards_duplicates() {
        let queue = filled_queue(users(&["a", "b", "a", "c", "b"])).await;
        let set = Arc::new(Mutex::new(ResultSet::new()));

        let outcome =
            run_consumer(0, queue.receiver(), ConsumerSink::Shared(set.clone()), None).await;
        assert_eq!(outcome.received, 5);
        assert_eq!(outcome.inserted, 3);
        assert_eq!(outcome.duplicates, 2);
        assert!(!outcome.stopped_early);
        assert!(outcome.private.is_none());

        let set = set.lock().await;
        assert_eq!(set.len(), 3);
        assert!(set.contains(&DedupKey::from("c")));
    }

    #[tokio::test]
    async fn test_private_sink_is_returned() {
        let queue = filled_queue(users(&["x", "x"])).await;
        let outcome = run_consumer(
            1,
            queue.receiver(),
            ConsumerSink::Private(ResultSet::new()),
            None,
        )
        .await;

        let private = outcome.private.unwrap();
        assert_eq!(private.len(), 1);
        assert_eq!(outcome.duplicates, 1);
    }

    #[tokio::test]
    async fn test_deadline_stops_consumer_on_open_queue() {
        let queue: HandoffQueue<User> = HandoffQueue::bounded(4);
        let deadline = Instant::now() + Duration::from_millis(20);

        let outcome = run_consumer(
            2,
            queue.receiver(),
            ConsumerSink::Private(ResultSet::new()),
            Some(deadline),
        )
        .await;
        assert!(outcome.stopped_early);
        assert_eq!(outcome.received, 0);
    }
}
