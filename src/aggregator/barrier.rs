//! Two-phase completion barrier
//!
//! ```text
//! Fetching --(all producers returned; close queue)--> Draining
//! Draining --(all consumers returned)--------------> Done
//! ```
//!
//! Consumers only stop on end of stream, and the stream only ends once the
//! queue is closed, so joining consumers while still `Fetching` could wait
//! forever. The barrier owns both task pools and refuses any transition out
//! of that order.

use super::queue::HandoffQueue;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use thiserror::Error;
use tokio::task::{Id, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierState {
    Fetching,
    Draining,
    Done,
}

impl fmt::Display for BarrierState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BarrierState::Fetching => "fetching",
            BarrierState::Draining => "draining",
            BarrierState::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BarrierError {
    #[error("cannot {action} while {state}")]
    OutOfOrder {
        state: BarrierState,
        action: &'static str,
    },

    #[error("{outstanding} producer handle(s) still alive when closing the hand-off queue")]
    ProducersStillAttached { outstanding: usize },
}

/// Result of the producer join (Fetching -> Draining)
#[derive(Debug)]
pub struct ProducerJoin<P> {
    /// Outputs of producers that returned normally
    pub completed: Vec<P>,
    /// Labels of producers aborted at the deadline
    pub aborted: Vec<usize>,
    /// Labels and panic messages of producers that panicked
    pub panicked: Vec<(usize, String)>,
    pub deadline_exceeded: bool,
}

/// Result of the consumer join (Draining -> Done)
#[derive(Debug)]
pub struct ConsumerJoin<C> {
    pub completed: Vec<C>,
    pub panicked: Vec<(usize, String)>,
}

pub struct CompletionBarrier<P, C> {
    state: BarrierState,
    deadline: Option<Instant>,
    producers: JoinSet<P>,
    producer_labels: HashMap<Id, usize>,
    consumers: JoinSet<C>,
    consumer_labels: HashMap<Id, usize>,
}

impl<P, C> CompletionBarrier<P, C>
where
    P: Send + 'static,
    C: Send + 'static,
{
    pub fn new(deadline: Option<Instant>) -> Self {
        Self {
            state: BarrierState::Fetching,
            deadline,
            producers: JoinSet::new(),
            producer_labels: HashMap::new(),
            consumers: JoinSet::new(),
            consumer_labels: HashMap::new(),
        }
    }

    pub fn state(&self) -> BarrierState {
        self.state
    }

    fn require_state(&self, state: BarrierState, action: &'static str) -> Result<(), BarrierError> {
        if self.state == state {
            Ok(())
        } else {
            Err(BarrierError::OutOfOrder {
                state: self.state,
                action,
            })
        }
    }

    /// Start a producer task; only allowed while fetching
    pub fn spawn_producer<F>(&mut self, label: usize, task: F) -> Result<(), BarrierError>
    where
        F: Future<Output = P> + Send + 'static,
    {
        self.require_state(BarrierState::Fetching, "spawn a producer")?;
        let handle = self.producers.spawn(task);
        self.producer_labels.insert(handle.id(), label);
        Ok(())
    }

    /// Start a consumer task; consumers run alongside producers
    pub fn spawn_consumer<F>(&mut self, label: usize, task: F) -> Result<(), BarrierError>
    where
        F: Future<Output = C> + Send + 'static,
    {
        self.require_state(BarrierState::Fetching, "spawn a consumer")?;
        let handle = self.consumers.spawn(task);
        self.consumer_labels.insert(handle.id(), label);
        Ok(())
    }

    /// Phase 1: wait for every producer, then close the queue
    ///
    /// If the deadline passes first, the producers still running are aborted
    /// (dropping whatever fetch they were awaiting) before the queue closes.
    pub async fn close_after_producers<T: Send + 'static>(
        &mut self,
        queue: &mut HandoffQueue<T>,
    ) -> Result<ProducerJoin<P>, BarrierError> {
        self.require_state(BarrierState::Fetching, "close the hand-off queue")?;

        let mut join = ProducerJoin {
            completed: Vec::new(),
            aborted: Vec::new(),
            panicked: Vec::new(),
            deadline_exceeded: false,
        };

        loop {
            let next = match self.deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, self.producers.join_next_with_id())
                        .await
                    {
                        Ok(next) => next,
                        Err(_) => {
                            join.deadline_exceeded = true;
                            break;
                        }
                    }
                }
                None => self.producers.join_next_with_id().await,
            };

            match next {
                Some(result) => collect(
                    result,
                    &mut self.producer_labels,
                    &mut join.completed,
                    &mut join.panicked,
                    &mut join.aborted,
                ),
                None => break,
            }
        }

        if join.deadline_exceeded {
            warn!(
                "Deadline reached with {} producer(s) still fetching; aborting them",
                self.producers.len()
            );
            self.producers.abort_all();
            while let Some(result) = self.producers.join_next_with_id().await {
                collect(
                    result,
                    &mut self.producer_labels,
                    &mut join.completed,
                    &mut join.panicked,
                    &mut join.aborted,
                );
            }
        }

        let outstanding = queue.close();
        if outstanding > 0 {
            error!(
                "Hand-off queue closed with {} producer handle(s) still alive",
                outstanding
            );
            return Err(BarrierError::ProducersStillAttached { outstanding });
        }

        self.state = BarrierState::Draining;
        debug!(
            "Barrier fetching -> draining ({} completed, {} aborted, {} panicked)",
            join.completed.len(),
            join.aborted.len(),
            join.panicked.len()
        );
        Ok(join)
    }

    /// Phase 2: wait for every consumer to reach end of stream
    pub async fn await_consumers(&mut self) -> Result<ConsumerJoin<C>, BarrierError> {
        self.require_state(BarrierState::Draining, "join consumers")?;

        let mut join = ConsumerJoin {
            completed: Vec::new(),
            panicked: Vec::new(),
        };
        let mut cancelled = Vec::new();
        while let Some(result) = self.consumers.join_next_with_id().await {
            collect(
                result,
                &mut self.consumer_labels,
                &mut join.completed,
                &mut join.panicked,
                &mut cancelled,
            );
        }

        self.state = BarrierState::Done;
        debug!("Barrier draining -> done ({} consumers)", join.completed.len());
        Ok(join)
    }
}

fn collect<T>(
    result: Result<(Id, T), tokio::task::JoinError>,
    labels: &mut HashMap<Id, usize>,
    completed: &mut Vec<T>,
    panicked: &mut Vec<(usize, String)>,
    cancelled: &mut Vec<usize>,
) {
    match result {
        Ok((id, output)) => {
            labels.remove(&id);
            completed.push(output);
        }
        Err(e) => {
            let label = labels.remove(&e.id()).unwrap_or(usize::MAX);
            if e.is_cancelled() {
                cancelled.push(label);
            } else {
                error!("Worker {} panicked: {}", label, e);
                panicked.push((label, e.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    type Barrier = CompletionBarrier<usize, usize>;

    #[tokio::test]
    async fn test_cannot_join_consumers_while_fetching() {
        let mut barrier = Barrier::new(None);
        let err = barrier.await_consumers().await.unwrap_err();
        assert_eq!(
            err,
            BarrierError::OutOfOrder {
                state: BarrierState::Fetching,
                action: "join consumers",
            }
        );
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let mut queue = HandoffQueue::<usize>::bounded(4);
        let mut barrier = Barrier::new(None);

        for i in 0..3 {
            let tx = queue.sender().unwrap();
            barrier
                .spawn_producer(i, async move {
                    tx.push(i).await.unwrap();
                    i
                })
                .unwrap();
        }
        let rx = queue.receiver();
        barrier
            .spawn_consumer(0, async move {
                let mut n = 0;
                while rx.pop().await.is_some() {
                    n += 1;
                }
                n
            })
            .unwrap();

        let producers = barrier.close_after_producers(&mut queue).await.unwrap();
        assert_eq!(producers.completed.len(), 3);
        assert!(!producers.deadline_exceeded);
        assert_eq!(barrier.state(), BarrierState::Draining);
        assert!(queue.is_closed());

        assert!(barrier.spawn_producer(9, async { 9 }).is_err());

        let consumers = barrier.await_consumers().await.unwrap();
        assert_eq!(consumers.completed, vec![3]);
        assert_eq!(barrier.state(), BarrierState::Done);

        assert!(barrier.close_after_producers(&mut queue).await.is_err());
    }

    #[tokio::test]
    async fn test_deadline_aborts_slow_producers() {
        let mut queue = HandoffQueue::<usize>::bounded(1);
        let mut barrier = Barrier::new(Some(Instant::now() + Duration::from_millis(50)));

        barrier.spawn_producer(0, async { 0 }).unwrap();
        let tx = queue.sender().unwrap();
        barrier
            .spawn_producer(1, async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                drop(tx);
                1
            })
            .unwrap();

        let join = barrier.close_after_producers(&mut queue).await.unwrap();
        assert!(join.deadline_exceeded);
        assert_eq!(join.completed, vec![0]);
        assert_eq!(join.aborted, vec![1]);
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn test_panicking_producer_is_reported() {
        let mut queue = HandoffQueue::<usize>::bounded(1);
        let mut barrier = Barrier::new(None);
        barrier
            .spawn_producer(4, async {
                let fail = true;
                if fail {
                    panic!("source exploded");
                }
                4
            })
            .unwrap();

        let join = barrier.close_after_producers(&mut queue).await.unwrap();
        assert!(join.completed.is_empty());
        assert_eq!(join.panicked.len(), 1);
        assert_eq!(join.panicked[0].0, 4);
    }
}
