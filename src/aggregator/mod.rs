//! Concurrent fan-out/fan-in deduplicating aggregator
//!
//! One call to [`Aggregator::aggregate`] runs P producer tasks, each fetching
//! a single batch from the [`RecordSource`] and forwarding its records onto a
//! bounded [`HandoffQueue`], while C consumer tasks drain the queue and merge
//! records into a [`ResultSet`] keyed by [`DedupKey`](crate::model::DedupKey).
//! The [`CompletionBarrier`] decides when the result is final: producers are
//! joined and the queue closed first, then consumers are joined.
//!
//! Producer failures never fail the call. They shrink the result and are
//! listed in the [`AggregationReport`].

pub mod barrier;
pub mod consumer;
pub mod producer;
pub mod queue;
pub mod report;
pub mod result_set;

pub use barrier::{BarrierError, BarrierState, CompletionBarrier};
pub use consumer::{ConsumerOutcome, ConsumerSink};
pub use producer::{ProducerOutcome, ProducerProgress};
pub use queue::{HandoffQueue, QueueClosed, QueueReceiver, QueueSender, MAX_QUEUE_CAPACITY};
pub use report::{AggregationReport, ProducerFailure};
pub use result_set::ResultSet;

use crate::config::AggregationConfig;
use crate::error::{ErrorCode, Result, RosterError};
use crate::model::DedupRecord;
use crate::source::RecordSource;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Output type produced for a given source
pub type OutputOf<S> = <<S as RecordSource>::Record as DedupRecord>::Output;

const MAX_PREALLOCATED_RESULTS: usize = 1 << 16;

/// How consumers share the result set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Every consumer inserts into one result set under a single mutex
    #[default]
    SharedLock,
    /// Each consumer fills a private set; the sets are merged once at the end
    PerConsumer,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeStrategy::SharedLock => f.write_str("shared_lock"),
            MergeStrategy::PerConsumer => f.write_str("per_consumer"),
        }
    }
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "shared_lock" | "shared-lock" => Ok(MergeStrategy::SharedLock),
            "per_consumer" | "per-consumer" => Ok(MergeStrategy::PerConsumer),
            other => Err(format!(
                "unknown merge strategy '{}' (expected shared_lock or per_consumer)",
                other
            )),
        }
    }
}

/// Shape of one aggregation call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationRequest {
    pub producers: usize,
    pub batch_size: usize,
    /// Defaults to the configured consumer count, or one per producer
    #[serde(default)]
    pub consumers: Option<usize>,
}

impl AggregationRequest {
    pub fn new(producers: usize, batch_size: usize) -> Self {
        Self {
            producers,
            batch_size,
            consumers: None,
        }
    }

    pub fn with_consumers(mut self, consumers: usize) -> Self {
        self.consumers = Some(consumers);
        self
    }
}

/// Deduplicated records together with the run's report
#[derive(Debug, Clone, Serialize)]
pub struct Aggregation<O> {
    pub records: Vec<O>,
    pub report: AggregationReport,
}

/// Validated parameters for one run
#[derive(Debug, Clone, Copy)]
struct Plan {
    producers: usize,
    consumers: usize,
    batch_size: usize,
    queue_capacity: usize,
    strategy: MergeStrategy,
}

/// Fan-out/fan-in aggregator over a record source
pub struct Aggregator<S: RecordSource> {
    source: Arc<S>,
    config: AggregationConfig,
}

impl<S: RecordSource> Aggregator<S> {
    pub fn new(source: S, config: AggregationConfig) -> Self {
        Self::with_shared_source(Arc::new(source), config)
    }

    pub fn with_shared_source(source: Arc<S>, config: AggregationConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Request built from the configured defaults
    pub fn default_request(&self) -> AggregationRequest {
        AggregationRequest {
            producers: self.config.producers,
            batch_size: self.config.batch_size,
            consumers: self.config.consumers,
        }
    }

    /// Fetch `producer_count` batches of `batch_size` records and deduplicate them
    ///
    /// Only invalid arguments produce an error. A failed producer contributes
    /// only the records it forwarded before failing, which is none unless it
    /// was aborted at the deadline mid-batch.
    pub async fn aggregate(
        &self,
        producer_count: usize,
        batch_size: usize,
    ) -> Result<Vec<OutputOf<S>>> {
        let aggregation = self
            .aggregate_with_report(AggregationRequest::new(producer_count, batch_size))
            .await?;
        Ok(aggregation.records)
    }

    /// Like [`aggregate`](Self::aggregate), also returning the run report
    pub async fn aggregate_with_report(
        &self,
        request: AggregationRequest,
    ) -> Result<Aggregation<OutputOf<S>>> {
        let plan = self.plan(request)?;
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = std::time::Instant::now();
        let deadline = self
            .config
            .deadline
            .map(|d| tokio::time::Instant::now() + d);

        info!(
            "Aggregation {} started: {} producers x {} records, {} consumers ({})",
            run_id, plan.producers, plan.batch_size, plan.consumers, plan.strategy
        );

        let mut queue = HandoffQueue::bounded(plan.queue_capacity);
        let shared = match plan.strategy {
            MergeStrategy::SharedLock => Some(Arc::new(Mutex::new(ResultSet::with_capacity(
                queue.capacity().min(MAX_PREALLOCATED_RESULTS),
            )))),
            MergeStrategy::PerConsumer => None,
        };
        let progress: Vec<Arc<ProducerProgress>> = (0..plan.producers)
            .map(|_| Arc::new(ProducerProgress::default()))
            .collect();
        let mut barrier: CompletionBarrier<ProducerOutcome, ConsumerOutcome<OutputOf<S>>> =
            CompletionBarrier::new(deadline);

        for producer_id in 0..plan.producers {
            let sender = queue.sender().ok_or_else(|| {
                barrier_violation("hand-off queue closed before producers started")
            })?;
            barrier
                .spawn_producer(
                    producer_id,
                    producer::run_producer(
                        producer_id,
                        self.source.clone(),
                        plan.batch_size,
                        sender,
                        progress[producer_id].clone(),
                    ),
                )
                .map_err(|e| barrier_violation(e.to_string()))?;
        }

        for consumer_id in 0..plan.consumers {
            let sink = match &shared {
                Some(set) => ConsumerSink::Shared(set.clone()),
                None => ConsumerSink::Private(ResultSet::new()),
            };
            barrier
                .spawn_consumer(
                    consumer_id,
                    consumer::run_consumer::<S::Record>(
                        consumer_id,
                        queue.receiver(),
                        sink,
                        deadline,
                    ),
                )
                .map_err(|e| barrier_violation(e.to_string()))?;
        }

        let producers = barrier
            .close_after_producers(&mut queue)
            .await
            .map_err(|e| barrier_violation(e.to_string()))?;
        let mut consumers = barrier
            .await_consumers()
            .await
            .map_err(|e| barrier_violation(e.to_string()))?;
        let abandoned = queue.drain_remaining().await;

        let received = consumers.completed.iter().map(|c| c.received).sum();
        let mut duplicates: usize = consumers.completed.iter().map(|c| c.duplicates).sum();
        let stopped_early = consumers.completed.iter().any(|c| c.stopped_early);

        let results = match shared {
            Some(shared) => {
                drop(consumers);
                match Arc::try_unwrap(shared) {
                    Ok(set) => set.into_inner(),
                    Err(shared) => shared.lock().await.clone(),
                }
            }
            None => {
                let mut merged = ResultSet::new();
                for outcome in consumers.completed.iter_mut() {
                    if let Some(private) = outcome.private.take() {
                        duplicates += merged.merge(private);
                    }
                }
                merged
            }
        };

        let failure = |producer_id: usize, cause: String| ProducerFailure {
            producer_id,
            forwarded: progress.get(producer_id).map_or(0, |p| p.forwarded()),
            cause,
        };
        let mut failed_producers: Vec<ProducerFailure> = producers
            .completed
            .iter()
            .filter_map(|p| {
                p.error
                    .as_ref()
                    .map(|cause| failure(p.producer_id, cause.clone()))
            })
            .chain(
                producers
                    .aborted
                    .iter()
                    .map(|&producer_id| failure(producer_id, "deadline exceeded".to_string())),
            )
            .chain(
                producers
                    .panicked
                    .iter()
                    .map(|(producer_id, message)| {
                        failure(*producer_id, format!("panicked: {}", message))
                    }),
            )
            .collect();
        failed_producers.sort_by_key(|f| f.producer_id);

        let report = AggregationReport {
            run_id,
            source: self.source.name().to_string(),
            started_at,
            elapsed_ms: start.elapsed().as_millis() as u64,
            producers: plan.producers,
            consumers: plan.consumers,
            batch_size: plan.batch_size,
            queue_capacity: queue.capacity(),
            merge_strategy: plan.strategy,
            // Counted from live progress so aborted producers are included
            fetched: progress.iter().map(|p| p.fetched()).sum(),
            forwarded: progress.iter().map(|p| p.forwarded()).sum(),
            received,
            unique: results.len(),
            duplicates,
            abandoned,
            failed_producers,
            deadline_exceeded: producers.deadline_exceeded || stopped_early,
        };

        info!("Aggregation {} finished: {}", run_id, report.summary());

        Ok(Aggregation {
            records: results.into_records(),
            report,
        })
    }

    fn plan(&self, request: AggregationRequest) -> Result<Plan> {
        if request.producers == 0 {
            return Err(RosterError::invalid_argument(
                "producers",
                "must be at least 1",
            ));
        }
        if request.batch_size == 0 {
            return Err(RosterError::invalid_argument(
                "batch_size",
                "must be at least 1",
            ));
        }

        let consumers = request
            .consumers
            .unwrap_or_else(|| self.config.consumers_for(request.producers));
        if consumers == 0 {
            return Err(RosterError::invalid_argument(
                "consumers",
                "must be at least 1",
            ));
        }

        if request.producers > self.config.max_producers {
            return Err(RosterError::limit_exceeded(
                "producers",
                request.producers,
                self.config.max_producers,
            ));
        }
        if consumers > self.config.max_consumers {
            return Err(RosterError::limit_exceeded(
                "consumers",
                consumers,
                self.config.max_consumers,
            ));
        }
        if request.batch_size > self.config.max_batch_size {
            return Err(RosterError::limit_exceeded(
                "batch_size",
                request.batch_size,
                self.config.max_batch_size,
            ));
        }

        Ok(Plan {
            producers: request.producers,
            consumers,
            batch_size: request.batch_size,
            queue_capacity: self
                .config
                .queue_capacity_for(request.producers, request.batch_size),
            strategy: self.config.merge_strategy,
        })
    }
}

fn barrier_violation(message: impl Into<String>) -> RosterError {
    RosterError::aggregation_with_code(ErrorCode::AGGREGATION_BARRIER_VIOLATION, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserSummary;
    use crate::testing::fixtures::{unique_users, users};
    use crate::testing::mocks::ScriptedSource;
    use std::collections::HashSet;
    use std::time::Duration;

    fn uuids(records: &[UserSummary]) -> HashSet<String> {
        records.iter().map(|r| r.uuid.clone()).collect()
    }

    fn config(strategy: MergeStrategy) -> AggregationConfig {
        AggregationConfig {
            merge_strategy: strategy,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_duplicates_within_and_across_batches() {
        for strategy in [MergeStrategy::SharedLock, MergeStrategy::PerConsumer] {
            let source = ScriptedSource::builder()
                .always(users(&["a", "b", "a"]))
                .build();
            let aggregator = Aggregator::new(source, config(strategy));

            let records = aggregator.aggregate(3, 3).await.unwrap();
            assert_eq!(records.len(), 2, "strategy {}", strategy);
            assert_eq!(
                uuids(&records),
                HashSet::from(["a".to_string(), "b".to_string()])
            );
        }
    }

    #[tokio::test]
    async fn test_report_counts_are_consistent() {
        let source = ScriptedSource::builder()
            .always(users(&["a", "b", "a"]))
            .build();
        let aggregator = Aggregator::new(source, config(MergeStrategy::SharedLock));

        let aggregation = aggregator
            .aggregate_with_report(AggregationRequest::new(3, 3).with_consumers(2))
            .await
            .unwrap();
        let report = aggregation.report;

        assert_eq!(report.source, "scripted");
        assert_eq!(report.producers, 3);
        assert_eq!(report.consumers, 2);
        assert_eq!(report.queue_capacity, 9);
        assert_eq!(report.fetched, 9);
        assert_eq!(report.forwarded, 9);
        assert_eq!(report.received, 9);
        assert_eq!(report.unique, 2);
        assert_eq!(report.duplicates, 7);
        assert_eq!(report.abandoned, 0);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_all_producers_failing_is_not_an_error() {
        let source = ScriptedSource::builder().fail_always("connection refused").build();
        let aggregator = Aggregator::new(source, AggregationConfig::default());

        let aggregation = aggregator
            .aggregate_with_report(AggregationRequest::new(4, 10))
            .await
            .unwrap();
        assert!(aggregation.records.is_empty());
        assert_eq!(aggregation.report.failed_producers.len(), 4);
        assert_eq!(aggregation.report.succeeded_producers(), 0);
        assert!(aggregation.report.failed_producers[0]
            .cause
            .contains("connection refused"));
    }

    #[tokio::test]
    async fn test_per_consumer_merge_counts_cross_consumer_duplicates() {
        let source = ScriptedSource::builder()
            .generate(|_, batch_size| unique_users("shared", batch_size))
            .build();
        let aggregator = Aggregator::new(source, config(MergeStrategy::PerConsumer));

        let aggregation = aggregator
            .aggregate_with_report(AggregationRequest::new(4, 50).with_consumers(4))
            .await
            .unwrap();
        assert_eq!(aggregation.records.len(), 50);
        assert_eq!(aggregation.report.received, 200);
        assert_eq!(aggregation.report.duplicates, 150);
    }

    #[tokio::test]
    async fn test_small_queue_applies_backpressure_without_loss() {
        let source = ScriptedSource::builder()
            .generate(|call, batch_size| unique_users(&format!("call{}", call), batch_size))
            .build();
        let aggregator = Aggregator::new(
            source,
            AggregationConfig {
                queue_capacity: Some(2),
                ..Default::default()
            },
        );

        let records = aggregator.aggregate(5, 40).await.unwrap();
        assert_eq!(records.len(), 200);
    }

    #[tokio::test]
    async fn test_deadline_aborts_hanging_producers() {
        let source = ScriptedSource::builder()
            .generate(|call, batch_size| unique_users(&format!("call{}", call), batch_size))
            .hang_call(2)
            .build();
        let aggregator = Aggregator::new(
            source,
            AggregationConfig {
                deadline: Some(Duration::from_millis(200)),
                ..Default::default()
            },
        );

        let aggregation = aggregator
            .aggregate_with_report(AggregationRequest::new(3, 10))
            .await
            .unwrap();
        let report = aggregation.report;
        assert!(report.deadline_exceeded);
        assert_eq!(report.failed_producers.len(), 1);
        assert_eq!(report.failed_producers[0].cause, "deadline exceeded");
        assert_eq!(aggregation.records.len(), 20);
        assert!(report.elapsed_ms < 5_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deadline_mid_batch_keeps_counts_consistent() {
        let source = ScriptedSource::builder()
            .generate(|call, batch_size| unique_users(&format!("call{}", call), batch_size))
            .hang_call(0)
            .build();
        let aggregator = Aggregator::new(
            source,
            AggregationConfig {
                queue_capacity: Some(1),
                deadline: Some(Duration::from_millis(20)),
                ..Default::default()
            },
        );

        let aggregation = aggregator
            .aggregate_with_report(AggregationRequest::new(4, 5000).with_consumers(1))
            .await
            .unwrap();
        let report = aggregation.report;

        assert!(report.deadline_exceeded);
        assert_eq!(report.fetched, 3 * 5000);
        assert_eq!(report.forwarded, report.received + report.abandoned);
        assert_eq!(report.received, report.unique + report.duplicates);
        assert_eq!(aggregation.records.len(), report.unique);

        let failed_forwarded: usize = report.failed_producers.iter().map(|f| f.forwarded).sum();
        let completed = report.producers - report.failed_producers.len();
        assert_eq!(report.forwarded, failed_forwarded + completed * 5000);
    }

    #[tokio::test]
    async fn test_per_consumer_strategy_reports_queue_capacity() {
        let source = ScriptedSource::builder()
            .always(users(&["a", "b"]))
            .build();
        let aggregator = Aggregator::new(
            source,
            AggregationConfig {
                merge_strategy: MergeStrategy::PerConsumer,
                queue_capacity: Some(usize::MAX),
                ..Default::default()
            },
        );

        let aggregation = aggregator
            .aggregate_with_report(AggregationRequest::new(2, 2))
            .await
            .unwrap();
        assert_eq!(aggregation.records.len(), 2);
        assert_eq!(aggregation.report.queue_capacity, MAX_QUEUE_CAPACITY);
    }

    #[tokio::test]
    async fn test_invalid_requests_rejected() {
        let aggregator = Aggregator::new(
            ScriptedSource::builder().build(),
            AggregationConfig {
                max_producers: 4,
                max_batch_size: 100,
                ..Default::default()
            },
        );

        let err = aggregator.aggregate(0, 10).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AGGREGATION_INVALID_ARGUMENT);

        let err = aggregator.aggregate(2, 0).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AGGREGATION_INVALID_ARGUMENT);

        let err = aggregator.aggregate(5, 10).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AGGREGATION_LIMIT_EXCEEDED);

        let err = aggregator.aggregate(2, 101).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AGGREGATION_LIMIT_EXCEEDED);

        let err = aggregator
            .aggregate_with_report(AggregationRequest::new(2, 10).with_consumers(0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AGGREGATION_INVALID_ARGUMENT);
    }

    #[test]
    fn test_merge_strategy_parsing() {
        assert_eq!(
            "per-consumer".parse::<MergeStrategy>().unwrap(),
            MergeStrategy::PerConsumer
        );
        assert_eq!(
            "shared_lock".parse::<MergeStrategy>().unwrap(),
            MergeStrategy::SharedLock
        );
        assert!("round_robin".parse::<MergeStrategy>().is_err());
        assert_eq!(MergeStrategy::PerConsumer.to_string(), "per_consumer");
    }
}
