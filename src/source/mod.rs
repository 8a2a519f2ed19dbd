//! Record source abstraction
//!
//! The aggregator treats the upstream data source as an opaque `fetch`
//! operation. Implementations must be safe to call from many producer tasks
//! at once.

pub mod random_user;

pub use random_user::RandomUserSource;

use crate::model::DedupRecord;
use async_trait::async_trait;
use thiserror::Error;

/// Failure to obtain a batch from a record source
///
/// These are never fatal to an aggregation: the producer that hit one logs
/// it, reports it, and contributes zero records.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// A source of raw records fetched in batches
#[async_trait]
pub trait RecordSource: Send + Sync + 'static {
    type Record: DedupRecord;

    /// Fetch one batch of up to `batch_size` records
    async fn fetch(&self, batch_size: usize) -> Result<Vec<Self::Record>, SourceError>;

    /// Short name used in logs and reports
    fn name(&self) -> &str {
        "source"
    }
}
