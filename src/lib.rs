//! # Roster
//!
//! Concurrent fan-out/fan-in aggregation of user records.
//!
//! A fixed number of producer tasks each fetch one batch from a record source
//! and hand the records to a pool of consumer tasks over a bounded queue. The
//! consumers deduplicate by key into a single result set, and a two-phase
//! completion barrier decides when that set is final.
//!
//! ## Usage
//!
//! ```bash
//! roster serve [--port 3000] [--producers 5] [--batch-size 5000]
//! roster fetch [--report]
//! roster config
//! ```
//!
//! ## Modules
//!
//! - `aggregator` - Producers, consumers, hand-off queue, result set and completion barrier
//! - `app` - Logging setup, service initialization and fatal error handling for the binary
//! - `config` - Service configuration loaded from TOML and environment variables
//! - `error` - Error types with numeric codes
//! - `model` - Record, key and projection types
//! - `server` - HTTP endpoints over the aggregator
//! - `source` - Record source abstraction and the random-user API client
//! - `testing` - Fixtures and a scripted record source for tests and benchmarks
pub mod aggregator;
pub mod app;
pub mod config;
pub mod error;
pub mod model;
pub mod server;
pub mod source;

pub mod testing;

pub use aggregator::{Aggregation, AggregationReport, AggregationRequest, Aggregator, MergeStrategy};
pub use error::{ErrorCode, Result, RosterError};
