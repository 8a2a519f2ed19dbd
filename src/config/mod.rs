//! Service configuration
//!
//! Configuration is assembled in layers: built-in defaults, an optional TOML
//! file, `ROSTER_*` environment variables, and finally command-line flags.
//! [`ServiceConfig::validate`] runs once all layers are applied.

pub mod loader;

pub use loader::{apply_env_overrides, apply_env_overrides_with, load_config};

use crate::aggregator::{MergeStrategy, MAX_QUEUE_CAPACITY};
use crate::error::{ErrorCode, Result, RosterError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_PRODUCERS: usize = 5;
pub const DEFAULT_BATCH_SIZE: usize = 5000;
pub const DEFAULT_SOURCE_URL: &str = "https://randomuser.me/api/";

/// Complete configuration for the service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub aggregation: AggregationConfig,
    pub source: SourceConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Fan-out/fan-in tuning and per-request limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Producers per request when the caller does not choose
    pub producers: usize,

    /// Consumers per request; defaults to the producer count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumers: Option<usize>,

    /// Records requested by each producer when the caller does not choose
    pub batch_size: usize,

    /// Hand-off queue capacity; defaults to producers x batch size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,

    /// Upper bound on the wall-clock time of one aggregation
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub deadline: Option<Duration>,

    pub merge_strategy: MergeStrategy,

    pub max_producers: usize,
    pub max_consumers: usize,
    pub max_batch_size: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            producers: DEFAULT_PRODUCERS,
            consumers: None,
            batch_size: DEFAULT_BATCH_SIZE,
            queue_capacity: None,
            deadline: None,
            merge_strategy: MergeStrategy::default(),
            max_producers: 64,
            max_consumers: 64,
            max_batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl AggregationConfig {
    /// Consumers to run alongside `producers`
    pub fn consumers_for(&self, producers: usize) -> usize {
        self.consumers.unwrap_or(producers)
    }

    /// Queue capacity for one request, within `1..=MAX_QUEUE_CAPACITY`
    pub fn queue_capacity_for(&self, producers: usize, batch_size: usize) -> usize {
        self.queue_capacity
            .unwrap_or_else(|| producers.saturating_mul(batch_size))
            .clamp(1, MAX_QUEUE_CAPACITY)
    }

    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("aggregation.producers", self.producers),
            ("aggregation.batch_size", self.batch_size),
            ("aggregation.max_producers", self.max_producers),
            ("aggregation.max_consumers", self.max_consumers),
            ("aggregation.max_batch_size", self.max_batch_size),
        ] {
            if value == 0 {
                return Err(invalid_value(field, "must be greater than 0"));
            }
        }

        if self.consumers == Some(0) {
            return Err(invalid_value(
                "aggregation.consumers",
                "must be greater than 0",
            ));
        }

        if self.queue_capacity == Some(0) {
            return Err(invalid_value(
                "aggregation.queue_capacity",
                "must be greater than 0",
            ));
        }

        if let Some(capacity) = self.queue_capacity.filter(|&c| c > MAX_QUEUE_CAPACITY) {
            return Err(invalid_value(
                "aggregation.queue_capacity",
                format!("{} exceeds the maximum of {}", capacity, MAX_QUEUE_CAPACITY),
            ));
        }

        if self.deadline == Some(Duration::ZERO) {
            return Err(invalid_value(
                "aggregation.deadline",
                "must be a positive duration",
            ));
        }

        if self.producers > self.max_producers {
            return Err(invalid_value(
                "aggregation.producers",
                format!("{} exceeds max_producers ({})", self.producers, self.max_producers),
            ));
        }

        if self.consumers_for(self.producers) > self.max_consumers {
            return Err(invalid_value(
                "aggregation.consumers",
                format!(
                    "{} exceeds max_consumers ({})",
                    self.consumers_for(self.producers),
                    self.max_consumers
                ),
            ));
        }

        if self.batch_size > self.max_batch_size {
            return Err(invalid_value(
                "aggregation.batch_size",
                format!(
                    "{} exceeds max_batch_size ({})",
                    self.batch_size, self.max_batch_size
                ),
            ));
        }

        Ok(())
    }
}

/// Upstream record source settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,

    /// Optional `gender` filter passed to the upstream API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,

    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SOURCE_URL.to_string(),
            gender: Some("female".to_string()),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl SourceConfig {
    fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.base_url).map_err(|e| {
            invalid_value("source.base_url", format!("'{}': {}", self.base_url, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid_value(
                "source.base_url",
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(invalid_value(
                "source.request_timeout",
                "must be a positive duration",
            ));
        }

        Ok(())
    }
}

impl ServiceConfig {
    /// Check every section, reporting the first invalid field
    pub fn validate(&self) -> Result<()> {
        self.aggregation.validate()?;
        self.source.validate()?;
        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            RosterError::config_with_code(ErrorCode::CONFIG_GENERIC, "failed to render config")
                .with_source(e)
        })
    }
}

fn invalid_value(field: &str, reason: impl std::fmt::Display) -> RosterError {
    RosterError::config_with_code(
        ErrorCode::CONFIG_INVALID_VALUE,
        format!("{} {}", field, reason),
    )
}
