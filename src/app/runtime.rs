//! Service initialization
//!
//! Turns command-line settings into a validated [`ServiceConfig`] and an
//! [`Aggregator`] over the random-user API.

use crate::aggregator::Aggregator;
use crate::app::config::AppConfig;
use crate::config::{load_config, ServiceConfig};
use crate::error::Result;
use crate::source::RandomUserSource;
use tracing::debug;

/// Load the configuration file (if any) and apply environment overrides
///
/// The result is not validated; callers apply CLI overrides first and then
/// call [`ServiceConfig::validate`].
pub fn load_service_config(app: &AppConfig) -> Result<ServiceConfig> {
    let config = load_config(app.config_path.as_deref())?;
    debug!(
        "Loaded configuration{}",
        app.config_path
            .as_ref()
            .map(|p| format!(" from {}", p.display()))
            .unwrap_or_default()
    );
    Ok(config)
}

/// Build the aggregator over the configured random-user endpoint
pub fn build_aggregator(config: &ServiceConfig) -> Result<Aggregator<RandomUserSource>> {
    let source = RandomUserSource::new(&config.source)?;
    debug!("Record source: {}", config.source.base_url);
    Ok(Aggregator::new(source, config.aggregation.clone()))
}
