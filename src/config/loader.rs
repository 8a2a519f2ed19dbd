//! Loading configuration from files and the environment

use super::ServiceConfig;
use crate::aggregator::MergeStrategy;
use crate::error::{ErrorCode, Result, RosterError};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Load defaults, then the optional TOML file, then `ROSTER_*` variables
///
/// Validation is left to the caller so command-line overrides can be
/// applied first.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    let mut config = match path {
        Some(path) => load_file(path)?,
        None => ServiceConfig::default(),
    };

    apply_env_overrides(&mut config)?;
    Ok(config)
}

fn load_file(path: &Path) -> Result<ServiceConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        let code = if e.kind() == std::io::ErrorKind::NotFound {
            ErrorCode::CONFIG_NOT_FOUND
        } else {
            ErrorCode::CONFIG_GENERIC
        };
        RosterError::config_with_code(code, "failed to read configuration file")
            .with_path(path)
            .with_source(e)
    })?;

    let config: ServiceConfig = toml::from_str(&content).map_err(|e| {
        RosterError::config_with_code(ErrorCode::CONFIG_PARSE_ERROR, e.to_string())
            .with_path(path)
    })?;

    debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Apply `ROSTER_*` overrides from the process environment
pub fn apply_env_overrides(config: &mut ServiceConfig) -> Result<()> {
    apply_env_overrides_with(config, |key| std::env::var(key).ok())
}

/// Apply `ROSTER_*` overrides using a custom variable lookup
pub fn apply_env_overrides_with<F>(config: &mut ServiceConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(bind) = lookup("ROSTER_BIND") {
        config.server.bind = bind;
    }
    if let Some(port) = lookup("ROSTER_PORT") {
        config.server.port = parse_env("ROSTER_PORT", &port)?;
    }
    if let Some(producers) = lookup("ROSTER_PRODUCERS") {
        config.aggregation.producers = parse_env("ROSTER_PRODUCERS", &producers)?;
    }
    if let Some(consumers) = lookup("ROSTER_CONSUMERS") {
        config.aggregation.consumers = Some(parse_env("ROSTER_CONSUMERS", &consumers)?);
    }
    if let Some(batch_size) = lookup("ROSTER_BATCH_SIZE") {
        config.aggregation.batch_size = parse_env("ROSTER_BATCH_SIZE", &batch_size)?;
    }
    if let Some(capacity) = lookup("ROSTER_QUEUE_CAPACITY") {
        config.aggregation.queue_capacity = Some(parse_env("ROSTER_QUEUE_CAPACITY", &capacity)?);
    }
    if let Some(deadline) = lookup("ROSTER_DEADLINE") {
        let deadline = humantime::parse_duration(&deadline).map_err(|e| {
            RosterError::config_with_code(
                ErrorCode::CONFIG_INVALID_ENV,
                format!("ROSTER_DEADLINE='{}': {}", deadline, e),
            )
        })?;
        config.aggregation.deadline = Some(deadline);
    }
    if let Some(strategy) = lookup("ROSTER_MERGE_STRATEGY") {
        config.aggregation.merge_strategy =
            parse_env::<MergeStrategy>("ROSTER_MERGE_STRATEGY", &strategy)?;
    }
    if let Some(url) = lookup("ROSTER_SOURCE_URL") {
        config.source.base_url = url;
    }
    if let Some(gender) = lookup("ROSTER_GENDER") {
        config.source.gender = if gender.is_empty() { None } else { Some(gender) };
    }

    Ok(())
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| {
        RosterError::config_with_code(
            ErrorCode::CONFIG_INVALID_ENV,
            format!("{}='{}': {}", key, value, e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 8080

[aggregation]
producers = 3
deadline = "45s"
merge_strategy = "per_consumer"
"#
        )
        .unwrap();

        let config = load_file(file.path()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.aggregation.producers, 3);
        assert_eq!(config.aggregation.batch_size, 5000);
        assert_eq!(config.aggregation.deadline, Some(Duration::from_secs(45)));
        assert_eq!(config.aggregation.merge_strategy, MergeStrategy::PerConsumer);
    }

    #[test]
    fn test_missing_file_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_file(&dir.path().join("absent.toml")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_NOT_FOUND);
    }

    #[test]
    fn test_malformed_file_reports_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[aggregation]\nproducers = \"many\"").unwrap();
        let err = load_file(file.path()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_PARSE_ERROR);
        assert!(err.user_message().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServiceConfig::default();
        apply_env_overrides_with(
            &mut config,
            env(&[
                ("ROSTER_PORT", "9000"),
                ("ROSTER_PRODUCERS", "8"),
                ("ROSTER_CONSUMERS", "2"),
                ("ROSTER_BATCH_SIZE", "100"),
                ("ROSTER_DEADLINE", "2s 500ms"),
                ("ROSTER_MERGE_STRATEGY", "per_consumer"),
                ("ROSTER_GENDER", ""),
            ]),
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.aggregation.producers, 8);
        assert_eq!(config.aggregation.consumers, Some(2));
        assert_eq!(config.aggregation.batch_size, 100);
        assert_eq!(
            config.aggregation.deadline,
            Some(Duration::from_millis(2500))
        );
        assert_eq!(config.aggregation.merge_strategy, MergeStrategy::PerConsumer);
        assert_eq!(config.source.gender, None);
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = ServiceConfig::default();
        let err = apply_env_overrides_with(&mut config, env(&[("ROSTER_PRODUCERS", "five")]))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_INVALID_ENV);
        assert!(err.to_string().contains("ROSTER_PRODUCERS"));
    }

    #[test]
    fn test_no_env_leaves_config_untouched() {
        let mut config = ServiceConfig::default();
        apply_env_overrides_with(&mut config, |_| None).unwrap();
        assert_eq!(config, ServiceConfig::default());
    }
}
