//! HTTP client for the random-user API

use super::{RecordSource, SourceError};
use crate::config::SourceConfig;
use crate::error::{ErrorCode, Result, RosterError};
use crate::model::User;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// Envelope returned by the API; only `results` is used
#[derive(Debug, Deserialize)]
struct UserPage {
    #[serde(default)]
    results: Vec<User>,
}

/// Record source backed by `GET <base_url>?results=<n>&gender=<g>`
#[derive(Debug, Clone)]
pub struct RandomUserSource {
    client: Client,
    base_url: url::Url,
    gender: Option<String>,
}

impl RandomUserSource {
    /// Build a source from configuration
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                RosterError::source_with_code(
                    ErrorCode::SOURCE_CLIENT_BUILD_FAILED,
                    "failed to create HTTP client",
                )
                .with_source(e)
            })?;

        let base_url = url::Url::parse(&config.base_url).map_err(|e| {
            RosterError::source_with_code(
                ErrorCode::SOURCE_INVALID_URL,
                format!("invalid base URL '{}'", config.base_url),
            )
            .with_source(e)
        })?;

        Ok(Self {
            client,
            base_url,
            gender: config.gender.clone(),
        })
    }

    /// URL requested for one batch
    pub fn batch_url(&self, batch_size: usize) -> url::Url {
        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("results", &batch_size.to_string());
            if let Some(gender) = &self.gender {
                query.append_pair("gender", gender);
            }
        }
        url
    }
}

#[async_trait]
impl RecordSource for RandomUserSource {
    type Record = User;

    async fn fetch(&self, batch_size: usize) -> std::result::Result<Vec<User>, SourceError> {
        let url = self.batch_url(batch_size);
        debug!("Fetching {} users from {}", batch_size, url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(SourceError::Status {
                status: status.as_u16(),
                body: truncate(&body, 256),
            });
        }

        let page: UserPage = serde_json::from_str(&body)?;
        Ok(page.results)
    }

    fn name(&self) -> &str {
        "randomuser"
    }
}

fn truncate(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(gender: Option<&str>) -> RandomUserSource {
        RandomUserSource::new(&SourceConfig {
            gender: gender.map(str::to_string),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_batch_url_with_gender() {
        let url = source(Some("female")).batch_url(5000);
        assert_eq!(
            url.as_str(),
            "https://randomuser.me/api/?results=5000&gender=female"
        );
    }

    #[test]
    fn test_batch_url_without_gender() {
        let url = source(None).batch_url(10);
        assert_eq!(url.as_str(), "https://randomuser.me/api/?results=10");
    }

    #[test]
    fn test_invalid_base_url() {
        let err = RandomUserSource::new(&SourceConfig {
            base_url: "::nope".to_string(),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SOURCE_INVALID_URL);
    }

    #[test]
    fn test_page_without_results_is_empty() {
        let page: UserPage = serde_json::from_str(r#"{"info": {"seed": "x"}}"#).unwrap();
        assert!(page.results.is_empty());
    }

    #[test]
    fn test_truncate_long_body() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
    }
}
