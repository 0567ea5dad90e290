use crate::adapters::{html, json};
use crate::config::ExtractionConfig;
use crate::orchestrator::{TierContext, TierError, TierFetcher};
use crate::Record;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

/// Fetches one URL with the tier's browser session and extracts records
#[derive(Debug, Clone)]
pub struct HttpTier {
    url: String,
    extraction: ExtractionConfig,
}

impl HttpTier {
    pub fn new(url: impl Into<String>, extraction: ExtractionConfig) -> Self {
        Self {
            url: url.into(),
            extraction,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TierFetcher for HttpTier {
    async fn fetch(&self, ctx: &TierContext) -> Result<Vec<Record>, TierError> {
        tracing::debug!(
            "[{}] GET {} as {}",
            ctx.source_id,
            self.url,
            ctx.session.family()
        );

        let response = ctx.session.client().get(&self.url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(TierError::Status {
                code: status.as_u16(),
                retry_after: parse_retry_after(response.headers()),
            });
        }

        let body = response.text().await?;

        match &self.extraction {
            ExtractionConfig::Html { selector, fields } => html::extract(&body, selector, fields),
            ExtractionConfig::Json { pointer } => json::extract(&body, pointer),
        }
    }
}

/// Reads `Retry-After` as delta-seconds or an HTTP date
///
/// A date in the past yields zero.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?;
    Some(
        (at.with_timezone(&Utc) - Utc::now())
            .to_std()
            .unwrap_or_default(),
    )
}
