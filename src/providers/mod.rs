pub mod alpha_vantage;
pub mod cleaner;
pub mod finnhub;
pub mod http_client;

use crate::config::AppConfig;
use crate::error::ProviderError;
use crate::models::{RawArticle, Ticker};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::{debug, info, warn};

use self::alpha_vantage::AlphaVantageSource;
use self::finnhub::FinnhubSource;
use self::http_client::HttpClient;

pub const ALPHA_VANTAGE: &str = "alpha_vantage";
pub const FINNHUB: &str = "finnhub";

// ── Source trait ──────────────────────────────────────────────────────────────

/// One external news provider.
#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Stable provider id, stored as the article's `source`.
    fn id(&self) -> &'static str;

    /// Articles about `ticker` published in `since..=until` (best effort).
    /// `until` is the cycle's clock, so one cycle asks every source the same window.
    async fn fetch(
        &self,
        ticker: &Ticker,
        since: NaiveDateTime,
        until: NaiveDateTime,
    ) -> Result<Vec<RawArticle>, ProviderError>;
}

/// Build the configured sources in fixed order. Providers without an API key
/// are skipped; having none at all is an error.
pub fn build_sources(config: &AppConfig) -> Result<Vec<Arc<dyn NewsSource>>> {
    config.require_news_key()?;
    let client = Arc::new(HttpClient::new(&config.providers).context("Failed to build provider client")?);
    let mut sources: Vec<Arc<dyn NewsSource>> = Vec::new();

    if let Some(key) = config.api_key(ALPHA_VANTAGE) {
        sources.push(Arc::new(AlphaVantageSource::new(
            Arc::clone(&client),
            &config.providers.alpha_vantage_url,
            key,
        )));
    }
    if let Some(key) = config.api_key(FINNHUB) {
        sources.push(Arc::new(FinnhubSource::new(
            Arc::clone(&client),
            &config.providers.finnhub_url,
            key,
        )));
    }

    info!(
        "News sources: [{}]",
        sources.iter().map(|s| s.id()).collect::<Vec<_>>().join(", ")
    );
    Ok(sources)
}

/// Fetch from one source, degrading any failure to zero results.
pub async fn fetch_or_empty(
    source: &dyn NewsSource,
    ticker: &Ticker,
    since: NaiveDateTime,
    until: NaiveDateTime,
) -> Vec<RawArticle> {
    match source.fetch(ticker, since, until).await {
        Ok(items) => {
            debug!("{}: {} items from {}", ticker, items.len(), source.id());
            items
        }
        Err(e) => {
            warn!("{}: skipping {} this cycle: {}", ticker, source.id(), e);
            Vec::new()
        }
    }
}
