use super::cleaner::parse_compact_timestamp;
use super::http_client::HttpClient;
use super::{ALPHA_VANTAGE, NewsSource};
use crate::error::ProviderError;
use crate::models::{RawArticle, Ticker};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::sync::Arc;

const FEED_LIMIT: &str = "50";

/// Alpha Vantage `NEWS_SENTIMENT` feed. Only title/summary/time are used;
/// the provider's own sentiment fields are ignored.
pub struct AlphaVantageSource {
    client: Arc<HttpClient>,
    base_url: String,
    api_key: String,
}

impl AlphaVantageSource {
    pub fn new(client: Arc<HttpClient>, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NewsSentimentResponse {
    feed: Option<Vec<FeedItem>>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    url: Option<String>,
    source: Option<String>,
    time_published: Option<String>,
}

impl From<FeedItem> for RawArticle {
    fn from(item: FeedItem) -> Self {
        RawArticle {
            published_at: item.time_published.as_deref().and_then(parse_compact_timestamp),
            title: Some(item.title),
            body: Some(item.summary),
            url: item.url,
            publisher: item.source,
        }
    }
}

#[async_trait]
impl NewsSource for AlphaVantageSource {
    fn id(&self) -> &'static str {
        ALPHA_VANTAGE
    }

    async fn fetch(
        &self,
        ticker: &Ticker,
        since: NaiveDateTime,
        until: NaiveDateTime,
    ) -> Result<Vec<RawArticle>, ProviderError> {
        let url = format!("{}/query", self.base_url);
        let time_from = since.format("%Y%m%dT%H%M").to_string();
        let time_to = until.format("%Y%m%dT%H%M").to_string();

        let resp: NewsSentimentResponse = self
            .client
            .get_json(
                ALPHA_VANTAGE,
                &url,
                &[
                    ("function", "NEWS_SENTIMENT"),
                    ("tickers", ticker.as_str()),
                    ("time_from", time_from.as_str()),
                    ("time_to", time_to.as_str()),
                    ("limit", FEED_LIMIT),
                    ("apikey", self.api_key.as_str()),
                ],
            )
            .await?;

        // Throttling is reported in-band with HTTP 200.
        if resp.note.is_some() || resp.information.is_some() {
            return Err(ProviderError::RateLimited {
                provider: ALPHA_VANTAGE,
            });
        }
        if let Some(msg) = resp.error_message {
            return Err(ProviderError::Malformed {
                provider: ALPHA_VANTAGE,
                detail: msg,
            });
        }

        let feed = resp.feed.ok_or_else(|| ProviderError::Malformed {
            provider: ALPHA_VANTAGE,
            detail: "missing `feed`".to_string(),
        })?;

        Ok(feed.into_iter().map(RawArticle::from).collect())
    }
}
