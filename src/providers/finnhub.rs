use super::cleaner::parse_unix_seconds;
use super::http_client::HttpClient;
use super::{FINNHUB, NewsSource};
use crate::error::ProviderError;
use crate::models::{RawArticle, Ticker};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::sync::Arc;

/// Finnhub `company-news`. Date-granular, so the collector re-filters by `since`.
pub struct FinnhubSource {
    client: Arc<HttpClient>,
    base_url: String,
    api_key: String,
}

impl FinnhubSource {
    pub fn new(client: Arc<HttpClient>, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompanyNewsItem {
    #[serde(default)]
    headline: String,
    #[serde(default)]
    summary: String,
    url: Option<String>,
    source: Option<String>,
    #[serde(default)]
    datetime: i64,
}

impl From<CompanyNewsItem> for RawArticle {
    fn from(item: CompanyNewsItem) -> Self {
        RawArticle {
            title: Some(item.headline),
            body: Some(item.summary),
            url: item.url,
            publisher: item.source,
            published_at: parse_unix_seconds(item.datetime),
        }
    }
}

#[async_trait]
impl NewsSource for FinnhubSource {
    fn id(&self) -> &'static str {
        FINNHUB
    }

    async fn fetch(
        &self,
        ticker: &Ticker,
        since: NaiveDateTime,
        until: NaiveDateTime,
    ) -> Result<Vec<RawArticle>, ProviderError> {
        let url = format!("{}/api/v1/company-news", self.base_url);
        let from = since.date().format("%Y-%m-%d").to_string();
        let to = until.date().format("%Y-%m-%d").to_string();

        let items: Vec<CompanyNewsItem> = self
            .client
            .get_json(
                FINNHUB,
                &url,
                &[
                    ("symbol", ticker.as_str()),
                    ("from", from.as_str()),
                    ("to", to.as_str()),
                    ("token", self.api_key.as_str()),
                ],
            )
            .await?;

        Ok(items.into_iter().map(RawArticle::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use chrono::NaiveDate;
    use httpmock::{Method::GET, MockServer};

    fn source(server: &MockServer) -> FinnhubSource {
        let config = ProviderConfig {
            request_delay_ms: 0,
            jitter_ms: 0,
            timeout_secs: 5,
            ..Default::default()
        };
        let client = Arc::new(HttpClient::new(&config).unwrap());
        FinnhubSource::new(client, &server.base_url(), "tok")
    }

    fn since() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn until() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 16)
            .unwrap()
            .and_hms_opt(23, 30, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_parses_company_news() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1/company-news")
                .query_param("symbol", "TSLA")
                .query_param("from", "2024-03-10")
                .query_param("to", "2024-03-16")
                .query_param("token", "tok");
            then.status(200).header("content-type", "application/json").body(
                r#"[
                    {"category":"company","datetime":1710507600,"headline":"Tesla plunges",
                     "id":1,"related":"TSLA","source":"CNBC","summary":"Deliveries miss","url":"https://x/2"},
                    {"category":"company","datetime":0,"headline":"Tesla undated","id":2,"summary":""}
                ]"#,
            );
        });

        let t = Ticker::parse("TSLA").unwrap();
        let items = source(&server).fetch(&t, since(), until()).await.unwrap();
        mock.assert();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title.as_deref(), Some("Tesla plunges"));
        assert_eq!(items[0].body.as_deref(), Some("Deliveries miss"));
        assert!(items[0].published_at.is_some());
        assert_eq!(items[1].published_at, None);
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/company-news").query_param("symbol", "TSLA");
            then.status(429);
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/company-news").query_param("symbol", "AMD");
            then.status(401);
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/company-news").query_param("symbol", "NVDA");
            then.status(200).body(r#"{"error":"You don't have access to this resource."}"#);
        });

        let src = source(&server);
        assert!(matches!(fetch_err(&src, "TSLA").await, ProviderError::RateLimited { .. }));
        assert!(matches!(fetch_err(&src, "AMD").await, ProviderError::Unauthorized { .. }));
        assert!(matches!(fetch_err(&src, "NVDA").await, ProviderError::Malformed { .. }));
    }

    async fn fetch_err(src: &FinnhubSource, symbol: &str) -> ProviderError {
        let t = Ticker::parse(symbol).unwrap();
        src.fetch(&t, since(), until()).await.unwrap_err()
    }
}
