use crate::config::ProviderConfig;
use crate::error::ProviderError;
use anyhow::{Context, Result};
use rand::Rng;
use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Shared HTTP client: one attempt per call, bounded by the configured timeout.
pub struct HttpClient {
    inner: reqwest::Client,
    request_delay_ms: u64,
    jitter_ms: u64,
}

impl HttpClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            request_delay_ms: config.request_delay_ms,
            jitter_ms: config.jitter_ms,
        })
    }

    /// GET `url` with query parameters and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        provider: &'static str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        self.polite_delay().await;
        debug!("{}: GET {}", provider, url);
        self.send_json(provider, self.inner.get(url).query(query)).await
    }

    /// POST a JSON body with a bearer token and decode the JSON response.
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        provider: &'static str,
        url: &str,
        bearer: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        debug!("{}: POST {}", provider, url);
        self.send_json(provider, self.inner.post(url).bearer_auth(bearer).json(body))
            .await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        provider: &'static str,
        request: RequestBuilder,
    ) -> Result<T, ProviderError> {
        let resp = request
            .send()
            .await
            .map_err(|source| ProviderError::Network { provider, source })?;

        match resp.status() {
            s if s.is_success() => {}
            StatusCode::TOO_MANY_REQUESTS => return Err(ProviderError::RateLimited { provider }),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ProviderError::Unauthorized { provider });
            }
            s => {
                return Err(ProviderError::Http {
                    provider,
                    status: s.as_u16(),
                });
            }
        }

        let text = resp
            .text()
            .await
            .map_err(|source| ProviderError::Network { provider, source })?;

        serde_json::from_str(&text).map_err(|e| ProviderError::Malformed {
            provider,
            detail: e.to_string(),
        })
    }

    /// Sleep for the configured delay + random jitter.
    async fn polite_delay(&self) {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=self.jitter_ms)
        };
        let total = Duration::from_millis(self.request_delay_ms + jitter);
        if !total.is_zero() {
            sleep(total).await;
        }
    }
}
