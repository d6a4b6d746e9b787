use thiserror::Error;

/// Problems with the configuration, raised at load/collection-request time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid ticker symbol: {0:?}")]
    InvalidTicker(String),
    #[error("No news provider API key configured (expected one of: {0})")]
    MissingApiKey(String),
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),
    #[error("Invalid setting: {0}")]
    Invalid(String),
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// A single provider call failed. Never fatal: the collector treats it as
/// zero results from that provider for the current cycle.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider}: rate limited")]
    RateLimited { provider: &'static str },
    #[error("{provider}: unauthorized (check API key)")]
    Unauthorized { provider: &'static str },
    #[error("{provider}: HTTP {status}")]
    Http {
        provider: &'static str,
        status: u16,
    },
    #[error("{provider}: request failed: {source}")]
    Network {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider}: malformed response: {detail}")]
    Malformed {
        provider: &'static str,
        detail: String,
    },
}
