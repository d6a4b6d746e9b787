use crate::error::ConfigError;
use crate::models::Ticker;
use crate::providers::{ALPHA_VANTAGE, FINNHUB};
use crate::sentiment::{AnalysisMode, HUGGINGFACE};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub stocks: Vec<String>,
    /// Keyed by provider id: `alpha_vantage`, `finnhub`, `huggingface`.
    pub api_keys: HashMap<String, String>,
    pub schedule: ScheduleConfig,
    pub analysis: AnalysisConfig,
    pub providers: ProviderConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    /// Local wall-clock time (`HH:MM`) anchoring the first tick.
    #[serde(default)]
    pub start_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_true")]
    pub use_specialized_model: bool,

    #[serde(default = "default_model_cache_dir")]
    pub model_cache_dir: PathBuf,

    #[serde(default = "default_max_news_per_stock")]
    pub max_news_per_stock: usize,

    #[serde(default)]
    pub mode: AnalysisMode,
}

/// Endpoints and politeness settings shared by every HTTP call.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default = "default_alpha_vantage_url")]
    pub alpha_vantage_url: String,

    #[serde(default = "default_finnhub_url")]
    pub finnhub_url: String,

    #[serde(default = "default_inference_url")]
    pub inference_url: String,

    #[serde(default = "default_hub_url")]
    pub hub_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_stocks() -> Vec<String> {
    ["AAPL", "GOOGL", "MSFT", "TSLA"].map(String::from).to_vec()
}
fn default_interval_hours() -> u64 {
    4
}
fn default_model_cache_dir() -> PathBuf {
    PathBuf::from("models")
}
fn default_max_news_per_stock() -> usize {
    50
}
fn default_alpha_vantage_url() -> String {
    "https://www.alphavantage.co".to_string()
}
fn default_finnhub_url() -> String {
    "https://finnhub.io".to_string()
}
fn default_inference_url() -> String {
    "https://api-inference.huggingface.co".to_string()
}
fn default_hub_url() -> String {
    "https://huggingface.co".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_request_delay_ms() -> u64 {
    1000
}
fn default_jitter_ms() -> u64 {
    250
}
fn default_user_agent() -> String {
    "stock-news-analyzer/0.1 (news sentiment research)".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/stock_news.duckdb")
}
fn default_true() -> bool {
    true
}
fn default_concurrency() -> usize {
    2
}
fn default_lookback_days() -> u32 {
    7
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides.
    ///
    /// Layers, later wins: `config/default.toml`, `config/local.toml`,
    /// `explicit` (required when given), `STOCK_NEWS__*` env vars.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut builder = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            );

        if let Some(path) = explicit {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let cfg = builder
            .add_source(config::Environment::with_prefix("STOCK_NEWS").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize()?;
        app_cfg.validate()?;
        Ok(app_cfg)
    }

    /// Reject anything that would only fail later, mid-cycle. Provider keys
    /// are checked by [`AppConfig::require_news_key`] when collecting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tickers()?;

        self.schedule.interval()?;
        self.schedule.start_time()?;

        if self.analysis.max_news_per_stock == 0 {
            return Err(ConfigError::Invalid("analysis.max_news_per_stock must be positive".into()));
        }
        if self.pipeline.concurrency == 0 {
            return Err(ConfigError::Invalid("pipeline.concurrency must be positive".into()));
        }

        for (name, value) in [
            ("providers.alpha_vantage_url", &self.providers.alpha_vantage_url),
            ("providers.finnhub_url", &self.providers.finnhub_url),
            ("providers.inference_url", &self.providers.inference_url),
            ("providers.hub_url", &self.providers.hub_url),
        ] {
            Url::parse(value).map_err(|e| ConfigError::Invalid(format!("{name}: {e}")))?;
        }

        Ok(())
    }

    /// Configured stocks as validated, de-duplicated tickers (config order).
    pub fn tickers(&self) -> Result<Vec<Ticker>, ConfigError> {
        let mut out: Vec<Ticker> = Vec::with_capacity(self.stocks.len());
        for raw in &self.stocks {
            let ticker = Ticker::parse(raw)?;
            if !out.contains(&ticker) {
                out.push(ticker);
            }
        }
        Ok(out)
    }

    /// Collection needs at least one news provider key.
    pub fn require_news_key(&self) -> Result<(), ConfigError> {
        if self.api_key(ALPHA_VANTAGE).is_none() && self.api_key(FINNHUB).is_none() {
            return Err(ConfigError::MissingApiKey(format!("{ALPHA_VANTAGE}, {FINNHUB}")));
        }
        Ok(())
    }

    /// API key for `provider`, treating blanks and `YOUR_…` placeholders as unset.
    pub fn api_key(&self, provider: &str) -> Option<&str> {
        self.api_keys
            .get(provider)
            .map(|k| k.trim())
            .filter(|k| !k.is_empty() && !k.starts_with("YOUR_"))
    }

    pub fn finbert_key(&self) -> Option<&str> {
        self.api_key(HUGGINGFACE)
    }
}

/// Longest accepted collection interval (one year).
pub const MAX_INTERVAL_HOURS: u64 = 24 * 366;

impl ScheduleConfig {
    pub fn interval(&self) -> Result<Duration, ConfigError> {
        match self.interval_hours {
            0 => Err(ConfigError::InvalidSchedule("interval_hours must be at least 1".into())),
            h if h > MAX_INTERVAL_HOURS => Err(ConfigError::InvalidSchedule(format!(
                "interval_hours must be at most {MAX_INTERVAL_HOURS}, got {h}"
            ))),
            h => h
                .checked_mul(3600)
                .map(Duration::from_secs)
                .ok_or_else(|| ConfigError::InvalidSchedule(format!("interval_hours {h} is too large"))),
        }
    }

    pub fn start_time(&self) -> Result<Option<NaiveTime>, ConfigError> {
        self.start_time
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                NaiveTime::parse_from_str(s, "%H:%M")
                    .map_err(|_| ConfigError::InvalidSchedule(format!("start_time {s:?} is not HH:MM")))
            })
            .transpose()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            stocks: default_stocks(),
            api_keys: HashMap::new(),
            schedule: ScheduleConfig::default(),
            analysis: AnalysisConfig::default(),
            providers: ProviderConfig::default(),
            storage: StorageConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_interval_hours(),
            start_time: None,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            use_specialized_model: true,
            model_cache_dir: default_model_cache_dir(),
            max_news_per_stock: default_max_news_per_stock(),
            mode: AnalysisMode::default(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            alpha_vantage_url: default_alpha_vantage_url(),
            finnhub_url: default_finnhub_url(),
            inference_url: default_inference_url(),
            hub_url: default_hub_url(),
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            jitter_ms: default_jitter_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            run_migrations: true,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            lookback_days: default_lookback_days(),
        }
    }
}
