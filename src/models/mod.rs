use crate::error::ConfigError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scores strictly above this are positive, strictly below its negation negative.
pub const LABEL_THRESHOLD: f64 = 0.15;

// ── Ticker ────────────────────────────────────────────────────────────────────

/// Validated, uppercase stock symbol: 1–5 letters, optional `.X` share class.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let symbol = raw.trim().to_uppercase();
        let (base, class) = match symbol.split_once('.') {
            Some((base, class)) => (base, Some(class)),
            None => (symbol.as_str(), None),
        };
        let letters = |s: &str, max: usize| {
            !s.is_empty() && s.len() <= max && s.chars().all(|c| c.is_ascii_uppercase())
        };
        if letters(base, 5) && class.is_none_or(|c| letters(c, 1)) {
            Ok(Self(symbol))
        } else {
            Err(ConfigError::InvalidTicker(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Ticker {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ticker::parse(&value)
    }
}

impl From<Ticker> for String {
    fn from(t: Ticker) -> Self {
        t.0
    }
}

// ── Sentiment ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    /// `> 0.15` positive, `< -0.15` negative, everything else (bounds included) neutral.
    pub fn from_score(score: f64) -> Self {
        if score > LABEL_THRESHOLD {
            Self::Positive
        } else if score < -LABEL_THRESHOLD {
            Self::Negative
        } else {
            Self::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The sentiment tier that produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMethod {
    Finbert,
    Vader,
    Keyword,
}

impl AnalysisMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Finbert => "finbert",
            Self::Vader => "vader",
            Self::Keyword => "keyword",
        }
    }
}

impl fmt::Display for AnalysisMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "finbert" => Ok(Self::Finbert),
            "vader" => Ok(Self::Vader),
            "keyword" => Ok(Self::Keyword),
            other => anyhow::bail!("unknown analysis method {:?}", other),
        }
    }
}

/// A score on the common [-1, 1] scale plus the label derived from it.
///
/// Only constructible from a score, so the label can never drift from the
/// threshold rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sentiment {
    score: f64,
    label: SentimentLabel,
    method: AnalysisMethod,
}

impl Sentiment {
    pub fn new(score: f64, method: AnalysisMethod) -> Self {
        let score = if score.is_nan() { 0.0 } else { score.clamp(-1.0, 1.0) };
        Self {
            score,
            label: SentimentLabel::from_score(score),
            method,
        }
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn label(&self) -> SentimentLabel {
        self.label
    }

    pub fn method(&self) -> AnalysisMethod {
        self.method
    }
}

// ── Articles ──────────────────────────────────────────────────────────────────

/// One provider record after adapter-level parsing, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawArticle {
    pub title: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
    /// Publisher name as reported by the provider (informational).
    pub publisher: Option<String>,
    pub published_at: Option<NaiveDateTime>,
}

/// A normalized, fingerprinted news item. Timestamps are UTC.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Article {
    pub fingerprint: String,
    pub ticker: Ticker,
    pub title: String,
    pub body: String,
    pub url: Option<String>,
    /// Provider that fetched it.
    pub source: String,
    /// Outlet that published it, when the provider says.
    pub publisher: Option<String>,
    pub published_at: NaiveDateTime,
    pub fetched_at: NaiveDateTime,
    pub sentiment: Option<Sentiment>,
}

impl Article {
    /// Text handed to the sentiment engine.
    pub fn analysis_text(&self) -> String {
        if self.body.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.body)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Duplicate,
}

/// Summary of one collection cycle (or one ticker within it).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    pub tickers_processed: usize,
    pub articles_fetched: usize,
    pub articles_added: usize,
    pub duplicates_skipped: usize,
    pub articles_scored: usize,
    pub errors: usize,
}

impl CycleStats {
    pub fn absorb(&mut self, other: &CycleStats) {
        self.tickers_processed += other.tickers_processed;
        self.articles_fetched += other.articles_fetched;
        self.articles_added += other.articles_added;
        self.duplicates_skipped += other.duplicates_skipped;
        self.articles_scored += other.articles_scored;
        self.errors += other.errors;
    }
}

// ── Reports ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SentimentDistribution {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub ticker: Ticker,
    pub period_days: u32,
    pub total_news: usize,
    pub scored_news: usize,
    pub sentiment_distribution: SentimentDistribution,
    pub average_sentiment_score: f64,
    pub overall_sentiment: SentimentLabel,
    pub recent_headlines: Vec<String>,
}
