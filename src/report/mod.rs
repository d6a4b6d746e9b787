use crate::models::{Article, Report, SentimentDistribution, SentimentLabel, Ticker};
use crate::storage::Repository;
use crate::utils::days_before;
use anyhow::Result;
use chrono::{NaiveDateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Headlines included in a report, newest first.
pub const RECENT_HEADLINES: usize = 5;

pub struct ReportGenerator {
    repo: Arc<Repository>,
}

impl ReportGenerator {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Summary of the last `period_days` of news for `ticker`. An empty
    /// window is a zeroed, neutral report.
    pub fn generate(&self, ticker: &Ticker, period_days: u32) -> Result<Report> {
        self.generate_at(ticker, period_days, Utc::now().naive_utc())
    }

    pub fn generate_at(&self, ticker: &Ticker, period_days: u32, now: NaiveDateTime) -> Result<Report> {
        let since = days_before(now, period_days);
        let articles = self.repo.query(ticker, since)?;
        debug!("{}: {} articles since {}", ticker, articles.len(), since);
        Ok(summarize(ticker, period_days, &articles))
    }
}

/// `articles` must be ordered newest first.
pub fn summarize(ticker: &Ticker, period_days: u32, articles: &[Article]) -> Report {
    let mut distribution = SentimentDistribution::default();
    let mut sum = 0.0;
    let mut scored = 0usize;

    for sentiment in articles.iter().filter_map(|a| a.sentiment.as_ref()) {
        match sentiment.label() {
            SentimentLabel::Positive => distribution.positive += 1,
            SentimentLabel::Negative => distribution.negative += 1,
            SentimentLabel::Neutral => distribution.neutral += 1,
        }
        sum += sentiment.score();
        scored += 1;
    }

    let mean = if scored == 0 { 0.0 } else { sum / scored as f64 };

    Report {
        ticker: ticker.clone(),
        period_days,
        total_news: articles.len(),
        scored_news: scored,
        sentiment_distribution: distribution,
        average_sentiment_score: round3(mean),
        overall_sentiment: SentimentLabel::from_score(mean),
        recent_headlines: articles
            .iter()
            .take(RECENT_HEADLINES)
            .map(|a| a.title.clone())
            .collect(),
    }
}

fn round3(x: f64) -> f64 {
    let r = (x * 1000.0).round() / 1000.0;
    // avoid printing -0.0
    if r == 0.0 { 0.0 } else { r }
}
