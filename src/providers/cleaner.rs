use crate::models::{Article, RawArticle, Ticker};
use chrono::{DateTime, NaiveDateTime};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::debug;

// ── Text ──────────────────────────────────────────────────────────────────────

/// Trim and collapse runs of whitespace to a single space.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Title form used for fingerprinting: lowercase, every non-alphanumeric
/// character becomes a space, whitespace collapsed.
/// "Apple  Beats Q3 — Shares Jump!" → "apple beats q3 shares jump"
pub fn normalise_title(title: &str) -> String {
    let mapped: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect();
    collapse_whitespace(&mapped)
}

/// Stable dedup key over ticker + normalised title (hex SHA-256).
pub fn fingerprint(ticker: &Ticker, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ticker.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(normalise_title(title).as_bytes());
    hex::encode(hasher.finalize())
}

// ── Timestamps ────────────────────────────────────────────────────────────────

/// Alpha Vantage `time_published`: "20240315T133000" (seconds optional).
pub fn parse_compact_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M"))
        .ok()
}

/// Unix seconds → UTC. Zero and negative values mean "not reported".
pub fn parse_unix_seconds(secs: i64) -> Option<NaiveDateTime> {
    if secs <= 0 {
        return None;
    }
    DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc())
}

// ── RawArticle → Article ──────────────────────────────────────────────────────

/// Normalise one provider record. Records without a usable title are dropped;
/// a missing publish time becomes `fetched_at`.
pub fn to_article(
    ticker: &Ticker,
    source: &str,
    raw: RawArticle,
    fetched_at: NaiveDateTime,
) -> Option<Article> {
    let title = collapse_whitespace(raw.title.as_deref()?);
    if normalise_title(&title).is_empty() {
        return None;
    }

    Some(Article {
        fingerprint: fingerprint(ticker, &title),
        ticker: ticker.clone(),
        body: raw.body.as_deref().map(collapse_whitespace).unwrap_or_default(),
        url: raw
            .url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty()),
        source: source.to_string(),
        publisher: raw
            .publisher
            .as_deref()
            .map(collapse_whitespace)
            .filter(|p| !p.is_empty()),
        published_at: raw.published_at.unwrap_or(fetched_at),
        fetched_at,
        sentiment: None,
        title,
    })
}

/// Result of merging every provider's records for one ticker.
#[derive(Debug, Default)]
pub struct MergedBatch {
    pub articles: Vec<Article>,
    /// Records dropped because an earlier record in the batch shared their fingerprint.
    pub duplicates: usize,
}

/// Merge per-provider batches (provider order preserved), drop records older
/// than `since`, drop in-batch duplicates, then keep the `cap` newest.
pub fn merge_batches(
    ticker: &Ticker,
    batches: Vec<(&str, Vec<RawArticle>)>,
    since: NaiveDateTime,
    fetched_at: NaiveDateTime,
    cap: usize,
) -> MergedBatch {
    let mut seen = HashSet::new();
    let mut merged = MergedBatch::default();

    for (source, raws) in batches {
        for raw in raws {
            let Some(article) = to_article(ticker, source, raw, fetched_at) else {
                continue;
            };
            if article.published_at < since {
                continue;
            }
            if !seen.insert(article.fingerprint.clone()) {
                merged.duplicates += 1;
                continue;
            }
            merged.articles.push(article);
        }
    }

    // Stable sort keeps provider order among equal timestamps.
    merged.articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    if merged.articles.len() > cap {
        debug!(
            "{}: capping {} articles to {}",
            ticker,
            merged.articles.len(),
            cap
        );
        merged.articles.truncate(cap);
    }
    merged
}

// ── Tests ─────────────────────────────────────────────────────────────────────
