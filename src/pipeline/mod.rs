//! Collector: ties providers → store → sentiment together.
//!
//! One cycle:
//!   1. Snapshot the watchlist and the analysis plan
//!   2. Per ticker (bounded concurrency): fetch from every source since the
//!      newest stored article, merge, cap, upsert
//!   3. Score everything still unscored for that ticker
//!
//! Re-running a cycle is idempotent: already stored fingerprints come back as
//! duplicates and are not scored twice.

pub mod watchlist;

use crate::config::AppConfig;
use crate::models::{CycleStats, Ticker, UpsertOutcome};
use crate::providers::cleaner::merge_batches;
use crate::providers::{NewsSource, fetch_or_empty};
use crate::scheduler::CollectionJob;
use crate::sentiment::{Plan, SentimentEngine};
use crate::storage::Repository;
use crate::utils::days_before;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

pub use self::watchlist::Watchlist;

/// State shared by every per-ticker task.
struct Shared {
    repo: Arc<Repository>,
    sources: Vec<Arc<dyn NewsSource>>,
    engine: Arc<SentimentEngine>,
    lookback_days: u32,
    max_per_stock: usize,
}

pub struct Collector {
    shared: Arc<Shared>,
    watchlist: Arc<Watchlist>,
    concurrency: usize,
}

impl Collector {
    pub fn new(
        config: &AppConfig,
        repo: Arc<Repository>,
        sources: Vec<Arc<dyn NewsSource>>,
        engine: Arc<SentimentEngine>,
        watchlist: Arc<Watchlist>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                repo,
                sources,
                engine,
                lookback_days: config.pipeline.lookback_days,
                max_per_stock: config.analysis.max_news_per_stock,
            }),
            watchlist,
            concurrency: config.pipeline.concurrency.max(1),
        }
    }

    pub fn watchlist(&self) -> &Arc<Watchlist> {
        &self.watchlist
    }

    /// Collect and score every watched ticker once.
    ///
    /// Provider failures only reduce what is fetched. A ticker whose storage
    /// step fails is counted in `errors`; the remaining tickers still finish
    /// and the cycle then returns an error naming the failed tickers.
    pub async fn run_once(&self) -> Result<CycleStats> {
        let tickers = self.watchlist.snapshot();
        let plan = Arc::new(self.shared.engine.plan());
        let now = Utc::now().naive_utc();

        let run_id = match self.shared.repo.begin_run() {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Could not record collection run: {:#}", e);
                None
            }
        };

        info!(
            "=== Collecting {} tickers from {} sources (tiers: {:?}) ===",
            tickers.len(),
            self.shared.sources.len(),
            plan.tiers()
        );

        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(tickers.len());

        for ticker in tickers {
            let shared = Arc::clone(&self.shared);
            let plan = Arc::clone(&plan);
            let sem = Arc::clone(&sem);
            let symbol = ticker.clone();

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire().await?;
                let stats = shared
                    .collect(&ticker, &plan, now)
                    .await
                    .with_context(|| format!("collect({})", ticker))?;
                Ok::<CycleStats, anyhow::Error>(stats)
            });

            handles.push((symbol, handle));
        }

        let mut stats = CycleStats::default();
        let mut failed: Vec<String> = Vec::new();

        for (ticker, handle) in handles {
            match handle.await {
                Ok(Ok(s)) => {
                    info!(
                        "{}: {} fetched, {} new, {} duplicates, {} scored",
                        ticker, s.articles_fetched, s.articles_added, s.duplicates_skipped, s.articles_scored
                    );
                    stats.absorb(&s);
                }
                Ok(Err(e)) => {
                    warn!("{}: {:#}", ticker, e);
                    stats.errors += 1;
                    failed.push(ticker.to_string());
                }
                Err(e) => {
                    error!("Task panic for {}: {}", ticker, e);
                    stats.errors += 1;
                    failed.push(ticker.to_string());
                }
            }
        }

        let failure = (!failed.is_empty()).then(|| format!("collection failed for {}", failed.join(", ")));

        if let Some(id) = run_id {
            if let Err(e) = self.shared.repo.finish_run(id, &stats, failure.as_deref()) {
                warn!("Could not finish collection run {}: {:#}", id, e);
            }
        }

        info!(
            "=== Done: {} tickers | {} new | {} duplicates | {} scored | {} errors ===",
            stats.tickers_processed,
            stats.articles_added,
            stats.duplicates_skipped,
            stats.articles_scored,
            stats.errors
        );

        match failure {
            Some(msg) => anyhow::bail!(msg),
            None => Ok(stats),
        }
    }

    /// On-demand collection of a single ticker, outside the cycle.
    pub async fn collect_ticker(&self, ticker: &Ticker) -> Result<CycleStats> {
        let plan = self.shared.engine.plan();
        self.shared
            .collect(ticker, &plan, Utc::now().naive_utc())
            .await
            .with_context(|| format!("collect({})", ticker))
    }
}

impl Shared {
    async fn collect(&self, ticker: &Ticker, plan: &Plan, now: NaiveDateTime) -> Result<CycleStats> {
        let floor = days_before(now, self.lookback_days);
        let since = match self.repo.latest_published_at(ticker)? {
            Some(latest) => latest.max(floor),
            None => floor,
        };
        debug!("{}: fetching since {}", ticker, since);

        // Merge every source; earlier sources win on shared fingerprints.
        let mut batches = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let raws = fetch_or_empty(source.as_ref(), ticker, since, now).await;
            batches.push((source.id(), raws));
        }
        let fetched: usize = batches.iter().map(|(_, raws)| raws.len()).sum();

        let merged = merge_batches(ticker, batches, since, now, self.max_per_stock);

        let mut stats = CycleStats {
            tickers_processed: 1,
            articles_fetched: fetched,
            duplicates_skipped: merged.duplicates,
            ..Default::default()
        };

        for article in &merged.articles {
            match self.repo.upsert(article)? {
                UpsertOutcome::Inserted => stats.articles_added += 1,
                UpsertOutcome::Duplicate => stats.duplicates_skipped += 1,
            }
        }

        // Includes leftovers from cycles that failed before scoring.
        for article in self.repo.unscored(ticker)? {
            let sentiment = self.engine.analyze(plan, &article.analysis_text()).await;
            self.repo.mark_scored(&article.fingerprint, &sentiment)?;
            stats.articles_scored += 1;
        }

        Ok(stats)
    }
}

#[async_trait]
impl CollectionJob for Collector {
    async fn run_cycle(&self) -> Result<CycleStats> {
        self.run_once().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::models::{AnalysisMethod, RawArticle};
    use crate::providers::cleaner::fingerprint;
    use chrono::Duration;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeSource {
        id: &'static str,
        items: Vec<RawArticle>,
        fail: bool,
        windows: Mutex<Vec<(NaiveDateTime, NaiveDateTime)>>,
    }

    #[async_trait]
    impl NewsSource for FakeSource {
        fn id(&self) -> &'static str {
            self.id
        }

        async fn fetch(
            &self,
            _ticker: &Ticker,
            since: NaiveDateTime,
            until: NaiveDateTime,
        ) -> Result<Vec<RawArticle>, ProviderError> {
            self.windows.lock().push((since, until));
            if self.fail {
                return Err(ProviderError::RateLimited { provider: self.id });
            }
            Ok(self.items.clone())
        }
    }

    fn raw(title: &str, hours_ago: i64) -> RawArticle {
        RawArticle {
            title: Some(title.to_string()),
            published_at: Some(Utc::now().naive_utc() - Duration::hours(hours_ago)),
            ..Default::default()
        }
    }

    fn source(id: &'static str, items: Vec<RawArticle>) -> Arc<dyn NewsSource> {
        Arc::new(FakeSource { id, items, ..Default::default() })
    }

    fn collector(repo: Arc<Repository>, sources: Vec<Arc<dyn NewsSource>>, symbols: &[&str], cap: usize) -> Collector {
        let mut config = AppConfig::default();
        config.analysis.max_news_per_stock = cap;
        collector_with(&config, repo, sources, symbols)
    }

    fn collector_with(
        config: &AppConfig,
        repo: Arc<Repository>,
        sources: Vec<Arc<dyn NewsSource>>,
        symbols: &[&str],
    ) -> Collector {
        let watchlist = Watchlist::new(symbols.iter().map(|s| Ticker::parse(s).unwrap()).collect());
        Collector::new(
            config,
            repo,
            sources,
            Arc::new(SentimentEngine::keyword_only()),
            Arc::new(watchlist),
        )
    }

    fn repo() -> Arc<Repository> {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        Arc::new(repo)
    }

    #[tokio::test]
    async fn test_merges_all_sources_and_counts_overlap() {
        let repo = repo();
        let a = source("alpha", vec![raw("Apple beats estimates", 3), raw("Apple unveils new chip", 5)]);
        let b = source("beta", vec![raw("Apple beats  estimates!", 2), raw("Apple stock surges", 1)]);

        let stats = collector(Arc::clone(&repo), vec![a, b], &["AAPL"], 50).run_once().await.unwrap();

        assert_eq!(stats.tickers_processed, 1);
        assert_eq!(stats.articles_fetched, 4);
        assert_eq!(stats.articles_added, 3);
        assert_eq!(stats.duplicates_skipped, 1);
        assert_eq!(stats.articles_scored, 3);
        assert_eq!(stats.errors, 0);

        let ticker = Ticker::parse("AAPL").unwrap();
        let stored = repo.query(&ticker, Utc::now().naive_utc() - Duration::days(1)).unwrap();
        assert_eq!(stored.len(), 3);
        assert!(stored.iter().all(|a| a.sentiment.map(|s| s.method()) == Some(AnalysisMethod::Keyword)));

        let dup = stored.iter().find(|a| a.fingerprint == fingerprint(&ticker, "Apple beats estimates")).unwrap();
        assert_eq!(dup.source, "alpha");
    }

    #[tokio::test]
    async fn test_second_cycle_adds_nothing() {
        let repo = repo();
        let a = source("alpha", vec![raw("Tesla recalls cars", 4), raw("Tesla profit soars", 1)]);
        let c = collector(Arc::clone(&repo), vec![a], &["TSLA"], 50);

        assert_eq!(c.run_once().await.unwrap().articles_added, 2);
        let again = c.run_once().await.unwrap();
        assert_eq!(again.articles_added, 0);
        assert_eq!(again.articles_scored, 0);
        assert_eq!(repo.article_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failing_source_does_not_block_others() {
        let repo = repo();
        let broken: Arc<dyn NewsSource> = Arc::new(FakeSource { id: "alpha", fail: true, ..Default::default() });
        let ok = source("beta", vec![raw("Microsoft expands cloud", 2)]);

        let stats = collector(Arc::clone(&repo), vec![broken, ok], &["MSFT"], 50)
            .run_once()
            .await
            .unwrap();
        assert_eq!(stats.articles_added, 1);
        assert_eq!(stats.errors, 0);
    }

    #[tokio::test]
    async fn test_cap_keeps_newest_and_lookback_drops_old() {
        let repo = repo();
        let items = vec![
            raw("Story one", 1),
            raw("Story two", 2),
            raw("Story three", 3),
            raw("Story four", 4),
            raw("Ancient story", 24 * 30),
        ];
        let c = collector(Arc::clone(&repo), vec![source("alpha", items)], &["NVDA"], 2);
        let stats = c.run_once().await.unwrap();
        assert_eq!(stats.articles_added, 2);

        let ticker = Ticker::parse("NVDA").unwrap();
        let titles: Vec<String> = repo
            .query(&ticker, Utc::now().naive_utc() - Duration::days(365))
            .unwrap()
            .into_iter()
            .map(|a| a.title)
            .collect();
        assert_eq!(titles, vec!["Story one", "Story two"]);
    }

    #[tokio::test]
    async fn test_sources_share_the_cycle_window() {
        let repo = repo();
        let a = Arc::new(FakeSource { id: "alpha", ..Default::default() });
        let b = Arc::new(FakeSource { id: "beta", ..Default::default() });
        let sources: Vec<Arc<dyn NewsSource>> = vec![a.clone() as Arc<dyn NewsSource>, b.clone() as Arc<dyn NewsSource>];

        let before = Utc::now().naive_utc();
        collector(repo, sources, &["AAPL", "MSFT"], 50).run_once().await.unwrap();
        let after = Utc::now().naive_utc();

        let windows: Vec<_> = a.windows.lock().iter().chain(b.windows.lock().iter()).copied().collect();
        assert_eq!(windows.len(), 4);
        let until = windows[0].1;
        assert!(before <= until && until <= after);
        for (since, end) in windows {
            assert_eq!(end, until);
            assert_eq!(since, days_before(until, 7));
        }
    }

    #[tokio::test]
    async fn test_unbounded_lookback_starts_at_epoch() {
        let repo = repo();
        let mut config = AppConfig::default();
        config.pipeline.lookback_days = u32::MAX;
        let old = Arc::new(FakeSource {
            id: "alpha",
            items: vec![raw("Decade old story", 24 * 365 * 10), raw("Fresh story", 1)],
            ..Default::default()
        });
        let sources: Vec<Arc<dyn NewsSource>> = vec![old.clone() as Arc<dyn NewsSource>];

        let stats = collector_with(&config, Arc::clone(&repo), sources, &["IBM"]).run_once().await.unwrap();
        assert_eq!(stats.articles_added, 2);
        assert_eq!(old.windows.lock()[0].0, chrono::DateTime::UNIX_EPOCH.naive_utc());
    }

    #[tokio::test]
    async fn test_scores_leftovers_from_earlier_cycles() {
        let repo = repo();
        let ticker = Ticker::parse("AMZN").unwrap();
        let leftover = crate::providers::cleaner::to_article(
            &ticker,
            "alpha",
            raw("Amazon shares slump", 2),
            Utc::now().naive_utc(),
        )
        .unwrap();
        repo.upsert(&leftover).unwrap();

        let c = collector(Arc::clone(&repo), vec![source("alpha", vec![])], &["AMZN"], 50);
        let stats = c.collect_ticker(&ticker).await.unwrap();
        assert_eq!(stats.articles_scored, 1);
        assert!(repo.unscored(&ticker).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_names_ticker() {
        // No migrations: every statement fails.
        let repo = Arc::new(Repository::open_in_memory().unwrap());
        let c = collector(repo, vec![source("alpha", vec![raw("Apple news", 1)])], &["AAPL", "MSFT"], 50);

        let err = c.run_once().await.unwrap_err().to_string();
        assert!(err.contains("AAPL"));
        assert!(err.contains("MSFT"));
    }
}
