use crate::models::{AnalysisMethod, Article, CycleStats, Sentiment, Ticker, UpsertOutcome};
use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use duckdb::{Connection, params};
use parking_lot::Mutex;
use std::path::Path;
use tracing::{info, warn};

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS articles (
    fingerprint      VARCHAR PRIMARY KEY,
    ticker           VARCHAR   NOT NULL,
    title            VARCHAR   NOT NULL,
    body             VARCHAR   NOT NULL DEFAULT '',
    url              VARCHAR,
    source           VARCHAR   NOT NULL,
    publisher        VARCHAR,
    published_at     TIMESTAMP NOT NULL,
    fetched_at       TIMESTAMP NOT NULL,
    -- NULL until scored; label is always derived from score
    sentiment_score  DOUBLE,
    sentiment_label  VARCHAR,
    analysis_method  VARCHAR
);

CREATE SEQUENCE IF NOT EXISTS collection_runs_id_seq;

CREATE TABLE IF NOT EXISTS collection_runs (
    id                  BIGINT PRIMARY KEY DEFAULT nextval('collection_runs_id_seq'),
    started_at          TIMESTAMP NOT NULL,
    finished_at         TIMESTAMP,
    status              VARCHAR NOT NULL DEFAULT 'running',
    tickers_processed   INTEGER DEFAULT 0,
    articles_added      INTEGER DEFAULT 0,
    duplicates_skipped  INTEGER DEFAULT 0,
    articles_scored     INTEGER DEFAULT 0,
    error_msg           VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

/// Adds `publisher` to version 1 databases. DuckDB cannot alter a table
/// that has an index, so the index is dropped here and rebuilt by `INDEXES`.
const UPGRADE_PUBLISHER: &str = r#"
DROP INDEX IF EXISTS idx_articles_ticker_published;
ALTER TABLE articles ADD COLUMN publisher VARCHAR;
"#;

const SCHEMA_VERSION: i32 = 2;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_articles_ticker_published ON articles (ticker, published_at);
"#;

const ARTICLE_COLUMNS: &str = "fingerprint, ticker, title, body, url, source, publisher, published_at, \
     fetched_at, sentiment_score, analysis_method";

// ── Repository ────────────────────────────────────────────────────────────────

/// DuckDB-backed article store.
///
/// Writes are serialised through one connection; reads run on a cloned
/// connection to the same database and see the last committed snapshot.
pub struct Repository {
    conn: Mutex<Connection>,
}

/// Columns as stored, before validation.
struct ArticleRow {
    fingerprint: String,
    ticker: String,
    title: String,
    body: String,
    url: Option<String>,
    source: String,
    publisher: Option<String>,
    published_at: NaiveDateTime,
    fetched_at: NaiveDateTime,
    sentiment_score: Option<f64>,
    analysis_method: Option<String>,
}

impl ArticleRow {
    fn from_row(r: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            fingerprint: r.get(0)?,
            ticker: r.get(1)?,
            title: r.get(2)?,
            body: r.get(3)?,
            url: r.get(4)?,
            source: r.get(5)?,
            publisher: r.get(6)?,
            published_at: r.get(7)?,
            fetched_at: r.get(8)?,
            sentiment_score: r.get(9)?,
            analysis_method: r.get(10)?,
        })
    }

    fn into_article(self) -> Result<Article> {
        let ticker = Ticker::parse(&self.ticker)
            .with_context(|| format!("article {} has bad ticker", self.fingerprint))?;

        let sentiment = match (self.sentiment_score, self.analysis_method.as_deref()) {
            (Some(score), Some(method)) => {
                Some(Sentiment::new(score, method.parse::<AnalysisMethod>()?))
            }
            (Some(score), None) => {
                warn!("article {} scored without method; assuming keyword", self.fingerprint);
                Some(Sentiment::new(score, AnalysisMethod::Keyword))
            }
            (None, _) => None,
        };

        Ok(Article {
            fingerprint: self.fingerprint,
            ticker,
            title: self.title,
            body: self.body,
            url: self.url,
            source: self.source,
            publisher: self.publisher,
            published_at: self.published_at,
            fetched_at: self.fetched_at,
            sentiment,
        })
    }
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        let conn = self.conn.lock();
        conn.execute_batch(DDL).context("DDL failed")?;
        let has_publisher: i64 = conn.query_row(
            "SELECT COUNT(*) FROM information_schema.columns \
             WHERE table_name = 'articles' AND column_name = 'publisher'",
            [],
            |r| r.get(0),
        )?;
        if has_publisher == 0 {
            info!("Adding articles.publisher");
            conn.execute_batch(UPGRADE_PUBLISHER).context("Schema upgrade failed")?;
        }
        conn.execute_batch(INDEXES).context("Index creation failed")?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?, ?)",
            params![SCHEMA_VERSION, Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    /// Separate connection for readers, so a long read never holds the writer lock.
    fn reader(&self) -> Result<Connection> {
        self.conn.lock().try_clone().context("Failed to open read connection")
    }

    // ── Articles ──────────────────────────────────────────────────────────────

    /// Insert unless the fingerprint is already stored. Check and insert are
    /// one statement, so concurrent callers cannot both insert.
    pub fn upsert(&self, article: &Article) -> Result<UpsertOutcome> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"INSERT INTO articles
                   (fingerprint, ticker, title, body, url, source, publisher, published_at, fetched_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (fingerprint) DO NOTHING
               RETURNING fingerprint"#,
        )?;
        let mut rows = stmt
            .query(params![
                article.fingerprint,
                article.ticker.as_str(),
                article.title,
                article.body,
                article.url,
                article.source,
                article.publisher,
                article.published_at,
                article.fetched_at,
            ])
            .with_context(|| format!("insert article {} {}", article.ticker, article.fingerprint))?;

        Ok(if rows.next()?.is_some() {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Duplicate
        })
    }

    /// Record a score. Returns false if no article has this fingerprint.
    pub fn mark_scored(&self, fingerprint: &str, sentiment: &Sentiment) -> Result<bool> {
        let conn = self.conn.lock();
        let n = conn
            .execute(
                r#"UPDATE articles SET
                   sentiment_score = ?, sentiment_label = ?, analysis_method = ?
                   WHERE fingerprint = ?"#,
                params![
                    sentiment.score(),
                    sentiment.label().as_str(),
                    sentiment.method().as_str(),
                    fingerprint,
                ],
            )
            .with_context(|| format!("mark_scored({})", fingerprint))?;
        Ok(n > 0)
    }

    /// Articles for `ticker` published at or after `since`, newest first.
    pub fn query(&self, ticker: &Ticker, since: NaiveDateTime) -> Result<Vec<Article>> {
        self.select_articles(
            "WHERE ticker = ? AND published_at >= ? ORDER BY published_at DESC, fingerprint",
            params![ticker.as_str(), since],
        )
    }

    /// Stored but not yet scored articles for `ticker`, newest first.
    pub fn unscored(&self, ticker: &Ticker) -> Result<Vec<Article>> {
        self.select_articles(
            "WHERE ticker = ? AND sentiment_score IS NULL ORDER BY published_at DESC, fingerprint",
            params![ticker.as_str()],
        )
    }

    fn select_articles(&self, clause: &str, params: &[&dyn duckdb::ToSql]) -> Result<Vec<Article>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM articles {}", ARTICLE_COLUMNS, clause))?;
        let rows = stmt
            .query_map(params, ArticleRow::from_row)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        rows.into_iter().map(ArticleRow::into_article).collect()
    }

    /// Newest stored publish time for a symbol, used as the next fetch's lower bound.
    pub fn latest_published_at(&self, ticker: &Ticker) -> Result<Option<NaiveDateTime>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare("SELECT MAX(published_at) FROM articles WHERE ticker = ?")?;
        Ok(stmt.query_row(params![ticker.as_str()], |r| r.get(0))?)
    }

    pub fn article_count(&self) -> Result<i64> {
        let conn = self.reader()?;
        let mut s = conn.prepare("SELECT COUNT(*) FROM articles")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn scored_count(&self) -> Result<i64> {
        let conn = self.reader()?;
        let mut s = conn.prepare("SELECT COUNT(*) FROM articles WHERE sentiment_score IS NOT NULL")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn ticker_count(&self) -> Result<i64> {
        let conn = self.reader()?;
        let mut s = conn.prepare("SELECT COUNT(DISTINCT ticker) FROM articles")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn published_range(&self) -> Result<(Option<NaiveDateTime>, Option<NaiveDateTime>)> {
        let conn = self.reader()?;
        let mut s = conn.prepare("SELECT MIN(published_at), MAX(published_at) FROM articles")?;
        Ok(s.query_row([], |r| Ok((r.get(0)?, r.get(1)?)))?)
    }

    pub fn list_tickers(&self) -> Result<Vec<String>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare("SELECT DISTINCT ticker FROM articles ORDER BY ticker")?;
        let syms = stmt
            .query_map([], |r| r.get(0))?
            .collect::<duckdb::Result<Vec<String>>>()?;
        Ok(syms)
    }

    // ── Collection run log ────────────────────────────────────────────────────

    pub fn begin_run(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let id: i64 = conn.query_row(
            "INSERT INTO collection_runs (started_at, status) VALUES (?, 'running') RETURNING id",
            params![Utc::now().naive_utc()],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn finish_run(&self, run_id: i64, stats: &CycleStats, error: Option<&str>) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"UPDATE collection_runs SET
               finished_at = ?, status = ?,
               tickers_processed = ?, articles_added = ?,
               duplicates_skipped = ?, articles_scored = ?, error_msg = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                if error.is_none() { "success" } else { "error" },
                stats.tickers_processed as i64,
                stats.articles_added as i64,
                stats.duplicates_skipped as i64,
                stats.articles_scored as i64,
                error,
                run_id,
            ],
        )?;
        Ok(())
    }

    /// `(status, articles_added)` of the most recent run.
    pub fn last_run(&self) -> Result<Option<(String, i64)>> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare(
            "SELECT status, articles_added FROM collection_runs ORDER BY id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(r) => Ok(Some((r.get(0)?, r.get(1)?))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SentimentLabel;
    use crate::providers::cleaner::fingerprint;
    use chrono::NaiveDate;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    fn article(ticker: &str, title: &str, day: u32) -> Article {
        let ticker = Ticker::parse(ticker).unwrap();
        Article {
            fingerprint: fingerprint(&ticker, title),
            ticker,
            title: title.to_string(),
            body: String::new(),
            url: None,
            source: "test".to_string(),
            publisher: None,
            published_at: ts(day),
            fetched_at: ts(day),
            sentiment: None,
        }
    }

    fn repo() -> Repository {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        repo
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let repo = repo();
        let a = article("AAPL", "Apple beats estimates", 10);

        assert_eq!(repo.upsert(&a).unwrap(), UpsertOutcome::Inserted);
        assert_eq!(repo.upsert(&a).unwrap(), UpsertOutcome::Duplicate);
        assert_eq!(repo.article_count().unwrap(), 1);
    }

    #[test]
    fn test_migrations_rerun_cleanly() {
        let repo = repo();
        repo.run_migrations().unwrap();
        assert_eq!(repo.article_count().unwrap(), 0);
    }

    #[test]
    fn test_query_orders_newest_first_and_filters() {
        let repo = repo();
        for (title, day) in [("Mid", 10), ("Newest", 12), ("Oldest", 2)] {
            repo.upsert(&article("AAPL", title, day)).unwrap();
        }
        repo.upsert(&article("MSFT", "Other ticker", 11)).unwrap();

        let t = Ticker::parse("AAPL").unwrap();
        let titles: Vec<String> = repo.query(&t, ts(5)).unwrap().into_iter().map(|a| a.title).collect();
        assert_eq!(titles, vec!["Newest", "Mid"]);

        assert_eq!(repo.latest_published_at(&t).unwrap(), Some(ts(12)));
        let none = Ticker::parse("TSLA").unwrap();
        assert_eq!(repo.latest_published_at(&none).unwrap(), None);
        assert_eq!(repo.list_tickers().unwrap(), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn test_mark_scored_round_trips_derived_label() {
        let repo = repo();
        let a = article("TSLA", "Tesla plunges", 10);
        repo.upsert(&a).unwrap();

        let t = Ticker::parse("TSLA").unwrap();
        assert_eq!(repo.unscored(&t).unwrap().len(), 1);

        let s = Sentiment::new(-0.6, AnalysisMethod::Keyword);
        assert!(repo.mark_scored(&a.fingerprint, &s).unwrap());
        assert!(!repo.mark_scored("missing", &s).unwrap());

        assert!(repo.unscored(&t).unwrap().is_empty());
        let stored = repo.query(&t, ts(1)).unwrap().remove(0).sentiment.unwrap();
        assert_eq!(stored.label(), SentimentLabel::Negative);
        assert_eq!(stored.method(), AnalysisMethod::Keyword);
        assert_eq!(repo.scored_count().unwrap(), 1);
    }

    #[test]
    fn test_publisher_round_trips() {
        let repo = repo();
        let mut a = article("AAPL", "Apple supplier news", 10);
        a.publisher = Some("Reuters".to_string());
        repo.upsert(&a).unwrap();
        repo.upsert(&article("AAPL", "No outlet given", 11)).unwrap();

        let t = Ticker::parse("AAPL").unwrap();
        let stored = repo.query(&t, ts(1)).unwrap();
        assert_eq!(stored[0].publisher, None);
        assert_eq!(stored[1].publisher.as_deref(), Some("Reuters"));
        assert_eq!(stored[1], a);
    }

    #[test]
    fn test_migrations_upgrade_version_one_schema() {
        let repo = Repository::open_in_memory().unwrap();
        repo.conn
            .lock()
            .execute_batch(
                r#"CREATE TABLE articles (
                    fingerprint VARCHAR PRIMARY KEY, ticker VARCHAR NOT NULL, title VARCHAR NOT NULL,
                    body VARCHAR NOT NULL DEFAULT '', url VARCHAR, source VARCHAR NOT NULL,
                    published_at TIMESTAMP NOT NULL, fetched_at TIMESTAMP NOT NULL,
                    sentiment_score DOUBLE, sentiment_label VARCHAR, analysis_method VARCHAR);
                   INSERT INTO articles (fingerprint, ticker, title, source, published_at, fetched_at)
                   VALUES ('old', 'AAPL', 'Stored before upgrade', 'finnhub',
                           TIMESTAMP '2024-03-05 12:00:00', TIMESTAMP '2024-03-05 12:00:00');
                   CREATE INDEX idx_articles_ticker_published ON articles (ticker, published_at);"#,
            )
            .unwrap();
        repo.run_migrations().unwrap();

        let mut a = article("AAPL", "Stored after upgrade", 10);
        a.publisher = Some("Bloomberg".to_string());
        repo.upsert(&a).unwrap();

        let t = Ticker::parse("AAPL").unwrap();
        let publishers: Vec<Option<String>> = repo.query(&t, ts(1)).unwrap().into_iter().map(|a| a.publisher).collect();
        assert_eq!(publishers, vec![Some("Bloomberg".to_string()), None]);

        let version: i32 = repo
            .reader()
            .unwrap()
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_reader_sees_committed_writes() {
        let repo = repo();
        let reader = repo.reader().unwrap();
        repo.upsert(&article("AAPL", "One", 10)).unwrap();
        let n: i64 = reader.query_row("SELECT COUNT(*) FROM articles", [], |r| r.get(0)).unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("news.duckdb");
        {
            let repo = Repository::open(&path).unwrap();
            repo.run_migrations().unwrap();
            repo.upsert(&article("AAPL", "Persisted", 10)).unwrap();
        }
        let repo = Repository::open(&path).unwrap();
        repo.run_migrations().unwrap();
        assert_eq!(repo.article_count().unwrap(), 1);
        assert_eq!(
            repo.upsert(&article("AAPL", "Persisted", 10)).unwrap(),
            UpsertOutcome::Duplicate
        );
    }

    #[test]
    fn test_run_log() {
        let repo = repo();
        let id = repo.begin_run().unwrap();
        let stats = CycleStats {
            tickers_processed: 2,
            articles_added: 5,
            ..Default::default()
        };
        repo.finish_run(id, &stats, None).unwrap();
        assert_eq!(repo.last_run().unwrap(), Some(("success".to_string(), 5)));

        let id2 = repo.begin_run().unwrap();
        assert!(id2 > id);
        repo.finish_run(id2, &CycleStats::default(), Some("boom")).unwrap();
        assert_eq!(repo.last_run().unwrap(), Some(("error".to_string(), 0)));
    }
}
