use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use stock_news_analyzer::config::AppConfig;
use stock_news_analyzer::models::Ticker;
use stock_news_analyzer::pipeline::{Collector, Watchlist};
use stock_news_analyzer::providers::build_sources;
use stock_news_analyzer::report::ReportGenerator;
use stock_news_analyzer::scheduler::Scheduler;
use stock_news_analyzer::sentiment::{AnalysisMode, SentimentEngine, extract_keywords};
use stock_news_analyzer::storage::Repository;
use stock_news_analyzer::utils;

#[derive(Parser)]
#[command(name = "stock-news", about = "Stock news collector with sentiment scoring", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Extra TOML config file, layered over config/default.toml and config/local.toml
    #[arg(short, long, global = true, env = "STOCK_NEWS_CONFIG")]
    config: Option<PathBuf>,

    /// Override analysis.mode
    #[arg(long, value_enum, global = true)]
    mode: Option<AnalysisMode>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single collection cycle for every configured stock
    Once,

    /// Collect on the configured schedule until Ctrl-C
    Run,

    /// Print a JSON sentiment report for one stock
    Report {
        ticker: String,

        #[arg(short, long, default_value_t = 7)]
        days: u32,
    },

    /// Score a piece of text and show which tier handled it
    Analyze { text: String },

    /// Show database statistics
    Stats,

    /// Apply schema migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "stock_news_analyzer=info,warn",
        1 => "stock_news_analyzer=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(mode) = cli.mode {
        config.analysis.mode = mode;
    }

    match cli.command {
        Command::Once => {
            let _t = utils::Timer::start("Collection cycle");
            let collector = build_collector(&config).await?;
            let stats = collector.run_once().await?;
            println!(
                "{} tickers | {} fetched | {} new | {} duplicates | {} scored",
                stats.tickers_processed,
                stats.articles_fetched,
                stats.articles_added,
                stats.duplicates_skipped,
                stats.articles_scored
            );
        }

        Command::Run => {
            let collector = build_collector(&config).await?;
            let mut scheduler = Scheduler::new(Arc::new(collector), &config.schedule)?;
            scheduler.start()?;

            tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
            info!("Ctrl-C received; waiting for the current cycle to finish");
            scheduler.stop().await;

            let state = scheduler.state();
            info!(
                "Ran {} cycles ({} failed)",
                state.cycles_run, state.cycles_failed
            );
        }

        Command::Report { ticker, days } => {
            let ticker = Ticker::parse(&ticker)?;
            let repo = Arc::new(open_repo(&config)?);
            let report = ReportGenerator::new(repo).generate(&ticker, days)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Analyze { text } => {
            let engine = SentimentEngine::init(&config).await;
            let sentiment = engine.analyze(&engine.plan(), &text).await;
            println!("Method   : {}", sentiment.method());
            println!("Label    : {}", sentiment.label());
            println!("Score    : {:.3}", sentiment.score());
            println!("Keywords : {}", extract_keywords(&text).join(", "));
        }

        Command::Stats => {
            let repo = open_repo(&config)?;
            let (min, max) = repo.published_range()?;
            println!("─────────────────────────────────");
            println!("  Stock News — Database Stats");
            println!("─────────────────────────────────");
            println!("  Tickers  : {}", utils::fmt_count(repo.ticker_count()?));
            println!("  Articles : {}", utils::fmt_count(repo.article_count()?));
            println!("  Scored   : {}", utils::fmt_count(repo.scored_count()?));
            println!("  From     : {}", utils::fmt_timestamp(min));
            println!("  To       : {}", utils::fmt_timestamp(max));
            if let Some((status, added)) = repo.last_run()? {
                println!("  Last run : {} ({} new)", status, utils::fmt_count(added));
            }
            let symbols = repo.list_tickers()?;
            if !symbols.is_empty() {
                println!("  Symbols  : {}", symbols.join(" "));
            }
            println!("─────────────────────────────────");
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}

fn open_repo(config: &AppConfig) -> Result<Repository> {
    let repo = Repository::open(&config.storage.db_path)?;
    if config.storage.run_migrations {
        repo.run_migrations()?;
    }
    Ok(repo)
}

async fn build_collector(config: &AppConfig) -> Result<Collector> {
    let repo = Arc::new(open_repo(config)?);
    let sources = build_sources(config)?;
    let engine = Arc::new(SentimentEngine::init(config).await);
    let watchlist = Arc::new(Watchlist::from_config(config)?);
    info!("Watching {} tickers", watchlist.len());
    Ok(Collector::new(config, repo, sources, engine, watchlist))
}
