//! Tiered sentiment analysis: FinBERT → VADER → keyword lexicon.
//!
//! Tiers are loaded once by [`SentimentEngine::init`]. Each cycle takes a
//! [`Plan`] snapshot of the current [`AnalysisMode`]; every article is then
//! scored by the first tier in the plan that succeeds. The keyword tier is
//! always last and cannot fail.

pub mod finbert;
pub mod keyword;
pub mod vader;

use crate::config::AppConfig;
use crate::models::{AnalysisMethod, Sentiment};
use anyhow::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

use self::finbert::FinbertTier;
use self::keyword::KeywordTier;
use self::vader::VaderTier;

pub const HUGGINGFACE: &str = "huggingface";

/// Which tier the chain starts from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// FinBERT → VADER → keyword
    #[default]
    Auto,
    /// VADER → keyword
    General,
    /// Keyword only
    Lightweight,
}

impl AnalysisMode {
    fn chain(self) -> &'static [AnalysisMethod] {
        use AnalysisMethod::*;
        match self {
            Self::Auto => &[Finbert, Vader, Keyword],
            Self::General => &[Vader, Keyword],
            Self::Lightweight => &[Keyword],
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::General => "general",
            Self::Lightweight => "lightweight",
        })
    }
}

/// Ordered tiers to try for one cycle. Always ends with the keyword tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    tiers: Vec<AnalysisMethod>,
}

impl Plan {
    pub fn tiers(&self) -> &[AnalysisMethod] {
        &self.tiers
    }
}

pub struct SentimentEngine {
    finbert: Option<FinbertTier>,
    vader: Option<VaderTier>,
    keyword: KeywordTier,
    mode: RwLock<AnalysisMode>,
}

impl SentimentEngine {
    /// Load every enabled tier once. Tiers that fail to load are logged and
    /// left out for the rest of the process.
    pub async fn init(config: &AppConfig) -> Self {
        let analysis = &config.analysis;

        let finbert = if !analysis.use_specialized_model {
            info!("FinBERT tier disabled by configuration");
            None
        } else if let Some(key) = config.finbert_key() {
            match FinbertTier::load(&config.providers, &analysis.model_cache_dir, key).await {
                Ok(tier) => Some(tier),
                Err(e) => {
                    warn!("FinBERT tier unavailable: {:#}", e);
                    None
                }
            }
        } else {
            info!("FinBERT tier unavailable: no `{}` API key", HUGGINGFACE);
            None
        };

        let engine = Self::from_tiers(finbert, VaderTier::load(), analysis.mode);
        info!(
            "Sentiment engine: mode={}, loaded tiers=[{}]",
            analysis.mode,
            engine.loaded().iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ")
        );
        engine
    }

    pub fn from_tiers(finbert: Option<FinbertTier>, vader: Option<VaderTier>, mode: AnalysisMode) -> Self {
        Self {
            finbert,
            vader,
            keyword: KeywordTier,
            mode: RwLock::new(mode),
        }
    }

    /// Engine with only the keyword tier.
    pub fn keyword_only() -> Self {
        Self::from_tiers(None, None, AnalysisMode::Lightweight)
    }

    pub fn loaded(&self) -> Vec<AnalysisMethod> {
        let mut out = Vec::with_capacity(3);
        if self.finbert.is_some() {
            out.push(AnalysisMethod::Finbert);
        }
        if self.vader.is_some() {
            out.push(AnalysisMethod::Vader);
        }
        out.push(AnalysisMethod::Keyword);
        out
    }

    pub fn mode(&self) -> AnalysisMode {
        *self.mode.read()
    }

    /// Takes effect from the next plan (i.e. the next cycle).
    pub fn set_mode(&self, mode: AnalysisMode) {
        *self.mode.write() = mode;
        info!("Analysis mode set to {}", mode);
    }

    pub fn plan(&self) -> Plan {
        let loaded: HashSet<AnalysisMethod> = self.loaded().into_iter().collect();
        Plan {
            tiers: self
                .mode()
                .chain()
                .iter()
                .copied()
                .filter(|m| loaded.contains(m))
                .collect(),
        }
    }

    /// Score `text` with the first tier in `plan` that succeeds.
    pub async fn analyze(&self, plan: &Plan, text: &str) -> Sentiment {
        for &method in plan.tiers() {
            match self.run_tier(method, text).await {
                Ok(score) => return Sentiment::new(score, method),
                Err(e) => debug!("{} tier failed, falling through: {:#}", method, e),
            }
        }
        Sentiment::new(self.keyword.score(text), AnalysisMethod::Keyword)
    }

    async fn run_tier(&self, method: AnalysisMethod, text: &str) -> Result<f64> {
        match method {
            AnalysisMethod::Finbert => match &self.finbert {
                Some(tier) => tier.score(text).await,
                None => anyhow::bail!("not loaded"),
            },
            AnalysisMethod::Vader => match &self.vader {
                Some(tier) => tier.score(text),
                None => anyhow::bail!("not loaded"),
            },
            AnalysisMethod::Keyword => Ok(self.keyword.score(text)),
        }
    }
}

const STOP_WORDS: &[&str] = &[
    "about", "after", "also", "been", "from", "have", "into", "more", "over", "said",
    "says", "than", "that", "their", "them", "then", "there", "these", "they", "this",
    "were", "what", "when", "which", "while", "will", "with", "would", "your",
];

/// Distinct lowercase words of four or more letters, stop words removed,
/// in first-seen order.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphabetic())
        .filter(|w| w.chars().count() >= 4)
        .map(str::to_lowercase)
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}
