//! General-purpose polarity tier (VADER compound score, already on [-1, 1]).
//! Compiled in with the `vader` feature; without it the tier never loads.

use anyhow::Result;

#[cfg(feature = "vader")]
pub struct VaderTier {
    analyzer: vader_sentiment::SentimentIntensityAnalyzer<'static>,
}

#[cfg(feature = "vader")]
impl VaderTier {
    pub fn load() -> Option<Self> {
        Some(Self {
            analyzer: vader_sentiment::SentimentIntensityAnalyzer::new(),
        })
    }

    pub fn score(&self, text: &str) -> Result<f64> {
        let scores = self.analyzer.polarity_scores(text);
        scores
            .get("compound")
            .copied()
            .ok_or_else(|| anyhow::anyhow!("VADER returned no compound score"))
    }
}

#[cfg(not(feature = "vader"))]
pub struct VaderTier;

#[cfg(not(feature = "vader"))]
impl VaderTier {
    pub fn load() -> Option<Self> {
        tracing::debug!("built without the `vader` feature; general tier unavailable");
        None
    }

    pub fn score(&self, _text: &str) -> Result<f64> {
        anyhow::bail!("VADER support not compiled in")
    }
}
