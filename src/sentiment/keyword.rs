//! Deterministic financial lexicon scorer; the terminal tier.
//!
//! Counts bullish/bearish terms (strong terms weigh double), boosts the
//! dominant side when a percentage appears, nudges both sides when a money
//! figure appears, and penalises negated bullish terms ("not strong").
//! The result is `(bullish - bearish) / words * 2`, clamped to [-1, 1].

use regex::Regex;
use std::sync::LazyLock;

const BULLISH: &[&str] = &[
    "bullish", "bull", "rally", "surge", "soar", "climb", "rise", "gain", "up",
    "growth", "profit", "earnings", "beat", "exceed", "outperform", "strong",
    "robust", "solid", "healthy", "positive", "optimistic", "confident",
    "breakthrough", "success", "expansion", "milestone", "record", "high",
    "upgrade", "buy", "overweight", "recommend", "target", "upside",
];

const BEARISH: &[&str] = &[
    "bearish", "bear", "crash", "plunge", "plummet", "fall", "drop", "decline",
    "loss", "losses", "down", "weak", "poor", "disappointing", "miss", "below",
    "underperform", "concern", "worry", "fear", "risk", "threat", "challenge",
    "pressure", "struggle", "difficulty", "problem", "issue", "negative",
    "pessimistic", "cautious", "downgrade", "sell", "underweight", "avoid",
];

const STRONG_BULLISH: &[&str] = &["surge", "soar", "skyrocket", "breakthrough", "record", "beat", "exceed"];
const STRONG_BEARISH: &[&str] = &["crash", "plunge", "plummet", "collapse", "devastating", "disaster"];

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w+\b").expect("word regex"));
static PERCENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+%").expect("percent regex"));
static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\d+|\d+\.\d+[BMK]?").expect("amount regex"));
static NEGATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:not|no|never)\s+(\w+)").expect("negation regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarity {
    Bullish,
    Bearish,
}

/// Whole-word lexicon lookup. Strong terms only count when they are also
/// in the base lists.
fn lookup(word: &str) -> Option<(Polarity, &'static str)> {
    BULLISH
        .iter()
        .find(|t| **t == word)
        .map(|t| (Polarity::Bullish, *t))
        .or_else(|| BEARISH.iter().find(|t| **t == word).map(|t| (Polarity::Bearish, *t)))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordTier;

impl KeywordTier {
    /// Pure function of `text`; never fails.
    pub fn score(&self, text: &str) -> f64 {
        let lower = text.to_lowercase();
        let words: Vec<&str> = WORD_RE.find_iter(&lower).map(|m| m.as_str()).collect();
        if words.is_empty() {
            return 0.0;
        }

        let mut bullish = 0.0;
        let mut bearish = 0.0;
        for word in &words {
            match lookup(word) {
                Some((Polarity::Bullish, term)) => {
                    bullish += if STRONG_BULLISH.contains(&term) { 2.0 } else { 1.0 };
                }
                Some((Polarity::Bearish, term)) => {
                    bearish += if STRONG_BEARISH.contains(&term) { 2.0 } else { 1.0 };
                }
                None => {}
            }
        }

        if PERCENT_RE.is_match(text) {
            if bullish > bearish {
                bullish *= 1.3;
            } else if bearish > bullish {
                bearish *= 1.3;
            }
        }

        if AMOUNT_RE.is_match(text) {
            bullish *= 1.1;
            bearish *= 1.1;
        }

        for cap in NEGATION_RE.captures_iter(&lower) {
            if matches!(lookup(&cap[1]), Some((Polarity::Bullish, _))) {
                bullish -= 1.5;
                bearish += 1.0;
            }
        }

        let total = words.len() as f64;
        ((bullish - bearish) / total * 2.0).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SentimentLabel;

    fn label(text: &str) -> SentimentLabel {
        SentimentLabel::from_score(KeywordTier.score(text))
    }

    #[test]
    fn test_headlines() {
        assert_eq!(
            label("Apple stock surges 5% after strong quarterly earnings beat expectations"),
            SentimentLabel::Positive
        );
        assert_eq!(
            label("Tesla shares plummet as investors worry about declining demand"),
            SentimentLabel::Negative
        );
        assert_eq!(label("Company schedules annual shareholder meeting"), SentimentLabel::Neutral);
    }

    #[test]
    fn test_negated_bullish_term_turns_bearish() {
        let score = KeywordTier.score("Results were not strong");
        assert!((score - -0.75).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn test_empty_and_symbol_only_text() {
        assert_eq!(KeywordTier.score(""), 0.0);
        assert_eq!(KeywordTier.score("   ?!  "), 0.0);
    }

    #[test]
    fn test_deterministic_and_bounded() {
        let text = "Record rally! Shares soar, surge, skyrocket past $100 target";
        let first = KeywordTier.score(text);
        assert_eq!(first, KeywordTier.score(text));
        assert!((-1.0..=1.0).contains(&first));
        assert_eq!(first, 1.0);
    }

    #[test]
    fn test_whole_words_only() {
        assert!(matches!(lookup("surge"), Some((Polarity::Bullish, "surge"))));
        assert_eq!(lookup("surges"), None);
        assert_eq!(lookup("recorded"), None);
        assert_eq!(lookup("issued"), None);
        assert_eq!(lookup("skyrocket"), None);

        assert_eq!(label("Company recorded a loss"), SentimentLabel::Negative);
        assert!((KeywordTier.score("Company recorded a loss") - -0.5).abs() < 1e-9);
        assert_eq!(KeywordTier.score("Apple issued new shares today"), 0.0);
    }
}
