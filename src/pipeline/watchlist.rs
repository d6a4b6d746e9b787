use crate::config::AppConfig;
use crate::error::ConfigError;
use crate::models::Ticker;
use parking_lot::RwLock;
use tracing::info;

/// The set of tickers collected each cycle. Edits take effect from the next
/// cycle's snapshot.
#[derive(Debug, Default)]
pub struct Watchlist {
    tickers: RwLock<Vec<Ticker>>,
}

impl Watchlist {
    pub fn new(tickers: Vec<Ticker>) -> Self {
        let mut unique: Vec<Ticker> = Vec::with_capacity(tickers.len());
        for t in tickers {
            if !unique.contains(&t) {
                unique.push(t);
            }
        }
        Self {
            tickers: RwLock::new(unique),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.tickers()?))
    }

    /// Returns false if the ticker was already watched.
    pub fn add(&self, raw: &str) -> Result<bool, ConfigError> {
        let ticker = Ticker::parse(raw)?;
        let mut tickers = self.tickers.write();
        if tickers.contains(&ticker) {
            return Ok(false);
        }
        info!("Watching {}", ticker);
        tickers.push(ticker);
        Ok(true)
    }

    /// Stored articles are kept. Returns false if the ticker was not watched.
    pub fn remove(&self, ticker: &Ticker) -> bool {
        let mut tickers = self.tickers.write();
        let before = tickers.len();
        tickers.retain(|t| t != ticker);
        let removed = tickers.len() != before;
        if removed {
            info!("No longer watching {}", ticker);
        }
        removed
    }

    pub fn snapshot(&self) -> Vec<Ticker> {
        self.tickers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.tickers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove() {
        let list = Watchlist::new(vec![Ticker::parse("AAPL").unwrap(), Ticker::parse("aapl").unwrap()]);
        assert_eq!(list.len(), 1);

        assert!(list.add("msft").unwrap());
        assert!(!list.add("MSFT").unwrap());
        assert!(list.add("not a ticker").is_err());

        let snap = list.snapshot();
        assert!(list.remove(&Ticker::parse("AAPL").unwrap()));
        assert!(!list.remove(&Ticker::parse("AAPL").unwrap()));

        assert_eq!(snap.len(), 2);
        assert_eq!(list.snapshot(), vec![Ticker::parse("MSFT").unwrap()]);
    }
}
