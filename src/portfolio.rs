use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::evolution::objective::PortfolioPerformance;

#[derive(Error, Debug, PartialEq)]
pub enum UniverseError {
    #[error("at least one ticker is required")]
    Empty,
    #[error("ticker #{0} is blank")]
    BlankTicker(usize),
    #[error("ticker `{0}` is listed more than once")]
    DuplicateTicker(String),
}

/// Ordered, duplicate-free list of tickers. Its order fixes the meaning of every
/// weight vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetUniverse(Vec<String>);

impl AssetUniverse {
    pub fn new(tickers: Vec<String>) -> Result<Self, UniverseError> {
        if tickers.is_empty() {
            return Err(UniverseError::Empty);
        }
        let mut seen = HashSet::new();
        for (position, ticker) in tickers.iter().enumerate() {
            if ticker.trim().is_empty() {
                return Err(UniverseError::BlankTicker(position + 1));
            }
            if !seen.insert(ticker.as_str()) {
                return Err(UniverseError::DuplicateTicker(ticker.clone()));
            }
        }
        Ok(AssetUniverse(tickers))
    }

    /// Parses a comma-separated list such as `"BBCA.JK,ADRO.JK,ANTM.JK"`.
    pub fn parse(raw: &str) -> Result<Self, UniverseError> {
        Self::new(raw.split(',').map(|t| t.trim().to_string()).collect())
    }

    pub fn tickers(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub weights: Vec<f64>,
    pub performance: PortfolioPerformance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub ticker: String,
    pub weight: f64,
}

impl Portfolio {
    pub fn new(weights: Vec<f64>, performance: PortfolioPerformance) -> Self {
        Portfolio {
            weights,
            performance,
        }
    }

    /// Weights keyed by ticker, largest first. Equal weights keep universe order.
    pub fn allocations(&self, tickers: &[String]) -> Vec<Allocation> {
        let mut allocations = tickers
            .iter()
            .zip(self.weights.iter())
            .map(|(ticker, &weight)| Allocation {
                ticker: ticker.clone(),
                weight,
            })
            .collect::<Vec<_>>();
        allocations.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        allocations
    }
}
