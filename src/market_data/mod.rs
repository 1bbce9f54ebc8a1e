//! Market statistics consumed by the optimizer.
//!
//! Providers fetch closing prices for the asset universe, the [`PriceTable`] aligns
//! them on common dates, and [`MarketStatistics`] turns the aligned table into the
//! annualized mean-return vector and covariance matrix the evolution runs against.

use chrono::NaiveDate;
use nalgebra::{DMatrix, DVector};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

use crate::consts::TRADING_DAYS_PER_YEAR;

pub mod csv_prices;
pub mod yahoo;

pub use csv_prices::CsvPriceProvider;
pub use yahoo::YahooChartProvider;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("failed to read price file {}", .path.display())]
    PriceFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed price CSV")]
    Csv(#[from] csv::Error),
    #[error("price request failed")]
    Http(#[from] reqwest::Error),
    #[error("price source returned an error for `{ticker}`: {message}")]
    Source { ticker: String, message: String },
    #[error("no price data found for ticker `{0}`")]
    MissingTicker(String),
    #[error("invalid date `{0}` in price data")]
    InvalidDate(String),
    #[error("duplicate date {0} in price data")]
    DuplicateDate(NaiveDate),
    #[error("invalid price `{value}` for `{ticker}` on {date}")]
    InvalidPrice {
        ticker: String,
        date: NaiveDate,
        value: String,
    },
    #[error("no prices on or after {0}")]
    NoPricesSince(NaiveDate),
    #[error("not enough price history: {0} return observations, need at least 2")]
    InsufficientHistory(usize),
    #[error("malformed statistics: {0}")]
    MalformedStatistics(String),
}

/// Something that can produce closing prices for a list of tickers.
pub trait StatisticsProvider {
    async fn fetch_prices(
        &self,
        tickers: &[String],
        start_date: NaiveDate,
    ) -> Result<PriceTable, DataError>;

    async fn statistics(
        &self,
        tickers: &[String],
        start_date: NaiveDate,
    ) -> Result<MarketStatistics, DataError> {
        let prices = self.fetch_prices(tickers, start_date).await?;
        if prices.is_empty() {
            return Err(DataError::NoPricesSince(start_date));
        }
        debug!(
            rows = prices.len(),
            assets = tickers.len(),
            "fetched price table"
        );
        MarketStatistics::from_prices(&prices)
    }
}

/// Closing prices, one row per date and one column per ticker.
/// A `None` cell means the source had no price for that ticker on that date.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    tickers: Vec<String>,
    dates: Vec<NaiveDate>,
    prices: Vec<Vec<Option<f64>>>,
}

impl PriceTable {
    pub fn new(
        tickers: Vec<String>,
        mut rows: Vec<(NaiveDate, Vec<Option<f64>>)>,
    ) -> Result<Self, DataError> {
        rows.sort_by_key(|(date, _)| *date);

        for window in rows.windows(2) {
            if window[0].0 == window[1].0 {
                return Err(DataError::DuplicateDate(window[0].0));
            }
        }

        for (date, row) in rows.iter() {
            if row.len() != tickers.len() {
                return Err(DataError::MalformedStatistics(format!(
                    "row for {} has {} prices but there are {} tickers",
                    date,
                    row.len(),
                    tickers.len()
                )));
            }
            for (ticker, price) in tickers.iter().zip(row.iter()) {
                if let Some(price) = price {
                    if !price.is_finite() || *price <= 0.0 {
                        return Err(DataError::InvalidPrice {
                            ticker: ticker.clone(),
                            date: *date,
                            value: price.to_string(),
                        });
                    }
                }
            }
        }

        let (dates, prices) = rows.into_iter().unzip();
        Ok(PriceTable {
            tickers,
            dates,
            prices,
        })
    }

    /// Outer-joins per-ticker series on date. Dates missing from a series become `None`.
    pub fn from_series(
        tickers: &[String],
        series: Vec<Vec<(NaiveDate, f64)>>,
    ) -> Result<Self, DataError> {
        let mut by_date: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();
        for (column, points) in series.into_iter().enumerate() {
            for (date, price) in points {
                by_date.entry(date).or_insert_with(|| vec![None; tickers.len()])[column] =
                    Some(price);
            }
        }
        PriceTable::new(tickers.to_vec(), by_date.into_iter().collect())
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Rows where every ticker has a price, in date order.
    pub fn complete_rows(&self) -> Vec<Vec<f64>> {
        self.prices
            .iter()
            .filter_map(|row| row.iter().copied().collect::<Option<Vec<f64>>>())
            .collect()
    }

    /// Simple daily returns between consecutive complete rows.
    pub fn daily_returns(&self) -> Vec<Vec<f64>> {
        self.complete_rows()
            .windows(2)
            .map(|pair| {
                pair[1]
                    .iter()
                    .zip(pair[0].iter())
                    .map(|(today, yesterday)| today / yesterday - 1.0)
                    .collect()
            })
            .collect()
    }
}

/// Annualized expected returns and covariance for an ordered asset universe.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketStatistics {
    tickers: Vec<String>,
    mean_returns: DVector<f64>,
    covariance: DMatrix<f64>,
}

impl MarketStatistics {
    pub fn new(
        tickers: Vec<String>,
        mean_returns: Vec<f64>,
        covariance: Vec<Vec<f64>>,
    ) -> Result<Self, DataError> {
        let n = tickers.len();
        if covariance.len() != n || covariance.iter().any(|row| row.len() != n) {
            return Err(DataError::MalformedStatistics(format!(
                "covariance matrix must be {n}x{n}"
            )));
        }
        let covariance = DMatrix::from_fn(n, n, |i, j| covariance[i][j]);
        Self::from_parts(tickers, DVector::from_vec(mean_returns), covariance)
    }

    pub fn from_parts(
        tickers: Vec<String>,
        mean_returns: DVector<f64>,
        covariance: DMatrix<f64>,
    ) -> Result<Self, DataError> {
        let n = tickers.len();
        if n == 0 {
            return Err(DataError::MalformedStatistics(
                "statistics need at least one asset".into(),
            ));
        }
        if mean_returns.len() != n {
            return Err(DataError::MalformedStatistics(format!(
                "expected {} mean returns, got {}",
                n,
                mean_returns.len()
            )));
        }
        if covariance.nrows() != n || covariance.ncols() != n {
            return Err(DataError::MalformedStatistics(format!(
                "covariance matrix must be {n}x{n}"
            )));
        }
        if mean_returns.iter().chain(covariance.iter()).any(|x| !x.is_finite()) {
            return Err(DataError::MalformedStatistics(
                "statistics contain non-finite values".into(),
            ));
        }

        // Enforce exact symmetry, sample covariances can drift in the last bits
        let covariance = (&covariance + covariance.transpose()) * 0.5;

        Ok(MarketStatistics {
            tickers,
            mean_returns,
            covariance,
        })
    }

    /// Mean daily return and sample covariance (n - 1 denominator), both scaled by
    /// 252 trading days.
    pub fn from_prices(prices: &PriceTable) -> Result<Self, DataError> {
        let returns = prices.daily_returns();
        if returns.len() < 2 {
            return Err(DataError::InsufficientHistory(returns.len()));
        }

        let n = prices.tickers().len();
        let columns: Vec<Vec<f64>> = (0..n)
            .map(|asset| returns.iter().map(|row| row[asset]).collect())
            .collect();

        let mean_returns = DVector::from_iterator(
            n,
            columns
                .iter()
                .map(|column| column.iter().mean() * TRADING_DAYS_PER_YEAR),
        );
        let covariance = DMatrix::from_fn(n, n, |i, j| {
            columns[i].iter().covariance(columns[j].iter()) * TRADING_DAYS_PER_YEAR
        });

        Self::from_parts(prices.tickers().to_vec(), mean_returns, covariance)
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn asset_count(&self) -> usize {
        self.tickers.len()
    }

    pub fn mean_returns(&self) -> &DVector<f64> {
        &self.mean_returns
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }
}
