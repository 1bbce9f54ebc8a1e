//! Genetic-algorithm portfolio allocation.
//!
//! [`optimize`] runs the search over precomputed [`MarketStatistics`];
//! [`run`] fetches prices through a [`StatisticsProvider`] first. Both either
//! return a complete [`OptimizationReport`] or a [`RunError`].

use chrono::NaiveDate;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use thiserror::Error;
use tracing::info;

pub mod consts;
pub mod evolution;
pub mod market_data;
pub mod portfolio;
pub mod report;
pub mod sampling;

pub use evolution::portfolio_evolution::{EvolutionConfig, EvolutionError, EvolutionResult};
pub use market_data::{DataError, MarketStatistics, StatisticsProvider};
pub use portfolio::{AssetUniverse, UniverseError};
pub use report::{Envelope, OptimizationReport};

use evolution::portfolio_evolution::evolve_portfolio;
use sampling::FrontierSampler;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("invalid asset universe")]
    Universe(#[from] UniverseError),
    #[error("invalid risk aversion `{0}`, expected a finite number")]
    RiskAversion(f64),
    #[error("invalid optimization parameters")]
    Evolution(#[from] EvolutionError),
    #[error("failed to fetch market data")]
    DataAcquisition(#[from] DataError),
}

impl RunError {
    /// Malformed invocation rather than a failure of the data source.
    pub fn is_input_error(&self) -> bool {
        !matches!(self, RunError::DataAcquisition(_))
    }
}

/// Evolves the allocation and samples the frontier from one RNG seeded with
/// `config.random_seed`, so identical inputs give identical reports.
pub fn optimize(
    statistics: &MarketStatistics,
    risk_aversion: f64,
    config: &EvolutionConfig,
) -> Result<OptimizationReport, RunError> {
    if !risk_aversion.is_finite() {
        return Err(RunError::RiskAversion(risk_aversion));
    }
    config.validate()?;

    let mut rng = ChaCha20Rng::seed_from_u64(config.random_seed);
    let evolution = evolve_portfolio(statistics, risk_aversion, config, &mut rng)?;

    let sampler = FrontierSampler::new(
        statistics,
        config.constraints(),
        config.frontier_sample_count,
        config.risk_free_rate,
    );
    let frontier = sampler.sample(&mut rng, &evolution.best_portfolio);

    Ok(OptimizationReport::new(
        statistics.tickers(),
        &evolution,
        frontier,
    ))
}

/// Validates the invocation, fetches statistics for `universe` and optimizes.
/// Input problems are reported before any data is requested.
pub async fn run<P: StatisticsProvider>(
    provider: &P,
    universe: &AssetUniverse,
    start_date: NaiveDate,
    risk_aversion: f64,
    config: &EvolutionConfig,
) -> Result<OptimizationReport, RunError> {
    if !risk_aversion.is_finite() {
        return Err(RunError::RiskAversion(risk_aversion));
    }
    config.validate()?;

    let statistics = provider.statistics(universe.tickers(), start_date).await?;
    info!(
        assets = statistics.asset_count(),
        risk_aversion, "market statistics ready"
    );
    optimize(&statistics, risk_aversion, config)
}
