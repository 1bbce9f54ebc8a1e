use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::consts::FLOAT_COMPARISON_EPSILON;
use crate::market_data::MarketStatistics;

/// Anything that can score a weight vector against fixed market statistics.
/// Higher is better.
pub trait OptimizationObjective: std::fmt::Debug + Send + Sync {
    fn compute(&self, weights: &[f64], statistics: &MarketStatistics) -> f64;
}

/// Mean-variance utility with a Herfindahl concentration penalty:
/// `return - risk_aversion * risk - concentration_penalty * sum(w_i^2)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenalizedMeanVariance {
    pub risk_aversion: f64,
    pub concentration_penalty: f64,
}

impl OptimizationObjective for PenalizedMeanVariance {
    fn compute(&self, weights: &[f64], statistics: &MarketStatistics) -> f64 {
        let (expected_return, risk) = evaluate(weights, statistics);
        fitness_from_parts(
            expected_return,
            risk,
            concentration_index(weights),
            self.risk_aversion,
            self.concentration_penalty,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPerformance {
    pub expected_return: f64,
    pub risk: f64,
    pub concentration_index: f64,
    pub fitness: f64,
}

/// Expected return (`w . mu`) and volatility (`sqrt(w' S w)`).
///
/// The quadratic form is clamped at zero before the square root, rounding can push
/// it slightly negative for near-singular covariance matrices.
pub fn evaluate(weights: &[f64], statistics: &MarketStatistics) -> (f64, f64) {
    let weights = DVector::from_column_slice(weights);
    let expected_return = weights.dot(statistics.mean_returns());
    let variance = (statistics.covariance() * &weights).dot(&weights);
    (expected_return, variance.max(0.0).sqrt())
}

/// Sum of squared weights, 1/N for an equal split and 1 for a single asset.
pub fn concentration_index(weights: &[f64]) -> f64 {
    weights.iter().map(|w| w * w).sum()
}

pub fn fitness(
    weights: &[f64],
    statistics: &MarketStatistics,
    risk_aversion: f64,
    concentration_penalty: f64,
) -> f64 {
    PenalizedMeanVariance {
        risk_aversion,
        concentration_penalty,
    }
    .compute(weights, statistics)
}

fn fitness_from_parts(
    expected_return: f64,
    risk: f64,
    concentration: f64,
    risk_aversion: f64,
    concentration_penalty: f64,
) -> f64 {
    expected_return - risk_aversion * risk - concentration_penalty * concentration
}

pub fn compute_portfolio_performance(
    weights: &[f64],
    statistics: &MarketStatistics,
    objective: &dyn OptimizationObjective,
) -> PortfolioPerformance {
    let (expected_return, risk) = evaluate(weights, statistics);
    PortfolioPerformance {
        expected_return,
        risk,
        concentration_index: concentration_index(weights),
        fitness: objective.compute(weights, statistics),
    }
}

pub fn sharpe_ratio(expected_return: f64, risk: f64, risk_free_rate: f64) -> f64 {
    if risk.abs() >= FLOAT_COMPARISON_EPSILON {
        (expected_return - risk_free_rate) / risk
    } else {
        // riskless portfolio, the ratio is meaningless
        0.
    }
}
