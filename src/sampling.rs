use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::evolution::objective::{evaluate, sharpe_ratio};
use crate::evolution::portfolio_evolution::{create_individual, WeightConstraints};
use crate::market_data::MarketStatistics;
use crate::portfolio::Portfolio;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
    #[serde(rename = "return")]
    pub expected_return: f64,
    pub risk: f64,
    #[serde(rename = "sharpe")]
    pub sharpe_ratio: f64,
    pub is_optimal: bool,
}

/// Random feasible portfolios drawn under the same bounds as the search, used to
/// plot the risk/return cloud the optimum sits in. The samples say nothing about
/// the search trajectory.
#[derive(Debug, Clone)]
pub struct FrontierSampler<'a> {
    statistics: &'a MarketStatistics,
    constraints: WeightConstraints,
    sample_count: usize,
    risk_free_rate: f64,
}

impl<'a> FrontierSampler<'a> {
    pub fn new(
        statistics: &'a MarketStatistics,
        constraints: WeightConstraints,
        sample_count: usize,
        risk_free_rate: f64,
    ) -> Self {
        FrontierSampler {
            statistics,
            constraints,
            sample_count,
            risk_free_rate,
        }
    }

    /// `sample_count` random points followed by exactly one point for `optimum`,
    /// the only one flagged `is_optimal`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, optimum: &Portfolio) -> Vec<FrontierPoint> {
        let assets = self.statistics.asset_count();
        let mut points = (0..self.sample_count)
            .map(|_| {
                let weights = create_individual(rng, assets, &self.constraints);
                let (expected_return, risk) = evaluate(&weights, self.statistics);
                self.point(expected_return, risk, false)
            })
            .collect::<Vec<_>>();

        points.push(self.point(
            optimum.performance.expected_return,
            optimum.performance.risk,
            true,
        ));
        points
    }

    fn point(&self, expected_return: f64, risk: f64, is_optimal: bool) -> FrontierPoint {
        FrontierPoint {
            expected_return,
            risk,
            sharpe_ratio: sharpe_ratio(expected_return, risk, self.risk_free_rate),
            is_optimal,
        }
    }
}
