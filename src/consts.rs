pub const FLOAT_COMPARISON_EPSILON: f64 = 1e-9;

// Annualization factor for daily return series
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;

// Elitism never keeps fewer than this many portfolios (unless the population is smaller)
pub const MIN_ELITE_COUNT: usize = 2;

// Bisection steps for the capped simplex projection, enough to hit f64 resolution
pub const PROJECTION_BISECTION_STEPS: usize = 200;
