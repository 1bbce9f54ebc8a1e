pub mod aggregator;
pub mod objective;
pub mod portfolio_evolution;
