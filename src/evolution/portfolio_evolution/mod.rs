use rand::Rng;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consts::{DEFAULT_RISK_FREE_RATE, MIN_ELITE_COUNT};
use crate::evolution::aggregator::{Aggregator, AggregatorError, ArithmeticMean, Maximum};
use crate::evolution::objective::{
    compute_portfolio_performance, OptimizationObjective, PenalizedMeanVariance,
};
use crate::market_data::MarketStatistics;
use crate::portfolio::Portfolio;

pub mod constraints;
pub mod operators;

pub use constraints::{BoundsEnforcement, WeightConstraints};
pub use operators::{
    create_individual, crossover, generate_offsprings, initialize_population, mutate,
    tournament_selection, Mutation,
};

#[derive(Error, Debug)]
pub enum EvolutionError {
    #[error("Invalid population parameters were passed: {0}")]
    BadPopulationParameter(String),
    #[error("Invalid weight bounds [{min}, {max}], need 0 <= min < max <= 1")]
    BadWeightBounds { min: f64, max: f64 },
    #[error("Invalid operator parameter: {0}")]
    BadOperatorParameter(String),
    #[error("Could not summarize generation fitness")]
    Aggregation(#[from] AggregatorError),
    #[error("Could not build the evaluation thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

fn default_max_concurrency() -> usize {
    num_cpus::get()
}

/// Hyperparameters of a run. Every field has a default, so a config file only
/// needs to list what it changes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EvolutionConfig {
    pub population_size: usize,
    pub generations: usize,
    pub min_weight: f64,
    pub max_weight: f64,
    pub bounds_enforcement: BoundsEnforcement,
    pub concentration_penalty: f64,
    pub tournament_size: usize,
    pub mutation_rate: f64,
    pub mutation_strength: f64,
    pub elite_fraction: f64,
    pub frontier_sample_count: usize,
    pub random_seed: u64,
    pub risk_free_rate: f64,
    pub max_concurrency: usize,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        EvolutionConfig {
            population_size: 150,
            generations: 300,
            min_weight: 0.05,
            max_weight: 0.50,
            bounds_enforcement: BoundsEnforcement::ClipAndRenormalize,
            concentration_penalty: 0.3,
            tournament_size: 5,
            mutation_rate: 0.3,
            mutation_strength: 0.15,
            elite_fraction: 0.1,
            frontier_sample_count: 300,
            random_seed: 42,
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl EvolutionConfig {
    pub fn validate(&self) -> Result<(), EvolutionError> {
        if self.population_size == 0 {
            return Err(EvolutionError::BadPopulationParameter(
                "Population size cannot be zero".into(),
            ));
        }
        if self.generations == 0 {
            return Err(EvolutionError::BadPopulationParameter(
                "Number of generations cannot be zero".into(),
            ));
        }
        let bounds_ok = self.min_weight.is_finite()
            && self.max_weight.is_finite()
            && 0.0 <= self.min_weight
            && self.min_weight < self.max_weight
            && self.max_weight <= 1.0;
        if !bounds_ok {
            return Err(EvolutionError::BadWeightBounds {
                min: self.min_weight,
                max: self.max_weight,
            });
        }
        if !(self.concentration_penalty.is_finite() && self.concentration_penalty >= 0.0) {
            return Err(EvolutionError::BadOperatorParameter(format!(
                "concentration penalty must be non-negative, got {}",
                self.concentration_penalty
            )));
        }
        if self.tournament_size == 0 {
            return Err(EvolutionError::BadOperatorParameter(
                "tournament size must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.elite_fraction) {
            return Err(EvolutionError::BadOperatorParameter(format!(
                "elite fraction must be within [0, 1], got {}",
                self.elite_fraction
            )));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(EvolutionError::BadOperatorParameter(
                "risk-free rate must be finite".into(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(EvolutionError::BadOperatorParameter(
                "max concurrency must be at least 1".into(),
            ));
        }
        // rate and strength are checked where the operator is built
        Mutation::new(self.mutation_rate, self.mutation_strength).map(|_| ())
    }

    pub fn constraints(&self) -> WeightConstraints {
        WeightConstraints {
            min_weight: self.min_weight,
            max_weight: self.max_weight,
            enforcement: self.bounds_enforcement,
        }
    }

    /// `max(2, floor(elite_fraction * population_size))`, never more than the population.
    pub fn elite_count(&self) -> usize {
        let proportional = ((self.population_size as f64) * self.elite_fraction) as usize;
        proportional.max(MIN_ELITE_COUNT).min(self.population_size)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct GenerationRecord {
    /// 1-based generation index.
    pub generation: usize,
    pub best_fitness: f64,
    pub average_fitness: f64,
}

/// Contains summary statistics for the final population after evolution.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct FinalPopulationSummary {
    pub best_fitness: f64,
    pub population_average_fitness: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EvolutionResult {
    pub best_portfolio: Portfolio,
    pub history: Vec<GenerationRecord>,
    pub final_summary: FinalPopulationSummary,
}

/// Runs the genetic algorithm with the penalized mean-variance objective.
pub fn evolve_portfolio<R: Rng + ?Sized>(
    statistics: &MarketStatistics,
    risk_aversion: f64,
    config: &EvolutionConfig,
    rng: &mut R,
) -> Result<EvolutionResult, EvolutionError> {
    let objective = PenalizedMeanVariance {
        risk_aversion,
        concentration_penalty: config.concentration_penalty,
    };
    evolve_with_objective(statistics, &objective, config, rng)
}

/// Fixed-budget generational search: evaluate, record, keep the elites, breed the
/// rest, repeat for `config.generations` generations. The final population is
/// evaluated once more to pick the winner.
pub fn evolve_with_objective<R, O>(
    statistics: &MarketStatistics,
    objective: &O,
    config: &EvolutionConfig,
    rng: &mut R,
) -> Result<EvolutionResult, EvolutionError>
where
    R: Rng + ?Sized,
    O: OptimizationObjective,
{
    config.validate()?;

    // Common Enough to Alias
    let assets_under_management = statistics.asset_count();
    let population_size = config.population_size;
    let generations = config.generations;
    let constraints = config.constraints();
    let mutation = Mutation::new(config.mutation_rate, config.mutation_strength)?;

    let elite_population_size = config.elite_count();
    let offspring_count = population_size - elite_population_size;

    if config.tournament_size > population_size {
        warn!(
            tournament_size = config.tournament_size,
            population_size, "Tournament size exceeds population size, every tournament sees the whole population."
        );
    }
    if !constraints.is_feasible(assets_under_management) {
        warn!(
            assets_under_management,
            min_weight = config.min_weight,
            max_weight = config.max_weight,
            "Weight bounds cannot hold for this many assets, weights will still sum to one."
        );
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.max_concurrency)
        .build()?;

    info!(
        assets_under_management,
        population_size,
        generations,
        elite_population_size,
        "starting portfolio evolution"
    );

    let mut population =
        initialize_population(rng, population_size, assets_under_management, &constraints)?;
    let mut history = Vec::with_capacity(generations);

    for generation in 1..=generations {
        let fitness = evaluate_population_fitness(&pool, &population, statistics, objective);

        let record = GenerationRecord {
            generation,
            best_fitness: Maximum.value(&fitness)?,
            average_fitness: ArithmeticMean.value(&fitness)?,
        };
        debug!(
            generation,
            best_fitness = record.best_fitness,
            average_fitness = record.average_fitness,
            "generation evaluated"
        );
        history.push(record);

        // Adding Elites (Exploitation)
        let mut next_generation = select_elites(&population, &fitness, elite_population_size);

        let offsprings = generate_offsprings(
            rng,
            &population,
            &fitness,
            offspring_count,
            config.tournament_size,
            &constraints,
            &mutation,
        );
        next_generation.extend(offsprings);
        population = next_generation;
    }

    // --- Final Evaluation After the Loop ---
    let fitness = evaluate_population_fitness(&pool, &population, statistics, objective);
    let best_index = index_of_best(&fitness);
    let final_summary = FinalPopulationSummary {
        best_fitness: fitness[best_index],
        population_average_fitness: ArithmeticMean.value(&fitness)?,
    };

    let best_weights = population.swap_remove(best_index);
    let performance = compute_portfolio_performance(&best_weights, statistics, objective);

    info!(
        fitness = performance.fitness,
        expected_return = performance.expected_return,
        risk = performance.risk,
        "portfolio evolution finished"
    );

    Ok(EvolutionResult {
        best_portfolio: Portfolio::new(best_weights, performance),
        history,
        final_summary,
    })
}

// Scores are independent per member, so the parallel map yields the same vector
// as a sequential one regardless of thread count.
fn evaluate_population_fitness<O: OptimizationObjective>(
    pool: &ThreadPool,
    population: &[Vec<f64>],
    statistics: &MarketStatistics,
    objective: &O,
) -> Vec<f64> {
    pool.install(|| {
        population
            .par_iter()
            .map(|weights| objective.compute(weights, statistics))
            .collect()
    })
}

/// Top `count` members by fitness. The sort is stable, so exact ties keep the
/// lower index first.
fn select_elites(population: &[Vec<f64>], fitness: &[f64], count: usize) -> Vec<Vec<f64>> {
    let mut ranked = (0..population.len()).collect::<Vec<usize>>();
    ranked.sort_by(|&a, &b| fitness[b].total_cmp(&fitness[a]));
    ranked
        .into_iter()
        .take(count)
        .map(|i| population[i].clone())
        .collect()
}

// first index wins exact ties
fn index_of_best(fitness: &[f64]) -> usize {
    fitness
        .iter()
        .enumerate()
        .fold(0, |best, (i, &f)| if f > fitness[best] { i } else { best })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::objective::evaluate;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn three_assets() -> MarketStatistics {
        MarketStatistics::new(
            vec!["A".into(), "B".into(), "C".into()],
            vec![0.08, 0.12, 0.20],
            vec![
                vec![0.02, 0.004, 0.002],
                vec![0.004, 0.05, 0.01],
                vec![0.002, 0.01, 0.12],
            ],
        )
        .unwrap()
    }

    fn small_config() -> EvolutionConfig {
        EvolutionConfig {
            population_size: 30,
            generations: 25,
            max_concurrency: 2,
            ..EvolutionConfig::default()
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = EvolutionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.elite_count(), 15);
    }

    #[test]
    fn test_elite_count_floor_of_two() {
        let config = EvolutionConfig {
            population_size: 10,
            ..EvolutionConfig::default()
        };
        assert_eq!(config.elite_count(), 2);

        let tiny = EvolutionConfig {
            population_size: 1,
            ..EvolutionConfig::default()
        };
        assert_eq!(tiny.elite_count(), 1);
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        let bad = [
            EvolutionConfig {
                population_size: 0,
                ..EvolutionConfig::default()
            },
            EvolutionConfig {
                generations: 0,
                ..EvolutionConfig::default()
            },
            EvolutionConfig {
                min_weight: 0.6,
                max_weight: 0.5,
                ..EvolutionConfig::default()
            },
            EvolutionConfig {
                max_weight: 1.5,
                ..EvolutionConfig::default()
            },
            EvolutionConfig {
                tournament_size: 0,
                ..EvolutionConfig::default()
            },
            EvolutionConfig {
                mutation_rate: -0.1,
                ..EvolutionConfig::default()
            },
            EvolutionConfig {
                mutation_strength: 0.0,
                ..EvolutionConfig::default()
            },
            EvolutionConfig {
                elite_fraction: 1.1,
                ..EvolutionConfig::default()
            },
            EvolutionConfig {
                concentration_penalty: -1.0,
                ..EvolutionConfig::default()
            },
        ];
        for config in bad.iter() {
            assert!(config.validate().is_err(), "{config:?} should be rejected");
        }
    }

    #[test]
    fn test_config_deserializes_partial_json() {
        let config: EvolutionConfig =
            serde_json::from_str(r#"{"generations": 10, "bounds_enforcement": "project"}"#)
                .unwrap();
        assert_eq!(config.generations, 10);
        assert_eq!(config.bounds_enforcement, BoundsEnforcement::Project);
        assert_eq!(config.population_size, 150);

        let typo = serde_json::from_str::<EvolutionConfig>(r#"{"generation": 10}"#);
        assert!(typo.is_err(), "unknown fields must be rejected");
    }

    #[test]
    fn test_select_elites_takes_the_fittest() {
        let population = vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]];
        let fitness = vec![0.5, 2.0, 2.0, -1.0];
        let elites = select_elites(&population, &fitness, 3);
        assert_eq!(elites, vec![vec![2.0], vec![3.0], vec![1.0]]);
        assert_eq!(index_of_best(&fitness), 1);
    }

    #[test]
    fn test_history_length_and_best_is_non_decreasing() {
        let stats = three_assets();
        let config = small_config();
        let mut rng = ChaCha20Rng::seed_from_u64(config.random_seed);
        let result = evolve_portfolio(&stats, 0.5, &config, &mut rng).unwrap();

        assert_eq!(result.history.len(), config.generations);
        for (i, record) in result.history.iter().enumerate() {
            assert_eq!(record.generation, i + 1);
            assert!(record.best_fitness >= record.average_fitness);
        }
        for pair in result.history.windows(2) {
            assert!(
                pair[0].best_fitness <= pair[1].best_fitness,
                "best fitness regressed between generations {} and {}",
                pair[0].generation,
                pair[1].generation
            );
        }
        assert!(result.final_summary.best_fitness >= result.history.last().unwrap().best_fitness);
    }

    #[test]
    fn test_best_portfolio_performance_is_consistent() {
        let stats = three_assets();
        let config = small_config();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let result = evolve_portfolio(&stats, 1.0, &config, &mut rng).unwrap();

        let best = &result.best_portfolio;
        let (ret, risk) = evaluate(&best.weights, &stats);
        assert_eq!(best.performance.expected_return, ret);
        assert_eq!(best.performance.risk, risk);
        assert_eq!(best.performance.fitness, result.final_summary.best_fitness);
        let sum: f64 = best.weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_same_seed_same_result_for_any_thread_count() {
        let stats = three_assets();
        let config = small_config();

        let first =
            evolve_portfolio(&stats, 0.5, &config, &mut ChaCha20Rng::seed_from_u64(99)).unwrap();
        let single_threaded = EvolutionConfig {
            max_concurrency: 1,
            ..config.clone()
        };
        let second = evolve_portfolio(
            &stats,
            0.5,
            &single_threaded,
            &mut ChaCha20Rng::seed_from_u64(99),
        )
        .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_projection_keeps_the_winner_in_bounds() {
        let stats = three_assets();
        let config = EvolutionConfig {
            bounds_enforcement: BoundsEnforcement::Project,
            ..small_config()
        };
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let result = evolve_portfolio(&stats, 0.2, &config, &mut rng).unwrap();
        for w in result.best_portfolio.weights.iter() {
            assert!(*w >= config.min_weight - 1e-9 && *w <= config.max_weight + 1e-9);
        }
    }

    #[test]
    fn test_invalid_config_aborts_before_evolving() {
        let config = EvolutionConfig {
            population_size: 0,
            ..EvolutionConfig::default()
        };
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        assert!(matches!(
            evolve_portfolio(&three_assets(), 0.5, &config, &mut rng),
            Err(EvolutionError::BadPopulationParameter(_))
        ));
    }
}
