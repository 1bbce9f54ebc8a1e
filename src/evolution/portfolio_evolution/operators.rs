use rand::distributions::{Distribution, Uniform};
use rand::seq::index;
use rand::Rng;
use statrs::distribution::Normal;
use tracing::trace;

use super::constraints::{normalize, WeightConstraints};
use super::EvolutionError;

/// Random long-only portfolio: uniform draws, normalized, then pushed into the bounds.
pub fn create_individual<R: Rng + ?Sized>(
    rng: &mut R,
    assets_under_management: usize,
    constraints: &WeightConstraints,
) -> Vec<f64> {
    let uniform = Uniform::new(0., 1.);
    let draws = (0..assets_under_management)
        .map(|_| uniform.sample(rng))
        .collect::<Vec<f64>>();

    let weights = normalize(draws)
        .unwrap_or_else(|| vec![1. / assets_under_management as f64; assets_under_management]);
    constraints.enforce(&weights).unwrap_or(weights)
}

pub fn initialize_population<R: Rng + ?Sized>(
    rng: &mut R,
    population_size: usize,
    assets_under_management: usize,
    constraints: &WeightConstraints,
) -> Result<Vec<Vec<f64>>, EvolutionError> {
    if population_size == 0 && assets_under_management == 0 {
        return Err(EvolutionError::BadPopulationParameter(
            "Both population size and assets under management are zero, but none are supposed to be.".into(),
        ));
    } else if population_size == 0 {
        return Err(EvolutionError::BadPopulationParameter(
            "Population size cannot be zero".into(),
        ));
    } else if assets_under_management == 0 {
        return Err(EvolutionError::BadPopulationParameter(
            "Assets under management cannot be zero".into(),
        ));
    }

    Ok((0..population_size)
        .map(|_| create_individual(rng, assets_under_management, constraints))
        .collect())
}

/// Draws `k` distinct members and returns a copy of the fittest one.
/// On exact ties the contestant drawn first wins.
pub fn tournament_selection<R: Rng + ?Sized>(
    rng: &mut R,
    population: &[Vec<f64>],
    fitness: &[f64],
    k: usize,
) -> Vec<f64> {
    debug_assert!(!population.is_empty(), "tournament over an empty population");
    debug_assert_eq!(population.len(), fitness.len());

    // k larger than the population degrades to "pick the best of everyone"
    let contestants = index::sample(rng, population.len(), k.clamp(1, population.len()));

    let winner = contestants
        .iter()
        .skip(1)
        .fold(contestants.index(0), |best, challenger| {
            if fitness[challenger] > fitness[best] {
                challenger
            } else {
                best
            }
        });
    population[winner].clone()
}

/// Blend crossover with an independent mixing weight per asset.
pub fn crossover<R: Rng + ?Sized>(
    rng: &mut R,
    parent_1: &[f64],
    parent_2: &[f64],
    constraints: &WeightConstraints,
) -> Vec<f64> {
    let child = parent_1
        .iter()
        .zip(parent_2.iter())
        .map(|(&weight_1, &weight_2)| {
            let alpha: f64 = rng.gen_range(0.0..1.0);
            alpha * weight_1 + (1.0 - alpha) * weight_2
        })
        .collect::<Vec<f64>>();

    match constraints.enforce(&child) {
        Some(child) => child,
        None => {
            trace!("crossover produced an all-zero child, replacing it");
            create_individual(rng, parent_1.len(), constraints)
        }
    }
}

/// Mutation probability and the Gaussian used for the noise operator.
#[derive(Debug, Clone)]
pub struct Mutation {
    rate: f64,
    noise: Normal,
}

impl Mutation {
    pub fn new(rate: f64, strength: f64) -> Result<Self, EvolutionError> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(EvolutionError::BadOperatorParameter(format!(
                "mutation rate must be within [0, 1], got {rate}"
            )));
        }
        if !(strength.is_finite() && strength > 0.0) {
            return Err(EvolutionError::BadOperatorParameter(format!(
                "mutation strength must be positive, got {strength}"
            )));
        }
        let noise = Normal::new(0.0, strength)
            .map_err(|e| EvolutionError::BadOperatorParameter(e.to_string()))?;
        Ok(Mutation { rate, noise })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

/// Applies at most one mutation: either swap two allocations or add Gaussian
/// noise to one allocation (floored at the minimum weight), each with even odds.
/// Single-asset portfolios can only take the noise operator.
pub fn mutate<R: Rng + ?Sized>(
    rng: &mut R,
    mut weights: Vec<f64>,
    constraints: &WeightConstraints,
    mutation: &Mutation,
) -> Vec<f64> {
    if !rng.gen_bool(mutation.rate) {
        return weights;
    }

    let assets = weights.len();
    if assets > 1 && rng.gen_bool(0.5) {
        let picked = index::sample(rng, assets, 2);
        weights.swap(picked.index(0), picked.index(1));
    } else {
        let i = rng.gen_range(0..assets);
        let change = mutation.noise.sample(rng);
        weights[i] = (weights[i] + change).max(constraints.min_weight);
    }

    match constraints.enforce(&weights) {
        Some(weights) => weights,
        None => {
            trace!("mutation produced an all-zero portfolio, replacing it");
            create_individual(rng, assets, constraints)
        }
    }
}

/// Tournament, crossover and mutation until `offspring_count` children exist.
/// Elites stay in the mating pool.
pub fn generate_offsprings<R: Rng + ?Sized>(
    rng: &mut R,
    population: &[Vec<f64>],
    fitness: &[f64],
    offspring_count: usize,
    tournament_size: usize,
    constraints: &WeightConstraints,
    mutation: &Mutation,
) -> Vec<Vec<f64>> {
    let mut offsprings = Vec::with_capacity(offspring_count);

    while offsprings.len() < offspring_count {
        let parent_1 = tournament_selection(rng, population, fitness, tournament_size);
        let parent_2 = tournament_selection(rng, population, fitness, tournament_size);

        let child_weights = crossover(rng, &parent_1, &parent_2, constraints);

        // Toss a coin and stochastically mutate weights based on rate
        offsprings.push(mutate(rng, child_weights, constraints, mutation));
    }
    offsprings
}
