use serde::{Deserialize, Serialize};

use crate::consts::PROJECTION_BISECTION_STEPS;

/// How per-asset bounds are restored after an operator moved the weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundsEnforcement {
    /// Clip every weight into `[min, max]`, then rescale to sum to one.
    /// Cheap, but rescaling can push weights back out of bounds.
    #[default]
    ClipAndRenormalize,
    /// Euclidean projection onto `{w : sum(w) = 1, min <= w_i <= max}`.
    /// Falls back to clipping when that set is empty.
    Project,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightConstraints {
    pub min_weight: f64,
    pub max_weight: f64,
    pub enforcement: BoundsEnforcement,
}

impl WeightConstraints {
    /// True when some weight vector of length `n` can satisfy both the bounds and
    /// the budget.
    pub fn is_feasible(&self, n: usize) -> bool {
        let n = n as f64;
        n * self.min_weight <= 1.0 && 1.0 <= n * self.max_weight
    }

    /// Restores the budget (sum to one, always) and the bounds (best effort).
    ///
    /// Returns `None` when the weights collapse to zero, callers replace the
    /// vector with a fresh individual.
    pub fn enforce(&self, weights: &[f64]) -> Option<Vec<f64>> {
        match self.enforcement {
            BoundsEnforcement::ClipAndRenormalize => self.clip_and_renormalize(weights),
            BoundsEnforcement::Project => {
                if self.is_feasible(weights.len()) {
                    Some(self.project(weights))
                } else {
                    self.clip_and_renormalize(weights)
                }
            }
        }
    }

    pub fn clip_and_renormalize(&self, weights: &[f64]) -> Option<Vec<f64>> {
        let clipped = weights
            .iter()
            .map(|w| w.clamp(self.min_weight, self.max_weight).max(0.0))
            .collect::<Vec<f64>>();
        normalize(clipped)
    }

    // Find the shift `theta` such that sum(clamp(w_i - theta, min, max)) = 1.
    // The sum is non-increasing in theta, so bisection converges; at the lower end
    // every weight sits at max and at the upper end every weight sits at min.
    fn project(&self, weights: &[f64]) -> Vec<f64> {
        let shifted_sum = |theta: f64| -> f64 {
            weights
                .iter()
                .map(|w| (w - theta).clamp(self.min_weight, self.max_weight))
                .sum()
        };

        let lowest = weights.iter().copied().fold(f64::INFINITY, f64::min);
        let highest = weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut low = lowest - self.max_weight;
        let mut high = highest - self.min_weight;

        for _ in 0..PROJECTION_BISECTION_STEPS {
            let mid = 0.5 * (low + high);
            if shifted_sum(mid) > 1.0 {
                low = mid;
            } else {
                high = mid;
            }
        }

        let theta = 0.5 * (low + high);
        let projected = weights
            .iter()
            .map(|w| (w - theta).clamp(self.min_weight, self.max_weight))
            .collect::<Vec<f64>>();

        // bisection leaves an error in the last bits, close the budget exactly
        normalize(projected.clone()).unwrap_or(projected)
    }
}

/// Rescales non-negative weights to sum to one, `None` if they sum to zero.
pub fn normalize(mut weights: Vec<f64>) -> Option<Vec<f64>> {
    let total = weights.iter().sum::<f64>();
    if total == 0.0 || !total.is_finite() {
        return None;
    }
    weights.iter_mut().for_each(|w| *w /= total);
    Some(weights)
}
