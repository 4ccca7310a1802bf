//! Bounded global minimizer, DE/rand/1/bin scheme of Storn & Price (1997).

use log::debug;
use rand::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Differential evolution over a box-bounded parameter space.
///
/// The optimizer is stochastic; pass a `seed` to make a run reproducible,
/// leave it `None` to seed from OS entropy.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct DifferentialEvolution {
    /// Number of generations
    pub niterations: u32,
    /// Population members per free parameter
    pub population_factor: usize,
    /// Differential weight, usually called F
    pub mutation: f64,
    /// Crossover probability, usually called CR
    pub crossover: f64,
    pub seed: Option<u64>,
}

impl DifferentialEvolution {
    #[inline]
    pub fn default_niterations() -> u32 {
        300
    }

    #[inline]
    pub fn default_population_factor() -> usize {
        15
    }

    #[inline]
    pub fn default_mutation() -> f64 {
        0.8
    }

    #[inline]
    pub fn default_crossover() -> f64 {
        0.9
    }

    pub fn new(niterations: u32, seed: Option<u64>) -> Self {
        assert!(niterations > 0, "niterations must be positive");
        Self {
            niterations,
            seed,
            ..Self::default()
        }
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    /// Minimize `objective` inside `bounds`.
    ///
    /// Each bound must satisfy `lower < upper` and be finite; the objective
    /// may return non-finite values, they are treated as worse than any
    /// finite one.
    pub fn minimize<F>(&self, objective: F, bounds: &[(f64, f64)]) -> Minimum
    where
        F: Fn(&[f64]) -> f64,
    {
        assert!(!bounds.is_empty(), "at least one parameter is required");
        for &(lo, hi) in bounds {
            assert!(lo.is_finite() && hi.is_finite() && lo < hi, "invalid bound");
        }

        let dim = bounds.len();
        let pop_size = usize::max(4, self.population_factor * dim);
        let mut rng = self.rng();

        let mut population: Vec<Vec<f64>> = (0..pop_size)
            .map(|_| {
                bounds
                    .iter()
                    .map(|&(lo, hi)| rng.random_range(lo..hi))
                    .collect()
            })
            .collect();
        let mut costs: Vec<f64> = population.iter().map(|x| objective(x)).collect();

        let mut best_idx = argmin(&costs);
        let mut trial = vec![0.0; dim];
        let mut spread_collapsed = false;
        for generation in 0..self.niterations {
            for i in 0..pop_size {
                let (r1, r2, r3) = distinct_triple(&mut rng, pop_size, i);
                let j_rand = rng.random_range(0..dim);
                for j in 0..dim {
                    trial[j] = if j == j_rand || rng.random::<f64>() < self.crossover {
                        let v = population[r1][j]
                            + self.mutation * (population[r2][j] - population[r3][j]);
                        v.clamp(bounds[j].0, bounds[j].1)
                    } else {
                        population[i][j]
                    };
                }
                let trial_cost = objective(&trial);
                if better(trial_cost, costs[i]) {
                    population[i].copy_from_slice(&trial);
                    costs[i] = trial_cost;
                    if better(trial_cost, costs[best_idx]) {
                        best_idx = i;
                    }
                }
            }
            if converged(&costs) {
                debug!("converged after {} generations", generation + 1);
                spread_collapsed = true;
                break;
            }
        }

        Minimum {
            x: population[best_idx].clone(),
            cost: costs[best_idx],
            converged: spread_collapsed,
        }
    }
}

/// Outcome of one [`DifferentialEvolution::minimize`] run.
#[derive(Clone, Debug)]
pub struct Minimum {
    /// Best parameter vector found
    pub x: Vec<f64>,
    /// Objective value at `x`
    pub cost: f64,
    /// Whether the population-spread test fired before the generation budget
    /// ran out
    pub converged: bool,
}

impl Default for DifferentialEvolution {
    fn default() -> Self {
        Self {
            niterations: Self::default_niterations(),
            population_factor: Self::default_population_factor(),
            mutation: Self::default_mutation(),
            crossover: Self::default_crossover(),
            seed: None,
        }
    }
}

#[inline]
fn better(candidate: f64, incumbent: f64) -> bool {
    candidate < incumbent || (candidate.is_finite() && !incumbent.is_finite())
}

fn argmin(costs: &[f64]) -> usize {
    let mut best = 0;
    for (i, &c) in costs.iter().enumerate() {
        if better(c, costs[best]) {
            best = i;
        }
    }
    best
}

fn distinct_triple(rng: &mut StdRng, n: usize, exclude: usize) -> (usize, usize, usize) {
    let mut pick = |taken: &[usize]| loop {
        let r = rng.random_range(0..n);
        if r != exclude && !taken.contains(&r) {
            return r;
        }
    };
    let r1 = pick(&[]);
    let r2 = pick(&[r1]);
    let r3 = pick(&[r1, r2]);
    (r1, r2, r3)
}

/// Relative spread of the population costs has collapsed
fn converged(costs: &[f64]) -> bool {
    let finite: Vec<f64> = costs.iter().copied().filter(|c| c.is_finite()).collect();
    if finite.len() < costs.len() {
        return false;
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    let var = finite.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / finite.len() as f64;
    var.sqrt() <= 1e-8 + 0.01 * mean.abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn minimizes_quadratic_bowl() {
        let opt = DifferentialEvolution::new(200, Some(0));
        let minimum = opt.minimize(
            |p| (p[0] - 1.5).powi(2) + 2.0 * (p[1] + 0.5).powi(2),
            &[(-10.0, 10.0), (-10.0, 10.0)],
        );
        assert_relative_eq!(minimum.x[0], 1.5, epsilon = 1e-2);
        assert_relative_eq!(minimum.x[1], -0.5, epsilon = 1e-2);
        assert!(minimum.cost < 1e-3);
    }

    #[test]
    fn escapes_local_minimum_of_rastrigin() {
        let opt = DifferentialEvolution::new(500, Some(1));
        let rastrigin = |p: &[f64]| {
            10.0 * p.len() as f64
                + p.iter()
                    .map(|&x| x * x - 10.0 * (std::f64::consts::TAU * x).cos())
                    .sum::<f64>()
        };
        let minimum = opt.minimize(rastrigin, &[(-5.12, 5.12), (-5.12, 5.12)]);
        assert!(minimum.cost < 1e-2, "cost {} at {:?}", minimum.cost, minimum.x);
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let opt = DifferentialEvolution::new(50, Some(42));
        let objective = |p: &[f64]| p[0].powi(2);
        let first = opt.minimize(objective, &[(-1.0, 1.0)]);
        let second = opt.minimize(objective, &[(-1.0, 1.0)]);
        assert_eq!(first.x, second.x);
        assert_eq!(first.cost, second.cost);
    }

    #[test]
    fn respects_bounds() {
        let opt = DifferentialEvolution::new(100, Some(3));
        // unconstrained minimum lies at -3, outside the box
        let minimum = opt.minimize(|p| (p[0] + 3.0).powi(2), &[(0.0, 1.0)]);
        assert!((0.0..=1.0).contains(&minimum.x[0]));
        assert_relative_eq!(minimum.x[0], 0.0, epsilon = 1e-3);
    }

    #[test]
    fn convergence_flag_tracks_population_spread() {
        // an easy bowl collapses the population well inside the budget
        let opt = DifferentialEvolution::new(500, Some(5));
        let minimum = opt.minimize(|p| p[0].powi(2), &[(-1.0, 1.0)]);
        assert!(minimum.converged);

        // a single generation cannot collapse a random population
        let opt = DifferentialEvolution::new(1, Some(5));
        let minimum = opt.minimize(|p| p[0].powi(2), &[(-1.0, 1.0)]);
        assert!(!minimum.converged);
    }

    #[test]
    #[should_panic(expected = "invalid bound")]
    fn rejects_inverted_bounds() {
        DifferentialEvolution::default().minimize(|p| p[0], &[(1.0, -1.0)]);
    }
}
