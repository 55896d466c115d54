//! Fitness function contract for the NES optimizers.
//!
//! The optimizer never inspects an objective beyond calling it: the
//! genotype is an opaque parameter vector and the returned fitness is an
//! opaque scalar.  Non-finite fitnesses are tolerated and cured by the
//! ranking machinery.

extern crate rayon;

use self::rayon::prelude::*;

/// Scores genotypes.  Implemented for free by any
/// `Fn(&[f64]) -> f64 + Send + Sync` closure.
pub trait Objective: Send + Sync {
    /// Scores a single genotype.
    fn fitness(&self, genotype: &[f64]) -> f64;

    /// Scores a whole population at once, returning one fitness per
    /// genotype in the same order.  Invoked instead of `fitness` when an
    /// optimizer is built with `parallel_fit`; the default maps `fitness`
    /// sequentially.
    fn fitness_all(&self, genotypes: &[Vec<f64>]) -> Vec<f64> {
        genotypes.iter().map(|g| self.fitness(g)).collect()
    }
}

impl<F> Objective for F
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn fitness(&self, genotype: &[f64]) -> f64 {
        self(genotype)
    }
}

/// Scores populations with a rayon thread pool.  The optimizer treats the
/// call as opaque and blocking; ordering of the returned fitnesses matches
/// the input population.
pub struct ParallelFit<F: Objective>(
    /// The wrapped single-genotype objective.
    pub F,
);

impl<F: Objective> Objective for ParallelFit<F> {
    fn fitness(&self, genotype: &[f64]) -> f64 {
        self.0.fitness(genotype)
    }

    fn fitness_all(&self, genotypes: &[Vec<f64>]) -> Vec<f64> {
        genotypes.par_iter().map(|g| self.0.fitness(g)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum_of_squares(genotype: &[f64]) -> f64 {
        genotype.iter().map(|x| x * x).sum()
    }

    #[test]
    fn test_closure_objective() {
        let obj = |g: &[f64]| g.iter().sum::<f64>();
        assert_eq!(obj.fitness(&[1.0, 2.0, 3.0]), 6.0);
        let batch = obj.fitness_all(&[vec![1.0], vec![2.0, 2.0]]);
        assert_eq!(batch, vec![1.0, 4.0]);
    }

    #[test]
    fn test_parallel_fit_preserves_order() {
        let genotypes: Vec<Vec<f64>> = (0..64).map(|i| vec![i as f64, 1.0]).collect();
        let serial = sum_of_squares.fitness_all(&genotypes);
        let parallel = ParallelFit(sum_of_squares).fitness_all(&genotypes);
        assert_eq!(serial, parallel);
    }
}
