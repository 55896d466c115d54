//! Radial Natural Evolution Strategies: a single shared variance.
//!
//! The covariance is `variance * I`; the radial gradient reduces the
//! population to one scalar, making this the cheapest adaptive variant.

use nalgebra::{DMatrix, DVector};

use crate::objective::Objective;
use crate::snapshot::Snapshot;
use crate::strategy::{
    evaluate, Best, Init, NesConfig, NesError, NesState, Optimization, ScoreLog,
    SearchDistribution,
};

/// Scalar-variance NES optimizer.
pub struct Rnes<F> {
    pub(crate) base: NesState,
    obj: F,
    pub(crate) variance: f64,
}

impl<F: Objective> Rnes<F> {
    /// Builds a new optimizer over `ndims` parameters.
    pub fn new(
        ndims: usize,
        obj: F,
        opt_type: Optimization,
        config: NesConfig,
    ) -> Result<Self, NesError> {
        let base = NesState::new(ndims, opt_type, &config)?;
        let variance = match &config.sigma_init {
            Init::Scalar(s) if *s > 0.0 => *s,
            _ => {
                return Err(NesError::Config(
                    "sigma_init must be a positive scalar".to_string(),
                ));
            }
        };
        Ok(Rnes {
            base,
            obj,
            variance,
        })
    }

    /// Current shared variance term.
    pub fn variance(&self) -> f64 {
        self.variance
    }

    fn move_inds(&self, samples: &DMatrix<f64>) -> DMatrix<f64> {
        DMatrix::from_fn(samples.nrows(), samples.ncols(), |r, c| {
            self.base.mu[c] + self.variance * samples[(r, c)]
        })
    }

    pub(crate) fn sorted_inds(&mut self) -> DMatrix<f64> {
        let samples = self.base.sample_matrix();
        let inds = self.move_inds(&samples);
        let fits = evaluate(&self.obj, &inds, self.base.parallel_fit);
        self.base.rank(&samples, &inds, fits)
    }

    // Mean update shared with the fixed-variance variant.
    pub(crate) fn update_mu(&mut self, picks: &DMatrix<f64>) {
        let g_mu = picks.tr_mul(&self.base.utils);
        self.base.mu += g_mu * (self.variance * self.base.lrate);
    }
}

impl<F: Objective> SearchDistribution for Rnes<F> {
    fn ndims(&self) -> usize {
        self.base.ndims
    }

    fn popsize(&self) -> usize {
        self.base.popsize
    }

    fn mu(&self) -> DVector<f64> {
        self.base.mu.clone()
    }

    fn train(&mut self) {
        let picks = self.sorted_inds();
        let g_sigma: f64 = (0..self.base.popsize)
            .map(|i| self.base.utils[i] * (picks.row(i).norm_squared() - self.base.ndims as f64))
            .sum();
        self.update_mu(&picks);
        self.variance *= (g_sigma * self.base.lrate / 2.0).exp();
        let variance = self.variance;
        self.base.log.insert("convergence", variance);
    }

    /// The shared variance itself.
    fn convergence(&self) -> f64 {
        self.variance
    }

    fn best(&self) -> &Best {
        &self.base.best
    }

    fn last_fits(&self) -> &[f64] {
        &self.base.last_fits
    }

    fn train_log(&self) -> &ScoreLog {
        &self.base.log
    }

    fn save(&self) -> Snapshot {
        Snapshot::Scalar {
            mean: self.base.mu.iter().cloned().collect(),
            variance: self.variance,
        }
    }

    fn load(&mut self, snapshot: &Snapshot) -> Result<(), NesError> {
        match snapshot {
            Snapshot::Scalar { mean, variance } if mean.len() == self.base.ndims => {
                self.base.mu = DVector::from_vec(mean.clone());
                self.variance = *variance;
                Ok(())
            }
            _ => Err(NesError::SnapshotMismatch(format!(
                "expected a scalar-covariance snapshot of {} dims",
                self.base.ndims
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sphere_min(g: &[f64]) -> f64 {
        g.iter().map(|x| x * x).sum()
    }

    fn sphere_max(g: &[f64]) -> f64 {
        -g.iter().map(|x| x * x).sum::<f64>()
    }

    fn seeded(seed: u64) -> NesConfig {
        NesConfig {
            seed: Some(seed),
            mu_init: Init::Scalar(1.0),
            ..NesConfig::default()
        }
    }

    #[test]
    fn test_requires_scalar_sigma() {
        let config = NesConfig {
            sigma_init: Init::Vector(vec![1.0, 1.0]),
            ..seeded(1)
        };
        assert!(Rnes::new(2, sphere_min, Optimization::Min, config).is_err());

        let config = NesConfig {
            sigma_init: Init::Scalar(-1.0),
            ..seeded(1)
        };
        assert!(Rnes::new(2, sphere_min, Optimization::Min, config).is_err());
    }

    #[test]
    fn test_deterministic_runs() {
        let mut a = Rnes::new(5, sphere_min, Optimization::Min, seeded(3)).unwrap();
        let mut b = Rnes::new(5, sphere_min, Optimization::Min, seeded(3)).unwrap();
        for _ in 0..5 {
            a.train();
            b.train();
        }
        assert_eq!(a.save(), b.save());
    }

    #[test]
    fn test_save_load_round_trip() {
        let mut a = Rnes::new(5, sphere_min, Optimization::Min, seeded(1)).unwrap();
        for _ in 0..3 {
            a.train();
        }
        let a_dump = a.save();
        let mut b = Rnes::new(5, sphere_min, Optimization::Min, seeded(2)).unwrap();
        b.load(&a_dump).unwrap();
        assert_eq!(a_dump, b.save());
    }

    #[test]
    fn test_load_allows_resuming() {
        let mut straight = Rnes::new(5, sphere_min, Optimization::Min, seeded(1)).unwrap();
        for _ in 0..4 {
            straight.train();
        }
        let mut nes = Rnes::new(5, sphere_min, Optimization::Min, seeded(1)).unwrap();
        for _ in 0..2 {
            nes.train();
        }
        let halfway = nes.save();
        nes.load(&halfway).unwrap();
        for _ in 0..2 {
            nes.train();
        }
        assert_eq!(straight.save(), nes.save());
    }

    #[test]
    fn test_optimizes_sphere_min() {
        let mut nes = Rnes::new(5, sphere_min, Optimization::Min, seeded(1)).unwrap();
        for _ in 0..180 {
            nes.train();
        }
        assert!(nes.mu().iter().all(|v| v.abs() < 1e-2));
        assert!(nes.convergence() < 1e-2);
    }

    #[test]
    fn test_optimizes_sphere_max() {
        let mut nes = Rnes::new(5, sphere_max, Optimization::Max, seeded(1)).unwrap();
        for _ in 0..180 {
            nes.train();
        }
        assert!(nes.mu().iter().all(|v| v.abs() < 1e-2));
        assert!(nes.convergence() < 1e-2);
    }
}
