//! Separable Natural Evolution Strategies: diagonal-covariance adaptation.
//!
//! One variance term per dimension, updated multiplicatively in the log
//! domain.  Per-step cost is linear in `ndims`, against the quadratic and
//! cubic costs of the full-covariance variant.

use nalgebra::{DMatrix, DVector};

use crate::objective::Objective;
use crate::snapshot::Snapshot;
use crate::strategy::{
    evaluate, Best, Init, NesConfig, NesError, NesState, Optimization, ScoreLog,
    SearchDistribution,
};

/// Diagonal-covariance NES optimizer.
pub struct Snes<F> {
    base: NesState,
    obj: F,
    variances: DVector<f64>,
}

impl<F: Objective> Snes<F> {
    /// Builds a new optimizer over `ndims` parameters.
    pub fn new(
        ndims: usize,
        obj: F,
        opt_type: Optimization,
        config: NesConfig,
    ) -> Result<Self, NesError> {
        let base = NesState::new(ndims, opt_type, &config)?;
        let variances = match &config.sigma_init {
            Init::Scalar(s) if *s > 0.0 => DVector::from_element(ndims, *s),
            Init::Vector(vs) if vs.len() == ndims && vs.iter().all(|&v| v > 0.0) => {
                DVector::from_vec(vs.clone())
            }
            _ => {
                return Err(NesError::Config(
                    "sigma_init must be a positive scalar or one positive value per dimension"
                        .to_string(),
                ));
            }
        };
        Ok(Snes {
            base,
            obj,
            variances,
        })
    }

    /// Current per-dimension variance terms.
    pub fn variances(&self) -> &DVector<f64> {
        &self.variances
    }

    // mu + diag(variances) . x, without materializing the diagonal.
    fn move_inds(&self, samples: &DMatrix<f64>) -> DMatrix<f64> {
        DMatrix::from_fn(samples.nrows(), samples.ncols(), |r, c| {
            self.base.mu[c] + self.variances[c] * samples[(r, c)]
        })
    }

    fn sorted_inds(&mut self) -> DMatrix<f64> {
        let samples = self.base.sample_matrix();
        let inds = self.move_inds(&samples);
        let fits = evaluate(&self.obj, &inds, self.base.parallel_fit);
        self.base.rank(&samples, &inds, fits)
    }
}

impl<F: Objective> SearchDistribution for Snes<F> {
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
        let g_mu = picks.tr_mul(&self.base.utils);
        let g_sigma = picks.map(|v| v * v - 1.0).tr_mul(&self.base.utils);
        self.base.mu += self.variances.component_mul(&g_mu) * self.base.lrate;
        for (v, g) in self.variances.iter_mut().zip(g_sigma.iter()) {
            *v *= (g * self.base.lrate / 2.0).exp();
        }
        let total = self.variances.sum();
        self.base.log.insert("convergence", total);
    }

    /// Total variance across dimensions.
    fn convergence(&self) -> f64 {
        self.variances.sum()
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
        Snapshot::Diagonal {
            mean: self.base.mu.iter().cloned().collect(),
            variances: self.variances.iter().cloned().collect(),
        }
    }

    fn load(&mut self, snapshot: &Snapshot) -> Result<(), NesError> {
        match snapshot {
            Snapshot::Diagonal { mean, variances }
                if mean.len() == self.base.ndims && variances.len() == self.base.ndims =>
            {
                self.base.mu = DVector::from_vec(mean.clone());
                self.variances = DVector::from_vec(variances.clone());
                Ok(())
            }
            _ => Err(NesError::SnapshotMismatch(format!(
                "expected a diagonal-covariance snapshot of {} dims",
                self.base.ndims
            ))),
        }
    }
}
