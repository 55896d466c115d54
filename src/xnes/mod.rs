//! Exponential Natural Evolution Strategies: full-covariance adaptation.
//!
//! The covariance update is integrated in the log domain and mapped back
//! through an eigendecomposition-based matrix exponential.  Working on
//! `log_sigma` keeps `sigma` symmetric positive-definite without repeated
//! Cholesky or eigendecomposition of an additively-updated covariance.

use nalgebra::{DMatrix, DVector};

use crate::objective::Objective;
use crate::snapshot::Snapshot;
use crate::strategy::{
    evaluate, Best, Init, NesConfig, NesError, NesState, Optimization, ScoreLog,
    SearchDistribution,
};

// exp(M) for symmetric M: diagonalize, exponentiate eigenvalues,
// reconstitute.
pub(crate) fn sym_exp(m: &DMatrix<f64>) -> DMatrix<f64> {
    let eig = m.clone().symmetric_eigen();
    let exp_vals = eig.eigenvalues.map(f64::exp);
    &eig.eigenvectors * DMatrix::from_diagonal(&exp_vals) * eig.eigenvectors.transpose()
}

// log(M) for symmetric positive-definite M.
fn sym_log(m: &DMatrix<f64>) -> Result<DMatrix<f64>, NesError> {
    let eig = m.clone().symmetric_eigen();
    if eig.eigenvalues.iter().any(|&v| v <= 0.0) {
        return Err(NesError::Config(
            "sigma_init must be positive-definite".to_string(),
        ));
    }
    let log_vals = eig.eigenvalues.map(f64::ln);
    Ok(&eig.eigenvectors * DMatrix::from_diagonal(&log_vals) * eig.eigenvectors.transpose())
}

/// Full-covariance NES optimizer.
pub struct Xnes<F> {
    base: NesState,
    obj: F,
    sigma: DMatrix<f64>,
    log_sigma: DMatrix<f64>,
    eye: DMatrix<f64>,
}

impl<F: Objective> Xnes<F> {
    /// Builds a new optimizer over `ndims` parameters.
    pub fn new(
        ndims: usize,
        obj: F,
        opt_type: Optimization,
        config: NesConfig,
    ) -> Result<Self, NesError> {
        let base = NesState::new(ndims, opt_type, &config)?;
        let (sigma, log_sigma) = match &config.sigma_init {
            Init::Scalar(s) => {
                if *s <= 0.0 {
                    return Err(NesError::Config("sigma_init must be positive".to_string()));
                }
                (
                    DMatrix::from_diagonal_element(ndims, ndims, *s),
                    DMatrix::from_diagonal_element(ndims, ndims, s.ln()),
                )
            }
            Init::Vector(vs) => {
                if vs.len() != ndims {
                    return Err(NesError::Config(format!(
                        "sigma_init has {} entries, expected {}",
                        vs.len(),
                        ndims
                    )));
                }
                if vs.iter().any(|&v| v <= 0.0) {
                    return Err(NesError::Config("sigma_init must be positive".to_string()));
                }
                let diag = DVector::from_vec(vs.clone());
                (
                    DMatrix::from_diagonal(&diag),
                    DMatrix::from_diagonal(&diag.map(f64::ln)),
                )
            }
            Init::Matrix(rows) => {
                if rows.len() != ndims || rows.iter().any(|r| r.len() != ndims) {
                    return Err(NesError::Config(format!(
                        "sigma_init must be a {0}x{0} matrix",
                        ndims
                    )));
                }
                let sigma =
                    DMatrix::from_fn(ndims, ndims, |r, c| rows[r][c]);
                let log_sigma = sym_log(&sigma)?;
                (sigma, log_sigma)
            }
        };
        Ok(Xnes {
            base,
            obj,
            sigma,
            log_sigma,
            eye: DMatrix::identity(ndims, ndims),
        })
    }

    /// Current covariance matrix.
    pub fn sigma(&self) -> &DMatrix<f64> {
        &self.sigma
    }

    // Moves standard-normal samples onto the current distribution:
    // one individual per row, `mu + sigma . x`.
    pub(crate) fn move_inds(&self, samples: &DMatrix<f64>) -> DMatrix<f64> {
        let mut inds = samples * self.sigma.transpose();
        for mut row in inds.row_iter_mut() {
            row += self.base.mu.transpose();
        }
        inds
    }

    fn sorted_inds(&mut self) -> DMatrix<f64> {
        let samples = self.base.sample_matrix();
        let inds = self.move_inds(&samples);
        let fits = evaluate(&self.obj, &inds, self.base.parallel_fit);
        self.base.rank(&samples, &inds, fits)
    }

    // One natural-gradient step from pre-sorted samples.  Split out from
    // `train` so the block composite can rank globally and update blocks
    // locally.
    pub(crate) fn train_on(&mut self, picks: &DMatrix<f64>) {
        let g_mu = picks.tr_mul(&self.base.utils);
        let mut g_log_sigma = DMatrix::zeros(self.base.ndims, self.base.ndims);
        for i in 0..self.base.popsize {
            let ind = picks.row(i);
            let outer = ind.transpose() * ind;
            g_log_sigma += (outer - &self.eye) * self.base.utils[i];
        }
        self.base.mu += &self.sigma * g_mu * self.base.lrate;
        self.log_sigma += g_log_sigma * (self.base.lrate / 2.0);
        self.sigma = sym_exp(&self.log_sigma);
        let trace = self.sigma.trace();
        self.base.log.insert("convergence", trace);
    }

    pub(crate) fn sample_block(&mut self) -> DMatrix<f64> {
        self.base.sample_matrix()
    }

    pub(crate) fn set_popsize(&mut self, popsize: usize) {
        self.base.set_popsize(popsize);
    }
}

impl<F: Objective> SearchDistribution for Xnes<F> {
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
        self.train_on(&picks);
    }

    /// Total variance, as the trace of the covariance.
    fn convergence(&self) -> f64 {
        self.sigma.trace()
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
        Snapshot::Full {
            mean: self.base.mu.iter().cloned().collect(),
            log_cov: self
                .log_sigma
                .row_iter()
                .map(|r| r.iter().cloned().collect())
                .collect(),
        }
    }

    fn load(&mut self, snapshot: &Snapshot) -> Result<(), NesError> {
        match snapshot {
            Snapshot::Full { mean, log_cov }
                if mean.len() == self.base.ndims
                    && log_cov.len() == self.base.ndims
                    && log_cov.iter().all(|r| r.len() == self.base.ndims) =>
            {
                self.base.mu = DVector::from_vec(mean.clone());
                self.log_sigma =
                    DMatrix::from_fn(self.base.ndims, self.base.ndims, |r, c| log_cov[r][c]);
                self.sigma = sym_exp(&self.log_sigma);
                Ok(())
            }
            _ => Err(NesError::SnapshotMismatch(format!(
                "expected a full-covariance snapshot of {} dims",
                self.base.ndims
            ))),
        }
    }
}
