//! Fixed-variance Natural Evolution Strategies.
//!
//! Reuses the radial distribution but only the mean moves; the variance
//! set at construction is never touched.  Intended for problems where
//! step-size adaptation is undesirable or premature.

use nalgebra::DVector;

use crate::objective::Objective;
use crate::rnes::Rnes;
use crate::snapshot::Snapshot;
use crate::strategy::{Best, NesConfig, NesError, Optimization, ScoreLog, SearchDistribution};

/// Mean-only NES optimizer over a fixed radial distribution.
pub struct Fnes<F> {
    inner: Rnes<F>,
}

impl<F: Objective> Fnes<F> {
    /// Builds a new optimizer over `ndims` parameters.
    pub fn new(
        ndims: usize,
        obj: F,
        opt_type: Optimization,
        config: NesConfig,
    ) -> Result<Self, NesError> {
        Ok(Fnes {
            inner: Rnes::new(ndims, obj, opt_type, config)?,
        })
    }

    /// The fixed variance term.
    pub fn variance(&self) -> f64 {
        self.inner.variance()
    }
}

impl<F: Objective> SearchDistribution for Fnes<F> {
    fn ndims(&self) -> usize {
        self.inner.ndims()
    }

    fn popsize(&self) -> usize {
        self.inner.popsize()
    }

    fn mu(&self) -> DVector<f64> {
        self.inner.mu()
    }

    fn train(&mut self) {
        let picks = self.inner.sorted_inds();
        self.inner.update_mu(&picks);
        let variance = self.inner.variance;
        self.inner.base.log.insert("convergence", variance);
    }

    /// The fixed variance; constant for the life of the optimizer.
    fn convergence(&self) -> f64 {
        self.inner.convergence()
    }

    fn best(&self) -> &Best {
        self.inner.best()
    }

    fn last_fits(&self) -> &[f64] {
        self.inner.last_fits()
    }

    fn train_log(&self) -> &ScoreLog {
        self.inner.train_log()
    }

    fn save(&self) -> Snapshot {
        self.inner.save()
    }

    fn load(&mut self, snapshot: &Snapshot) -> Result<(), NesError> {
        self.inner.load(snapshot)
    }
}
