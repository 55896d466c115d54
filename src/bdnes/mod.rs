//! Block-Diagonal Natural Evolution Strategies.
//!
//! Owns a list of independent XNES blocks, each adapting the covariance of
//! a disjoint contiguous slice of the genotype.  The population is a
//! single unit for fitness: complete individuals are assembled from the
//! per-block slices, scored by the shared objective, ranked globally, and
//! the sorted standard-normal samples are split back into per-block slices
//! for each block's own natural-gradient step.
//!
//! Blocks never score anything on their own; only complete genotypes are
//! ever evaluated.  Each block draws from its own sub-seeded sample stream
//! so runs stay deterministic while blocks remain decorrelated.
//!
//! Blocks train sequentially; a parallel block-update mode is an extension
//! point deliberately left unimplemented.

use nalgebra::{DMatrix, DVector};

use crate::objective::Objective;
use crate::sampler::GaussStream;
use crate::snapshot::Snapshot;
use crate::strategy::{
    cure_fits, evaluate, rank_order, Best, Init, NesConfig, NesError, Optimization, ScoreLog,
    SearchDistribution,
};
use crate::xnes::Xnes;

// Placeholder objective for blocks.  Never invoked: block training only
// ever consumes pre-sorted samples from the composite.
struct BlockObjective;

impl Objective for BlockObjective {
    fn fitness(&self, _genotype: &[f64]) -> f64 {
        unreachable!("blocks are only scored as complete genotypes")
    }
}

/// Block-diagonal composite NES optimizer.
pub struct Bdnes<F> {
    ndims_lst: Vec<usize>,
    total_dims: usize,
    blocks: Vec<Xnes<BlockObjective>>,
    obj: F,
    opt_type: Optimization,
    parallel_fit: bool,
    popsize: usize,
    best: Best,
    last_fits: Vec<f64>,
    log: ScoreLog,
}

impl<F: Objective> Bdnes<F> {
    /// Builds a composite over blocks of the given sizes.  The objective
    /// always receives complete genotypes of `ndims_lst.iter().sum()`
    /// parameters, regardless of the block division.
    ///
    /// `mu_init` and `sigma_init` must be scalars; they are broadcast to
    /// every block.
    pub fn new(
        ndims_lst: &[usize],
        obj: F,
        opt_type: Optimization,
        config: NesConfig,
    ) -> Result<Self, NesError> {
        if ndims_lst.is_empty() {
            return Err(NesError::Config("ndims_lst must not be empty".to_string()));
        }
        match (&config.mu_init, &config.sigma_init) {
            (Init::Scalar(_), Init::Scalar(_)) => (),
            _ => {
                return Err(NesError::Config(
                    "block composites only broadcast scalar mu_init/sigma_init".to_string(),
                ));
            }
        }

        // One sub-seed per block: deterministic from the master seed, yet
        // decorrelated across blocks.
        let mut master = match config.seed {
            Some(seed) => GaussStream::new(seed),
            None => GaussStream::from_entropy(),
        };
        let blocks = ndims_lst
            .iter()
            .map(|&ndims| {
                let block_config = NesConfig {
                    seed: Some(master.next_seed()),
                    parallel_fit: false,
                    ..config.clone()
                };
                Xnes::new(ndims, BlockObjective, opt_type, block_config)
            })
            .collect::<Result<Vec<_>, _>>()?;

        // All blocks must produce population-aligned sample matrices.
        let popsize = blocks.iter().map(|b| b.popsize()).fold(0, usize::max);
        let mut composite = Bdnes {
            ndims_lst: ndims_lst.to_vec(),
            total_dims: ndims_lst.iter().sum(),
            blocks,
            obj,
            opt_type,
            parallel_fit: config.parallel_fit,
            popsize,
            best: Best::new(opt_type),
            last_fits: Vec::new(),
            log: ScoreLog::new(),
        };
        for block in composite.blocks.iter_mut() {
            block.set_popsize(popsize);
        }
        Ok(composite)
    }

    /// Sizes of the covariance blocks, in genotype order.
    pub fn ndims_lst(&self) -> &[usize] {
        &self.ndims_lst
    }

    // Samples every block, scores complete genotypes, ranks globally, and
    // returns each block's slice of the sorted standard-normal samples.
    fn sorted_block_inds(&mut self) -> Vec<DMatrix<f64>> {
        let samples: Vec<DMatrix<f64>> = self
            .blocks
            .iter_mut()
            .map(|block| block.sample_block())
            .collect();

        // Assemble complete individuals, block slices side by side.
        let mut full_inds = DMatrix::zeros(self.popsize, self.total_dims);
        let mut offset = 0;
        for (block, block_samples) in self.blocks.iter().zip(&samples) {
            let inds = block.move_inds(block_samples);
            full_inds
                .view_mut((0, offset), (self.popsize, block.ndims()))
                .copy_from(&inds);
            offset += block.ndims();
        }

        let mut fits = evaluate(&self.obj, &full_inds, self.parallel_fit);
        cure_fits(&mut fits, self.opt_type);
        let order = rank_order(&fits, self.opt_type);
        let top = order[order.len() - 1];
        if self.opt_type.improves(fits[top], self.best.fitness) {
            self.best.fitness = fits[top];
            self.best.genotype = Some(full_inds.row(top).iter().cloned().collect());
        }
        self.log.insert("fitness_top", fits[top]);
        self.log
            .insert("fitness_mean", fits.iter().sum::<f64>() / fits.len() as f64);
        self.last_fits = fits;

        // Split the globally sorted samples back into per-block slices.
        samples
            .into_iter()
            .map(|block_samples| {
                DMatrix::from_fn(self.popsize, block_samples.ncols(), |r, c| {
                    block_samples[(order[r], c)]
                })
            })
            .collect()
    }
}

impl<F: Objective> SearchDistribution for Bdnes<F> {
    /// Dimensionality of the complete genotype.
    fn ndims(&self) -> usize {
        self.total_dims
    }

    fn popsize(&self) -> usize {
        self.popsize
    }

    /// Concatenation of the block means.
    fn mu(&self) -> DVector<f64> {
        let mut mu = Vec::with_capacity(self.total_dims);
        for block in &self.blocks {
            mu.extend(block.mu().iter().cloned());
        }
        DVector::from_vec(mu)
    }

    fn train(&mut self) {
        let picks = self.sorted_block_inds();
        for (block, block_picks) in self.blocks.iter_mut().zip(&picks) {
            block.train_on(block_picks);
        }
        let total = self.convergence();
        self.log.insert("convergence", total);
    }

    /// Sum of the per-block convergence values.
    fn convergence(&self) -> f64 {
        self.blocks.iter().map(|b| b.convergence()).sum()
    }

    fn best(&self) -> &Best {
        &self.best
    }

    fn last_fits(&self) -> &[f64] {
        &self.last_fits
    }

    fn train_log(&self) -> &ScoreLog {
        &self.log
    }

    fn save(&self) -> Snapshot {
        Snapshot::Blocks(self.blocks.iter().map(|b| b.save()).collect())
    }

    /// Restores every block in block order.  Block sample streams are
    /// untouched, so a load on the instance that produced the snapshot
    /// resumes bit-identically.
    fn load(&mut self, snapshot: &Snapshot) -> Result<(), NesError> {
        match snapshot {
            Snapshot::Blocks(parts) if parts.len() == self.blocks.len() => {
                for (block, part) in self.blocks.iter_mut().zip(parts) {
                    block.load(part)?;
                }
                Ok(())
            }
            _ => Err(NesError::SnapshotMismatch(format!(
                "expected {} block snapshots",
                self.blocks.len()
            ))),
        }
    }
}
