//! Seeded standard-normal sampling for the NES optimizers.
//!
//! All stochasticity in this crate flows through `GaussStream`.  The
//! normal transform is a hand-written Box–Muller over uniform draws rather
//! than a library sampler: resuming a run from a snapshot is only
//! bit-reproducible if the number and order of underlying uniform draws is
//! fully under our control.

use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

/// Upper bound (exclusive) for derived block sub-seeds.
pub const MAX_RSEED: u64 = 1 << 32;

/// A seeded stream of standard-normal samples.
pub struct GaussStream {
    rng: XorShiftRng,
}

impl GaussStream {
    /// Returns a new stream seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        GaussStream {
            rng: XorShiftRng::seed_from_u64(seed),
        }
    }

    /// Returns a new stream with an entropy-derived seed.
    pub fn from_entropy() -> Self {
        GaussStream::new(rand::random::<u64>())
    }

    /// Box–Muller transform: one sample from a standard normal
    /// distribution.  Consumes exactly three uniform draws: radius,
    /// angle, and the cos/sin pick.
    pub fn next_normal(&mut self) -> f64 {
        let rho = (-2.0 * self.rng.gen::<f64>().ln()).sqrt();
        let theta = 2.0 * std::f64::consts::PI * self.rng.gen::<f64>();
        if self.rng.gen::<f64>() > 0.5 {
            rho * theta.cos()
        } else {
            rho * theta.sin()
        }
    }

    /// Fills a `rows x cols` matrix with independent standard-normal
    /// draws, row by row.  The fill order is part of the resume contract.
    pub fn normal_matrix(&mut self, rows: usize, cols: usize) -> DMatrix<f64> {
        DMatrix::from_row_iterator(rows, cols, (0..rows * cols).map(|_| self.next_normal()))
    }

    /// Derives a sub-seed for an independent child stream.
    pub fn next_seed(&mut self) -> u64 {
        self.rng.gen::<u64>() % MAX_RSEED
    }
}
