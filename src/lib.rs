//! Nes-Core
//! ===
//!
//! This library contains a family of Natural Evolution Strategies (NES)
//! optimizers for black-box search over high-dimensional continuous
//! parameter spaces.  Each optimizer adapts a multivariate Gaussian search
//! distribution toward higher-fitness regions using natural-gradient
//! estimates built from a rank-weighted population; no gradients of the
//! objective are required.
//!
//! XNES
//! ---
//! Exponential NES adapts a full covariance matrix, working in the log
//! domain via an eigendecomposition-based matrix exponential.  The most
//! expressive variant and the most expensive per step.
//!
//! SNES
//! ---
//! Separable NES adapts one variance per dimension.  Linear cost per step,
//! a good default for high-dimensional separable-ish problems.
//!
//! RNES
//! ---
//! Radial NES adapts a single scalar variance shared by all dimensions.
//!
//! FNES
//! ---
//! Fixed-variance NES updates only the mean, reusing the radial
//! distribution.  Useful when step-size adaptation is undesirable.
//!
//! BDNES
//! ---
//! Block-diagonal NES composes independent XNES blocks over disjoint
//! slices of the genotype, scoring complete individuals while adapting
//! each block's covariance separately.

#![warn(missing_docs, unused)]

#[macro_use]
extern crate serde_derive;

/// Defines the seeded standard-normal sample stream.
pub mod sampler;

/// Defines the fitness function contract.
pub mod objective;

/// Defines the shared search-distribution core and variant contract.
pub mod strategy;

/// Defines the save/load snapshot representation.
pub mod snapshot;

/// Defines the full-covariance (exponential) NES optimizer.
pub mod xnes;

/// Defines the diagonal-covariance (separable) NES optimizer.
pub mod snes;

/// Defines the scalar-variance (radial) NES optimizer.
pub mod rnes;

/// Defines the fixed-variance, mean-only NES optimizer.
pub mod fnes;

/// Defines the block-diagonal composite NES optimizer.
pub mod bdnes;

pub use crate::bdnes::Bdnes;
pub use crate::fnes::Fnes;
pub use crate::objective::{Objective, ParallelFit};
pub use crate::rnes::Rnes;
pub use crate::snapshot::Snapshot;
pub use crate::snes::Snes;
pub use crate::strategy::{
    Best, Init, NesConfig, NesError, Optimization, ScoreLog, SearchDistribution,
};
pub use crate::xnes::Xnes;

pub use nalgebra::{DMatrix, DVector};
