//! Snapshot representation for save/load and checkpoint-resume.
//!
//! Snapshots are plain nested numeric arrays: a `(mean, covariance)` pair
//! in the variant's native covariance shape, or a list of block snapshots
//! for the block-diagonal composite.  Loading reconstructs the dense
//! covariance deterministically from this representation.

use serde_json;
use std::io::{Read, Write};

use crate::strategy::NesError;

/// Captured distribution parameters.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Snapshot {
    /// Full covariance (XNES): the mean and the log-domain covariance.
    Full {
        /// Distribution mean.
        mean: Vec<f64>,
        /// Log-domain covariance, row by row.
        log_cov: Vec<Vec<f64>>,
    },
    /// Diagonal covariance (SNES): the mean and the per-dimension scales.
    Diagonal {
        /// Distribution mean.
        mean: Vec<f64>,
        /// Per-dimension variance terms.
        variances: Vec<f64>,
    },
    /// Scalar covariance (RNES/FNES): the mean and one variance.
    Scalar {
        /// Distribution mean.
        mean: Vec<f64>,
        /// Shared variance term.
        variance: f64,
    },
    /// One snapshot per block, in block order (BDNES).
    Blocks(Vec<Snapshot>),
}

impl Snapshot {
    /// Writes the snapshot as JSON.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), NesError> {
        serde_json::to_writer(writer, &self).map_err(NesError::Serde)
    }

    /// Reads a snapshot from JSON.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, NesError> {
        serde_json::from_reader(reader).map_err(NesError::Serde)
    }
}
