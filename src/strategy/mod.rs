//! Shared machinery for the NES optimizer family.
//!
//! Each variant owns a `NesState`: the distribution mean, the seeded
//! sample stream, the memoized magic numbers (population size, learning
//! rate, rank utilities) and the running-best bookkeeping.  Variants only
//! add their covariance representation and the natural-gradient update.
//!
//! Algorithm equations are derived for fitness maximization; utilities are
//! matched with individuals sorted by increasing fitness and the ordering
//! is reversed for minimization.

extern crate float_ord;
extern crate hashbrown;

use std::error::Error;
use std::fmt;

use self::float_ord::FloatOrd;
use self::hashbrown::HashMap;

use nalgebra::{DMatrix, DVector};

use crate::objective::Objective;
use crate::sampler::GaussStream;
use crate::snapshot::Snapshot;

/// Direction of optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Optimization {
    /// Lower fitness is better.
    Min,
    /// Higher fitness is better.
    Max,
}

impl Optimization {
    /// Worst representable fitness for this direction.  Used both to
    /// initialize the running best and to cure non-finite fitnesses so
    /// they never influence updates.
    pub fn worst(self) -> f64 {
        match self {
            Optimization::Min => f64::INFINITY,
            Optimization::Max => f64::NEG_INFINITY,
        }
    }

    /// Whether `new` strictly improves on `old`.
    pub fn improves(self, new: f64, old: f64) -> bool {
        match self {
            Optimization::Min => new < old,
            Optimization::Max => new > old,
        }
    }
}

/// Initial value for the distribution mean or covariance.
#[derive(Debug, Clone, PartialEq)]
pub enum Init {
    /// One value broadcast across all dimensions.
    Scalar(f64),
    /// One value per dimension.
    Vector(Vec<f64>),
    /// A full `ndims x ndims` covariance matrix (XNES only).
    Matrix(Vec<Vec<f64>>),
}

/// Settings shared by all NES variants.
#[derive(Debug, Clone, PartialEq)]
pub struct NesConfig {
    /// Seed for the sample stream.  `None` seeds from entropy.
    pub seed: Option<u64>,

    /// Initial distribution mean.
    pub mu_init: Init,

    /// Initial covariance, in the variant's native shape.
    pub sigma_init: Init,

    /// When set, the objective is handed the entire population in one
    /// `fitness_all` call instead of one `fitness` call per individual.
    pub parallel_fit: bool,

    /// Scaling applied once to the default population size.
    pub rescale_popsize: f64,

    /// Scaling applied once to the default learning rate.
    pub rescale_lrate: f64,
}

impl Default for NesConfig {
    fn default() -> Self {
        NesConfig {
            seed: None,
            mu_init: Init::Scalar(0.0),
            sigma_init: Init::Scalar(1.0),
            parallel_fit: false,
            rescale_popsize: 1.0,
            rescale_lrate: 1.0,
        }
    }
}

/// Errors surfaced by optimizer construction and snapshot loading.
#[derive(Debug)]
pub enum NesError {
    /// Malformed construction arguments (init shapes, dimensions).
    Config(String),
    /// A snapshot whose shape does not match the receiving optimizer.
    SnapshotMismatch(String),
    /// Snapshot (de)serialization failure.
    Serde(serde_json::Error),
}

impl fmt::Display for NesError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NesError::Config(msg) => write!(f, "invalid configuration: {}", msg),
            NesError::SnapshotMismatch(msg) => write!(f, "snapshot mismatch: {}", msg),
            NesError::Serde(err) => write!(f, "snapshot serialization: {}", err),
        }
    }
}

impl Error for NesError {}

/// Best individual ever observed by an optimizer.
#[derive(Debug, Clone)]
pub struct Best {
    /// Fitness of the best individual; the direction-worst value until an
    /// individual has been scored.
    pub fitness: f64,
    /// The best genotype, once one has been observed.
    pub genotype: Option<Vec<f64>>,
}

impl Best {
    pub(crate) fn new(opt_type: Optimization) -> Self {
        Best {
            fitness: opt_type.worst(),
            genotype: None,
        }
    }
}

/// Named scalar metrics from the most recent train step.
#[derive(Clone)]
pub struct ScoreLog {
    scores: HashMap<String, f64>,
}

impl ScoreLog {
    /// Returns an empty log.
    pub fn new() -> ScoreLog {
        ScoreLog {
            scores: HashMap::new(),
        }
    }

    #[inline]
    /// Records a score.
    pub fn insert(&mut self, key: &str, value: f64) -> () {
        self.scores.insert(key.to_string(), value);
    }

    #[inline]
    /// Gets a score.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.scores.get(key).map(|x| *x)
    }

    /// Iterates over the logged scores.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.scores.iter()
    }
}

impl fmt::Debug for ScoreLog {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // sort scores
        let mut data: Vec<(&String, &f64)> = self.scores.iter().collect();
        data.sort_by_key(|(k, _v)| *k);
        write!(f, "{:?}", data)
    }
}

/// Default population size, from CMA-ES.
pub fn cmaes_popsize(ndims: usize) -> usize {
    (4 + (3.0 * (ndims as f64).ln()).floor() as usize).max(5)
}

/// Default learning rate lower bound, from CMA-ES.
pub fn cmaes_lrate(ndims: usize) -> f64 {
    (3.0 + (ndims as f64).ln()) / (5.0 * (ndims as f64).sqrt())
}

/// Rank-based utility weights, from CMA-ES.  Utilities correspond to
/// individuals sorted by increasing fitness and sum to zero by
/// construction (shifted log-ranks).
pub fn cmaes_utilities(popsize: usize) -> DVector<f64> {
    let log_range: Vec<f64> = (1..=popsize)
        .map(|i| (0f64).max((popsize as f64 / 2.0 - 1.0).ln() - (i as f64).ln()))
        .collect();
    let total: f64 = log_range.iter().sum();
    let buf = 1.0 / popsize as f64;
    let mut vals: Vec<f64> = log_range.into_iter().map(|v| v / total - buf).collect();
    vals.reverse();
    DVector::from_vec(vals)
}

// Cures non-finite fitnesses so the individuals carrying them can never
// win a rank or the running best.
pub(crate) fn cure_fits(fits: &mut [f64], opt_type: Optimization) {
    let worst = opt_type.worst();
    for f in fits.iter_mut() {
        if !f.is_finite() {
            *f = worst;
        }
    }
}

// Ascending-fitness rank order, reversed for minimization so the last
// index is always the generation's best individual.
pub(crate) fn rank_order(fits: &[f64], opt_type: Optimization) -> Vec<usize> {
    let mut order: Vec<usize> = (0..fits.len()).collect();
    order.sort_by_key(|&i| FloatOrd(fits[i]));
    if opt_type == Optimization::Min {
        order.reverse();
    }
    order
}

// Scores a population of individuals (one row per individual).
pub(crate) fn evaluate<F: Objective>(
    obj: &F,
    inds: &DMatrix<f64>,
    parallel_fit: bool,
) -> Vec<f64> {
    if parallel_fit {
        let genotypes: Vec<Vec<f64>> = inds
            .row_iter()
            .map(|r| r.iter().cloned().collect())
            .collect();
        obj.fitness_all(&genotypes)
    } else {
        inds.row_iter()
            .map(|r| {
                let genotype: Vec<f64> = r.iter().cloned().collect();
                obj.fitness(&genotype)
            })
            .collect()
    }
}

/// State shared by every NES variant: the mean, the sample stream, the
/// magic numbers and the generation bookkeeping.
pub(crate) struct NesState {
    pub ndims: usize,
    pub mu: DVector<f64>,
    pub opt_type: Optimization,
    pub parallel_fit: bool,
    pub popsize: usize,
    pub lrate: f64,
    pub utils: DVector<f64>,
    pub rng: GaussStream,
    pub best: Best,
    pub last_fits: Vec<f64>,
    pub log: ScoreLog,
}

impl NesState {
    pub fn new(ndims: usize, opt_type: Optimization, config: &NesConfig) -> Result<Self, NesError> {
        if ndims == 0 {
            return Err(NesError::Config("ndims must be positive".to_string()));
        }
        let mu = match &config.mu_init {
            Init::Scalar(v) => DVector::from_element(ndims, *v),
            Init::Vector(vs) if vs.len() == ndims => DVector::from_vec(vs.clone()),
            Init::Vector(vs) => {
                return Err(NesError::Config(format!(
                    "mu_init has {} entries, expected {}",
                    vs.len(),
                    ndims
                )));
            }
            Init::Matrix(_) => {
                return Err(NesError::Config("mu_init cannot be a matrix".to_string()));
            }
        };
        let rng = match config.seed {
            Some(seed) => GaussStream::new(seed),
            None => GaussStream::from_entropy(),
        };
        if !(config.rescale_lrate > 0.0) {
            return Err(NesError::Config(
                "rescale_lrate must be positive".to_string(),
            ));
        }
        // Rescaling is applied exactly once, here.
        let popsize = ((cmaes_popsize(ndims) as f64) * config.rescale_popsize).round() as usize;
        // Below 5 individuals every shifted-log utility term is zero and
        // the normalization divides 0/0.
        if popsize < 5 {
            return Err(NesError::Config(format!(
                "rescale_popsize {} gives a population of {}, need at least 5",
                config.rescale_popsize, popsize
            )));
        }
        let lrate = cmaes_lrate(ndims) * config.rescale_lrate;
        Ok(NesState {
            ndims,
            mu,
            opt_type,
            parallel_fit: config.parallel_fit,
            popsize,
            lrate,
            utils: cmaes_utilities(popsize),
            rng,
            best: Best::new(opt_type),
            last_fits: Vec::new(),
            log: ScoreLog::new(),
        })
    }

    /// Samples a fresh `popsize x ndims` population of standard-normal
    /// draws.
    pub fn sample_matrix(&mut self) -> DMatrix<f64> {
        self.rng.normal_matrix(self.popsize, self.ndims)
    }

    /// Forces a new population size, recomputing the rank utilities.
    /// Used by the block composite to align its blocks.
    pub fn set_popsize(&mut self, popsize: usize) {
        self.popsize = popsize;
        self.utils = cmaes_utilities(popsize);
    }

    /// Ranks a scored generation: cures non-finite fitnesses, records the
    /// fitness list for stagnation checks, updates the running best, and
    /// returns the standard-normal samples reordered by ascending fitness
    /// (descending for minimization).  The sorted samples, not the mapped
    /// individuals, feed the gradient estimators.
    pub fn rank(
        &mut self,
        samples: &DMatrix<f64>,
        inds: &DMatrix<f64>,
        mut fits: Vec<f64>,
    ) -> DMatrix<f64> {
        cure_fits(&mut fits, self.opt_type);
        let order = rank_order(&fits, self.opt_type);
        let top = order[order.len() - 1];
        if self.opt_type.improves(fits[top], self.best.fitness) {
            self.best.fitness = fits[top];
            self.best.genotype = Some(inds.row(top).iter().cloned().collect());
        }
        self.log.insert("fitness_top", fits[top]);
        self.log
            .insert("fitness_mean", fits.iter().sum::<f64>() / fits.len() as f64);
        self.last_fits = fits;
        DMatrix::from_fn(samples.nrows(), samples.ncols(), |r, c| {
            samples[(order[r], c)]
        })
    }
}

/// Contract shared by every NES variant.  All members are compile-time
/// requirements; there is no runtime "not implemented" path.
pub trait SearchDistribution {
    /// Number of optimized parameters.
    fn ndims(&self) -> usize;

    /// Population size per generation.
    fn popsize(&self) -> usize;

    /// Current distribution mean, interpreted as the best-known solution.
    fn mu(&self) -> DVector<f64>;

    /// Advances the distribution one step: sample, score, rank, update.
    fn train(&mut self);

    /// Scalar proxy for the remaining search-distribution spread.
    fn convergence(&self) -> f64;

    /// Best individual ever observed.
    fn best(&self) -> &Best;

    /// Fitnesses of the most recent generation, after non-finite cure.
    fn last_fits(&self) -> &[f64];

    /// Metrics from the most recent train step.
    fn train_log(&self) -> &ScoreLog;

    /// Captures the distribution parameters as plain nested arrays.
    fn save(&self) -> Snapshot;

    /// Restores distribution parameters from a snapshot.  The sample
    /// stream is untouched: a loaded optimizer continues its own draw
    /// history, which is what makes snapshot-resume reproducible.
    fn load(&mut self, snapshot: &Snapshot) -> Result<(), NesError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_vectors(expected: &[f64], actual: &[f64]) -> () {
        assert_eq!(expected.len(), actual.len());
        for (e, a) in expected.iter().zip(actual) {
            assert!((e - a).abs() < 1e-5, "expected {} got {}", e, a);
        }
    }

    #[test]
    fn test_popsize() {
        assert_eq!(cmaes_popsize(5), 8);
        assert_eq!(cmaes_popsize(10), 10);
        assert_eq!(cmaes_popsize(20), 12);
    }

    #[test]
    fn test_lrate() {
        assert!((cmaes_lrate(5) - 0.412281).abs() < 1e-5);
        assert!((cmaes_lrate(10) - 0.335365).abs() < 1e-5);
        assert!((cmaes_lrate(20) - 0.268137).abs() < 1e-5);
    }

    #[test]
    fn test_utilities() {
        let u5 = cmaes_utilities(5);
        assert_vectors(&[-0.2, -0.2, -0.2, -0.2, 0.8], u5.as_slice());

        let u10 = cmaes_utilities(10);
        assert_vectors(
            &[
                -0.1, -0.1, -0.1, -0.1, -0.1, -0.1, -0.1, 0.0215323, 0.192823, 0.485645,
            ],
            u10.as_slice(),
        );

        let u20 = cmaes_utilities(20);
        assert_vectors(
            &[
                -0.05, -0.05, -0.05, -0.05, -0.05, -0.05, -0.05, -0.05, -0.05, -0.05, -0.05,
                -0.05, -0.0331092, -0.0139599, 0.00814626, 0.0342923, 0.0662925, 0.107548,
                0.165694, 0.265096,
            ],
            u20.as_slice(),
        );
    }

    #[test]
    fn test_utilities_sum_to_zero() {
        for &popsize in &[5, 8, 10, 20, 40] {
            let sum: f64 = cmaes_utilities(popsize).iter().sum();
            assert!(sum.abs() < 1e-12);
        }
    }

    fn ranked_inds(opt_type: Optimization) -> (NesState, DMatrix<f64>) {
        let config = NesConfig {
            seed: Some(1),
            ..NesConfig::default()
        };
        let mut state = NesState::new(3, opt_type, &config).unwrap();
        state.set_popsize(3);
        // Samples double as row markers so the ordering is observable.
        let samples = DMatrix::from_row_slice(
            3,
            3,
            &[
                7.0, 8.0, 9.0, //
                1.0, 2.0, 3.0, //
                4.0, 5.0, 6.0,
            ],
        );
        let inds = samples.clone();
        let fits: Vec<f64> = inds.row_iter().map(|r| r.iter().sum()).collect();
        let sorted = state.rank(&samples, &inds, fits);
        (state, sorted)
    }

    #[test]
    fn test_rank_minimization() {
        let (state, sorted) = ranked_inds(Optimization::Min);
        // Ascending fitness reversed: highest-sum row first, lowest last.
        assert_eq!(sorted.row(0).iter().cloned().collect::<Vec<f64>>(), vec![7.0, 8.0, 9.0]);
        assert_eq!(sorted.row(1).iter().cloned().collect::<Vec<f64>>(), vec![4.0, 5.0, 6.0]);
        assert_eq!(sorted.row(2).iter().cloned().collect::<Vec<f64>>(), vec![1.0, 2.0, 3.0]);
        assert_eq!(state.best.fitness, 6.0);
        assert_eq!(state.best.genotype, Some(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_rank_maximization() {
        let (state, sorted) = ranked_inds(Optimization::Max);
        assert_eq!(sorted.row(0).iter().cloned().collect::<Vec<f64>>(), vec![1.0, 2.0, 3.0]);
        assert_eq!(sorted.row(1).iter().cloned().collect::<Vec<f64>>(), vec![4.0, 5.0, 6.0]);
        assert_eq!(sorted.row(2).iter().cloned().collect::<Vec<f64>>(), vec![7.0, 8.0, 9.0]);
        assert_eq!(state.best.fitness, 24.0);
        assert_eq!(state.best.genotype, Some(vec![7.0, 8.0, 9.0]));
    }

    #[test]
    fn test_non_finite_fits_are_cured() {
        let mut fits = vec![1.0, f64::NAN, f64::INFINITY, -2.0];
        cure_fits(&mut fits, Optimization::Max);
        assert_eq!(fits[0], 1.0);
        assert_eq!(fits[1], f64::NEG_INFINITY);
        assert_eq!(fits[2], f64::NEG_INFINITY);
        assert_eq!(fits[3], -2.0);

        let mut fits = vec![f64::NAN];
        cure_fits(&mut fits, Optimization::Min);
        assert_eq!(fits[0], f64::INFINITY);
    }

    #[test]
    fn test_best_requires_strict_improvement() {
        let config = NesConfig {
            seed: Some(1),
            ..NesConfig::default()
        };
        let mut state = NesState::new(2, Optimization::Min, &config).unwrap();
        state.set_popsize(2);
        let samples = DMatrix::zeros(2, 2);
        let inds = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 2.0, 2.0]);
        state.rank(&samples, &inds, vec![3.0, 4.0]);
        assert_eq!(state.best.fitness, 3.0);
        let first = state.best.genotype.clone();

        // An equal fitness must not replace the stored genotype.
        let other = DMatrix::from_row_slice(2, 2, &[9.0, 9.0, 8.0, 8.0]);
        state.rank(&samples, &other, vec![3.0, 5.0]);
        assert_eq!(state.best.genotype, first);
    }

    #[test]
    fn test_bad_config_rejected() {
        let bad_mu = NesConfig {
            mu_init: Init::Vector(vec![0.0, 0.0]),
            ..NesConfig::default()
        };
        assert!(NesState::new(3, Optimization::Min, &bad_mu).is_err());
        assert!(NesState::new(0, Optimization::Min, &NesConfig::default()).is_err());
    }

    #[test]
    fn test_rescale_popsize_applies() {
        let config = NesConfig {
            rescale_popsize: 2.0,
            ..NesConfig::default()
        };
        let state = NesState::new(5, Optimization::Min, &config).unwrap();
        assert_eq!(state.popsize, 16);
        assert_eq!(state.utils.len(), 16);
        assert!(state.utils.iter().all(|u| u.is_finite()));
    }

    #[test]
    fn test_rescale_lrate_applies() {
        let config = NesConfig {
            rescale_lrate: 0.5,
            ..NesConfig::default()
        };
        let state = NesState::new(5, Optimization::Min, &config).unwrap();
        assert!((state.lrate - cmaes_lrate(5) * 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_undersized_rescale_popsize_rejected() {
        // popsize(5) * 0.5 rounds to 4: every utility would be NaN.
        for &factor in &[0.5, 0.0, -1.0] {
            let config = NesConfig {
                rescale_popsize: factor,
                ..NesConfig::default()
            };
            assert!(NesState::new(5, Optimization::Min, &config).is_err());
        }
    }

    #[test]
    fn test_non_positive_rescale_lrate_rejected() {
        for &factor in &[0.0, -1.0, f64::NAN] {
            let config = NesConfig {
                rescale_lrate: factor,
                ..NesConfig::default()
            };
            assert!(NesState::new(5, Optimization::Min, &config).is_err());
        }
    }
}
