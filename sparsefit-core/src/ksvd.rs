//! K-SVD dictionary learning.
//!
//! Finds a dictionary `A` and a sparse code `X` solving
//!
//! ```text
//! argmin_{A, X} sum_i ||y_i - x_i A||_2^2   such that ||x_i||_0 <= k0 for all i
//! ```
//!
//! by alternating a full re-encode of the data with a rank-1 SVD refinement of
//! each atom restricted to the samples that use it.
//!
//! Reference: Elad and Aharon, "Image denoising via sparse and redundant
//! representations over learned dictionaries", IEEE TIP 15.12 (2006).
extern crate nalgebra as na;

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    encoder::{OrthogonalMatchingPursuit, SparseEncoder},
    timing::{TimingTracker, time_fn},
    utils::{Result, SolverError},
};

/// Settings for [`ksvd`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KsvdConfig {
    /// Number of atoms, the rows of the learned dictionary
    pub n_components: usize,
    /// Nonzero budget per sample, clamped to `n_features`
    pub k0: usize,
    /// Stop once the reconstruction error changes by less than this
    pub tol: f64,
    /// Upper bound on completed encode and update rounds
    pub max_iter: usize,
}

/// Output of [`ksvd`].
#[derive(Debug, Clone)]
pub struct KsvdResult {
    /// `n_components × n_features`, one atom per row
    pub dictionary: na::DMatrix<f64>,
    /// `n_samples × n_components`
    pub code: na::DMatrix<f64>,
    /// Frobenius reconstruction error before the first iteration and after
    /// each completed one
    pub errors: Vec<f64>,
    /// Number of completed iterations
    pub n_iter: usize,
    pub timings: TimingTracker,
}

/// `||Y - X A||_F`
pub fn reconstruction_error(
    y: &na::DMatrix<f64>,
    dictionary: &na::DMatrix<f64>,
    code: &na::DMatrix<f64>,
) -> f64 {
    (y - code * dictionary).norm()
}

/// Scales every row of `dictionary` to unit l2 norm.
fn normalize_atoms(dictionary: &mut na::DMatrix<f64>) -> Result<()> {
    for (j, mut atom) in dictionary.row_iter_mut().enumerate() {
        let norm = atom.dot(&atom).sqrt();
        if norm == 0.0 || !norm.is_finite() {
            return Err(SolverError::InvalidInput(format!(
                "atom {j} has norm {norm} and cannot be normalized"
            )));
        }
        atom /= norm;
    }
    Ok(())
}

/// Replaces atom `j` and its code column with the best rank-1 fit of the
/// residual over the samples that use it.
///
/// Returns `false` without touching anything when no sample uses the atom.
fn update_atom(
    y: &na::DMatrix<f64>,
    dictionary: &mut na::DMatrix<f64>,
    code: &mut na::DMatrix<f64>,
    j: usize,
) -> Result<bool> {
    let support: Vec<usize> = (0..code.nrows()).filter(|&i| code[(i, j)] != 0.0).collect();
    if support.is_empty() {
        return Ok(false);
    }
    for &i in &support {
        code[(i, j)] = 0.0;
    }

    let y_s = y.select_rows(&support);
    let code_s = code.select_rows(&support);
    let residual = y_s - code_s * &*dictionary;

    let svd = residual.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => {
            return Err(SolverError::Numerical(format!(
                "SVD of the residual for atom {j} did not produce singular vectors"
            )));
        }
    };
    let (lead, sigma) = svd
        .singular_values
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .ok_or_else(|| SolverError::Numerical(format!("empty SVD for atom {j}")))?;

    dictionary.set_row(j, &v_t.row(lead));
    for (r, &i) in support.iter().enumerate() {
        code[(i, j)] = sigma * u[(r, lead)];
    }
    Ok(true)
}

/// Learns a dictionary with K-SVD.
///
/// The dictionary starts from `dict_init` or, when absent, from the first
/// `n_components` rows of `y`; either way every atom is scaled to unit norm.
/// The code starts from `code_init` or zeros. Atoms that no sample uses in a
/// round are left unchanged.
///
/// # Errors
///
/// * [`SolverError::DimensionMismatch`] if warm starts do not fit `y`
/// * [`SolverError::InvalidInput`] if `y` has fewer rows than `n_components`
///   and no `dict_init` is given, or an initial atom is zero
/// * errors from the encoder and [`SolverError::Numerical`] from the SVD
pub fn ksvd<E: SparseEncoder>(
    y: &na::DMatrix<f64>,
    config: &KsvdConfig,
    dict_init: Option<na::DMatrix<f64>>,
    code_init: Option<na::DMatrix<f64>>,
    encoder: &E,
) -> Result<KsvdResult> {
    let (n_samples, n_features) = y.shape();
    let n_components = config.n_components;
    let k0 = config.k0.min(n_features);

    let mut dictionary = match dict_init {
        Some(dictionary) => {
            if dictionary.shape() != (n_components, n_features) {
                return Err(SolverError::DimensionMismatch {
                    what: "initial dictionary",
                    expected: n_components * n_features,
                    actual: dictionary.len(),
                });
            }
            dictionary
        }
        None => {
            if n_samples < n_components {
                return Err(SolverError::InvalidInput(format!(
                    "need at least {n_components} samples to seed the dictionary, got {n_samples}"
                )));
            }
            y.rows(0, n_components).clone_owned()
        }
    };
    normalize_atoms(&mut dictionary)?;

    let mut code = match code_init {
        Some(code) => {
            if code.shape() != (n_samples, n_components) {
                return Err(SolverError::DimensionMismatch {
                    what: "initial code",
                    expected: n_samples * n_components,
                    actual: code.len(),
                });
            }
            code
        }
        None => na::DMatrix::zeros(n_samples, n_components),
    };

    let mut timings = TimingTracker::new();
    let mut errors = vec![reconstruction_error(y, &dictionary, &code)];
    let mut n_iter = 0;

    for k in 0..config.max_iter {
        timings.start_iteration();
        code = time_fn(&mut timings, "sparse_encode", || {
            encoder.encode(&dictionary, y, k0)
        })?;

        let starved = time_fn(&mut timings, "atom_update", || {
            let mut starved = 0usize;
            for j in 0..n_components {
                if !update_atom(y, &mut dictionary, &mut code, j)? {
                    starved += 1;
                }
            }
            Ok(starved)
        })?;
        if starved > 0 {
            log::debug!("[ksvd] iteration {}: {} atom(s) without support", k, starved);
        }

        errors.push(reconstruction_error(y, &dictionary, &code));
        n_iter = k + 1;

        let last = errors[errors.len() - 1];
        let previous = errors[errors.len() - 2];
        if (last - previous).abs() < config.tol {
            break;
        }
    }

    Ok(KsvdResult {
        dictionary,
        code,
        errors,
        n_iter,
        timings,
    })
}

/// K-SVD estimator with random initialization and an OMP encoder.
///
/// # Example
///
/// ```rust
/// # extern crate nalgebra as na;
/// # use sparsefit_core::ksvd::Ksvd;
/// let y = na::DMatrix::from_fn(20, 4, |i, j| ((i * 4 + j) as f64).sin());
/// let mut model = Ksvd::new().with_n_components(3).with_k0(2).with_random_state(0);
/// model.fit(&y).unwrap();
/// assert_eq!(model.components().unwrap().shape(), (3, 4));
/// ```
#[derive(Debug, Clone)]
pub struct Ksvd {
    /// Defaults to `n_features`
    pub n_components: Option<usize>,
    /// Nonzero budget while fitting, defaults to `n_features`
    pub k0: Option<usize>,
    /// Nonzero budget used by [`Ksvd::transform`], defaults to
    /// `max(n_features / 10, 1)`
    pub transform_n_nonzero_coefs: Option<usize>,
    /// Return `[max(code, 0), -min(code, 0)]` side by side from
    /// [`Ksvd::transform`]
    pub split_sign: bool,
    /// Upper bound on K-SVD rounds
    pub max_iter: usize,
    /// Stop once the reconstruction error changes by less than this
    pub tol: f64,
    /// Seed of the initial dictionary and code, drawn from the OS when `None`
    pub random_state: Option<u64>,
    /// Encoder used while fitting and by [`Ksvd::transform`]
    pub encoder: OrthogonalMatchingPursuit,
    components: Option<na::DMatrix<f64>>,
    errors: Vec<f64>,
    n_iter: usize,
}

impl Default for Ksvd {
    fn default() -> Self {
        Self {
            n_components: None,
            k0: None,
            transform_n_nonzero_coefs: None,
            split_sign: false,
            max_iter: 1000,
            tol: 1e-8,
            random_state: None,
            encoder: OrthogonalMatchingPursuit::default(),
            components: None,
            errors: Vec::new(),
            n_iter: 0,
        }
    }
}

impl Ksvd {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of atoms.
    pub fn with_n_components(mut self, n_components: usize) -> Self {
        self.n_components = Some(n_components);
        self
    }

    /// Sets the nonzero budget per sample used while fitting.
    pub fn with_k0(mut self, k0: usize) -> Self {
        self.k0 = Some(k0);
        self
    }

    /// Sets the maximum number of K-SVD rounds.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Sets the error-change tolerance.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Makes initialization reproducible.
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Sets the nonzero budget per sample used by [`Ksvd::transform`].
    pub fn with_transform_n_nonzero_coefs(mut self, n_nonzero_coefs: usize) -> Self {
        self.transform_n_nonzero_coefs = Some(n_nonzero_coefs);
        self
    }

    /// Splits transformed codes into positive and negative parts.
    pub fn with_split_sign(mut self, split_sign: bool) -> Self {
        self.split_sign = split_sign;
        self
    }

    /// Learns the dictionary from uniformly random initial dictionary and code.
    pub fn fit(&mut self, y: &na::DMatrix<f64>) -> Result<&mut Self> {
        let (n_samples, n_features) = y.shape();
        let n_components = self.n_components.unwrap_or(n_features);
        let k0 = self.k0.unwrap_or(n_features).min(n_features);

        let mut rng = match self.random_state {
            Some(seed) => rand::rngs::SmallRng::seed_from_u64(seed),
            None => rand::rngs::SmallRng::from_os_rng(),
        };
        let code_init = na::DMatrix::<f64>::from_fn(n_samples, n_components, |_, _| rng.random());
        let dict_init = na::DMatrix::<f64>::from_fn(n_components, n_features, |_, _| rng.random());

        let config = KsvdConfig {
            n_components,
            k0,
            tol: self.tol,
            max_iter: self.max_iter,
        };
        let result = ksvd(y, &config, Some(dict_init), Some(code_init), &self.encoder)?;

        self.components = Some(result.dictionary);
        self.errors = result.errors;
        self.n_iter = result.n_iter;
        Ok(self)
    }

    /// Encodes `y` against the learned atoms.
    ///
    /// Uses `transform_n_nonzero_coefs` nonzeros per sample, not the fitting
    /// budget `k0`. With `split_sign` the result is `n_samples × 2
    /// n_components`.
    pub fn transform(&self, y: &na::DMatrix<f64>) -> Result<na::DMatrix<f64>> {
        let components = self.components()?;
        let n_features = y.ncols();
        let n_nonzero_coefs = self
            .transform_n_nonzero_coefs
            .unwrap_or((n_features / 10).max(1))
            .min(n_features);
        let code = self.encoder.encode(components, y, n_nonzero_coefs)?;
        if !self.split_sign {
            return Ok(code);
        }

        let (n_samples, n_components) = code.shape();
        Ok(na::DMatrix::from_fn(n_samples, 2 * n_components, |i, j| {
            if j < n_components {
                code[(i, j)].max(0.0)
            } else {
                -code[(i, j - n_components)].min(0.0)
            }
        }))
    }

    /// Learned dictionary, one atom per row.
    pub fn components(&self) -> Result<&na::DMatrix<f64>> {
        self.components
            .as_ref()
            .ok_or_else(|| SolverError::InvalidInput("Ksvd has not been fitted".to_string()))
    }

    /// Reconstruction error trace of the last fit.
    pub fn errors(&self) -> &[f64] {
        &self.errors
    }

    /// Completed rounds of the last fit.
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }
}
