//! Sparse coding against a fixed dictionary.
extern crate nalgebra as na;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::utils::{Result, SolverError};

/// Computes codes with a bounded number of nonzeros per sample.
///
/// `dictionary` is `n_components × n_features` with one atom per row, `data`
/// is `n_samples × n_features`. The returned code is `n_samples ×
/// n_components` with at most `k0` nonzero entries per row and should
/// minimize the reconstruction error `||data - code * dictionary||`.
pub trait SparseEncoder: Sync {
    fn encode(
        &self,
        dictionary: &na::DMatrix<f64>,
        data: &na::DMatrix<f64>,
        k0: usize,
    ) -> Result<na::DMatrix<f64>>;
}

/// Greedy Orthogonal Matching Pursuit.
///
/// Expects unit-norm atoms. Each step adds the atom most correlated with the
/// current residual and refits all active coefficients by least squares.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrthogonalMatchingPursuit {
    /// Stop early once the best correlation falls below `tol * ||sample||`
    pub tol: f64,
}

impl Default for OrthogonalMatchingPursuit {
    fn default() -> Self {
        Self { tol: 1e-10 }
    }
}

impl OrthogonalMatchingPursuit {
    /// Encodes one sample, returning its `n_components` coefficients.
    pub fn encode_sample(
        &self,
        dictionary: &na::DMatrix<f64>,
        sample: &na::DVector<f64>,
        k0: usize,
    ) -> Result<na::DVector<f64>> {
        let (n_components, n_features) = dictionary.shape();
        let mut code = na::DVector::<f64>::zeros(n_components);

        let sample_norm = sample.norm();
        if sample_norm == 0.0 {
            return Ok(code);
        }
        let threshold = self.tol * sample_norm;

        let mut active: Vec<usize> = Vec::with_capacity(k0);
        let mut active_coef = na::DVector::<f64>::zeros(0);
        let mut residual = sample.clone();

        for _ in 0..k0.min(n_components) {
            let correlations = dictionary * &residual;
            let best = correlations
                .iter()
                .enumerate()
                .filter(|(j, _)| !active.contains(j))
                .map(|(j, c)| (j, c.abs()))
                .max_by(|a, b| a.1.total_cmp(&b.1));

            let Some((j, corr)) = best else { break };
            if corr <= threshold {
                break;
            }
            active.push(j);

            // Active atoms as columns, n_features × |active|
            let atoms = na::DMatrix::<f64>::from_fn(n_features, active.len(), |i, c| {
                dictionary[(active[c], i)]
            });
            active_coef = atoms
                .clone()
                .svd(true, true)
                .solve(sample, 1e-12)
                .map_err(|e| SolverError::Numerical(format!("OMP least squares: {e}")))?;
            residual = sample - &atoms * &active_coef;
        }

        for (c, &j) in active.iter().enumerate() {
            code[j] = active_coef[c];
        }
        Ok(code)
    }
}

impl SparseEncoder for OrthogonalMatchingPursuit {
    fn encode(
        &self,
        dictionary: &na::DMatrix<f64>,
        data: &na::DMatrix<f64>,
        k0: usize,
    ) -> Result<na::DMatrix<f64>> {
        if data.ncols() != dictionary.ncols() {
            return Err(SolverError::DimensionMismatch {
                what: "data features",
                expected: dictionary.ncols(),
                actual: data.ncols(),
            });
        }
        let n_samples = data.nrows();

        let encode_row = |i: usize| {
            let sample = data.row(i).transpose();
            self.encode_sample(dictionary, &sample, k0)
        };

        #[cfg(feature = "rayon")]
        let rows: Vec<Result<na::DVector<f64>>> =
            (0..n_samples).into_par_iter().map(encode_row).collect();

        #[cfg(not(feature = "rayon"))]
        let rows: Vec<Result<na::DVector<f64>>> = (0..n_samples).map(encode_row).collect();

        let mut code = na::DMatrix::<f64>::zeros(n_samples, dictionary.nrows());
        for (i, row) in rows.into_iter().enumerate() {
            code.set_row(i, &row?.transpose());
        }
        Ok(code)
    }
}
