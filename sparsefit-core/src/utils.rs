extern crate nalgebra as na;

use rand::prelude::*;
use rand_distr::{Normal, StandardNormal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the solvers in this crate.
///
/// Numerical failures are surfaced immediately and never retried. Running out
/// of iterations is not an error: solvers report their iteration counts and
/// leave the convergence verdict to the caller.
///
/// # Example
///
/// ```rust
/// # use sparsefit_core::utils::SolverError;
///
/// fn might_fail() -> Result<(), SolverError> {
///     Err(SolverError::IllConditioned("singular coefficient matrix".to_string()))
/// }
/// assert!(might_fail().is_err());
/// ```
#[derive(Debug, Error)]
pub enum SolverError {
    /// Inversion or factorization failed, or produced non-finite values.
    #[error("ill-conditioned system: {0}")]
    IllConditioned(String),

    /// A decomposition (SVD, least squares) did not succeed.
    #[error("numerical failure: {0}")]
    Numerical(String),

    /// Two inputs disagree on a dimension.
    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Invalid argument combination.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, SolverError>;

/// Proximal operator of `t * |v|`.
///
/// Returns 0 when `|v| <= t`, otherwise `v - t * sign(v)`.
pub fn soft_threshold(v: f64, t: f64) -> f64 {
    if v.abs() <= t {
        0.0
    } else {
        v - t * v.signum()
    }
}

/// Elementwise [`soft_threshold`] of a vector.
pub fn soft_threshold_vec(v: &na::DVector<f64>, t: f64) -> na::DVector<f64> {
    v.map(|x| soft_threshold(x, t))
}

/// Returns `Ok(())` if every value is finite.
pub(crate) fn ensure_finite<'a>(
    values: impl IntoIterator<Item = &'a f64>,
    what: &str,
) -> Result<()> {
    if values.into_iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(SolverError::IllConditioned(format!(
            "{what} contains non-finite values"
        )))
    }
}

/// A synthetic sparse regression problem `y = X w_true + v`.
///
/// Serialized as JSON by the `generate_problem` binary and read back by
/// `admm_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionProblem {
    /// Design matrix, `m × n`
    pub x: na::DMatrix<f64>,
    /// Targets, `m × 1`
    pub y: na::DMatrix<f64>,
    /// Coefficients used to generate `y`
    pub w_true: na::DVector<f64>,
}

impl RegressionProblem {
    /// Generates a problem with `k` nonzero coefficients.
    ///
    /// Columns of `x` are standard normal draws scaled to unit norm, the
    /// support of `w_true` is sampled uniformly and `y` receives Gaussian noise
    /// with standard deviation `noise`.
    pub fn generate(m: usize, n: usize, k: usize, noise: f64, seed: u64) -> Result<Self> {
        if k > n {
            return Err(SolverError::InvalidInput(format!(
                "cannot place {k} nonzero coefficients among {n} features"
            )));
        }
        let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);

        let mut x = na::DMatrix::<f64>::zeros(m, n);
        for j in 0..n {
            let mut column: Vec<f64> = (0..m).map(|_| rng.sample(StandardNormal)).collect();
            let norm = column.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                column.iter_mut().for_each(|v| *v /= norm);
            }
            x.column_mut(j).copy_from_slice(&column);
        }

        let mut w_true = na::DVector::<f64>::zeros(n);
        let indices = rand::seq::index::sample(&mut rng, n, k).into_vec();
        for idx in indices {
            w_true[idx] = rng.sample(StandardNormal);
        }

        let noise_dist = Normal::new(0.0, noise)
            .map_err(|e| SolverError::InvalidInput(format!("bad noise level: {e}")))?;
        let v = na::DVector::<f64>::from_fn(m, |_, _| rng.sample(noise_dist));

        let y = &x * &w_true + v;
        Ok(RegressionProblem {
            x,
            y: na::DMatrix::from_column_slice(m, 1, y.as_slice()),
            w_true,
        })
    }

    /// `max_j |x_j^T y| / m`, the smallest Lasso penalty with an all-zero solution.
    pub fn alpha_max(&self) -> f64 {
        let m = self.x.nrows() as f64;
        (self.x.transpose() * &self.y)
            .iter()
            .fold(0.0f64, |acc, v| acc.max(v.abs()))
            / m
    }
}

/// Solves the Lasso with linfa's coordinate descent, for cross-checking.
///
/// Both solvers minimize `1/(2m) ||y - Xw||^2 + alpha ||w||_1`, so the penalty
/// is passed through unchanged. Not meant for production use.
#[cfg(feature = "linfa")]
pub fn reference_lasso_linfa(
    x: &na::DMatrix<f64>,
    y: &na::DVector<f64>,
    alpha: f64,
) -> Result<na::DVector<f64>> {
    use linfa::prelude::*;
    use linfa_elasticnet::ElasticNet;
    use ndarray::{Array, Array1};

    let (m, n) = x.shape();
    let x_nd = Array::from_shape_fn((m, n), |(i, j)| x[(i, j)]);
    let y_nd = Array1::from_vec(y.as_slice().to_vec());
    let dataset = Dataset::new(x_nd, y_nd);

    let model = ElasticNet::lasso()
        .penalty(alpha)
        .with_intercept(false)
        .fit(&dataset)
        .map_err(|e| SolverError::Numerical(format!("linfa lasso failed: {e}")))?;

    Ok(na::DVector::from_iterator(
        n,
        model.hyperplane().iter().copied(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_threshold_shrinks_towards_zero() {
        assert_eq!(soft_threshold(0.5, 1.0), 0.0);
        assert_eq!(soft_threshold(-1.0, 1.0), 0.0);
        assert_eq!(soft_threshold(3.0, 1.0), 2.0);
        assert_eq!(soft_threshold(-3.0, 1.0), -2.0);
    }

    #[test]
    fn generated_problem_has_requested_support() {
        let problem = RegressionProblem::generate(30, 10, 3, 0.0, 7).unwrap();
        assert_eq!(problem.x.shape(), (30, 10));
        assert_eq!(problem.y.shape(), (30, 1));
        assert_eq!(problem.w_true.iter().filter(|v| **v != 0.0).count(), 3);
        for j in 0..10 {
            assert!((problem.x.column(j).norm() - 1.0).abs() < 1e-12);
        }
        let residual = &problem.x * &problem.w_true - problem.y.column(0);
        assert!(residual.norm() < 1e-12);
    }

    #[test]
    fn too_many_nonzeros_is_rejected() {
        assert!(matches!(
            RegressionProblem::generate(5, 2, 3, 0.1, 0),
            Err(SolverError::InvalidInput(_))
        ));
    }
}
