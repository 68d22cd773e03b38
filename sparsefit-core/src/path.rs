//! Regularization paths: one fresh ADMM fit per penalty strength.
extern crate nalgebra as na;

use serde::{Deserialize, Serialize};

use crate::{
    lasso::GeneralizedLasso,
    problem::AdmmConfig,
    timing::{TimingTracker, time_fn},
    transform::TransformMatrix,
    utils::{Result, SolverError},
};

/// Value used for every alpha when `X^T y` vanishes.
const ALPHA_RESOLUTION: f64 = 1e-15;

/// Settings for [`admm_path`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Explicit penalties; generated with [`alpha_grid`] when `None`
    pub alphas: Option<Vec<f64>>,
    /// `alpha_min / alpha_max` of the generated grid
    pub eps: f64,
    /// Length of the generated grid
    pub n_alphas: usize,
    pub rho: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub transform: TransformMatrix,
    pub banded: bool,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            alphas: None,
            eps: 1e-3,
            n_alphas: 100,
            rho: 1.0,
            max_iter: 1000,
            tol: 1e-4,
            transform: TransformMatrix::Identity,
            banded: false,
        }
    }
}

/// Coefficients along a regularization path.
#[derive(Debug, Clone)]
pub struct AdmmPath {
    /// Penalties, descending
    pub alphas: Vec<f64>,
    /// One `n_features × n_targets` matrix per alpha
    pub coefs: Vec<na::DMatrix<f64>>,
    /// Per alpha, the iteration index each target stopped at
    pub n_iter: Vec<Vec<usize>>,
    /// One "fit_alpha" record per alpha
    pub timings: TimingTracker,
}

impl AdmmPath {
    /// `n_features × n_alphas` coefficients of one target.
    pub fn coef_matrix(&self, target: usize) -> Result<na::DMatrix<f64>> {
        let n_features = self.coefs.first().map_or(0, |c| c.nrows());
        let mut out = na::DMatrix::<f64>::zeros(n_features, self.coefs.len());
        for (i, coef) in self.coefs.iter().enumerate() {
            if target >= coef.ncols() {
                return Err(SolverError::DimensionMismatch {
                    what: "path target",
                    expected: coef.ncols(),
                    actual: target,
                });
            }
            out.set_column(i, &coef.column(target));
        }
        Ok(out)
    }

    /// `||w||_1` of every alpha's coefficients, summed over targets.
    pub fn l1_norms(&self) -> Vec<f64> {
        self.coefs.iter().map(|c| c.lp_norm(1)).collect()
    }
}

/// Descending log-spaced grid anchored at the smallest all-zero penalty.
///
/// `alpha_max = max_j ||(X^T y)_j||_2 / n_samples`, the row norm running over
/// targets, and the grid spans `[alpha_max * eps, alpha_max]`.
pub fn alpha_grid(
    x: &na::DMatrix<f64>,
    y: &na::DMatrix<f64>,
    eps: f64,
    n_alphas: usize,
) -> Result<Vec<f64>> {
    if y.nrows() != x.nrows() {
        return Err(SolverError::DimensionMismatch {
            what: "target rows",
            expected: x.nrows(),
            actual: y.nrows(),
        });
    }
    if eps.is_nan() || eps <= 0.0 {
        return Err(SolverError::InvalidInput(format!(
            "grid ratio eps must be positive, got {eps}"
        )));
    }
    let n_samples = x.nrows().max(1) as f64;
    let xy = x.tr_mul(y);
    let alpha_max = xy
        .row_iter()
        .map(|row| row.norm())
        .fold(0.0f64, f64::max)
        / n_samples;

    if alpha_max <= ALPHA_RESOLUTION {
        return Ok(vec![ALPHA_RESOLUTION; n_alphas]);
    }

    let hi = alpha_max.log10();
    let lo = (alpha_max * eps).log10();
    let alphas = match n_alphas {
        0 => Vec::new(),
        1 => vec![10f64.powf(lo)],
        _ => (0..n_alphas)
            .map(|k| 10f64.powf(hi + (lo - hi) * k as f64 / (n_alphas - 1) as f64))
            .collect(),
    };
    Ok(alphas)
}

/// Fits a fresh [`GeneralizedLasso`] for every alpha, largest first.
///
/// No state crosses alphas, so each fit starts cold.
pub fn admm_path(
    x: &na::DMatrix<f64>,
    y: &na::DMatrix<f64>,
    config: &PathConfig,
) -> Result<AdmmPath> {
    let alphas = match &config.alphas {
        Some(alphas) => {
            if alphas.iter().any(|a| a.is_nan()) {
                return Err(SolverError::InvalidInput(
                    "alphas must not be NaN".to_string(),
                ));
            }
            let mut sorted = alphas.clone();
            sorted.sort_by(|a, b| b.total_cmp(a));
            sorted
        }
        None => alpha_grid(x, y, config.eps, config.n_alphas)?,
    };

    let mut timings = TimingTracker::new();
    let mut coefs = Vec::with_capacity(alphas.len());
    let mut n_iter = Vec::with_capacity(alphas.len());

    for &alpha in &alphas {
        timings.start_iteration();
        let model = GeneralizedLasso::new(
            AdmmConfig {
                alpha,
                rho: config.rho,
                tol: config.tol,
                max_iter: config.max_iter,
                banded: config.banded,
            },
            config.transform,
        );
        let fit = time_fn(&mut timings, "fit_alpha", || model.fit(x, y))?;
        log::debug!(
            "alpha={:.6e} n_iter={:?} l1={:.6}",
            alpha,
            fit.n_iter,
            fit.coef.lp_norm(1)
        );
        coefs.push(fit.coef);
        n_iter.push(fit.n_iter);
    }

    Ok(AdmmPath {
        alphas,
        coefs,
        n_iter,
        timings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn grid_is_anchored_at_alpha_max() {
        let x = na::DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 2.0]);
        let y = na::DMatrix::from_column_slice(2, 1, &[3.0, 1.0]);
        // X^T y = [3, 2], alpha_max = 3 / 2
        let alphas = alpha_grid(&x, &y, 1e-2, 3).unwrap();
        assert_eq!(alphas.len(), 3);
        assert_relative_eq!(alphas[0], 1.5, max_relative = 1e-12);
        assert_relative_eq!(alphas[1], 0.15, max_relative = 1e-12);
        assert_relative_eq!(alphas[2], 0.015, max_relative = 1e-12);
    }

    #[test]
    fn multi_target_grid_uses_row_norms() {
        let x = na::DMatrix::<f64>::identity(2, 2);
        let y = na::DMatrix::from_row_slice(2, 2, &[3.0, 4.0, 1.0, 0.0]);
        let alphas = alpha_grid(&x, &y, 0.5, 2).unwrap();
        assert_relative_eq!(alphas[0], 2.5, max_relative = 1e-12);
        assert_relative_eq!(alphas[1], 1.25, max_relative = 1e-12);
    }

    #[test]
    fn zero_correlation_gives_flat_grid() {
        let x = na::DMatrix::<f64>::identity(2, 2);
        let y = na::DMatrix::zeros(2, 1);
        assert_eq!(alpha_grid(&x, &y, 1e-3, 4).unwrap(), vec![1e-15; 4]);
    }

    #[test]
    fn explicit_alphas_are_sorted_descending() {
        let x = na::DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let y = na::DMatrix::from_column_slice(3, 1, &[1.0, 1.0, 2.0]);
        let config = PathConfig {
            alphas: Some(vec![0.01, 1.0, 0.1]),
            ..PathConfig::default()
        };
        let path = admm_path(&x, &y, &config).unwrap();
        assert_eq!(path.alphas, vec![1.0, 0.1, 0.01]);
        assert_eq!(path.coefs.len(), 3);
        assert_eq!(path.n_iter.len(), 3);
        assert_eq!(path.coef_matrix(0).unwrap().shape(), (2, 3));
        assert!(path.coef_matrix(1).is_err());
        assert_eq!(path.timings.get_step_statistics()["fit_alpha"].2, 3);
    }

    #[test]
    fn nan_alpha_is_rejected() {
        let x = na::DMatrix::<f64>::identity(2, 2);
        let y = na::DMatrix::zeros(2, 1);
        let config = PathConfig {
            alphas: Some(vec![f64::NAN]),
            ..PathConfig::default()
        };
        assert!(admm_path(&x, &y, &config).is_err());
    }
}
