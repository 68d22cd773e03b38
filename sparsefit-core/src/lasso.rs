//! Generalized Lasso solved with ADMM.
//!
//! Minimizes
//!
//! ```text
//! 1 / (2 n) ||y - X w||^2 + alpha ||z||_1    subject to   D w = z
//! ```
//!
//! through the scaled augmented Lagrangian
//!
//! ```text
//! 1 / (2 n) ||y - X w||^2 + alpha ||z||_1 + h^T (D w - z) + rho / 2 ||D w - z||^2
//! ```
//!
//! The coefficient matrix `M = X^T X / n + rho D^T D` does not depend on the
//! target, so it is factored once per fit in a [`LinearSystem`] and shared
//! read-only by every target's iteration.
extern crate nalgebra as na;

use crate::{
    dispatch,
    ops::{TridiagonalMatrix, dense_inverse},
    problem::{AdmmConfig, AdmmProblem, AdmmSolver},
    timing::TimingTracker,
    transform::TransformMatrix,
    utils::{Result, SolverError, ensure_finite, soft_threshold_vec},
};

/// How the w-update solves its linear system, fixed when the system is built.
#[derive(Debug, Clone)]
pub enum WUpdate {
    /// `inv_d = M^-1 rho D^T`, so `w = inv_xy + inv_d (z - h / rho)`.
    Dense { inv_d: na::DMatrix<f64> },
    /// `w = inv_xy + M^-1 D^T (rho z - h)` with a tridiagonal solve.
    Banded { band: TridiagonalMatrix },
}

/// Target-independent precomputation shared by all targets of one fit.
#[derive(Debug)]
pub struct LinearSystem<'a> {
    x: &'a na::DMatrix<f64>,
    y: &'a na::DMatrix<f64>,
    d: na::DMatrix<f64>,
    /// `M^-1 X^T y / n`, one column per target
    inv_xy: na::DMatrix<f64>,
    /// `X^T y / n`, the starting point of every target
    xy: na::DMatrix<f64>,
    w_update: WUpdate,
    config: AdmmConfig,
}

impl<'a> LinearSystem<'a> {
    /// Builds and factors `M = X^T X / n + rho D^T D`.
    ///
    /// # Errors
    ///
    /// * [`SolverError::DimensionMismatch`] if `x`, `y` and `d` disagree
    /// * [`SolverError::IllConditioned`] if `M` cannot be inverted or solved
    pub fn new(
        x: &'a na::DMatrix<f64>,
        y: &'a na::DMatrix<f64>,
        d: na::DMatrix<f64>,
        config: AdmmConfig,
    ) -> Result<Self> {
        let (n_samples, n_features) = x.shape();
        if y.nrows() != n_samples {
            return Err(SolverError::DimensionMismatch {
                what: "target rows",
                expected: n_samples,
                actual: y.nrows(),
            });
        }
        if d.ncols() != n_features {
            return Err(SolverError::DimensionMismatch {
                what: "transform matrix columns",
                expected: n_features,
                actual: d.ncols(),
            });
        }
        if n_samples == 0 {
            return Err(SolverError::InvalidInput(
                "cannot fit on zero samples".to_string(),
            ));
        }
        let n = n_samples as f64;

        let coef_matrix = x.tr_mul(x) / n + d.tr_mul(&d) * config.rho;
        let xy = x.tr_mul(y) / n;

        let (inv_xy, w_update) = if config.banded {
            let off_band = TridiagonalMatrix::off_band_norm(&coef_matrix);
            if off_band > 1e-12 * coef_matrix.norm() {
                log::warn!(
                    "coefficient matrix is not tridiagonal (off-band norm {:e}); \
                     banded solve only approximates it",
                    off_band
                );
            }
            let band = TridiagonalMatrix::from_dense(&coef_matrix)?;
            (band.solve_columns(&xy)?, WUpdate::Banded { band })
        } else {
            let inverse = dense_inverse(&coef_matrix)?;
            let inv_d = &inverse * d.transpose() * config.rho;
            (&inverse * &xy, WUpdate::Dense { inv_d })
        };
        ensure_finite(inv_xy.iter(), "precomputed M^-1 X^T y")?;

        Ok(LinearSystem {
            x,
            y,
            d,
            inv_xy,
            xy,
            w_update,
            config,
        })
    }

    pub fn n_targets(&self) -> usize {
        self.y.ncols()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    pub fn w_update(&self) -> &WUpdate {
        &self.w_update
    }

    /// Runs ADMM on target column `target`.
    pub fn solve_target(&self, target: usize) -> Result<TargetSolution> {
        let problem = TargetProblem::new(self, target);
        let mut solver = AdmmSolver::new(problem, self.config.max_iter)
            .with_tracker(TimingTracker::for_target(target));
        let n_iter = solver.solve()?;
        let (problem, timings) = solver.into_parts();
        Ok(TargetSolution {
            target,
            coef: problem.w,
            n_iter,
            timings,
        })
    }
}

/// Result of one target's ADMM run.
#[derive(Debug, Clone)]
pub struct TargetSolution {
    pub target: usize,
    pub coef: na::DVector<f64>,
    pub n_iter: usize,
    pub timings: TimingTracker,
}

/// ADMM state `(w, z, h)` for one target column.
pub struct TargetProblem<'s, 'a> {
    system: &'s LinearSystem<'a>,
    target: usize,
    w: na::DVector<f64>,
    z: na::DVector<f64>,
    h: na::DVector<f64>,
    dw: na::DVector<f64>,
    cost: f64,
    prev_cost: f64,
}

impl<'s, 'a> TargetProblem<'s, 'a> {
    pub fn new(system: &'s LinearSystem<'a>, target: usize) -> Self {
        let n_features = system.n_features();
        let n_rows = system.d.nrows();
        TargetProblem {
            system,
            target,
            w: na::DVector::zeros(n_features),
            z: na::DVector::zeros(n_rows),
            h: na::DVector::zeros(n_rows),
            dw: na::DVector::zeros(n_rows),
            cost: f64::INFINITY,
            prev_cost: f64::INFINITY,
        }
    }

    /// `||y - X w||_2 / n + alpha * sum |z|`.
    ///
    /// The residual norm is not squared.
    fn cost_function(&self) -> f64 {
        let x = self.system.x;
        let n = x.nrows() as f64;
        let residual = self.system.y.column(self.target) - x * &self.w;
        residual.norm() / n + self.system.config.alpha * self.z.lp_norm(1)
    }
}

impl AdmmProblem for TargetProblem<'_, '_> {
    fn initialize(&mut self) -> Result<()> {
        let system = self.system;
        self.w = system.xy.column(self.target).clone_owned();
        self.z = &system.d * &self.w;
        self.h = na::DVector::zeros(system.d.nrows());
        self.cost = self.cost_function();
        self.prev_cost = self.cost;
        Ok(())
    }

    fn update_w(&mut self) -> Result<()> {
        let system = self.system;
        let rho = system.config.rho;
        let inv_xy = system.inv_xy.column(self.target);
        self.w = match &system.w_update {
            WUpdate::Dense { inv_d } => inv_xy + inv_d * (&self.z - &self.h / rho),
            WUpdate::Banded { band } => {
                let rhs = system.d.tr_mul(&(&self.z * rho - &self.h));
                inv_xy + band.solve(&rhs)?
            }
        };
        ensure_finite(self.w.iter(), "primal iterate")
    }

    fn update_z(&mut self) -> Result<()> {
        let config = &self.system.config;
        self.dw = &self.system.d * &self.w;
        self.z = soft_threshold_vec(&(&self.dw + &self.h / config.rho), config.alpha / config.rho);
        Ok(())
    }

    fn update_h(&mut self) -> Result<()> {
        self.h += (&self.dw - &self.z) * self.system.config.rho;
        Ok(())
    }

    fn update_cost(&mut self) -> Result<()> {
        self.prev_cost = self.cost;
        self.cost = self.cost_function();
        Ok(())
    }

    fn check_stopping_criteria(&self) -> bool {
        (self.cost - self.prev_cost).abs() < self.system.config.tol
    }
}

/// Fitted coefficients of a [`GeneralizedLasso`].
#[derive(Debug, Clone)]
pub struct LassoFit {
    /// `n_features × n_targets`, columns in target order
    pub coef: na::DMatrix<f64>,
    /// Iteration index each target stopped at
    pub n_iter: Vec<usize>,
    pub timings: TimingTracker,
}

impl LassoFit {
    /// Coefficients of the first target.
    pub fn coef_vector(&self) -> na::DVector<f64> {
        self.coef.column(0).clone_owned()
    }

    pub fn predict(&self, x: &na::DMatrix<f64>) -> Result<na::DMatrix<f64>> {
        if x.ncols() != self.coef.nrows() {
            return Err(SolverError::DimensionMismatch {
                what: "prediction features",
                expected: self.coef.nrows(),
                actual: x.ncols(),
            });
        }
        Ok(x * &self.coef)
    }
}

/// ADMM estimator for the generalized Lasso.
///
/// # Example
///
/// ```rust
/// # extern crate nalgebra as na;
/// # use sparsefit_core::lasso::GeneralizedLasso;
/// let x = na::DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
/// let y = na::DVector::from_vec(vec![1.0, 1.0, 2.0]);
///
/// let fit = GeneralizedLasso::lasso(0.01)
///     .with_max_iter(500)
///     .with_tol(1e-6)
///     .fit_vector(&x, &y)
///     .unwrap();
/// assert!((fit.coef[(0, 0)] - 0.99).abs() < 1e-3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneralizedLasso {
    pub config: AdmmConfig,
    pub transform: TransformMatrix,
}

impl GeneralizedLasso {
    /// Estimator with an explicit config and penalty structure.
    pub fn new(config: AdmmConfig, transform: TransformMatrix) -> Self {
        GeneralizedLasso { config, transform }
    }

    /// `D = I`
    pub fn lasso(alpha: f64) -> Self {
        Self::new(
            AdmmConfig {
                alpha,
                ..AdmmConfig::default()
            },
            TransformMatrix::Identity,
        )
    }

    /// `alpha * (sparse_coef * sum |w_j| + fused_coef * sum |w_j - w_{j-1}|)`
    pub fn fused(alpha: f64, sparse_coef: f64, fused_coef: f64) -> Self {
        Self::new(
            AdmmConfig {
                alpha,
                ..AdmmConfig::default()
            },
            TransformMatrix::Fused {
                sparse_coef,
                fused_coef,
            },
        )
    }

    /// Second differences, with `margin` boundary rows.
    pub fn trend_filtering(alpha: f64, margin: usize) -> Self {
        Self::new(
            AdmmConfig {
                alpha,
                ..AdmmConfig::default()
            },
            TransformMatrix::TrendFiltering { margin },
        )
    }

    /// Sets the augmented Lagrangian penalty parameter.
    pub fn with_rho(mut self, rho: f64) -> Self {
        self.config.rho = rho;
        self
    }

    /// Sets the cost-change tolerance of the stopping rule.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.config.tol = tol;
        self
    }

    /// Sets the iteration budget per target.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.config.max_iter = max_iter;
        self
    }

    /// Selects the tridiagonal w-update instead of the dense inverse.
    pub fn with_banded(mut self, banded: bool) -> Self {
        self.config.banded = banded;
        self
    }

    /// Fits every column of `y` as an independent target.
    ///
    /// # Errors
    ///
    /// * [`SolverError::InvalidInput`] if a banded solve is requested for a
    ///   transform whose `D^T D` is not tridiagonal
    /// * errors from [`LinearSystem::new`] and the per-target iterations
    pub fn fit(&self, x: &na::DMatrix<f64>, y: &na::DMatrix<f64>) -> Result<LassoFit> {
        if self.config.alpha == 0.0 {
            log::warn!(
                "with alpha = 0 this algorithm does not converge well; \
                 prefer ordinary least squares"
            );
        }
        if self.config.banded && !self.transform.supports_banded() {
            return Err(SolverError::InvalidInput(format!(
                "{} transform does not admit a banded solve",
                self.transform.name()
            )));
        }

        let d = self.transform.generate(x.ncols());
        let system = LinearSystem::new(x, y, d, self.config)?;
        let (coef, n_iter, timings) = dispatch::solve_targets(&system)?;
        Ok(LassoFit {
            coef,
            n_iter,
            timings,
        })
    }

    /// Single-target convenience wrapper around [`GeneralizedLasso::fit`].
    pub fn fit_vector(&self, x: &na::DMatrix<f64>, y: &na::DVector<f64>) -> Result<LassoFit> {
        let y = na::DMatrix::from_column_slice(y.len(), 1, y.as_slice());
        self.fit(x, &y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn small_problem() -> (na::DMatrix<f64>, na::DMatrix<f64>) {
        let x = na::DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let y = na::DMatrix::from_column_slice(3, 1, &[1.0, 1.0, 2.0]);
        (x, y)
    }

    #[test]
    fn dense_system_precomputes_inverse_terms() {
        let (x, y) = small_problem();
        let config = AdmmConfig::default();
        let system = LinearSystem::new(&x, &y, na::DMatrix::identity(2, 2), config).unwrap();
        // M = [[2, 1], [1, 2]] / 3 + I, X^T y / n = [1, 1]
        let m = na::DMatrix::from_row_slice(2, 2, &[5.0, 1.0, 1.0, 5.0]) / 3.0;
        assert_abs_diff_eq!(&m * &system.inv_xy, system.xy, epsilon = 1e-12);
        match system.w_update() {
            WUpdate::Dense { inv_d } => {
                assert_abs_diff_eq!(&m * inv_d, na::DMatrix::identity(2, 2), epsilon = 1e-12)
            }
            WUpdate::Banded { .. } => panic!("expected dense w-update"),
        }
    }

    #[test]
    fn first_iteration_from_exact_start_stays_put() {
        let (x, y) = small_problem();
        let lasso = GeneralizedLasso::lasso(0.0).with_tol(1e-12).with_max_iter(50);
        let fit = lasso.fit(&x, &y).unwrap();
        assert_abs_diff_eq!(fit.coef[(0, 0)], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.coef[(1, 0)], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn mismatched_rows_are_rejected() {
        let (x, _) = small_problem();
        let y = na::DMatrix::zeros(4, 1);
        assert!(matches!(
            GeneralizedLasso::lasso(0.1).fit(&x, &y),
            Err(SolverError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn banded_trend_filtering_is_rejected() {
        let (x, y) = small_problem();
        let model = GeneralizedLasso::trend_filtering(0.1, 1).with_banded(true);
        assert!(matches!(
            model.fit(&x, &y),
            Err(SolverError::InvalidInput(_))
        ));
    }

    #[test]
    fn predict_uses_fitted_coefficients() {
        let (x, y) = small_problem();
        let fit = GeneralizedLasso::lasso(0.01)
            .with_tol(1e-8)
            .fit(&x, &y)
            .unwrap();
        let prediction = fit.predict(&x).unwrap();
        assert_abs_diff_eq!(prediction, &x * &fit.coef, epsilon = 1e-12);
        assert!(fit.predict(&na::DMatrix::zeros(2, 3)).is_err());
    }
}
