extern crate nalgebra as na;

use serde::{Deserialize, Serialize};

/// Structural operator `D` of the generalized Lasso penalty `alpha * ||D w||_1`.
///
/// Each variant is a pure function of the number of features. The ADMM core
/// only ever sees the generated matrix and [`TransformMatrix::supports_banded`].
///
/// # Example
///
/// ```rust
/// # use sparsefit_core::transform::TransformMatrix;
/// let d = TransformMatrix::TrendFiltering { margin: 1 }.generate(5);
/// assert_eq!(d.row(0).iter().copied().collect::<Vec<_>>(), vec![-2.0, 2.0, 0.0, 0.0, 0.0]);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformMatrix {
    /// `D = I`, the plain Lasso.
    #[default]
    Identity,
    /// `D = sparse_coef * I + fused_coef * F`, where `F` takes first
    /// differences and its first row is zero.
    Fused { sparse_coef: f64, fused_coef: f64 },
    /// Second differences, with the first `margin` rows replaced by the
    /// boundary pattern `[-2, 2, ...]`.
    TrendFiltering { margin: usize },
}

impl TransformMatrix {
    pub fn generate(&self, n_features: usize) -> na::DMatrix<f64> {
        let n = n_features;
        match *self {
            TransformMatrix::Identity => na::DMatrix::identity(n, n),
            TransformMatrix::Fused {
                sparse_coef,
                fused_coef,
            } => {
                let mut fused = na::DMatrix::<f64>::identity(n, n);
                for i in 1..n {
                    fused[(i, i - 1)] = -1.0;
                }
                if n > 0 {
                    fused[(0, 0)] = 0.0;
                }
                na::DMatrix::<f64>::identity(n, n) * sparse_coef + fused * fused_coef
            }
            TransformMatrix::TrendFiltering { margin } => {
                let mut d = na::DMatrix::<f64>::from_fn(n, n, |i, j| match i.abs_diff(j) {
                    0 => -2.0,
                    1 => 1.0,
                    _ => 0.0,
                });
                for i in 0..margin.min(n) {
                    d[(i, 0)] = -2.0;
                    if n > 1 {
                        d[(i, 1)] = 2.0;
                    }
                }
                d
            }
        }
    }

    /// Whether `D^T D` is tridiagonal, so `X^T X / n + rho D^T D` can be
    /// solved in banded form when `X^T X` is too.
    pub fn supports_banded(&self) -> bool {
        matches!(
            self,
            TransformMatrix::Identity | TransformMatrix::Fused { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransformMatrix::Identity => "lasso",
            TransformMatrix::Fused { .. } => "fused_lasso",
            TransformMatrix::TrendFiltering { .. } => "trend_filtering",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(d: &na::DMatrix<f64>, i: usize) -> Vec<f64> {
        d.row(i).iter().copied().collect()
    }

    #[test]
    fn fused_without_fusion_is_scaled_identity() {
        let d = TransformMatrix::Fused {
            sparse_coef: 0.7,
            fused_coef: 0.0,
        }
        .generate(6);
        assert_eq!(d, na::DMatrix::<f64>::identity(6, 6) * 0.7);
    }

    #[test]
    fn fused_first_row_has_no_difference() {
        let d = TransformMatrix::Fused {
            sparse_coef: 1.0,
            fused_coef: 2.0,
        }
        .generate(4);
        assert_eq!(row(&d, 0), vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(row(&d, 1), vec![-2.0, 3.0, 0.0, 0.0]);
        assert_eq!(row(&d, 3), vec![0.0, 0.0, -2.0, 3.0]);
    }

    #[test]
    fn trend_filtering_boundary_rows() {
        let d = TransformMatrix::TrendFiltering { margin: 1 }.generate(5);
        assert_eq!(row(&d, 0), vec![-2.0, 2.0, 0.0, 0.0, 0.0]);
        assert_eq!(row(&d, 1), vec![1.0, -2.0, 1.0, 0.0, 0.0]);
        assert_eq!(row(&d, 2), vec![0.0, 1.0, -2.0, 1.0, 0.0]);
        assert_eq!(row(&d, 3), vec![0.0, 0.0, 1.0, -2.0, 1.0]);
        // Only the leading rows are adjusted.
        assert_eq!(row(&d, 4), vec![0.0, 0.0, 0.0, 1.0, -2.0]);
    }

    #[test]
    fn trend_filtering_margin_is_clamped() {
        let d = TransformMatrix::TrendFiltering { margin: 10 }.generate(2);
        assert_eq!(row(&d, 0), vec![-2.0, 2.0]);
        assert_eq!(row(&d, 1), vec![-2.0, 2.0]);
        let single = TransformMatrix::TrendFiltering { margin: 1 }.generate(1);
        assert_eq!(single[(0, 0)], -2.0);
    }

    #[test]
    fn banded_capability() {
        assert!(TransformMatrix::Identity.supports_banded());
        assert!(
            TransformMatrix::Fused {
                sparse_coef: 1.0,
                fused_coef: 1.0
            }
            .supports_banded()
        );
        assert!(!TransformMatrix::TrendFiltering { margin: 1 }.supports_banded());
    }
}
