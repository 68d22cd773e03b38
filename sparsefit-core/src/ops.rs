//! Linear-system primitives used by the ADMM solver.
extern crate nalgebra as na;

#[cfg(any(feature = "accelerate", feature = "openblas", feature = "netlib"))]
use nalgebra_lapack::Cholesky;

use crate::utils::{Result, SolverError, ensure_finite};

/// Inverts a symmetric positive definite matrix.
///
/// Tries a Cholesky factorization first and falls back to LU for matrices
/// that are invertible but not numerically positive definite.
///
/// - Uses LAPACK's Cholesky when any LAPACK backend feature is enabled
///   (accelerate, openblas, or netlib)
/// - Falls back to nalgebra's built-in Cholesky when no LAPACK backend is available
///
/// # Errors
///
/// [`SolverError::IllConditioned`] if the matrix is singular or the inverse
/// contains non-finite values.
pub fn dense_inverse(m: &na::DMatrix<f64>) -> Result<na::DMatrix<f64>> {
    if !m.is_square() {
        return Err(SolverError::DimensionMismatch {
            what: "coefficient matrix columns",
            expected: m.nrows(),
            actual: m.ncols(),
        });
    }

    #[cfg(any(feature = "accelerate", feature = "openblas", feature = "netlib"))]
    let cholesky = Cholesky::new(m.clone()).and_then(|l| l.inverse());

    #[cfg(not(any(feature = "accelerate", feature = "openblas", feature = "netlib")))]
    let cholesky = m.clone().cholesky().map(|l| l.inverse());

    let inverse = match cholesky {
        Some(inverse) => inverse,
        None => m.clone().try_inverse().ok_or_else(|| {
            SolverError::IllConditioned("coefficient matrix is singular".to_string())
        })?,
    };
    ensure_finite(inverse.iter(), "inverse of the coefficient matrix")?;
    Ok(inverse)
}

/// A square tridiagonal matrix in banded form.
///
/// `sub[i]` is entry `(i + 1, i)`, `diag[i]` is `(i, i)` and `sup[i]` is
/// `(i, i + 1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TridiagonalMatrix {
    pub sub: Vec<f64>,
    pub diag: Vec<f64>,
    pub sup: Vec<f64>,
}

impl TridiagonalMatrix {
    /// Keeps the three central diagonals of a square matrix.
    pub fn from_dense(m: &na::DMatrix<f64>) -> Result<Self> {
        if !m.is_square() {
            return Err(SolverError::DimensionMismatch {
                what: "banded matrix columns",
                expected: m.nrows(),
                actual: m.ncols(),
            });
        }
        let n = m.nrows();
        let diag = (0..n).map(|i| m[(i, i)]).collect();
        let sub = (1..n).map(|i| m[(i, i - 1)]).collect();
        let sup = (1..n).map(|i| m[(i - 1, i)]).collect();
        Ok(TridiagonalMatrix { sub, diag, sup })
    }

    pub fn size(&self) -> usize {
        self.diag.len()
    }

    /// Frobenius norm of everything `from_dense` discarded from `m`.
    pub fn off_band_norm(m: &na::DMatrix<f64>) -> f64 {
        let mut sum = 0.0;
        for j in 0..m.ncols() {
            for i in 0..m.nrows() {
                if i.abs_diff(j) > 1 {
                    sum += m[(i, j)] * m[(i, j)];
                }
            }
        }
        sum.sqrt()
    }

    /// Solves `self * x = rhs` with the Thomas algorithm.
    ///
    /// No pivoting is done, which is stable for the symmetric positive
    /// definite systems the ADMM solver produces.
    pub fn solve(&self, rhs: &na::DVector<f64>) -> Result<na::DVector<f64>> {
        let n = self.size();
        if rhs.len() != n {
            return Err(SolverError::DimensionMismatch {
                what: "banded right-hand side",
                expected: n,
                actual: rhs.len(),
            });
        }
        if n == 0 {
            return Ok(na::DVector::zeros(0));
        }

        let mut c_prime = vec![0.0; n];
        let mut d_prime = vec![0.0; n];

        let mut pivot = self.diag[0];
        for i in 0..n {
            if i > 0 {
                pivot = self.diag[i] - self.sub[i - 1] * c_prime[i - 1];
            }
            if pivot == 0.0 || !pivot.is_finite() {
                return Err(SolverError::IllConditioned(format!(
                    "zero pivot at row {i} of banded system"
                )));
            }
            if i + 1 < n {
                c_prime[i] = self.sup[i] / pivot;
            }
            d_prime[i] = if i == 0 {
                rhs[0] / pivot
            } else {
                (rhs[i] - self.sub[i - 1] * d_prime[i - 1]) / pivot
            };
        }

        let mut x = na::DVector::<f64>::zeros(n);
        x[n - 1] = d_prime[n - 1];
        for i in (0..n - 1).rev() {
            x[i] = d_prime[i] - c_prime[i] * x[i + 1];
        }
        ensure_finite(x.iter(), "banded solution")?;
        Ok(x)
    }

    /// Solves for every column of `rhs`.
    pub fn solve_columns(&self, rhs: &na::DMatrix<f64>) -> Result<na::DMatrix<f64>> {
        let mut out = na::DMatrix::<f64>::zeros(rhs.nrows(), rhs.ncols());
        for (k, column) in rhs.column_iter().enumerate() {
            let x = self.solve(&column.clone_owned())?;
            out.set_column(k, &x);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn spd_tridiagonal(n: usize) -> na::DMatrix<f64> {
        na::DMatrix::from_fn(n, n, |i, j| match i.abs_diff(j) {
            0 => 4.0 + i as f64,
            1 => -1.0,
            _ => 0.0,
        })
    }

    #[test]
    fn banded_solve_matches_dense_solve() {
        let m = spd_tridiagonal(6);
        let band = TridiagonalMatrix::from_dense(&m).unwrap();
        let rhs = na::DVector::from_vec(vec![1.0, -2.0, 0.5, 3.0, 0.0, 1.5]);

        let banded = band.solve(&rhs).unwrap();
        let dense = dense_inverse(&m).unwrap() * &rhs;
        assert_abs_diff_eq!(banded, dense, epsilon = 1e-12);
    }

    #[test]
    fn off_band_norm_ignores_band() {
        let mut m = spd_tridiagonal(4);
        assert_eq!(TridiagonalMatrix::off_band_norm(&m), 0.0);
        m[(0, 3)] = 3.0;
        m[(3, 1)] = 4.0;
        assert_abs_diff_eq!(TridiagonalMatrix::off_band_norm(&m), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn singular_matrix_is_ill_conditioned() {
        let m = na::DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        assert!(matches!(
            dense_inverse(&m),
            Err(SolverError::IllConditioned(_))
        ));

        let band = TridiagonalMatrix::from_dense(&na::DMatrix::zeros(3, 3)).unwrap();
        assert!(band.solve(&na::DVector::from_element(3, 1.0)).is_err());
    }

    #[test]
    fn single_entry_system() {
        let band = TridiagonalMatrix::from_dense(&na::DMatrix::from_element(1, 1, 2.0)).unwrap();
        let x = band.solve(&na::DVector::from_element(1, 3.0)).unwrap();
        assert_abs_diff_eq!(x[0], 1.5);
    }
}
