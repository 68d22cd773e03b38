//! sparsefit-core
//!
//! This library provides the numerical core of sparsefit: K-SVD dictionary
//! learning and an ADMM solver for generalized Lasso problems
//!
//! ```text
//! minimize 1 / (2 n) ||y - X w||^2 + alpha ||D w||_1
//! ```
//!
//! where the structural operator `D` selects plain Lasso, Fused Lasso or
//! Trend Filtering.
//!
//! # Functionality
//!
//! - K-SVD with a pluggable sparse encoder (Orthogonal Matching Pursuit built in)
//! - Transform-matrix strategies for the generalized Lasso penalty
//! - ADMM with a dense inverse or a tridiagonal solve, shared across targets
//! - Parallel multi-target dispatch and regularization paths
//! - Timing diagnostics returned with every fit
//!
//! # Features
//!
//! - `rayon` - Solve independent targets and encode samples in parallel (default)
//! - `linfa` - Reference Lasso solver from `linfa-elasticnet` for cross-checks
//! - `accelerate` - Use the `accelerate` backend for matrix operations
//! - `netlib` - Use the `netlib` backend for matrix operations
//! - `openblas` - Use the `openblas` backend for matrix operations
//!
//! # Example
//!
//! ```rust
//! # extern crate nalgebra as na;
//! use sparsefit_core::path::{PathConfig, admm_path};
//!
//! let x = na::DMatrix::from_fn(20, 4, |i, j| ((i * 4 + j) as f64 * 0.37).sin());
//! let y = na::DMatrix::from_fn(20, 1, |i, _| x[(i, 0)] - 2.0 * x[(i, 2)]);
//!
//! let path = admm_path(&x, &y, &PathConfig { n_alphas: 5, ..PathConfig::default() }).unwrap();
//! assert_eq!(path.coef_matrix(0).unwrap().shape(), (4, 5));
//! ```

/// Multi-target fan-out of the ADMM solver
pub mod dispatch;

/// Sparse encoders consumed by K-SVD
pub mod encoder;

/// K-SVD dictionary learning
pub mod ksvd;

/// Generalized Lasso estimator and its shared linear system
pub mod lasso;

/// Dense and banded linear-system primitives
pub mod ops;

/// Regularization path runner
pub mod path;

/// ADMM problem trait, configuration and iteration driver
pub mod problem;

/// Timing diagnostics
pub mod timing;

/// Structural operators for the generalized Lasso penalty
pub mod transform;

/// Errors, soft-thresholding and synthetic problems
pub mod utils;

pub use lasso::{GeneralizedLasso, LassoFit};
pub use utils::{Result, SolverError};
