//! Fan-out of independent ADMM targets.
extern crate nalgebra as na;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::lasso::{LinearSystem, TargetSolution};
use crate::timing::TimingTracker;
use crate::utils::{Result, SolverError};

/// Solves every target of `system` and assembles the coefficient matrix.
///
/// Targets only share the immutable [`LinearSystem`], so with the `rayon`
/// feature they run on the global thread pool without any locking.
/// Returns `(coef, n_iter, timings)` with coefficient columns and iteration
/// counts in target order.
pub fn solve_targets(
    system: &LinearSystem<'_>,
) -> Result<(na::DMatrix<f64>, Vec<usize>, TimingTracker)> {
    let n_targets = system.n_targets();

    let solutions: Vec<Result<TargetSolution>> = if n_targets == 1 {
        vec![system.solve_target(0)]
    } else {
        solve_all(system)
    };

    let solutions = solutions.into_iter().collect::<Result<Vec<_>>>()?;
    combine_targets(system.n_features(), solutions)
}

#[cfg(feature = "rayon")]
fn solve_all(system: &LinearSystem<'_>) -> Vec<Result<TargetSolution>> {
    (0..system.n_targets())
        .into_par_iter()
        .map(|k| system.solve_target(k))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn solve_all(system: &LinearSystem<'_>) -> Vec<Result<TargetSolution>> {
    (0..system.n_targets())
        .map(|k| system.solve_target(k))
        .collect()
}

/// Combines per-target solutions back into one `n_features × n_targets` matrix.
pub fn combine_targets(
    n_features: usize,
    mut solutions: Vec<TargetSolution>,
) -> Result<(na::DMatrix<f64>, Vec<usize>, TimingTracker)> {
    solutions.sort_by_key(|s| s.target);

    let mut coef = na::DMatrix::<f64>::zeros(n_features, solutions.len());
    let mut n_iter = Vec::with_capacity(solutions.len());
    let mut timings = TimingTracker::new();

    for (k, solution) in solutions.into_iter().enumerate() {
        if solution.target != k {
            return Err(SolverError::InvalidInput(format!(
                "missing solution for target {k}"
            )));
        }
        if solution.coef.len() != n_features {
            return Err(SolverError::DimensionMismatch {
                what: "target coefficients",
                expected: n_features,
                actual: solution.coef.len(),
            });
        }
        coef.set_column(k, &solution.coef);
        n_iter.push(solution.n_iter);
        timings.merge(solution.timings);
    }

    Ok((coef, n_iter, timings))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solution(target: usize, value: f64, n_iter: usize) -> TargetSolution {
        TargetSolution {
            target,
            coef: na::DVector::from_element(2, value),
            n_iter,
            timings: TimingTracker::for_target(target),
        }
    }

    #[test]
    fn columns_are_assembled_in_target_order() {
        let (coef, n_iter, _) =
            combine_targets(2, vec![solution(1, 2.0, 5), solution(0, 1.0, 3)]).unwrap();
        assert_eq!(coef, na::DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 1.0, 2.0]));
        assert_eq!(n_iter, vec![3, 5]);
    }

    #[test]
    fn gaps_in_targets_are_reported() {
        assert!(combine_targets(2, vec![solution(0, 1.0, 1), solution(2, 1.0, 1)]).is_err());
    }
}
