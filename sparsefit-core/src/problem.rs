use serde::{Deserialize, Serialize};

use crate::{
    timing::{TimingTracker, time_fn},
    utils::Result,
};

/// Configuration settings for one ADMM fit.
///
/// # Example
///
/// ```rust
/// # use sparsefit_core::problem::AdmmConfig;
/// let config = AdmmConfig {
///     alpha: 0.1,
///     max_iter: 500,
///     ..AdmmConfig::default()
/// };
/// assert_eq!(config.rho, 1.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmmConfig {
    /// Penalty strength on `||D w||_1`
    pub alpha: f64,
    /// Augmented Lagrangian penalty parameter
    pub rho: f64,
    /// Stop once the cost changes by less than this between iterations
    pub tol: f64,
    /// Maximum number of iterations
    pub max_iter: usize,
    /// Solve the w-update with a tridiagonal solver instead of a dense inverse
    pub banded: bool,
}

impl Default for AdmmConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            rho: 1.0,
            tol: 1e-4,
            max_iter: 1000,
            banded: false,
        }
    }
}

/// Trait defining the steps of a scaled-form ADMM iteration.
///
/// The methods in this trait implement the standard ADMM algorithm:
/// 1. `initialize` - Set the starting primal, auxiliary and dual variables
/// 2. `update_w` - Minimize the augmented Lagrangian over the primal variable
/// 3. `update_z` - Proximal step on the auxiliary variable
/// 4. `update_h` - Dual ascent on the scaled multiplier
/// 5. `update_cost` - Evaluate the objective used by the stopping rule
/// 6. `check_stopping_criteria` - Check if the algorithm should terminate
pub trait AdmmProblem {
    /// Called once before the first iteration.
    fn initialize(&mut self) -> Result<()>;

    fn update_w(&mut self) -> Result<()>;

    fn update_z(&mut self) -> Result<()>;

    fn update_h(&mut self) -> Result<()>;

    fn update_cost(&mut self) -> Result<()>;

    /// Returns `true` once the algorithm should stop.
    fn check_stopping_criteria(&self) -> bool;
}

/// ADMM solver that orchestrates the iterative optimization process.
///
/// Runs any [`AdmmProblem`] for at most `max_iter` iterations and records the
/// duration of every step in a [`TimingTracker`].
pub struct AdmmSolver<P>
where
    P: AdmmProblem,
{
    problem: P,
    max_iter: usize,
    timing_tracker: TimingTracker,
}

impl<P> AdmmSolver<P>
where
    P: AdmmProblem,
{
    pub fn new(problem: P, max_iter: usize) -> Self {
        AdmmSolver {
            problem,
            max_iter,
            timing_tracker: TimingTracker::new(),
        }
    }

    /// Uses `tracker` instead of a fresh one, e.g. to tag records with a target.
    pub fn with_tracker(mut self, tracker: TimingTracker) -> Self {
        self.timing_tracker = tracker;
        self
    }

    /// Iterates until the stopping criteria hold or `max_iter` is exhausted.
    ///
    /// Returns the 0-based index of the last iteration run: the one at which
    /// the criteria held, or `max_iter - 1` if they never did. Exhausting the
    /// budget is not an error. With `max_iter == 0` nothing runs and 0 is
    /// returned.
    pub fn solve(&mut self) -> Result<usize> {
        time_fn(&mut self.timing_tracker, "initialize", || {
            self.problem.initialize()
        })?;

        let mut i = 0;
        while i < self.max_iter {
            self.timing_tracker.start_iteration();

            time_fn(&mut self.timing_tracker, "update_w", || {
                self.problem.update_w()
            })?;
            time_fn(&mut self.timing_tracker, "update_z", || {
                self.problem.update_z()
            })?;
            time_fn(&mut self.timing_tracker, "update_h", || {
                self.problem.update_h()
            })?;
            time_fn(&mut self.timing_tracker, "update_cost", || {
                self.problem.update_cost()
            })?;

            if self.problem.check_stopping_criteria() {
                log::trace!("[AdmmSolver] converged at iteration {}", i);
                return Ok(i);
            }
            i += 1;
        }
        Ok(self.max_iter.saturating_sub(1))
    }

    pub fn problem(&self) -> &P {
        &self.problem
    }

    pub fn timing_tracker(&self) -> &TimingTracker {
        &self.timing_tracker
    }

    /// Gives back the problem and the timings collected while solving.
    pub fn into_parts(self) -> (P, TimingTracker) {
        (self.problem, self.timing_tracker)
    }
}
