/*
This program runs an ADMM regularization path on a problem written by
generate_problem and prints a summary of every fit.
*/

use std::fs::File;
use std::io::BufReader;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use sparsefit_core::{
    path::{PathConfig, admm_path},
    transform::TransformMatrix,
    utils::{RegressionProblem, SolverError},
};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Regularizer {
    Lasso,
    Fused,
    Trend,
}

/// Program to fit a generalized Lasso over a grid of penalties.
///
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON problem produced by generate_problem
    #[arg(short, long)]
    input: String,

    /// Structure of the penalty
    #[arg(short, long, value_enum, default_value_t = Regularizer::Lasso)]
    regularizer: Regularizer,

    /// Number of penalties on the path
    #[arg(long, default_value_t = 20)]
    n_alphas: usize,

    /// Ratio alpha_min / alpha_max
    #[arg(long, default_value_t = 1e-3)]
    eps: f64,

    /// Augmented Lagrangian penalty parameter
    #[arg(long, default_value_t = 1.0)]
    rho: f64,

    /// Maximum number of ADMM iterations per fit
    #[arg(long, default_value_t = 1000)]
    max_iter: usize,

    /// Cost-change tolerance
    #[arg(long, default_value_t = 1e-4)]
    tol: f64,

    /// Use the tridiagonal solve for the w-update
    #[arg(long, default_value_t = false)]
    banded: bool,

    /// The number of threads to use for parallelization
    #[arg(short, long, default_value_t = 1)]
    threads: usize,

    /// Write per-alpha timings to this CSV file
    #[arg(long)]
    timings: Option<String>,
}

fn main() -> Result<(), SolverError> {
    let args = Args::parse();

    #[cfg(feature = "rayon")]
    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()
        .map_err(|e| SolverError::InvalidInput(format!("failed to create thread pool: {e}")))?;

    let load_start = Instant::now();
    let reader = BufReader::new(File::open(&args.input)?);
    let problem: RegressionProblem = serde_json::from_reader(reader)?;
    let (m, n) = problem.x.shape();
    println!(
        "[Main] Loaded {}x{} problem from {} in {:?}",
        m,
        n,
        args.input,
        load_start.elapsed()
    );

    let transform = match args.regularizer {
        Regularizer::Lasso => TransformMatrix::Identity,
        Regularizer::Fused => TransformMatrix::Fused {
            sparse_coef: 1.0,
            fused_coef: 1.0,
        },
        Regularizer::Trend => TransformMatrix::TrendFiltering { margin: 1 },
    };

    let config = PathConfig {
        eps: args.eps,
        n_alphas: args.n_alphas,
        rho: args.rho,
        max_iter: args.max_iter,
        tol: args.tol,
        transform,
        banded: args.banded,
        ..PathConfig::default()
    };

    let solve_start = Instant::now();
    let path = admm_path(&problem.x, &problem.y, &config)?;
    println!(
        "[Main] {} path with {} alphas solved in {:?}",
        transform.name(),
        path.alphas.len(),
        solve_start.elapsed()
    );

    for ((alpha, coef), n_iter) in path.alphas.iter().zip(&path.coefs).zip(&path.n_iter) {
        let nonzeros = coef.iter().filter(|v| v.abs() > 1e-8).count();
        let error = (coef.column(0) - &problem.w_true).norm();
        println!(
            "alpha={:.4e}  iters={:?}  nnz={}  ||w - w_true||={:.4e}",
            alpha, n_iter, nonzeros, error
        );
    }

    path.timings.print_timing_summary();
    if let Some(filename) = &args.timings {
        path.timings.write_step_timings_to_csv(filename)?;
        println!("[Main] Timings written to {}", filename);
    }

    Ok(())
}
