/*
This program generates a sparse regression problem and stores it as JSON.
*/

use std::fs::File;
use std::io::BufWriter;
use std::time::Instant;

use clap::Parser;
use sparsefit_core::utils::{RegressionProblem, SolverError};

/// Program to generate a design matrix X and targets y for a Lasso problem.
///
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The number of rows in X
    #[arg(short, long)]
    m: usize,

    /// The number of columns in X
    #[arg(short, long)]
    n: usize,

    /// The number of non-zero elements in w_true
    #[arg(short, long)]
    k: usize,

    /// Standard deviation of the additive noise
    #[arg(long, default_value_t = 0.03162)]
    noise: f64,

    /// Seed for the random generator
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Path of the JSON file to write
    #[arg(short, long, default_value_t = ("lasso-problem.json").to_string())]
    output: String,
}

fn main() -> Result<(), SolverError> {
    let args = Args::parse();
    let start = Instant::now();

    println!("[Main] Generating {}x{} problem with {} nonzeros...", args.m, args.n, args.k);
    let problem = RegressionProblem::generate(args.m, args.n, args.k, args.noise, args.seed)?;
    println!("[Main] Problem generated in {:?}", start.elapsed());
    println!("[Main] Alpha_max: {}", problem.alpha_max());

    let write_start = Instant::now();
    let writer = BufWriter::new(File::create(&args.output)?);
    serde_json::to_writer(writer, &problem)?;
    println!(
        "[Main] Wrote {} in {:?}",
        args.output,
        write_start.elapsed()
    );

    println!("[Main] Data generation complete in {:?}", start.elapsed());
    Ok(())
}
