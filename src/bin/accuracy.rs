//! Experiment Runner for the Accuracy Analysis.
//!
//! This executable measures how well the thick-restart process recovers the leading
//! singular values of a dense test matrix with a prescribed spectrum. The matrix is
//! assembled as `A = U diag(σ) Vᵗ` from random orthonormal factors, so the exact
//! singular values are known. For every working size `k` of the sweep the runner records
//! the relative error of each recovered value, the final error bound, the number of
//! restarts and the number of operator products.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use faer::{
    Col, Mat, Par,
    dyn_stack::{MemBuffer, MemStack},
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;
use std::path::PathBuf;
use thick_restart_svd::{
    ThickRestartParams, matrix::CountingOperator, thick_restart_svd, thick_restart_svd_scratch,
};

/// The spectral properties of the test matrix A.
#[derive(ValueEnum, Clone, Debug, Copy)]
enum SpectrumScenario {
    /// Geometrically decaying singular values, `σ_i = 100 · 0.9^i`. The leading values
    /// are well separated and converge quickly.
    Separated,
    /// The leading values form a tight cluster of relative width `1e-3`, followed by a
    /// slow decay. Clusters keep the refined bounds from tightening.
    Clustered,
}

/// Command-line arguments for the accuracy experiment.
#[derive(Parser, Debug)]
#[clap(
    name = "accuracy-runner",
    about = "Measures the accuracy of thick-restart SVD against a known spectrum."
)]
struct AccuracyArgs {
    /// The spectral scenario for the test problem.
    #[clap(long, value_enum)]
    scenario: SpectrumScenario,

    /// Number of rows of the test matrix.
    #[clap(long, default_value_t = 600)]
    rows: usize,

    /// Number of columns of the test matrix.
    #[clap(long, default_value_t = 400)]
    cols: usize,

    /// Number of singular values requested (l).
    #[clap(long, default_value_t = 6)]
    nvals: usize,

    /// Smallest working size (k) of the sweep. Must exceed `nvals`.
    #[clap(long, default_value_t = 8)]
    k_min: usize,

    /// Largest working size (k) of the sweep.
    #[clap(long, default_value_t = 60)]
    k_max: usize,

    /// Step size for iterating k.
    #[clap(long, default_value_t = 4)]
    k_step: usize,

    /// Convergence tolerance on the refined error bounds.
    #[clap(long, default_value_t = 1e-8)]
    tol: f64,

    /// Seed for the random orthonormal factors and the starting vector.
    #[clap(long, default_value_t = 42)]
    seed: u64,

    /// Path to the output CSV file where results will be written.
    #[clap(long, value_name = "PATH")]
    output: PathBuf,
}

/// Represents a single row of data for the accuracy analysis CSV.
#[derive(Debug, Serialize)]
struct AccuracyResult {
    /// The working size.
    k: usize,
    /// Completed restarts.
    iterations: usize,
    /// `Converged`, `Exhausted` or `Breakdown`.
    termination: String,
    /// Largest relative error `|σ̃_i - σ_i| / σ_i` over the requested values.
    max_relative_error: f64,
    /// Largest refined error bound reported by the solver.
    max_bound: f64,
    /// Normwise backward error `β / σ_1`.
    backward_error: f64,
    forward_products: usize,
    transpose_products: usize,
}

/// Prescribed singular values, in descending order.
fn spectrum(count: usize, scenario: SpectrumScenario) -> Vec<f64> {
    match scenario {
        SpectrumScenario::Separated => (0..count).map(|i| 100.0 * 0.9_f64.powi(i as i32)).collect(),
        SpectrumScenario::Clustered => (0..count)
            .map(|i| {
                if i < 8 {
                    10.0 * (1.0 - 1e-3 * i as f64 / 8.0)
                } else {
                    9.0 / (1.0 + 0.05 * (i - 8) as f64)
                }
            })
            .collect(),
    }
}

/// Orthonormal `rows×cols` factor, taken from the SVD of a random matrix.
fn random_orthonormal(rows: usize, cols: usize, rng: &mut StdRng) -> Result<Mat<f64>> {
    let g = Mat::<f64>::from_fn(rows, cols, |_, _| rng.random::<f64>() - 0.5);
    let svd = g
        .thin_svd()
        .map_err(|e| anyhow!("SVD of the random factor failed: {:?}", e))?;
    Ok(svd.U().to_owned())
}

/// Assembles `A = U diag(σ) Vᵗ` and returns it with its singular values.
fn create_test_matrix(
    rows: usize,
    cols: usize,
    scenario: SpectrumScenario,
    rng: &mut StdRng,
) -> Result<(Mat<f64>, Vec<f64>)> {
    let rank = rows.min(cols);
    let sigma = spectrum(rank, scenario);
    let u = random_orthonormal(rows, rank, rng)?;
    let v = random_orthonormal(cols, rank, rng)?;
    let s = Col::<f64>::from_fn(rank, |i| sigma[i]);
    let a = u.as_ref() * s.as_diagonal() * v.transpose();
    Ok((a, sigma))
}

/// The main entry point for the accuracy experiment.
fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .try_init()?;
    let args = AccuracyArgs::parse();
    log::info!(
        "Starting accuracy analysis: scenario {:?}, {}x{}, l = {}",
        args.scenario,
        args.rows,
        args.cols,
        args.nvals
    );

    // 1. Setup the test problem and ground truth.
    let mut rng = StdRng::seed_from_u64(args.seed);
    let (a, sigma) = create_test_matrix(args.rows, args.cols, args.scenario, &mut rng)
        .context("Failed to build the test matrix")?;
    let g = Mat::<f64>::from_fn(args.cols, 1, |_, _| rng.random::<f64>() - 0.5);
    let g_norm = g.norm_l2();
    let q0 = Mat::<f64>::from_fn(args.cols, 1, |i, _| g[(i, 0)] / g_norm);

    let op = CountingOperator::new(a.as_ref());
    let mut stack_mem = MemBuffer::new(thick_restart_svd_scratch(&op, Par::Seq));
    let mut results = Vec::new();

    // 2. Sweep the working size.
    for k in (args.k_min..=args.k_max).step_by(args.k_step.max(1)) {
        if k <= args.nvals {
            continue;
        }
        log::info!("Running for k = {k}...");
        op.reset();
        let params = ThickRestartParams {
            nvals: args.nvals,
            working_size: Some(k),
            tol: args.tol,
            ..ThickRestartParams::default()
        };

        let output = match thick_restart_svd(
            &op,
            q0.as_ref(),
            params,
            MemStack::new(&mut stack_mem),
            None,
        ) {
            Ok(output) => output,
            Err(e) => {
                log::warn!("Run failed at k = {k}: {e}. Stopping.");
                break;
            }
        };

        // 3. Compute and store metrics.
        let max_relative_error = output
            .values
            .iter()
            .zip(&sigma)
            .map(|(approx, exact)| (approx - exact).abs() / exact)
            .fold(0.0, f64::max);

        results.push(AccuracyResult {
            k,
            iterations: output.iterations,
            termination: format!("{:?}", output.termination),
            max_relative_error,
            max_bound: output.report.max_bound(),
            backward_error: output.report.backward_error,
            forward_products: op.forward_products(),
            transpose_products: op.transpose_products(),
        });
    }

    // 4. Write results to CSV.
    log::info!("Writing results to {:?}...", &args.output);
    let mut writer = csv::Writer::from_path(&args.output)?;
    for record in results {
        writer.serialize(record)?;
    }
    writer.flush()?;

    log::info!("Accuracy analysis complete.");
    Ok(())
}
