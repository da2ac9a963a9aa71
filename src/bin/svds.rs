//! Computes the leading singular values of a Matrix Market file.
//!
//! Prints one line per value with its refined error bound, followed by a short summary
//! of the run. Set `RUST_LOG=debug` to follow the error bounds restart by restart.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use faer::{
    Mat, Par,
    dyn_stack::{MemBuffer, MemStack},
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::path::PathBuf;
use thick_restart_svd::{
    Termination, ThickRestartParams, matrix::CountingOperator, thick_restart_svd,
    thick_restart_svd_scratch, utils::data_loader::load_matrix_market,
};

/// Command-line arguments of the partial SVD tool.
#[derive(Parser, Debug)]
#[clap(
    name = "svds",
    about = "Computes the largest singular values of a sparse Matrix Market matrix."
)]
struct SvdsArgs {
    /// Path to a `coordinate real` Matrix Market file.
    #[clap(value_name = "PATH")]
    input: PathBuf,
    /// Number of singular values to compute (l).
    #[clap(short = 'l', long, default_value_t = 6)]
    nvals: usize,
    /// Working size (k). Defaults to 2l.
    #[clap(short = 'k', long)]
    working_size: Option<usize>,
    /// Restart budget. Defaults to min(rows, cols).
    #[clap(long)]
    max_iterations: Option<usize>,
    /// Convergence tolerance. Defaults to sqrt(machine epsilon).
    #[clap(long)]
    tol: Option<f64>,
    /// Re-orthonormalize the compressed bases at every restart.
    #[clap(long)]
    reorthogonalize: bool,
    /// Seed of the random starting vector.
    #[clap(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init()?;
    let args = SvdsArgs::parse();

    let a = load_matrix_market(&args.input)
        .with_context(|| format!("Failed to load {:?}", &args.input))?;
    let (m, n) = (a.nrows(), a.ncols());
    log::info!("Loaded {:?}: {}x{}, {} nonzeros", &args.input, m, n, a.compute_nnz());

    let mut rng = StdRng::seed_from_u64(args.seed);
    let g = Mat::<f64>::from_fn(n, 1, |_, _| rng.random::<f64>() - 0.5);
    let g_norm = g.norm_l2();
    if g_norm == 0.0 {
        return Err(anyhow!("The matrix has no columns."));
    }
    let q0 = Mat::<f64>::from_fn(n, 1, |i, _| g[(i, 0)] / g_norm);

    let defaults = ThickRestartParams::default();
    let params = ThickRestartParams {
        nvals: args.nvals,
        working_size: args.working_size,
        max_iterations: args.max_iterations,
        tol: args.tol.unwrap_or(defaults.tol),
        reorthogonalize: args.reorthogonalize,
        par: Par::Seq,
    };

    let op = CountingOperator::new(a.as_ref());
    let mut stack_mem = MemBuffer::new(thick_restart_svd_scratch(&op, params.par));
    let output = thick_restart_svd(&op, q0.as_ref(), params, MemStack::new(&mut stack_mem), None)?;

    println!("{:>4}  {:>24}  {:>12}", "i", "sigma", "bound");
    for (i, (value, bound)) in output.values.iter().zip(&output.report.bounds).enumerate() {
        println!("{:>4}  {:>24.16e}  {:>12.3e}", i + 1, value, bound);
    }

    let status = match output.termination {
        Termination::Converged => "converged".to_string(),
        Termination::Exhausted => "restart budget exhausted".to_string(),
        Termination::Breakdown { iteration } => format!("invariant subspace at restart {iteration}"),
    };
    println!(
        "{status} after {} restarts; {} products with A, {} with Aᵗ",
        output.iterations,
        op.forward_products(),
        op.transpose_products()
    );
    Ok(())
}
