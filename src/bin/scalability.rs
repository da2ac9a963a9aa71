//! Experiment Runner for the Scalability Analysis.
//!
//! The primary process, the "orchestrator," iterates through a range of problem sizes.
//! For each size it spawns isolated "worker" child processes, one per restart variant
//! (`plain`, `reorthogonalized`), which generate a random sparse matrix, run the
//! thick-restart SVD on it and report time, operator products and peak memory.
//!
//! Each worker runs in a separate process so that its peak RSS is not conflated with
//! the orchestrator's or with other workers'. The orchestrator captures the single-row
//! CSV output of each worker and aggregates all results into a final CSV file.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use faer::{
    Mat, Par,
    dyn_stack::{MemBuffer, MemStack},
    sparse::{SparseColMat, Triplet},
};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use std::{
    path::PathBuf,
    process::{Command, Stdio},
    time::Instant,
};
use thick_restart_svd::{
    ThickRestartParams, matrix::CountingOperator, thick_restart_svd, thick_restart_svd_scratch,
    utils::perf::get_peak_rss_kb,
};

/// Environment variable to differentiate between orchestrator and worker processes.
/// If this is set, the process runs in worker mode for the specified variant.
const VARIANT_ENV_VAR: &str = "THICK_SVD_SCALABILITY_VARIANT";

/// Restart variant run by a worker process.
#[derive(ValueEnum, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Copy)]
#[serde(rename_all = "kebab-case")]
enum RestartVariant {
    Plain,
    Reorthogonalized,
}

impl RestartVariant {
    fn name(self) -> &'static str {
        match self {
            RestartVariant::Plain => "plain",
            RestartVariant::Reorthogonalized => "reorthogonalized",
        }
    }
}

/// Command-line arguments for the main orchestrator process.
#[derive(Parser, Debug)]
#[clap(
    name = "scalability-runner",
    about = "Runs the scalability analysis of thick-restart SVD on random sparse matrices."
)]
struct ScalabilityArgs {
    /// The starting number of rows.
    #[clap(long)]
    rows_start: usize,
    /// The ending number of rows.
    #[clap(long)]
    rows_end: usize,
    /// The step size for increasing the number of rows.
    #[clap(long)]
    rows_step: usize,
    /// Columns per row; the matrix has `rows * col_ratio` columns.
    #[clap(long, default_value_t = 0.5)]
    col_ratio: f64,
    /// Nonzeros per column of the generated matrices.
    #[clap(long, default_value_t = 5)]
    nnz_per_col: usize,
    /// Number of singular values requested (l).
    #[clap(long, default_value_t = 10)]
    nvals: usize,
    /// Working size (k).
    #[clap(long, default_value_t = 30)]
    working_size: usize,
    /// Restart budget of every run.
    #[clap(long, default_value_t = 50)]
    max_iterations: usize,
    /// Path to the output CSV file for storing aggregated results.
    #[clap(long, value_name = "PATH")]
    output: PathBuf,
}

/// Command-line arguments for the isolated worker processes.
#[derive(Parser, Debug)]
struct WorkerArgs {
    #[clap(long)]
    rows: usize,
    #[clap(long)]
    cols: usize,
    #[clap(long)]
    nnz_per_col: usize,
    #[clap(long)]
    nvals: usize,
    #[clap(long)]
    working_size: usize,
    #[clap(long)]
    max_iterations: usize,
}

/// Represents a single row of data in the output CSV.
/// This struct captures the result from a single worker run.
#[derive(Debug, Serialize, Deserialize)]
struct ScalabilityResult {
    variant: RestartVariant,
    rows: usize,
    cols: usize,
    nnz: usize,
    k: usize,
    iterations: usize,
    converged: bool,
    time_s: f64,
    forward_products: usize,
    transpose_products: usize,
    rss_kb: u64,
}

/// Main entry point.
///
/// The logic dispatches to either the orchestrator or a worker based on the
/// presence of the `THICK_SVD_SCALABILITY_VARIANT` environment variable.
fn main() -> Result<()> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;

    if let Ok(variant_str) = std::env::var(VARIANT_ENV_VAR) {
        let variant = RestartVariant::from_str(&variant_str, true)
            .map_err(|_| anyhow!("Invalid variant string in env var: {}", variant_str))?;
        run_worker(variant)
    } else {
        run_orchestrator()
    }
}

/// Orchestrator logic.
///
/// Results are written to the output CSV file incrementally so that data is saved even
/// if a run fails mid-way through the experiment.
fn run_orchestrator() -> Result<()> {
    let args = ScalabilityArgs::parse();
    log::info!("Orchestrator starting scalability experiment...");

    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("Failed to create CSV writer for {:?}", &args.output))?;

    let variants_to_run = [RestartVariant::Plain, RestartVariant::Reorthogonalized];
    let current_exe = std::env::current_exe()?;

    for rows in (args.rows_start..=args.rows_end).step_by(args.rows_step.max(1)) {
        let cols = ((rows as f64) * args.col_ratio).round() as usize;
        if cols <= args.working_size {
            log::warn!("Skipping {rows} rows: {cols} columns cannot hold k = {}.", args.working_size);
            continue;
        }
        log::info!("Processing problem size: {rows}x{cols}");

        for &variant in &variants_to_run {
            log::info!("Spawning worker for variant: {variant:?}");
            let child = Command::new(&current_exe)
                .args(["--rows", &rows.to_string()])
                .args(["--cols", &cols.to_string()])
                .args(["--nnz-per-col", &args.nnz_per_col.to_string()])
                .args(["--nvals", &args.nvals.to_string()])
                .args(["--working-size", &args.working_size.to_string()])
                .args(["--max-iterations", &args.max_iterations.to_string()])
                .env(VARIANT_ENV_VAR, variant.name())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .spawn()
                .with_context(|| format!("Failed to spawn worker for variant {variant:?}"))?;

            let output = child.wait_with_output()?;
            if !output.status.success() {
                log::error!(
                    "Worker process for variant {:?} on {}x{} failed with status: {}. Skipping.",
                    variant,
                    rows,
                    cols,
                    output.status
                );
                continue;
            }

            let mut rdr = csv::ReaderBuilder::new()
                .has_headers(false)
                .from_reader(output.stdout.as_slice());

            match rdr.deserialize::<ScalabilityResult>().next() {
                Some(Ok(record)) => {
                    log::info!(
                        "Worker finished. Result: {}x{}, {} restarts, time={:.2}s, rss={}KB",
                        record.rows,
                        record.cols,
                        record.iterations,
                        record.time_s,
                        record.rss_kb
                    );
                    writer.serialize(&record)?;
                    writer.flush()?;
                }
                Some(Err(e)) => {
                    log::error!("Failed to parse worker output as CSV: {}. Skipping record.", e);
                }
                None => {
                    log::warn!("Worker for {:?} produced no output. Skipping record.", variant);
                }
            }
        }
    }

    log::info!(
        "Scalability experiment complete. Results saved to {:?}.",
        &args.output
    );
    Ok(())
}

/// Random sparse `rows×cols` matrix with `nnz_per_col` entries in every column.
///
/// Row positions follow a fixed hash of the column index so that every size is
/// reproducible; values are uniform in `[-1, 1)`.
fn create_sparse_problem(
    rows: usize,
    cols: usize,
    nnz_per_col: usize,
    rng: &mut StdRng,
) -> Result<SparseColMat<usize, f64>> {
    let mut triplets = Vec::with_capacity(cols * nnz_per_col);
    for j in 0..cols {
        for t in 0..nnz_per_col {
            triplets.push(Triplet {
                row: (j * 7919 + t * 104_729) % rows,
                col: j,
                val: 2.0 * rng.random::<f64>() - 1.0,
            });
        }
    }
    SparseColMat::try_new_from_triplets(rows, cols, &triplets)
        .map_err(|e| anyhow!("Failed to construct sparse matrix: {:?}", e))
}

/// Worker logic.
///
/// This function runs in an isolated child process. It generates one problem, runs the
/// requested variant, and prints a single `ScalabilityResult` to stdout as a CSV row.
fn run_worker(variant: RestartVariant) -> Result<()> {
    let args = WorkerArgs::parse();
    log::info!("Worker for {variant:?} started.");

    let mut rng = StdRng::seed_from_u64(args.rows as u64);
    let a = create_sparse_problem(args.rows, args.cols, args.nnz_per_col, &mut rng)?;
    let nnz = a.compute_nnz();
    let n = args.cols;
    let q0 = Mat::<f64>::from_fn(n, 1, |_, _| 1.0 / (n as f64).sqrt());

    let op = CountingOperator::new(a.as_ref());
    let mut stack_mem = MemBuffer::new(thick_restart_svd_scratch(&op, Par::Seq));
    let params = ThickRestartParams {
        nvals: args.nvals,
        working_size: Some(args.working_size),
        max_iterations: Some(args.max_iterations),
        reorthogonalize: variant == RestartVariant::Reorthogonalized,
        ..ThickRestartParams::default()
    };

    let start_time = Instant::now();
    let output = thick_restart_svd(&op, q0.as_ref(), params, MemStack::new(&mut stack_mem), None)?;
    let time_s = start_time.elapsed().as_secs_f64();
    let rss_kb = get_peak_rss_kb();

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(std::io::stdout());
    writer.serialize(ScalabilityResult {
        variant,
        rows: args.rows,
        cols: args.cols,
        nnz,
        k: args.working_size,
        iterations: output.iterations,
        converged: output.converged(),
        time_s,
        forward_products: op.forward_products(),
        transpose_products: op.transpose_products(),
        rss_kb,
    })?;
    writer.flush()?;

    log::info!("Worker for {variant:?} finished.");
    Ok(())
}
