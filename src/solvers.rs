//! This module provides the high-level API: computing the largest singular values of a
//! matrix-free operator by thick-restarted Golub–Kahan–Lanczos bidiagonalization.
//!
//! The driver runs the state machine
//!
//! ```text
//!     Build -> Decompose -> [Truncate -> Extend -> Decompose -> check]* -> Converged
//!                                                                       -> Exhausted
//! ```
//!
//! holding a single live [`FactorizationState`]. Each restart replaces it wholesale, so a
//! failure half-way through a restart leaves the previous complete state intact.

use crate::{
    algorithms::{
        FactorizationState, RestartCallback, RestartSnapshot,
        convergence::{ConvergenceReport, estimate},
        extend::extend,
        golub_kahan::build,
        truncate::truncate,
    },
    error::{ThickSvdError, ThickSvdErrorKind, input_error},
};
use faer::{
    Mat, MatRef, Par,
    dyn_stack::{MemStack, StackReq},
    matrix_free::BiLinOp,
};

/// Tuning parameters of [`thick_restart_svd`].
#[derive(Clone, Copy, Debug)]
pub struct ThickRestartParams {
    /// Number of singular values requested (`l`).
    pub nvals: usize,
    /// Working size `k > l`. Defaults to `2l`.
    pub working_size: Option<usize>,
    /// Restart budget. Defaults to `min(rows, cols)`.
    pub max_iterations: Option<usize>,
    /// Absolute tolerance on the refined error bounds.
    pub tol: f64,
    /// Re-orthonormalize the compressed bases at every restart.
    pub reorthogonalize: bool,
    /// Parallelism for dense kernels and operator products.
    pub par: Par,
}

impl Default for ThickRestartParams {
    fn default() -> Self {
        Self {
            nvals: 6,
            working_size: None,
            max_iterations: None,
            tol: f64::EPSILON.sqrt(),
            reorthogonalize: false,
            par: Par::Seq,
        }
    }
}

impl ThickRestartParams {
    /// Default parameters for `nvals` requested values.
    pub fn new(nvals: usize) -> Self {
        Self {
            nvals,
            ..Self::default()
        }
    }
}

/// How the restart loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// Every refined error bound fell below the tolerance.
    Converged,
    /// The restart budget ran out; the values are the best available estimates.
    Exhausted,
    /// An invariant subspace was found during restart `iteration`, or during the initial
    /// bidiagonalization when `iteration` is 0. The values and state are those of the last
    /// complete factorization.
    Breakdown { iteration: usize },
}

/// Result of [`thick_restart_svd`].
#[derive(Clone, Debug)]
pub struct ThickRestartOutput {
    /// The `l` largest Ritz values, in descending order. Fewer than `l` when the initial
    /// bidiagonalization closed an invariant subspace of smaller dimension.
    pub values: Vec<f64>,
    /// Approximate left singular vectors `P U[:, :l]` (`m×l`).
    pub left: Mat<f64>,
    /// Approximate right singular vectors `Q V[:, :l]` (`n×l`).
    pub right: Mat<f64>,
    /// The final factorization.
    pub state: FactorizationState,
    /// Error bounds of [`Self::values`].
    pub report: ConvergenceReport,
    pub termination: Termination,
    /// Number of completed restarts.
    pub iterations: usize,
}

impl ThickRestartOutput {
    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }
}

/// Workspace required by [`thick_restart_svd`] for single-vector products with `operator`.
pub fn thick_restart_svd_scratch(operator: &impl BiLinOp<f64>, par: Par) -> StackReq {
    StackReq::any_of(&[
        operator.apply_scratch(1, par),
        operator.transpose_apply_scratch(1, par),
    ])
}

/// Computes the largest singular values of `operator` by thick-restarted
/// Golub–Kahan–Lanczos bidiagonalization.
///
/// # Arguments
/// * `operator`: The matrix `A` (`m×n`), dense or sparse, accessed only through `A x`
///   and `Aᵗ x`.
/// * `q0`: Starting vector, a single column of length `n` with unit norm. It is not
///   re-normalized.
/// * `params`: Number of values, working size, restart budget, tolerance.
/// * `stack`: Workspace of at least [`thick_restart_svd_scratch`].
/// * `callback`: Optional observer invoked after every restart.
///
/// # Returns
/// The `l` leading Ritz values with their error bounds, the matching Ritz vectors and the
/// final factorization. Running out of restarts is not an error: the output then carries
/// [`Termination::Exhausted`].
///
/// An invariant subspace found by the initial bidiagonalization ends the run, since a
/// restart cannot add directions to it. If it has the full working size and its bounds
/// meet `tol` the run has converged; otherwise it ends in [`Termination::Breakdown`] with
/// `iteration` 0.
///
/// # Errors
/// Precondition violations are reported before any product with `A`. If `A q0 = 0` there
/// is no partial result at all, and [`ThickSvdErrorKind::Breakdown`] is returned.
pub fn thick_restart_svd(
    operator: &impl BiLinOp<f64>,
    q0: MatRef<'_, f64>,
    params: ThickRestartParams,
    stack: &mut MemStack,
    mut callback: Option<&mut RestartCallback<'_>>,
) -> Result<ThickRestartOutput, ThickSvdError> {
    let (l, k, max_iterations) = validate(operator, q0, &params)?;
    let par = params.par;

    let mut state = build(operator, q0, k, par, stack)?;
    let l = l.min(state.working_size());
    let mut svd = state.b().svd()?;
    let mut report = estimate(&state, &svd, l)?;
    let mut iterations = 0;

    let termination = loop {
        if iterations >= max_iterations {
            break Termination::Exhausted;
        }
        if state.working_size() < k || state.is_invariant() {
            if state.working_size() == k && report.is_converged(params.tol) {
                break Termination::Converged;
            }
            break Termination::Breakdown { iteration: iterations };
        }

        let truncated = match truncate(operator, &state, &svd, l, params.reorthogonalize, par, stack)
        {
            Ok(truncated) => truncated,
            Err(e) if e.is_breakdown() => break Termination::Breakdown { iteration: iterations + 1 },
            Err(e) => return Err(e),
        };
        let extended = match extend(operator, truncated, k, par, stack) {
            Ok(extended) => extended,
            Err(e) if e.is_breakdown() => break Termination::Breakdown { iteration: iterations + 1 },
            Err(e) => return Err(e),
        };

        svd = extended.b().svd()?;
        state = extended;
        iterations += 1;
        report = estimate(&state, &svd, l)?;
        log::debug!(
            "Restart {iterations}: β = {:e}, max bound = {:e}, gap = {:e}",
            state.beta(),
            report.max_bound(),
            report.spectral_gap
        );

        if let Some(ref mut cb) = callback {
            cb(&RestartSnapshot {
                iteration: iterations,
                report: &report,
                state: &state,
            });
        }

        if report.is_converged(params.tol) {
            break Termination::Converged;
        }
    };

    match termination {
        Termination::Converged => {
            log::info!("Converged after {iterations} restarts (tol = {:e}).", params.tol)
        }
        Termination::Exhausted => log::warn!(
            "No convergence after {iterations} restarts; max bound {:e} exceeds tol {:e}.",
            report.max_bound(),
            params.tol
        ),
        Termination::Breakdown { iteration: 0 } => log::warn!(
            "Invariant subspace of dimension {} found by the initial bidiagonalization.",
            state.working_size()
        ),
        Termination::Breakdown { iteration } => log::warn!(
            "Invariant subspace found during restart {iteration}; returning the last complete factorization."
        ),
    }

    let (left, right) = state.ritz_vectors(&svd, l)?;
    Ok(ThickRestartOutput {
        values: report.values.clone(),
        left,
        right,
        state,
        report,
        termination,
        iterations,
    })
}

/// Resolves defaults and checks every precondition. Returns `(l, k, max_iterations)`.
fn validate(
    operator: &impl BiLinOp<f64>,
    q0: MatRef<'_, f64>,
    params: &ThickRestartParams,
) -> Result<(usize, usize, usize), ThickSvdError> {
    let (m, n) = (operator.nrows(), operator.ncols());
    if q0.ncols() != 1 || q0.nrows() != n {
        return Err(ThickSvdErrorKind::DimensionMismatch {
            operator_cols: n,
            vector_rows: q0.nrows(),
        }
        .into());
    }

    let l = params.nvals;
    let k = params.working_size.unwrap_or(2 * l);
    if l == 0 {
        return Err(input_error("At least one singular value must be requested."));
    }
    if k <= l {
        return Err(input_error(format!(
            "The working size k = {k} must exceed the number of values l = {l}."
        )));
    }
    if k > m || k >= n {
        return Err(input_error(format!(
            "The working size k = {k} must satisfy k <= rows = {m} and k < cols = {n}."
        )));
    }
    if !(params.tol.is_finite() && params.tol >= 0.0) {
        return Err(input_error(format!(
            "The tolerance must be finite and non-negative, got {}.",
            params.tol
        )));
    }

    let q0_norm = q0.norm_l2();
    if (q0_norm - 1.0).abs() > f64::EPSILON.sqrt() {
        return Err(input_error(format!(
            "The starting vector must have unit norm, got {q0_norm}."
        )));
    }

    let max_iterations = params.max_iterations.unwrap_or(m.min(n));
    Ok((l, k, max_iterations))
}
