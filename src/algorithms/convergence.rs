//! A-posteriori error bounds for the Ritz values of a factorization.
//!
//! For the SVD `B = U Σ Vᵗ` of the working matrix, the residual of the `i`-th Ritz
//! triplet is `β |U[k, i]|`, which bounds the distance from `σ_i` to a true singular
//! value of `A` ("simple bound"). When the Ritz values are well separated the bound can
//! be sharpened with Rayleigh–Ritz theory: with `δ` the smallest gap between the
//! retained Ritz values and `ε_i` the simple bound, whenever `2 ε_i <= δ`
//!
//! ```text
//!     vector bound  = ε_i / (δ - ε_i) * sqrt(1 + (ε_i / (δ - ε_i))²)
//!     value bound   = ε_i² / δ
//! ```
//!
//! and the refined bound is the smallest of the three. Normwise backward errors are
//! reported alongside as diagnostics; they never influence the accept/reject decision.

use super::{FactorizationState, check_svd_matches};
use crate::error::{ThickSvdError, input_error};
use faer::linalg::solvers::Svd;

/// Error bounds and diagnostics for the `l` leading Ritz values.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvergenceReport {
    /// The `l` largest Ritz values, in descending order.
    pub values: Vec<f64>,
    /// `β |U[k, i]|` for each retained value.
    pub simple_bounds: Vec<f64>,
    /// Rayleigh–Ritz refined bounds; these decide convergence.
    pub bounds: Vec<f64>,
    /// Smallest gap between the retained values (or to the next Ritz value if `l = 1`).
    pub spectral_gap: f64,
    /// Normwise backward error `β / σ_1`.
    pub backward_error: f64,
    /// Per-value backward errors `ε_i / σ_1`.
    pub value_backward_errors: Vec<f64>,
}

impl ConvergenceReport {
    /// Every refined bound is strictly below `tol`.
    pub fn is_converged(&self, tol: f64) -> bool {
        self.bounds.iter().all(|&bound| bound < tol)
    }

    /// The largest refined bound, or zero when no values are tracked.
    pub fn max_bound(&self) -> f64 {
        self.bounds.iter().copied().fold(0.0, f64::max)
    }
}

/// Computes the error bounds of the `l` leading Ritz values of `state`.
///
/// `svd` must be the SVD of `state.b()` and `1 <= l <= working_size`.
pub fn estimate(
    state: &FactorizationState,
    svd: &Svd<f64>,
    l: usize,
) -> Result<ConvergenceReport, ThickSvdError> {
    check_svd_matches(state, svd)?;
    let k = state.working_size();
    if l == 0 || l > k {
        return Err(input_error(format!(
            "Cannot estimate l = {l} values of a working size k = {k}."
        )));
    }

    let sigma = svd.S().column_vector();
    let u = svd.U();
    let beta = state.beta();

    let values: Vec<f64> = (0..l).map(|i| sigma[i]).collect();
    let simple_bounds: Vec<f64> = (0..l).map(|i| beta * u[(k - 1, i)].abs()).collect();

    let spectral_gap = if l > 1 {
        min_pairwise_gap(&values)
    } else if k > 1 {
        (sigma[0] - sigma[1]).abs()
    } else {
        f64::INFINITY
    };

    let bounds = simple_bounds
        .iter()
        .map(|&eps| refine_bound(eps, spectral_gap))
        .collect();

    let sigma_max = values[0];
    let backward_error = relative_to(beta, sigma_max);
    let value_backward_errors = simple_bounds
        .iter()
        .map(|&eps| relative_to(eps, sigma_max))
        .collect();

    Ok(ConvergenceReport {
        values,
        simple_bounds,
        bounds,
        spectral_gap,
        backward_error,
        value_backward_errors,
    })
}

/// Decides whether the `l` leading Ritz values have converged to tolerance `tol`.
///
/// # Errors
/// `tol` must be finite and non-negative. A zero tolerance never converges.
pub fn is_converged(
    state: &FactorizationState,
    svd: &Svd<f64>,
    l: usize,
    tol: f64,
) -> Result<bool, ThickSvdError> {
    if !(tol.is_finite() && tol >= 0.0) {
        return Err(input_error(format!(
            "The tolerance must be finite and non-negative, got {tol}."
        )));
    }
    Ok(estimate(state, svd, l)?.is_converged(tol))
}

fn min_pairwise_gap(values: &[f64]) -> f64 {
    let mut gap = f64::INFINITY;
    for (i, &a) in values.iter().enumerate() {
        for &b in &values[i + 1..] {
            gap = gap.min((a - b).abs());
        }
    }
    gap
}

fn refine_bound(eps: f64, gap: f64) -> f64 {
    if !(gap > 0.0 && gap.is_finite() && 2.0 * eps <= gap) {
        return eps;
    }
    let ratio = eps / (gap - eps);
    let vector_bound = ratio * (1.0 + ratio * ratio).sqrt();
    let value_bound = eps * eps / gap;
    eps.min(vector_bound).min(value_bound)
}

fn relative_to(x: f64, scale: f64) -> f64 {
    if scale > 0.0 { x / scale } else { f64::INFINITY }
}
