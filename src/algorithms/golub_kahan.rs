//! Initial Golub–Kahan–Lanczos bidiagonalization.
//!
//! Starting from a unit vector `q_1`, the recurrence
//!
//! ```text
//!     α_j p_j     = A q_j  - β_{j-1} p_{j-1}
//!     β_j q_{j+1} = Aᵗ p_j - α_j q_j
//! ```
//!
//! generates orthonormal bases `P_k`, `Q_{k+1}` and an upper bidiagonal `B_k` with
//! `A Q_k = P_k B_k`. The two-term recurrence alone loses orthogonality quickly in
//! floating point, so every new `q` is projected against the whole current `Q` instead
//! of only `q_j` (one-sided full re-orthogonalization).

use super::{
    FactorizationState, apply_forward, apply_transpose, normalize, orthogonalize,
    subtract_scaled,
};
use crate::{
    bidiagonal::{Bidiagonal, WorkingMatrix},
    error::{ThickSvdError, ThickSvdErrorKind, input_error},
};
use faer::{MatRef, Par, dyn_stack::MemStack, matrix_free::BiLinOp};

/// Performs `k` steps of Golub–Kahan–Lanczos bidiagonalization.
///
/// # Arguments
/// * `operator`: The matrix `A` (`m×n`), accessed only through products.
/// * `q0`: The starting vector, a single unit-norm column of length `n`. It becomes the
///   first column of `Q` unchanged.
/// * `k`: The working size, `1 <= k <= m` and `k < n`.
/// * `par`: Parallelism forwarded to the dense kernels.
/// * `stack`: Workspace for the operator products.
///
/// # Returns
/// A state with `P` of size `m×k`, `Q` of size `n×(k+1)`, a plain bidiagonal `B` holding
/// `α_1..α_k` and `β_1..β_{k-1}`, and `β = β_k`.
///
/// If the recurrence finds an invariant subspace, the steps completed so far are kept:
/// - `α_j = 0` (`A q_j` has no new direction): the state has `j - 1` steps and keeps
///   `q_j` as its residual direction.
/// - `β_j = 0` (`span(Q)` is invariant under `AᵗA`): the state has `j` steps, `β = 0` and
///   no residual column, see [`FactorizationState::is_invariant`]. Its Ritz values are
///   exact singular values of `A`.
///
/// # Errors
/// Fails with [`ThickSvdErrorKind::Breakdown`] only when `A q_1 = 0`, which leaves no
/// step to keep, and with a precondition error on bad inputs.
pub fn build(
    operator: &impl BiLinOp<f64>,
    q0: MatRef<'_, f64>,
    k: usize,
    par: Par,
    stack: &mut MemStack,
) -> Result<FactorizationState, ThickSvdError> {
    let (m, n) = (operator.nrows(), operator.ncols());
    if q0.ncols() != 1 || q0.nrows() != n {
        return Err(ThickSvdErrorKind::DimensionMismatch {
            operator_cols: n,
            vector_rows: q0.nrows(),
        }
        .into());
    }
    // Q needs k + 1 orthonormal columns in R^n, P needs k in R^m.
    if k == 0 || k > m || k >= n {
        return Err(input_error(format!(
            "The working size k = {k} must satisfy 1 <= k <= rows = {m} and k < cols = {n}."
        )));
    }

    let mut alphas = Vec::with_capacity(k);
    let mut betas = Vec::with_capacity(k);
    let placeholder = WorkingMatrix::Bidiagonal(Bidiagonal::new(Vec::new(), Vec::new())?);
    let mut state = FactorizationState::with_capacity(m, n, k, placeholder);
    state.push_q(q0);

    for j in 0..k {
        let step = j + 1;

        let mut p = apply_forward(operator, state.q().get(.., j..j + 1), par, stack);
        let p_reference = p.norm_l2();
        if j > 0 {
            subtract_scaled(&mut p, betas[j - 1], state.p().get(.., j - 1..j));
        }
        match normalize(&mut p, p_reference, step) {
            Ok(alpha) => alphas.push(alpha),
            Err(e) if e.is_breakdown() && j > 0 => {
                log::debug!("Bidiagonalization stopped at step {step}: A q_{step} lies in span(P).");
                break;
            }
            Err(e) => return Err(e),
        }
        state.push_p(p.as_ref());

        let mut q = apply_transpose(operator, p.as_ref(), par, stack);
        let q_reference = q.norm_l2();
        orthogonalize(&mut q, state.q(), par);
        match normalize(&mut q, q_reference, step) {
            Ok(beta) => {
                betas.push(beta);
                state.push_q(q.as_ref());
            }
            Err(e) if e.is_breakdown() => {
                log::debug!("Bidiagonalization stopped at step {step}: span(Q) is invariant.");
                betas.push(0.0);
                break;
            }
            Err(e) => return Err(e),
        }
    }

    // The last β couples B to the residual direction q_{k+1}; it is not part of B.
    state.beta = betas.pop().unwrap_or(0.0);
    state.b = Bidiagonal::new(alphas, betas)?.into();
    log::trace!(
        "Built a {}-step bidiagonalization with residual norm {:e}",
        state.working_size(),
        state.beta
    );
    Ok(state)
}
