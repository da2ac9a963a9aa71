//! Growing a truncated factorization back to full working size.
//!
//! After a restart `Q` is no longer a plain Krylov sequence (its leading columns are
//! Ritz vectors), so each new `q` direction is re-orthogonalized against the entire
//! current `Q` rather than against its predecessor only. The scalars of each step are
//! appended to the broken-arrow working matrix: `β` to the superdiagonal and `α` to the
//! diagonal.

use super::{
    FactorizationState, apply_forward, apply_transpose, normalize, orthogonalize,
    subtract_scaled,
};
use crate::{
    bidiagonal::{Bidiagonal, WorkingMatrix},
    error::{ThickSvdError, ThickSvdErrorKind, input_error},
};
use faer::{Par, dyn_stack::MemStack, matrix_free::BiLinOp};

/// Extends a truncated factorization from working size `l + 1` to `k`.
///
/// The state is consumed; on success the returned state has `P` with `k` columns, `Q`
/// with `k + 1` columns, and `β` set to the norm of the final residual. On failure the
/// partially extended state is dropped, so callers never observe it.
///
/// # Errors
/// Fails with [`ThickSvdErrorKind::Breakdown`] if a new direction vanishes after
/// orthogonalization, and with a precondition error if `state` is not the output of a
/// truncation or `k` is outside `[working_size, capacity]`.
pub fn extend(
    operator: &impl BiLinOp<f64>,
    mut state: FactorizationState,
    k: usize,
    par: Par,
    stack: &mut MemStack,
) -> Result<FactorizationState, ThickSvdError> {
    let start = state.working_size();
    if state.q().ncols() != start {
        return Err(ThickSvdErrorKind::ParameterMismatch {
            param_name: "Q".to_string(),
            expected: start,
            actual: state.q().ncols(),
        }
        .into());
    }
    if k < start || k > state.capacity() {
        return Err(input_error(format!(
            "Cannot extend a factorization of size {start} to k = {k} (capacity {}).",
            state.capacity()
        )));
    }

    let placeholder = WorkingMatrix::Bidiagonal(Bidiagonal::new(Vec::new(), Vec::new())?);
    let mut b = match std::mem::replace(&mut state.b, placeholder) {
        WorkingMatrix::BrokenArrow(b) => b,
        WorkingMatrix::Bidiagonal(_) => {
            return Err(input_error(
                "Only a truncated factorization (broken-arrow B) can be extended.",
            ));
        }
    };

    let mut pending = state.residual.take();
    let mut beta = state.beta;

    // `j` counts the columns of P; column j of Q is the next one to be formed.
    for j in start..=k {
        // The pending direction from a truncation is already normalized; its true
        // length is the state's β.
        let (mut q, scale) = match pending.take() {
            Some(g) => (g, state.beta),
            None => (
                apply_transpose(operator, state.p().get(.., j - 1..j), par, stack),
                1.0,
            ),
        };
        let q_reference = q.norm_l2();
        orthogonalize(&mut q, state.q(), par);
        beta = scale * normalize(&mut q, q_reference, j)?;
        state.push_q(q.as_ref());

        if j == k {
            break;
        }
        b.push_superdiag(beta);

        let mut p = apply_forward(operator, state.q().get(.., j..j + 1), par, stack);
        let p_reference = p.norm_l2();
        subtract_scaled(&mut p, beta, state.p().get(.., j - 1..j));
        let alpha = normalize(&mut p, p_reference, j + 1)?;
        b.push_diag(alpha);
        state.push_p(p.as_ref());
    }

    state.beta = beta;
    state.b = b.into();
    log::trace!("Extended working size {start} -> {k}, β = {beta:e}");
    Ok(state)
}
