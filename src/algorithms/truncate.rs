//! The thick restart: compress a `k`-step factorization onto its best `l` directions.
//!
//! Given the SVD `B = U Σ Vᵗ` of the current working matrix, the bases are rotated onto
//! the leading Ritz vectors,
//!
//! ```text
//!     Q' = [Q_k V_l, q_{k+1}],        P' = P_k U_l,
//! ```
//!
//! and the factorization is advanced by one Lanczos step from the residual direction
//! `q_{k+1}`. Since `A Q_k V_l = P_k U_l Σ_l` holds exactly, the new working matrix is
//! diagonal on the retained block and only couples to the fresh direction through the
//! arrow `ρ = β U[k, :l]`, giving the broken-arrow layout of
//! [`crate::bidiagonal::BrokenArrowBidiagonal`].

use super::{
    FactorizationState, apply_forward, apply_transpose, check_svd_matches, normalize,
    orthogonalize, subtract_scaled,
};
use crate::{
    bidiagonal::{Bidiagonal, BrokenArrowBidiagonal, WorkingMatrix},
    error::{ThickSvdError, ThickSvdErrorKind, input_error},
};
use faer::{
    Accum, Mat, Par,
    dyn_stack::MemStack,
    linalg::{matmul::matmul, solvers::Svd},
    matrix_free::BiLinOp,
};

/// Restarts the factorization, keeping the `l` dominant Ritz directions.
///
/// # Arguments
/// * `operator`: The matrix `A`.
/// * `state`: A complete factorization of working size `k` (`Q` has `k + 1` columns).
/// * `svd`: The SVD of `state.b()`.
/// * `l`: Number of directions to keep, `1 <= l < k`.
/// * `reorthogonalize`: Re-orthonormalize the compressed bases and project the new left
///   vector against the whole compressed `P`. Compression by an orthonormal factor keeps
///   the bases orthonormal in exact arithmetic; this only counters accumulated rounding.
///
/// # Returns
/// A factorization of working size `l + 1` in which `P` and `Q` both have `l + 1`
/// columns, `B` is broken-arrow with an empty superdiagonal, and `β` is the norm of the
/// pending residual direction that the next [`super::extend::extend`] consumes.
pub fn truncate(
    operator: &impl BiLinOp<f64>,
    state: &FactorizationState,
    svd: &Svd<f64>,
    l: usize,
    reorthogonalize: bool,
    par: Par,
    stack: &mut MemStack,
) -> Result<FactorizationState, ThickSvdError> {
    let k = state.working_size();
    if state.q().ncols() != k + 1 {
        return Err(ThickSvdErrorKind::ParameterMismatch {
            param_name: "Q".to_string(),
            expected: k + 1,
            actual: state.q().ncols(),
        }
        .into());
    }
    check_svd_matches(state, svd)?;
    if l == 0 || l >= k {
        return Err(input_error(format!(
            "Cannot keep l = {l} directions of a working size k = {k}; need 1 <= l < k."
        )));
    }

    let (m, n) = (operator.nrows(), operator.ncols());
    let capacity = state.capacity();
    let u = svd.U();
    let sigma = svd.S().column_vector();

    let placeholder = WorkingMatrix::Bidiagonal(Bidiagonal::new(Vec::new(), Vec::new())?);
    let mut next = FactorizationState::with_capacity(m, n, capacity, placeholder);

    // 1. Q' = [Q_k V_l, q_{k+1}]
    matmul(
        next.q.as_mut().get_mut(.., 0..l),
        Accum::Replace,
        state.q().get(.., 0..k),
        svd.V().get(.., 0..l),
        1.0,
        par,
    );
    next.q.col_mut(l).copy_from(state.q().col(k));
    next.q_cols = l + 1;
    if reorthogonalize {
        reorthonormalize(&mut next.q, l + 1, par)?;
    }

    // 2. f = A q_{k+1}
    let mut f = apply_forward(operator, next.q().get(.., l..l + 1), par, stack);
    let f_reference = f.norm_l2();

    // 3. ρ = β U[k, :l]
    let rho: Vec<f64> = (0..l).map(|i| state.beta() * u[(k - 1, i)]).collect();

    // 4. P' = P_k U_l
    matmul(
        next.p.as_mut().get_mut(.., 0..l),
        Accum::Replace,
        state.p(),
        u.get(.., 0..l),
        1.0,
        par,
    );
    next.p_cols = l;
    if reorthogonalize {
        reorthonormalize(&mut next.p, l, par)?;
    }

    // 5. f -= P' ρ, then append f / ‖f‖ to P'.
    let rho_col = Mat::from_fn(l, 1, |i, _| rho[i]);
    matmul(f.as_mut(), Accum::Add, next.p(), rho_col.as_ref(), -1.0, par);
    if reorthogonalize {
        orthogonalize(&mut f, next.p(), par);
    }
    let alpha = normalize(&mut f, f_reference, l + 1)?;
    next.push_p(f.as_ref());

    // 6. g = Aᵗ f - α q_{k+1}, kept as the pending residual direction.
    let mut g = apply_transpose(operator, f.as_ref(), par, stack);
    let g_reference = g.norm_l2();
    subtract_scaled(&mut g, alpha, next.q().get(.., l..l + 1));
    next.beta = normalize(&mut g, g_reference, l + 1)?;
    next.residual = Some(g);

    // 7. B' = broken arrow with diagonal [σ_1..σ_l, α] and arrow ρ.
    let mut d = Vec::with_capacity(capacity);
    d.extend((0..l).map(|i| sigma[i]));
    d.push(alpha);
    let mut b = BrokenArrowBidiagonal::new(d, rho, Vec::new())?;
    b.reserve_to(capacity);
    next.b = b.into();

    log::trace!(
        "Truncated working size {k} -> {}, α = {alpha:e}, β = {:e}",
        l + 1,
        next.beta
    );
    Ok(next)
}

/// One pass of classical Gram–Schmidt over the first `ncols` columns of `basis`.
fn reorthonormalize(basis: &mut Mat<f64>, ncols: usize, par: Par) -> Result<(), ThickSvdError> {
    for j in 0..ncols {
        let mut v = basis.as_ref().get(.., j..j + 1).to_owned();
        let reference = v.norm_l2();
        orthogonalize(&mut v, basis.as_ref().get(.., 0..j), par);
        normalize(&mut v, reference, j + 1)?;
        basis.col_mut(j).copy_from(v.col(0));
    }
    Ok(())
}
