//! Building blocks of the thick-restarted Golub–Kahan–Lanczos bidiagonalization.
//!
//! ** NOTE: We recommend using the high-level method [`crate::solvers::thick_restart_svd`]
//! instead. These modules are intended for use cases where fine-grained control over
//! the restart cycle is required.
//!
//! The process maintains a partial factorization
//!
//! ```text
//!     A Q_k = P_k B_k,        Aᵗ P_k = Q_k B_kᵗ + β q_{k+1} e_kᵗ
//! ```
//!
//! held in a [`FactorizationState`], and cycles through four stages:
//!
//! - [`golub_kahan::build`]: the initial `k`-step bidiagonalization from a start vector.
//! - [`truncate::truncate`]: the thick restart, which compresses both bases onto the
//!   best `l` Ritz directions and produces a broken-arrow working matrix.
//! - [`extend::extend`]: grows the truncated factorization back to working size `k`.
//! - [`convergence::estimate`]: Ritz error bounds used to accept the current values.

pub mod convergence;
pub mod extend;
pub mod golub_kahan;
pub mod truncate;

use crate::{
    bidiagonal::WorkingMatrix,
    error::{ThickSvdError, ThickSvdErrorKind},
};
use convergence::ConvergenceReport;
use faer::{
    Accum, Mat, MatRef, Par,
    dyn_stack::MemStack,
    linalg::{matmul::matmul, solvers::Svd},
    matrix_free::BiLinOp,
    unzip, zip,
};

/// A partial Golub–Kahan factorization `A Q = P B` plus its trailing residual norm.
///
/// Both bases are stored in buffers allocated once at full working size (`m×k` for `P`,
/// `n×(k+1)` for `Q`) with explicit used-column counts, so Build and Extend append
/// columns without reallocating. [`Self::p`] and [`Self::q`] expose only the live columns.
#[derive(Clone, Debug)]
pub struct FactorizationState {
    p: Mat<f64>,
    q: Mat<f64>,
    p_cols: usize,
    q_cols: usize,
    b: WorkingMatrix,
    beta: f64,
    // Normalized residual direction left behind by a truncation; the next extension
    // uses it as its first new `Q` column instead of recomputing `Aᵗ p`.
    residual: Option<Mat<f64>>,
}

impl FactorizationState {
    pub(crate) fn with_capacity(m: usize, n: usize, k: usize, b: WorkingMatrix) -> Self {
        Self {
            p: Mat::zeros(m, k),
            q: Mat::zeros(n, k + 1),
            p_cols: 0,
            q_cols: 0,
            b,
            beta: 0.0,
            residual: None,
        }
    }

    /// The live columns of the range-side basis `P` (`m × working_size`).
    pub fn p(&self) -> MatRef<'_, f64> {
        self.p.as_ref().get(.., 0..self.p_cols)
    }

    /// The live columns of the domain-side basis `Q`.
    ///
    /// Outside an extension this has one more column than `P`: the last column is the
    /// normalized residual direction.
    pub fn q(&self) -> MatRef<'_, f64> {
        self.q.as_ref().get(.., 0..self.q_cols)
    }

    /// The projected working matrix `B`.
    pub fn b(&self) -> &WorkingMatrix {
        &self.b
    }

    /// Norm of the last unnormalized residual vector.
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Number of live columns of `P`, which is also the order of `B`.
    pub fn working_size(&self) -> usize {
        self.p_cols
    }

    /// No residual direction is left: `span(Q)` is invariant under `AᵗA`, `β = 0`, and the
    /// Ritz values are exact singular values of `A`. Such a state cannot be restarted.
    pub fn is_invariant(&self) -> bool {
        self.q_cols == self.p_cols && self.residual.is_none()
    }

    /// The working size `k` the buffers were allocated for.
    pub fn capacity(&self) -> usize {
        self.p.ncols()
    }

    /// Recovers approximate singular vectors from the SVD of `B`.
    ///
    /// Returns `(P U[:, :l], Q[:, :k] V[:, :l])`, the left and right Ritz vectors that
    /// belong to the `l` largest Ritz values.
    pub fn ritz_vectors(
        &self,
        svd: &Svd<f64>,
        l: usize,
    ) -> Result<(Mat<f64>, Mat<f64>), ThickSvdError> {
        let k = self.working_size();
        check_svd_matches(self, svd)?;
        if l > k {
            return Err(ThickSvdErrorKind::ParameterMismatch {
                param_name: "l".to_string(),
                expected: k,
                actual: l,
            }
            .into());
        }
        let left = self.p() * svd.U().get(.., 0..l);
        let right = self.q().get(.., 0..k) * svd.V().get(.., 0..l);
        Ok((left, right))
    }

    pub(crate) fn push_p(&mut self, column: MatRef<'_, f64>) {
        self.p.col_mut(self.p_cols).copy_from(column.col(0));
        self.p_cols += 1;
    }

    pub(crate) fn push_q(&mut self, column: MatRef<'_, f64>) {
        self.q.col_mut(self.q_cols).copy_from(column.col(0));
        self.q_cols += 1;
    }
}

/// A read-only view of the solver after a completed restart, handed to the observer.
pub struct RestartSnapshot<'a> {
    /// Number of completed restarts (1-based).
    pub iteration: usize,
    /// Error bounds and backward-error diagnostics of the current Ritz values.
    pub report: &'a ConvergenceReport,
    /// The live factorization after the extension.
    pub state: &'a FactorizationState,
}

/// Observer invoked after every restart. It cannot alter the control flow.
pub type RestartCallback<'a> = dyn FnMut(&RestartSnapshot<'_>) + 'a;

/// Relative threshold below which an orthogonalized vector counts as zero.
///
/// A vector whose norm drops to this fraction of its norm before orthogonalization has
/// no component left outside the current basis: the subspace is invariant.
pub(crate) fn breakdown_tolerance() -> f64 {
    100.0 * f64::EPSILON
}

/// Scales `v` to unit norm and returns the norm it had.
///
/// `reference` is the norm of `v` before any projection was subtracted from it. Fails
/// with [`ThickSvdErrorKind::Breakdown`] when the remaining norm is zero, not finite, or
/// negligible relative to `reference`.
pub(crate) fn normalize(
    v: &mut Mat<f64>,
    reference: f64,
    step: usize,
) -> Result<f64, ThickSvdError> {
    let norm = v.norm_l2();
    if !(norm.is_finite() && norm > 0.0 && norm > breakdown_tolerance() * reference) {
        return Err(ThickSvdErrorKind::Breakdown { step }.into());
    }
    let inv = norm.recip();
    zip!(v.as_mut()).for_each(|unzip!(x)| *x *= inv);
    Ok(norm)
}

/// Removes from `v` its components along the (orthonormal) columns of `basis`.
pub(crate) fn orthogonalize(v: &mut Mat<f64>, basis: MatRef<'_, f64>, par: Par) {
    if basis.ncols() == 0 {
        return;
    }
    let mut coeffs = Mat::<f64>::zeros(basis.ncols(), v.ncols());
    matmul(
        coeffs.as_mut(),
        Accum::Replace,
        basis.transpose(),
        v.as_ref(),
        1.0,
        par,
    );
    matmul(v.as_mut(), Accum::Add, basis, coeffs.as_ref(), -1.0, par);
}

/// `v -= scale * x` for single-column matrices.
pub(crate) fn subtract_scaled(v: &mut Mat<f64>, scale: f64, x: MatRef<'_, f64>) {
    zip!(v.as_mut(), x).for_each(|unzip!(v, x)| *v -= scale * *x);
}

/// Computes `A x` into a freshly allocated matrix.
pub(crate) fn apply_forward(
    op: &impl BiLinOp<f64>,
    x: MatRef<'_, f64>,
    par: Par,
    stack: &mut MemStack,
) -> Mat<f64> {
    let mut out = Mat::zeros(op.nrows(), x.ncols());
    op.apply(out.as_mut(), x, par, stack);
    out
}

/// Computes `Aᵗ x` into a freshly allocated matrix.
pub(crate) fn apply_transpose(
    op: &impl BiLinOp<f64>,
    x: MatRef<'_, f64>,
    par: Par,
    stack: &mut MemStack,
) -> Mat<f64> {
    let mut out = Mat::zeros(op.ncols(), x.ncols());
    op.transpose_apply(out.as_mut(), x, par, stack);
    out
}

/// Checks that `svd` decomposes a matrix of the state's working size.
pub(crate) fn check_svd_matches(
    state: &FactorizationState,
    svd: &Svd<f64>,
) -> Result<(), ThickSvdError> {
    let k = state.working_size();
    if svd.U().nrows() != k || svd.V().nrows() != k {
        return Err(ThickSvdErrorKind::ParameterMismatch {
            param_name: "svd".to_string(),
            expected: k,
            actual: svd.U().nrows(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_utils {
    use faer::{Mat, MatRef};
    use rand::{Rng, SeedableRng, rngs::StdRng};

    /// `‖I - XᵗX‖_F`, the loss of orthonormality of the columns of `x`.
    pub fn orthogonality_loss(x: MatRef<'_, f64>) -> f64 {
        let gram = x.transpose() * x;
        let identity = Mat::<f64>::identity(x.ncols(), x.ncols());
        (&gram - &identity).norm_l2()
    }

    /// A dense matrix with uniform random entries, reproducible from `seed`.
    pub fn random_matrix(m: usize, n: usize, seed: u64) -> Mat<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Mat::from_fn(m, n, |_, _| rng.random::<f64>() - 0.5)
    }

    /// A unit-norm random start vector.
    pub fn random_unit_vector(n: usize, seed: u64) -> Mat<f64> {
        let v = random_matrix(n, 1, seed);
        let norm = v.norm_l2();
        Mat::from_fn(n, 1, |i, _| v[(i, 0)] / norm)
    }
}
